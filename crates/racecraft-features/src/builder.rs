//! Feature table construction from raw race records.
//!
//! [`FeatureTableBuilder`] turns [`RaceSession`]s into an [`ObservationTable`]:
//! one row per driver-race, one value per [`Feature`].
//!
//! # Overview
//!
//! Building runs in two passes per session:
//!
//! 1. **Session context**: field-relative references (pole time, session best
//!    clean lap, trap speeds of the whole field)
//! 2. **Per-driver metrics**: each feature formula applied to the driver's laps,
//!    relative to the session context where needed
//!
//! # Reliability Floor
//!
//! Statistics computed over laps are only meaningful with enough laps. Every
//! lap-based metric requires at least [`FeatureConfig::min_clean_laps`] clean laps
//! (or samples); below that the metric is stored as missing rather than being
//! computed from too few points:
//!
//! - `best_lap_gap`, `lap_time_consistency`, `sector_consistency`: `min_clean_laps` clean laps
//! - `braking_consistency`: corners with `min_clean_laps` braking samples
//! - `late_stint_pace`, `degradation_slope`: stints with `min_clean_laps` clean laps
//! - `pace_retention`: `2 × min_clean_laps` clean laps (disjoint first/last windows)
//! - `overtakes`: running positions on `min_clean_laps` laps
//!
//! # Exclusions
//!
//! Driver-races that cannot form an observation at all are excluded with an
//! [`ExclusionReason`] and logged; they never enter the table with placeholder values.
//!
//! The builder is a pure function of its input: the same sessions always
//! produce the same table.

use std::collections::{BTreeMap, BTreeSet};

use racecraft_stats::{
    descriptive::{self, DescriptiveStats},
    percentiles::rank_percentile,
    regression::simple_slope,
};
use serde::{Deserialize, Serialize};

use crate::{
    feature::{Feature, FeatureValues},
    ids::ObservationKey,
    observation::{Exclusion, ExclusionReason, Observation, ObservationTable},
    record::{DriverRaceRecord, LapRecord, RaceSession},
};

/// Feature builder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Minimum clean laps (or samples) for a lap-based metric to be computed
    pub min_clean_laps: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { min_clean_laps: 5 }
    }
}

/// Builds observation tables from raw race sessions.
#[derive(Debug, Clone, Default)]
pub struct FeatureTableBuilder {
    config: FeatureConfig,
}

/// Field-relative references of one session.
#[derive(Debug)]
struct SessionContext {
    pole_time: Option<f64>,
    best_clean_lap: Option<f64>,
    sorted_top_speeds: Vec<f64>,
}

impl SessionContext {
    fn from_session(session: &RaceSession) -> Self {
        let entries = || session.entries.iter().filter(|e| e.is_finite());
        let pole_time = entries()
            .filter_map(|e| e.qualifying_time)
            .filter(|t| *t > 0.0)
            .min_by(f64::total_cmp);
        let best_clean_lap = entries()
            .flat_map(DriverRaceRecord::clean_laps)
            .map(|lap| lap.lap_time)
            .filter(|t| *t > 0.0)
            .min_by(f64::total_cmp);
        let mut sorted_top_speeds = entries().filter_map(max_top_speed).collect::<Vec<_>>();
        sorted_top_speeds.sort_by(f64::total_cmp);
        Self {
            pole_time,
            best_clean_lap,
            sorted_top_speeds,
        }
    }
}

impl FeatureTableBuilder {
    #[must_use]
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Builds the observation table for all sessions.
    ///
    /// # Examples
    ///
    /// ```
    /// use racecraft_features::{
    ///     builder::{FeatureConfig, FeatureTableBuilder},
    ///     record::RaceSession,
    /// };
    ///
    /// let sessions: Vec<RaceSession> = vec![];
    /// let table = FeatureTableBuilder::new(FeatureConfig::default()).build(&sessions);
    /// assert!(table.is_empty());
    /// ```
    #[must_use]
    pub fn build(&self, sessions: &[RaceSession]) -> ObservationTable {
        let mut observations = vec![];
        let mut exclusions = vec![];
        let mut seen = BTreeSet::new();

        for session in sessions {
            let context = SessionContext::from_session(session);
            for entry in &session.entries {
                let key = ObservationKey {
                    track_id: session.track_id.clone(),
                    race_id: session.race_id.clone(),
                    driver_id: entry.driver_id.clone(),
                };
                let result = if seen.insert(key.clone()) {
                    self.build_observation(&key, entry, &context)
                } else {
                    Err(ExclusionReason::DuplicateKey)
                };
                match result {
                    Ok(observation) => observations.push(observation),
                    Err(reason) => {
                        tracing::warn!(%key, %reason, "excluding driver-race from feature table");
                        exclusions.push(Exclusion { key, reason });
                    }
                }
            }
        }

        observations.sort_by(|a, b| a.key().cmp(b.key()));
        tracing::info!(
            observations = observations.len(),
            excluded = exclusions.len(),
            "built feature table"
        );
        ObservationTable {
            observations,
            exclusions,
        }
    }

    fn build_observation(
        &self,
        key: &ObservationKey,
        entry: &DriverRaceRecord,
        context: &SessionContext,
    ) -> Result<Observation, ExclusionReason> {
        if !entry.is_finite() {
            return Err(ExclusionReason::NonFiniteInput);
        }
        let finishing_position = entry
            .finishing_position
            .ok_or(ExclusionReason::NotClassified)?;
        if finishing_position == 0 {
            return Err(ExclusionReason::InvalidFinishingPosition);
        }
        if entry.laps.is_empty() {
            return Err(ExclusionReason::NoLaps);
        }

        let features = self.compute_features(entry, context);
        Observation::new(key.clone(), finishing_position, features)
            .map_err(|_| ExclusionReason::NonFiniteInput)
    }

    fn compute_features(&self, entry: &DriverRaceRecord, context: &SessionContext) -> FeatureValues {
        let floor = self.config.min_clean_laps.max(2);
        let mut laps = entry.laps.iter().collect::<Vec<_>>();
        laps.sort_by_key(|lap| lap.lap_number);
        let clean = laps
            .iter()
            .copied()
            .filter(|lap| lap.is_clean())
            .collect::<Vec<_>>();
        let stints = group_stints(&clean);

        let mut values = FeatureValues::missing();
        values.set(Feature::QualifyingPace, qualifying_pace(entry, context));
        values.set(Feature::BestLapGap, best_lap_gap(&clean, context, floor));
        values.set(Feature::TopSpeedRank, top_speed_rank(entry, context));
        values.set(
            Feature::LapTimeConsistency,
            lap_time_consistency(&clean, floor),
        );
        values.set(
            Feature::BrakingConsistency,
            braking_consistency(&clean, floor),
        );
        values.set(Feature::SectorConsistency, sector_consistency(&clean, floor));
        values.set(Feature::PositionsGained, positions_gained(entry));
        values.set(Feature::Overtakes, overtakes(&laps, floor));
        values.set(Feature::FirstLapGain, first_lap_gain(entry, &laps));
        values.set(Feature::LateStintPace, late_stint_pace(&stints, floor));
        values.set(Feature::DegradationSlope, degradation_slope(&stints, floor));
        values.set(Feature::PaceRetention, pace_retention(&clean, floor));
        values
    }
}

fn max_top_speed(entry: &DriverRaceRecord) -> Option<f64> {
    entry
        .laps
        .iter()
        .filter_map(|lap| lap.top_speed)
        .max_by(f64::total_cmp)
}

fn group_stints<'a>(clean: &[&'a LapRecord]) -> BTreeMap<u32, Vec<&'a LapRecord>> {
    let mut stints: BTreeMap<u32, Vec<&LapRecord>> = BTreeMap::new();
    for lap in clean {
        stints.entry(lap.stint).or_default().push(lap);
    }
    stints
}

#[expect(clippy::cast_precision_loss)]
fn weighted_mean(pairs: &[(f64, usize)]) -> Option<f64> {
    let total = pairs.iter().map(|(_, w)| *w).sum::<usize>();
    if total == 0 {
        return None;
    }
    Some(pairs.iter().map(|(v, w)| v * *w as f64).sum::<f64>() / total as f64)
}

fn lap_times(laps: &[&LapRecord]) -> Vec<f64> {
    laps.iter().map(|lap| lap.lap_time).collect()
}

fn qualifying_pace(entry: &DriverRaceRecord, context: &SessionContext) -> Option<f64> {
    let time = entry.qualifying_time.filter(|t| *t > 0.0)?;
    let pole = context.pole_time?;
    Some((time / pole - 1.0) * 100.0)
}

fn best_lap_gap(clean: &[&LapRecord], context: &SessionContext, floor: usize) -> Option<f64> {
    if clean.len() < floor {
        return None;
    }
    let best = lap_times(clean).into_iter().min_by(f64::total_cmp)?;
    let reference = context.best_clean_lap?;
    Some((best / reference - 1.0) * 100.0)
}

fn top_speed_rank(entry: &DriverRaceRecord, context: &SessionContext) -> Option<f64> {
    let own = max_top_speed(entry)?;
    Some(rank_percentile(&context.sorted_top_speeds, own))
}

fn lap_time_consistency(clean: &[&LapRecord], floor: usize) -> Option<f64> {
    if clean.len() < floor {
        return None;
    }
    DescriptiveStats::new(lap_times(clean))?.coefficient_of_variation()
}

fn braking_consistency(clean: &[&LapRecord], floor: usize) -> Option<f64> {
    let mut by_corner: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for lap in clean {
        for point in &lap.braking_points {
            by_corner.entry(point.corner).or_default().push(point.distance_m);
        }
    }
    let std_devs = by_corner
        .into_values()
        .filter(|samples| samples.len() >= floor)
        .filter_map(|samples| DescriptiveStats::new(samples).map(|s| s.std_dev))
        .collect::<Vec<_>>();
    descriptive::mean(&std_devs)
}

fn sector_consistency(clean: &[&LapRecord], floor: usize) -> Option<f64> {
    if clean.len() < floor {
        return None;
    }
    let num_sectors = clean
        .iter()
        .map(|lap| lap.sector_times.len())
        .max()
        .unwrap_or(0);
    let cvs = (0..num_sectors)
        .filter_map(|sector| {
            let times = clean
                .iter()
                .filter_map(|lap| lap.sector_times.get(sector).copied())
                .collect::<Vec<_>>();
            if times.len() < floor {
                return None;
            }
            DescriptiveStats::new(times)?.coefficient_of_variation()
        })
        .collect::<Vec<_>>();
    descriptive::mean(&cvs)
}

fn positions_gained(entry: &DriverRaceRecord) -> Option<f64> {
    let grid = entry.grid_position?;
    let finish = entry.finishing_position?;
    Some(f64::from(grid) - f64::from(finish))
}

fn overtakes(laps: &[&LapRecord], floor: usize) -> Option<f64> {
    let with_position = laps.iter().filter(|lap| lap.position.is_some()).count();
    if with_position < floor {
        return None;
    }
    let gained = laps
        .windows(2)
        .filter(|pair| {
            let (previous, current) = (pair[0], pair[1]);
            current.lap_number == previous.lap_number + 1
                && !previous.is_pit_lap()
                && !current.is_pit_lap()
                && !current.under_caution
        })
        .filter_map(|pair| Some((pair[0].position?, pair[1].position?)))
        .map(|(previous, current)| previous.saturating_sub(current))
        .sum::<u32>();
    Some(f64::from(gained))
}

fn first_lap_gain(entry: &DriverRaceRecord, laps: &[&LapRecord]) -> Option<f64> {
    let grid = entry.grid_position?;
    let after_lap_one = laps.iter().find(|lap| lap.lap_number == 1)?.position?;
    Some(f64::from(grid) - f64::from(after_lap_one))
}

fn late_stint_pace(stints: &BTreeMap<u32, Vec<&LapRecord>>, floor: usize) -> Option<f64> {
    let ratios = stints
        .values()
        .filter(|laps| laps.len() >= floor)
        .filter_map(|laps| {
            let times = lap_times(laps);
            let third = (times.len() / 3).max(1);
            let early = descriptive::mean(&times[..third])?;
            let late = descriptive::mean(&times[times.len() - third..])?;
            (early > 0.0).then(|| (late / early, times.len()))
        })
        .collect::<Vec<_>>();
    weighted_mean(&ratios)
}

fn degradation_slope(stints: &BTreeMap<u32, Vec<&LapRecord>>, floor: usize) -> Option<f64> {
    let slopes = stints
        .values()
        .filter(|laps| laps.len() >= floor)
        .filter_map(|laps| {
            let first_lap = laps.first()?.lap_number;
            let xs = laps
                .iter()
                .map(|lap| f64::from(lap.lap_number - first_lap))
                .collect::<Vec<_>>();
            let slope = simple_slope(&xs, &lap_times(laps))?;
            Some((slope, laps.len()))
        })
        .collect::<Vec<_>>();
    weighted_mean(&slopes)
}

fn pace_retention(clean: &[&LapRecord], floor: usize) -> Option<f64> {
    if clean.len() < 2 * floor {
        return None;
    }
    let times = lap_times(clean);
    let early = descriptive::median(&times[..floor])?;
    let late = descriptive::median(&times[times.len() - floor..])?;
    (early > 0.0).then(|| (late / early - 1.0) * 100.0)
}
