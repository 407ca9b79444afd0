//! Seeded synthetic seasons with a known generating process.
//!
//! Each driver has a fixed latent skill vector (one value per [`SkillFactor`]).
//! Every race adds per-race form noise, then every feature is generated from
//! the skill it belongs to:
//!
//! ```text
//! signal_j = loading × form_f + √(1 - loading²) × ε
//! raw_j    = center_j + direction_j × scale_j × signal_j
//! ```
//!
//! Finishing positions are the ranks within each race of a linear outcome
//! `Σ outcome_weights_f × form_f + outcome_noise × ε`. The noise-free part is
//! kept in [`SyntheticSeason::performance`].
//!
//! The same configuration (including seed) always produces the same season.

use std::collections::BTreeMap;

use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{
    feature::{Feature, FeatureValues, SkillFactor},
    ids::{DriverId, ObservationKey, RaceId, TrackId},
    observation::{Observation, ObservationError, ObservationTable},
};

/// Parameters of the generating process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub drivers: usize,
    pub races: usize,
    /// Races are assigned to tracks round-robin
    pub tracks: usize,
    pub seed: u64,
    /// Loading of every feature on its skill, in `(0, 1)`
    pub loading: f64,
    /// Standard deviation of per-race form around the driver's skill
    pub form_sd: f64,
    /// Correlation between the skills of one driver
    pub skill_correlation: f64,
    /// Weight of each skill in the outcome, in [`SkillFactor::ALL`] order
    pub outcome_weights: [f64; 4],
    pub outcome_noise: f64,
    /// Probability that any one feature value is missing
    pub missing_rate: f64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            drivers: 20,
            races: 20,
            tracks: 5,
            seed: 42,
            loading: 0.8,
            form_sd: 0.5,
            skill_correlation: 0.2,
            outcome_weights: [1.0, 0.5, 0.7, 0.4],
            outcome_noise: 0.5,
            missing_rate: 0.0,
        }
    }
}

/// A generated season together with the true skills behind it.
#[derive(Debug, Clone)]
pub struct SyntheticSeason {
    /// True latent skills per driver, in [`SkillFactor::ALL`] order
    pub skills: BTreeMap<DriverId, [f64; 4]>,
    /// Noise-free outcome (weighted race form) behind each finishing position
    pub performance: BTreeMap<ObservationKey, f64>,
    pub table: ObservationTable,
}

impl SyntheticSeason {
    /// Generates a season.
    ///
    /// # Errors
    ///
    /// Fails only if the configuration produces non-finite feature values
    /// (e.g. a non-finite loading).
    ///
    /// # Examples
    ///
    /// ```
    /// use racecraft_features::synthetic::{SyntheticConfig, SyntheticSeason};
    ///
    /// let config = SyntheticConfig { drivers: 4, races: 3, ..Default::default() };
    /// let season = SyntheticSeason::generate(&config).unwrap();
    /// assert_eq!(season.table.len(), 12);
    /// assert_eq!(season.skills.len(), 4);
    /// ```
    pub fn generate(config: &SyntheticConfig) -> Result<Self, ObservationError> {
        let mut rng = Pcg32::seed_from_u64(config.seed);
        let tracks = config.tracks.max(1);

        let common_share = config.skill_correlation.clamp(0.0, 1.0);
        let skills = (1..=config.drivers)
            .map(|i| {
                let common = normal(&mut rng);
                let skill = std::array::from_fn(|_| {
                    common_share.sqrt() * common + (1.0 - common_share).sqrt() * normal(&mut rng)
                });
                (DriverId::new(format!("D{i:02}")), skill)
            })
            .collect::<BTreeMap<_, _>>();

        let unique = (1.0 - config.loading.powi(2)).max(0.0).sqrt();
        let mut observations = Vec::with_capacity(config.drivers * config.races);
        let mut performance = BTreeMap::new();
        for race in 0..config.races {
            let track_id = TrackId::new(format!("T{}", race % tracks + 1));
            let race_id = RaceId::new(format!("R{:02}", race + 1));

            let mut entries = skills
                .iter()
                .map(|(driver_id, skill)| {
                    let form: [f64; 4] =
                        std::array::from_fn(|f| skill[f] + config.form_sd * normal(&mut rng));
                    let expected = form
                        .iter()
                        .zip(config.outcome_weights)
                        .map(|(s, w)| s * w)
                        .sum::<f64>();
                    let outcome = expected + config.outcome_noise * normal(&mut rng);
                    let mut features = FeatureValues::missing();
                    for feature in Feature::ALL {
                        let signal =
                            config.loading * form[skill_index(feature.skill())] + unique * normal(&mut rng);
                        let (center, scale) = feature_scale(feature);
                        let raw = center + feature.direction().sign() * scale * signal;
                        let dropped = config.missing_rate > 0.0 && rng.random_bool(config.missing_rate.min(1.0));
                        if !dropped {
                            features.set(feature, Some(raw));
                        }
                    }
                    (driver_id.clone(), outcome, expected, features)
                })
                .collect::<Vec<_>>();

            entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            for (rank, (driver_id, _, expected, features)) in (1..).zip(entries) {
                let key = ObservationKey {
                    track_id: track_id.clone(),
                    race_id: race_id.clone(),
                    driver_id,
                };
                performance.insert(key.clone(), expected);
                observations.push(Observation::new(key, rank, features)?);
            }
        }

        Ok(Self {
            skills,
            performance,
            table: ObservationTable::from_observations(observations),
        })
    }
}

fn normal(rng: &mut Pcg32) -> f64 {
    rng.sample(StandardNormal)
}

fn skill_index(skill: SkillFactor) -> usize {
    match skill {
        SkillFactor::RawSpeed => 0,
        SkillFactor::Consistency => 1,
        SkillFactor::Racecraft => 2,
        SkillFactor::TireManagement => 3,
    }
}

/// Typical center and spread of each raw metric.
fn feature_scale(feature: Feature) -> (f64, f64) {
    match feature {
        Feature::QualifyingPace => (1.2, 0.5),
        Feature::BestLapGap => (1.0, 0.4),
        Feature::TopSpeedRank => (50.0, 20.0),
        Feature::LapTimeConsistency => (1.5, 0.4),
        Feature::BrakingConsistency => (4.0, 1.2),
        Feature::SectorConsistency => (2.0, 0.5),
        Feature::PositionsGained => (0.0, 2.5),
        Feature::Overtakes => (3.0, 1.5),
        Feature::FirstLapGain => (0.0, 1.5),
        Feature::LateStintPace => (1.01, 0.006),
        Feature::DegradationSlope => (0.08, 0.03),
        Feature::PaceRetention => (1.0, 0.5),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_seeded() {
        let config = SyntheticConfig {
            drivers: 5,
            races: 4,
            ..Default::default()
        };
        let a = SyntheticSeason::generate(&config).unwrap();
        let b = SyntheticSeason::generate(&config).unwrap();
        assert_eq!(a.table.observations, b.table.observations);
        assert_eq!(a.performance.len(), 20);
        assert!(a.table.observations.iter().all(|o| a.performance.contains_key(o.key())));

        let c = SyntheticSeason::generate(&SyntheticConfig { seed: 7, ..config }).unwrap();
        assert_ne!(a.table.observations, c.table.observations);
    }

    #[test]
    fn test_positions_are_ranks_within_each_race() {
        let config = SyntheticConfig {
            drivers: 6,
            races: 3,
            tracks: 2,
            ..Default::default()
        };
        let season = SyntheticSeason::generate(&config).unwrap();
        assert_eq!(season.table.tracks().len(), 2);

        let mut by_race: BTreeMap<_, Vec<u32>> = BTreeMap::new();
        for observation in &season.table.observations {
            by_race
                .entry(observation.key().event())
                .or_default()
                .push(observation.finishing_position());
        }
        assert_eq!(by_race.len(), 3);
        for positions in by_race.values_mut() {
            positions.sort_unstable();
            assert_eq!(*positions, (1..=6).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_directions_follow_skill() {
        // a much faster driver has smaller lap-time gaps on average
        let config = SyntheticConfig {
            drivers: 30,
            races: 10,
            ..Default::default()
        };
        let season = SyntheticSeason::generate(&config).unwrap();
        let (fastest, _) = season
            .skills
            .iter()
            .max_by(|a, b| a.1[0].total_cmp(&b.1[0]))
            .unwrap();
        let (slowest, _) = season
            .skills
            .iter()
            .min_by(|a, b| a.1[0].total_cmp(&b.1[0]))
            .unwrap();
        let mean_gap = |driver: &DriverId| {
            let values = season
                .table
                .observations
                .iter()
                .filter(|o| o.driver_id() == driver)
                .filter_map(|o| o.features().get(Feature::QualifyingPace))
                .collect::<Vec<_>>();
            values.iter().sum::<f64>() / values.len() as f64
        };
        assert!(mean_gap(fastest) < mean_gap(slowest));
    }

    #[test]
    fn test_missing_rate_drops_values() {
        let config = SyntheticConfig {
            drivers: 10,
            races: 10,
            missing_rate: 0.2,
            ..Default::default()
        };
        let season = SyntheticSeason::generate(&config).unwrap();
        let missing = season
            .table
            .observations
            .iter()
            .map(|o| o.features().missing_features().count())
            .sum::<usize>();
        assert!(missing > 0);
    }
}
