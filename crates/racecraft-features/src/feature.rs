//! Observable driver metrics and the skills they are expected to reflect.
//!
//! Each [`Feature`] is one engineered per-driver, per-race metric. Features carry two
//! pieces of static metadata the factor pipeline depends on:
//!
//! - a [`Direction`]: whether a higher raw value means better performance
//!   (e.g. `positions_gained`) or worse performance (e.g. lap-time gaps)
//! - a canonical [`SkillFactor`]: the latent skill the metric was designed to measure
//!
//! The canonical model has four skills measured by three metrics each:
//!
//! | Skill | Metrics |
//! |-------|---------|
//! | Raw speed | `qualifying_pace`, `best_lap_gap`, `top_speed_rank` |
//! | Consistency | `lap_time_consistency`, `braking_consistency`, `sector_consistency` |
//! | Racecraft | `positions_gained`, `overtakes`, `first_lap_gain` |
//! | Tire management | `late_stint_pace`, `degradation_slope`, `pace_retention` |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Whether larger raw values of a metric indicate better performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    /// `+1.0` for higher-is-better, `-1.0` for lower-is-better.
    ///
    /// Multiplying a standardized value by this sign yields a
    /// performance-oriented value where higher is always better.
    #[must_use]
    pub const fn sign(self) -> f64 {
        match self {
            Direction::HigherIsBetter => 1.0,
            Direction::LowerIsBetter => -1.0,
        }
    }
}

/// Latent driver skills of the canonical four-factor model.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum SkillFactor {
    #[display("Raw Speed")]
    RawSpeed,
    #[display("Consistency")]
    Consistency,
    #[display("Racecraft")]
    Racecraft,
    #[display("Tire Management")]
    TireManagement,
}

impl SkillFactor {
    pub const ALL: [SkillFactor; 4] = [
        SkillFactor::RawSpeed,
        SkillFactor::Consistency,
        SkillFactor::Racecraft,
        SkillFactor::TireManagement,
    ];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            SkillFactor::RawSpeed => "raw_speed",
            SkillFactor::Consistency => "consistency",
            SkillFactor::Racecraft => "racecraft",
            SkillFactor::TireManagement => "tire_management",
        }
    }

    /// Parses a skill from its snake_case id.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|skill| skill.id() == id)
    }

    /// The canonical metrics designed to measure this skill.
    pub fn features(self) -> impl Iterator<Item = Feature> {
        Feature::ALL
            .into_iter()
            .filter(move |feature| feature.skill() == self)
    }
}

/// Engineered per-driver, per-race metric.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Qualifying gap to pole in percent.
    ///
    /// # Raw measurement
    ///
    /// `(qualifying_time / pole_time - 1) × 100`, where the pole time is the fastest
    /// qualifying time in the session.
    QualifyingPace,
    /// Best clean race lap gap to the session's best clean lap in percent.
    BestLapGap,
    /// Percentile rank (0-100) of the driver's maximum trap speed within the session.
    TopSpeedRank,
    /// Coefficient of variation (percent) of clean lap times.
    LapTimeConsistency,
    /// Mean over corners of the standard deviation of braking-point distance, in meters.
    BrakingConsistency,
    /// Mean over sectors of the coefficient of variation (percent) of clean sector times.
    SectorConsistency,
    /// Grid position minus finishing position.
    PositionsGained,
    /// Positions gained on track between consecutive non-pit laps.
    ///
    /// # Raw measurement
    ///
    /// `Σ max(0, previous_position - position)` over consecutive laps where neither lap
    /// is a pit-in or pit-out lap, so places gained through pit cycles are not counted.
    Overtakes,
    /// Grid position minus position at the end of lap 1.
    FirstLapGain,
    /// Lap-weighted mean over stints of `mean(last third) / mean(first third)` of clean laps.
    LateStintPace,
    /// Lap-weighted mean over stints of the lap-time slope against lap-in-stint, seconds per lap.
    DegradationSlope,
    /// Median of the last five clean laps relative to the first five, in percent.
    PaceRetention,
}

impl Feature {
    pub const COUNT: usize = 12;

    pub const ALL: [Feature; Self::COUNT] = [
        Feature::QualifyingPace,
        Feature::BestLapGap,
        Feature::TopSpeedRank,
        Feature::LapTimeConsistency,
        Feature::BrakingConsistency,
        Feature::SectorConsistency,
        Feature::PositionsGained,
        Feature::Overtakes,
        Feature::FirstLapGain,
        Feature::LateStintPace,
        Feature::DegradationSlope,
        Feature::PaceRetention,
    ];

    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Feature::QualifyingPace => "qualifying_pace",
            Feature::BestLapGap => "best_lap_gap",
            Feature::TopSpeedRank => "top_speed_rank",
            Feature::LapTimeConsistency => "lap_time_consistency",
            Feature::BrakingConsistency => "braking_consistency",
            Feature::SectorConsistency => "sector_consistency",
            Feature::PositionsGained => "positions_gained",
            Feature::Overtakes => "overtakes",
            Feature::FirstLapGain => "first_lap_gain",
            Feature::LateStintPace => "late_stint_pace",
            Feature::DegradationSlope => "degradation_slope",
            Feature::PaceRetention => "pace_retention",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Feature::QualifyingPace => "Qualifying Pace",
            Feature::BestLapGap => "Best Lap Gap",
            Feature::TopSpeedRank => "Top Speed Rank",
            Feature::LapTimeConsistency => "Lap Time Consistency",
            Feature::BrakingConsistency => "Braking Consistency",
            Feature::SectorConsistency => "Sector Consistency",
            Feature::PositionsGained => "Positions Gained",
            Feature::Overtakes => "Overtakes",
            Feature::FirstLapGain => "First Lap Gain",
            Feature::LateStintPace => "Late Stint Pace",
            Feature::DegradationSlope => "Degradation Slope",
            Feature::PaceRetention => "Pace Retention",
        }
    }

    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Feature::TopSpeedRank
            | Feature::PositionsGained
            | Feature::Overtakes
            | Feature::FirstLapGain => Direction::HigherIsBetter,
            Feature::QualifyingPace
            | Feature::BestLapGap
            | Feature::LapTimeConsistency
            | Feature::BrakingConsistency
            | Feature::SectorConsistency
            | Feature::LateStintPace
            | Feature::DegradationSlope
            | Feature::PaceRetention => Direction::LowerIsBetter,
        }
    }

    #[must_use]
    pub const fn skill(self) -> SkillFactor {
        match self {
            Feature::QualifyingPace | Feature::BestLapGap | Feature::TopSpeedRank => {
                SkillFactor::RawSpeed
            }
            Feature::LapTimeConsistency
            | Feature::BrakingConsistency
            | Feature::SectorConsistency => SkillFactor::Consistency,
            Feature::PositionsGained | Feature::Overtakes | Feature::FirstLapGain => {
                SkillFactor::Racecraft
            }
            Feature::LateStintPace | Feature::DegradationSlope | Feature::PaceRetention => {
                SkillFactor::TireManagement
            }
        }
    }

    /// Parses a feature from its snake_case id.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|feature| feature.id() == id)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Value of every feature for one observation.
///
/// A feature whose value could not be computed reliably is stored as `None`
/// (serialized as `null`). Absent values are never replaced by zero here;
/// downstream consumers decide whether to exclude or impute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureValues(BTreeMap<Feature, Option<f64>>);

impl FeatureValues {
    /// Creates a set where every feature is missing.
    #[must_use]
    pub fn missing() -> Self {
        Self(Feature::ALL.into_iter().map(|f| (f, None)).collect())
    }

    /// Returns the value of `feature`, or `None` if it is missing.
    #[must_use]
    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.0.get(&feature).copied().flatten()
    }

    /// Sets the value of `feature`. Non-finite values are stored as missing.
    pub fn set(&mut self, feature: Feature, value: Option<f64>) {
        let value = match value {
            Some(v) if !v.is_finite() => {
                tracing::debug!(%feature, value = v, "non-finite feature value stored as missing");
                None
            }
            value => value,
        };
        self.0.insert(feature, value);
    }

    #[must_use]
    pub fn with(mut self, feature: Feature, value: f64) -> Self {
        self.set(feature, Some(value));
        self
    }

    /// Features whose value is missing, in canonical order.
    pub fn missing_features(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL
            .into_iter()
            .filter(|feature| self.get(*feature).is_none())
    }

    /// Returns `true` if any stored value is non-finite.
    ///
    /// Values written through [`FeatureValues::set`] are always finite; this guards
    /// against deserialized input.
    #[must_use]
    pub fn has_non_finite(&self) -> bool {
        self.0.values().flatten().any(|v| !v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_skill_has_three_features() {
        for skill in SkillFactor::ALL {
            assert_eq!(skill.features().count(), 3, "{skill}");
        }
    }

    #[test]
    fn test_ids_roundtrip() {
        for feature in Feature::ALL {
            assert_eq!(Feature::from_id(feature.id()), Some(feature));
            let json = serde_json::to_string(&feature).unwrap();
            assert_eq!(json, format!("\"{}\"", feature.id()));
        }
        for skill in SkillFactor::ALL {
            assert_eq!(SkillFactor::from_id(skill.id()), Some(skill));
        }
        assert_eq!(Feature::from_id("lap_time"), None);
    }

    #[test]
    fn test_missing_is_distinct_from_zero() {
        let values = FeatureValues::missing().with(Feature::Overtakes, 0.0);
        assert_eq!(values.get(Feature::Overtakes), Some(0.0));
        assert_eq!(values.get(Feature::FirstLapGain), None);
        assert_eq!(values.missing_features().count(), Feature::COUNT - 1);

        let json = serde_json::to_value(&values).unwrap();
        assert_eq!(json["overtakes"], serde_json::json!(0.0));
        assert!(json["first_lap_gain"].is_null());
    }

    #[test]
    fn test_non_finite_values_are_stored_as_missing() {
        let mut values = FeatureValues::missing();
        values.set(Feature::BestLapGap, Some(f64::NAN));
        assert_eq!(values.get(Feature::BestLapGap), None);

        let mut values = values.with(Feature::Overtakes, 3.0);
        values.set(Feature::Overtakes, Some(f64::INFINITY));
        assert_eq!(values.get(Feature::Overtakes), None);
        assert!(!values.has_non_finite());
        assert!(values.missing_features().any(|f| f == Feature::Overtakes));
    }
}
