//! Observations: one driver at one race, with engineered features and outcome.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    feature::FeatureValues,
    ids::{DriverId, ObservationKey, RaceId, TrackId},
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ObservationError {
    #[display("{key}: finishing position must be at least 1")]
    InvalidFinishingPosition { key: ObservationKey },
    #[display("{key}: feature values must be finite")]
    NonFiniteFeature { key: ObservationKey },
}

/// One driver at one race (at one track).
///
/// Observations are immutable once built: fields are private and only
/// readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawObservation")]
pub struct Observation {
    key: ObservationKey,
    finishing_position: u32,
    features: FeatureValues,
}

#[derive(Deserialize)]
struct RawObservation {
    key: ObservationKey,
    finishing_position: u32,
    features: FeatureValues,
}

impl TryFrom<RawObservation> for Observation {
    type Error = ObservationError;

    fn try_from(raw: RawObservation) -> Result<Self, Self::Error> {
        Observation::new(raw.key, raw.finishing_position, raw.features)
    }
}

impl Observation {
    /// Creates an observation, validating the outcome and feature values.
    ///
    /// # Errors
    ///
    /// Fails if `finishing_position` is zero or any feature value is non-finite.
    pub fn new(
        key: ObservationKey,
        finishing_position: u32,
        features: FeatureValues,
    ) -> Result<Self, ObservationError> {
        if finishing_position == 0 {
            return Err(ObservationError::InvalidFinishingPosition { key });
        }
        if features.has_non_finite() {
            return Err(ObservationError::NonFiniteFeature { key });
        }
        Ok(Self {
            key,
            finishing_position,
            features,
        })
    }

    #[must_use]
    pub fn key(&self) -> &ObservationKey {
        &self.key
    }

    #[must_use]
    pub fn driver_id(&self) -> &DriverId {
        &self.key.driver_id
    }

    #[must_use]
    pub fn track_id(&self) -> &TrackId {
        &self.key.track_id
    }

    #[must_use]
    pub fn race_id(&self) -> &RaceId {
        &self.key.race_id
    }

    #[must_use]
    pub fn finishing_position(&self) -> u32 {
        self.finishing_position
    }

    #[must_use]
    pub fn features(&self) -> &FeatureValues {
        &self.features
    }
}

/// Why a driver-race was left out of the observation table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    #[display("driver was not classified")]
    NotClassified,
    #[display("finishing position is invalid")]
    InvalidFinishingPosition,
    #[display("record contains non-finite values")]
    NonFiniteInput,
    #[display("duplicate driver entry for the same race")]
    DuplicateKey,
    #[display("no lap data")]
    NoLaps,
}

/// A driver-race rejected by the builder, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub key: ObservationKey,
    pub reason: ExclusionReason,
}

/// The observable-variable table: one row per driver-race.
///
/// Rows are sorted by [`ObservationKey`] and keys are unique.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationTable {
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub exclusions: Vec<Exclusion>,
}

impl ObservationTable {
    /// Builds a table from observations, dropping duplicate keys.
    ///
    /// The first occurrence of a key is kept; later ones are recorded as
    /// [`ExclusionReason::DuplicateKey`].
    #[must_use]
    pub fn from_observations<I>(observations: I) -> Self
    where
        I: IntoIterator<Item = Observation>,
    {
        let mut seen = BTreeSet::new();
        let mut table = Self::default();
        for observation in observations {
            if seen.insert(observation.key().clone()) {
                table.observations.push(observation);
            } else {
                tracing::warn!(key = %observation.key(), "dropping duplicate observation");
                table.exclusions.push(Exclusion {
                    key: observation.key().clone(),
                    reason: ExclusionReason::DuplicateKey,
                });
            }
        }
        table.observations.sort_by(|a, b| a.key().cmp(b.key()));
        table
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Distinct drivers in key order.
    #[must_use]
    pub fn drivers(&self) -> Vec<DriverId> {
        self.observations
            .iter()
            .map(|o| o.driver_id().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct tracks in key order.
    #[must_use]
    pub fn tracks(&self) -> Vec<TrackId> {
        self.observations
            .iter()
            .map(|o| o.track_id().clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;

    fn observation(driver: &str, race: &str, position: u32) -> Observation {
        Observation::new(
            ObservationKey::new(driver, "monza", race),
            position,
            FeatureValues::missing().with(Feature::PositionsGained, 1.0),
        )
        .unwrap()
    }

    #[test]
    fn test_zero_finishing_position_is_rejected() {
        let err = Observation::new(
            ObservationKey::new("A", "monza", "r1"),
            0,
            FeatureValues::missing(),
        )
        .unwrap_err();
        assert!(matches!(err, ObservationError::InvalidFinishingPosition { .. }));
    }

    #[test]
    fn test_deserialization_validates() {
        let json = r#"{"key":{"track_id":"t","race_id":"r","driver_id":"d"},"finishing_position":0,"features":{}}"#;
        assert!(serde_json::from_str::<Observation>(json).is_err());

        let json = r#"{"key":{"track_id":"t","race_id":"r","driver_id":"d"},"finishing_position":3,"features":{"overtakes":2.0,"first_lap_gain":null}}"#;
        let observation: Observation = serde_json::from_str(json).unwrap();
        assert_eq!(observation.features().get(Feature::Overtakes), Some(2.0));
        assert_eq!(observation.features().get(Feature::FirstLapGain), None);
        assert_eq!(observation.features().get(Feature::QualifyingPace), None);
    }

    #[test]
    fn test_table_drops_duplicates_and_sorts() {
        let table = ObservationTable::from_observations([
            observation("B", "r1", 2),
            observation("A", "r1", 1),
            observation("B", "r1", 3),
        ]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.observations[0].driver_id().as_str(), "A");
        assert_eq!(table.exclusions.len(), 1);
        assert_eq!(table.exclusions[0].reason, ExclusionReason::DuplicateKey);
        assert_eq!(table.drivers().len(), 2);
        assert_eq!(table.tracks().len(), 1);
    }
}
