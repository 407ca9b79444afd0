//! Identifiers for drivers, tracks and races.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            Serialize,
            Deserialize,
            derive_more::Display,
            derive_more::From,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }
    };
}

string_id!(
    /// Driver identifier (e.g. car number or driver code)
    DriverId
);
string_id!(
    /// Track (circuit) identifier
    TrackId
);
string_id!(
    /// Race identifier within a season (e.g. round number)
    RaceId
);

/// Unique key of one driver at one race at one track.
///
/// Ordering is track, race, then driver so that sorted tables group
/// observations of the same event together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObservationKey {
    pub track_id: TrackId,
    pub race_id: RaceId,
    pub driver_id: DriverId,
}

impl ObservationKey {
    #[must_use]
    pub fn new(
        driver_id: impl Into<DriverId>,
        track_id: impl Into<TrackId>,
        race_id: impl Into<RaceId>,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            race_id: race_id.into(),
            driver_id: driver_id.into(),
        }
    }

    /// Key of the event (track + race) this observation belongs to.
    #[must_use]
    pub fn event(&self) -> (&TrackId, &RaceId) {
        (&self.track_id, &self.race_id)
    }
}

impl std::fmt::Display for ObservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}/{}", self.driver_id, self.track_id, self.race_id)
    }
}
