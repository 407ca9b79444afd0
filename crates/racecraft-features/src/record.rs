//! Raw race, lap and telemetry records consumed by the feature table builder.
//!
//! # Data Structure
//!
//! ```text
//! RaceSession (one race at one track)
//! ├─ track_id, race_id
//! └─ entries: Vec<DriverRaceRecord>
//!     ├─ driver_id, grid / finishing position, qualifying time
//!     └─ laps: Vec<LapRecord>
//!         ├─ lap number, lap time, sector times, running position
//!         ├─ trap speed, stint number, pit / caution flags
//!         └─ braking_points: Vec<BrakingPoint>
//! ```
//!
//! # Serialization
//!
//! ```json
//! {
//!   "track_id": "monza",
//!   "race_id": "r14",
//!   "entries": [
//!     {
//!       "driver_id": "VER",
//!       "grid_position": 1,
//!       "finishing_position": 2,
//!       "qualifying_time": 80.12,
//!       "laps": [
//!         { "lap_number": 1, "lap_time": 86.4, "position": 1, "stint": 1 }
//!       ]
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::ids::{DriverId, RaceId, TrackId};

/// All entries of one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSession {
    pub track_id: TrackId,
    pub race_id: RaceId,
    pub entries: Vec<DriverRaceRecord>,
}

/// One driver's data for one race.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverRaceRecord {
    pub driver_id: DriverId,
    /// Starting grid slot (1 = pole), if known
    #[serde(default)]
    pub grid_position: Option<u32>,
    /// Classified finishing position (1 = winner); `None` when not classified
    #[serde(default)]
    pub finishing_position: Option<u32>,
    /// Best qualifying lap time in seconds
    #[serde(default)]
    pub qualifying_time: Option<f64>,
    #[serde(default)]
    pub laps: Vec<LapRecord>,
}

/// One lap of one driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapRecord {
    /// 1-based lap number
    pub lap_number: u32,
    /// Lap time in seconds
    pub lap_time: f64,
    /// Sector times in seconds
    #[serde(default)]
    pub sector_times: Vec<f64>,
    /// Running position at the end of the lap
    #[serde(default)]
    pub position: Option<u32>,
    /// Maximum speed trap reading on the lap, km/h
    #[serde(default)]
    pub top_speed: Option<f64>,
    /// 1-based tire stint number
    #[serde(default = "default_stint")]
    pub stint: u32,
    #[serde(default)]
    pub pit_in: bool,
    #[serde(default)]
    pub pit_out: bool,
    /// Lap run (partly) under safety car, virtual safety car or yellow flags
    #[serde(default)]
    pub under_caution: bool,
    #[serde(default)]
    pub braking_points: Vec<BrakingPoint>,
}

fn default_stint() -> u32 {
    1
}

/// Distance before a corner at which the driver started braking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BrakingPoint {
    /// Corner number on the track
    pub corner: u32,
    /// Distance from the corner's reference marker, meters
    pub distance_m: f64,
}

impl LapRecord {
    /// Whether this lap reflects representative race pace.
    ///
    /// Clean laps exclude the opening lap, pit-in and pit-out laps and laps run
    /// under caution.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.lap_number > 1 && !self.pit_in && !self.pit_out && !self.under_caution
    }

    /// Whether this lap touched the pit lane.
    #[must_use]
    pub fn is_pit_lap(&self) -> bool {
        self.pit_in || self.pit_out
    }

    /// Whether every numeric field is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lap_time.is_finite()
            && self.sector_times.iter().all(|t| t.is_finite())
            && self.top_speed.is_none_or(f64::is_finite)
            && self.braking_points.iter().all(|b| b.distance_m.is_finite())
    }
}

impl DriverRaceRecord {
    /// Whether every numeric field of the record and its laps is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.qualifying_time.is_none_or(f64::is_finite) && self.laps.iter().all(LapRecord::is_finite)
    }

    /// Clean laps in lap-number order.
    pub fn clean_laps(&self) -> impl Iterator<Item = &LapRecord> {
        self.laps.iter().filter(|lap| lap.is_clean())
    }
}
