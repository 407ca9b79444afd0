//! An explicitly constructed, reloadable set of observations.
//!
//! Components take a `&Dataset` (or its observations) instead of reading
//! shared state; refitting with fresh data means calling [`Dataset::reload`]
//! or building a new dataset.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use racecraft_features::{
    builder::{FeatureConfig, FeatureTableBuilder},
    ids::{DriverId, TrackId},
    observation::{Exclusion, Observation, ObservationTable},
    record::RaceSession,
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DatasetError {
    #[display("failed to open observations file {}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("failed to parse observations file {}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("dataset was built in memory and has no source to reload")]
    NotReloadable,
}

/// Where a dataset was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSource {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    source: DatasetSource,
    table: ObservationTable,
}

impl Dataset {
    /// Loads an observation table from a JSON file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or does not hold a valid table.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = path.as_ref().to_path_buf();
        let table = read_table(&path)?;
        tracing::info!(path = %path.display(), observations = table.len(), "loaded dataset");
        Ok(Self {
            source: DatasetSource::File(path),
            table,
        })
    }

    /// Builds the observation table from raw race sessions.
    #[must_use]
    pub fn from_sessions(sessions: &[RaceSession], config: &FeatureConfig) -> Self {
        Self::from_table(FeatureTableBuilder::new(*config).build(sessions))
    }

    #[must_use]
    pub fn from_table(table: ObservationTable) -> Self {
        Self {
            source: DatasetSource::Memory,
            table,
        }
    }

    /// Re-reads the source file, replacing the current observations.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::NotReloadable`] for in-memory datasets, or the
    /// I/O and parse errors of [`Dataset::open`]. On error the current
    /// observations are kept.
    pub fn reload(&mut self) -> Result<(), DatasetError> {
        let DatasetSource::File(path) = &self.source else {
            return Err(DatasetError::NotReloadable);
        };
        self.table = read_table(path)?;
        tracing::info!(path = %path.display(), observations = self.table.len(), "reloaded dataset");
        Ok(())
    }

    #[must_use]
    pub fn source(&self) -> &DatasetSource {
        &self.source
    }

    #[must_use]
    pub fn table(&self) -> &ObservationTable {
        &self.table
    }

    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.table.observations
    }

    #[must_use]
    pub fn exclusions(&self) -> &[Exclusion] {
        &self.table.exclusions
    }

    #[must_use]
    pub fn drivers(&self) -> Vec<DriverId> {
        self.table.drivers()
    }

    #[must_use]
    pub fn tracks(&self) -> Vec<TrackId> {
        self.table.tracks()
    }

    /// Observations at one track, in key order.
    #[must_use]
    pub fn for_track(&self, track_id: &TrackId) -> Vec<Observation> {
        self.observations()
            .iter()
            .filter(|o| o.track_id() == track_id)
            .cloned()
            .collect()
    }
}

fn read_table(path: &Path) -> Result<ObservationTable, DatasetError> {
    let file = File::open(path).map_err(|source| DatasetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table: ObservationTable =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| DatasetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    // re-sort and deduplicate in case the file was edited by hand
    let mut checked = ObservationTable::from_observations(table.observations);
    checked.exclusions.splice(0..0, table.exclusions);
    Ok(checked)
}
