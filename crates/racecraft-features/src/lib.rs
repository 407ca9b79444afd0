//! Data model and feature engineering for the Racecraft driver-skill pipeline.
//!
//! This crate turns raw race, lap and telemetry records into the observable
//! variable table the factor pipeline consumes.
//!
//! # Overview
//!
//! 1. **Raw records** ([`record::RaceSession`]): one race with per-driver lap data
//! 2. **Feature table** ([`builder::FeatureTableBuilder`]): computes every
//!    [`feature::Feature`] per driver-race, applying reliability floors
//! 3. **Observations** ([`observation::ObservationTable`]): immutable rows keyed
//!    by [`ids::ObservationKey`], with explicit missing values and exclusion records
//!
//! [`synthetic::SyntheticSeason`] generates observation tables from a known latent
//! skill process for tests and experiments.
//!
//! # Example
//!
//! ```
//! use racecraft_features::{
//!     feature::Feature,
//!     synthetic::{SyntheticConfig, SyntheticSeason},
//! };
//!
//! let season = SyntheticSeason::generate(&SyntheticConfig::default()).unwrap();
//! let first = &season.table.observations[0];
//! assert!(first.features().get(Feature::QualifyingPace).is_some());
//! ```

pub mod builder;
pub mod feature;
pub mod ids;
pub mod observation;
pub mod record;
pub mod synthetic;
