//! Latent driver-skill analysis for the Racecraft pipeline.
//!
//! Everything downstream of the observation table lives here:
//!
//! 1. **Factor extraction** ([`factor`]): fits a [`factor::FactorModel`] that reduces the
//!    observable metrics to a few skill factors and owns score orientation
//! 2. **Validation** ([`validation`]): leave-one-driver-out or leave-one-race-out
//!    cross-validation of the whole fit-then-predict pipeline
//! 3. **Track demand** ([`track_demand`]): which skills matter at which track
//! 4. **Circuit fit** ([`circuit_fit`]): how well a driver matches a track
//! 5. **Ranking** ([`ranking`]): per-driver profiles and dashboard records
//! 6. **Skill adjustments** ([`improve`]): budgeted "what if" scenarios with
//!    coaching from [`coaching`]
//!
//! Inputs come from a [`dataset::Dataset`]; settings from [`config::PipelineConfig`].
//! Every derived output carries the [`factor::ModelVersion`] of the model it
//! came from.
//!
//! # Example
//!
//! ```
//! use racecraft_analysis::{
//!     factor::{FactorConfig, FactorModel},
//!     ranking::DriverRanking,
//!     track_demand::{TrackDemandConfig, fit_track_profiles},
//! };
//! use racecraft_features::synthetic::{SyntheticConfig, SyntheticSeason};
//!
//! let season = SyntheticSeason::generate(&SyntheticConfig::default()).unwrap();
//! let observations = &season.table.observations;
//!
//! let model = FactorModel::fit(observations, &FactorConfig::default()).unwrap();
//! let ranking = DriverRanking::build(&model, observations);
//! let tracks = fit_track_profiles(observations, &model, &TrackDemandConfig::default()).unwrap();
//!
//! assert_eq!(ranking.model_version, tracks.model_version);
//! ```

pub mod circuit_fit;
pub mod coaching;
pub mod config;
pub mod dataset;
pub mod factor;
pub mod improve;
pub mod ranking;
pub mod track_demand;
pub mod validation;
