//! Grouped cross-validation of the full fit-then-predict pipeline.
//!
//! Observations are grouped by driver (leave-one-driver-out) or by race
//! (leave-one-race-out). For every group the factor model **and** the outcome
//! predictor are refitted on the remaining groups, then the held-out
//! finishing positions are predicted. Pooled held-out predictions give the
//! out-of-sample metrics; a fit on everything gives the in-sample ones.
//!
//! ```text
//! shrinkage   = R²_in - R²_oos
//! shrinkage % = shrinkage / R²_in × 100      (when R²_in > 0)
//! overfitting = shrinkage % > shrinkage_warning_pct
//! ```
//!
//! Folds are independent and may run in parallel; the report is identical
//! either way.

use std::collections::{BTreeMap, BTreeSet};

use racecraft_features::{
    ids::{ObservationKey, TrackId},
    observation::Observation,
};
use racecraft_stats::metrics::FitMetrics;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    factor::{FactorConfig, FactorError, FactorModel, ModelVersion, scoring::ScoreError},
    track_demand::{
        Confidence, DemandScope, TrackDemandConfig, TrackDemandError, TrackDemandProfile,
    },
};

/// Fits a factor model on a set of observations.
pub trait ModelBuilder: Sync {
    /// # Errors
    ///
    /// Returns a [`FactorError`] when the observations cannot be fitted.
    fn build(&self, observations: &[Observation]) -> Result<FactorModel, FactorError>;
}

impl ModelBuilder for FactorConfig {
    fn build(&self, observations: &[Observation]) -> Result<FactorModel, FactorError> {
        FactorModel::fit(observations, self)
    }
}

/// Fits an outcome model on factor scores.
pub trait Predictor: Sync {
    type Fitted: FittedPredictor + Send;

    /// # Errors
    ///
    /// Returns a [`PredictorError`] when the training data cannot be fitted.
    fn fit(
        &self,
        model: &FactorModel,
        training: &[Observation],
    ) -> Result<Self::Fitted, PredictorError>;
}

pub trait FittedPredictor {
    /// Predicted finishing position of one observation.
    ///
    /// # Errors
    ///
    /// Returns a [`PredictorError`] when the observation cannot be scored.
    fn predict(&self, model: &FactorModel, observation: &Observation)
    -> Result<f64, PredictorError>;
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum PredictorError {
    #[display("observation cannot be scored")]
    Score { source: ScoreError },
    #[display("outcome regression failed")]
    Regression { source: TrackDemandError },
    #[display("scores and outcome model come from different model versions")]
    #[from(ignore)]
    VersionMismatch,
}

/// One OLS regression of finishing position on all factor z-scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRegression;

impl Predictor for GlobalRegression {
    type Fitted = TrackDemandProfile;

    fn fit(
        &self,
        model: &FactorModel,
        training: &[Observation],
    ) -> Result<Self::Fitted, PredictorError> {
        Ok(TrackDemandProfile::fit(
            DemandScope::Global,
            training,
            model,
            &TrackDemandConfig::default(),
        )?)
    }
}

impl FittedPredictor for TrackDemandProfile {
    fn predict(
        &self,
        model: &FactorModel,
        observation: &Observation,
    ) -> Result<f64, PredictorError> {
        let scores = model.score(observation)?;
        TrackDemandProfile::predict(self, &scores).ok_or(PredictorError::VersionMismatch)
    }
}

/// Per-track regressions where the track has enough training data, the
/// global regression elsewhere.
#[derive(Debug, Clone, Default)]
pub struct TrackDemandPredictor {
    pub config: TrackDemandConfig,
}

#[derive(Debug, Clone)]
pub struct FittedTrackDemand {
    global: TrackDemandProfile,
    tracks: BTreeMap<TrackId, TrackDemandProfile>,
}

impl Predictor for TrackDemandPredictor {
    type Fitted = FittedTrackDemand;

    fn fit(
        &self,
        model: &FactorModel,
        training: &[Observation],
    ) -> Result<Self::Fitted, PredictorError> {
        let scores = model.score_all(training);
        let global =
            TrackDemandProfile::from_scores(DemandScope::Global, &scores, model, &self.config)?;
        let track_ids = scores
            .iter()
            .map(|s| s.key.track_id.clone())
            .collect::<BTreeSet<_>>();
        let mut tracks = BTreeMap::new();
        for track_id in track_ids {
            let track_scores = scores
                .iter()
                .filter(|s| s.key.track_id == track_id)
                .cloned()
                .collect::<Vec<_>>();
            let scope = DemandScope::Track {
                track_id: track_id.clone(),
            };
            // low-confidence and refused tracks fall back to the global profile
            let profile = TrackDemandProfile::from_scores(scope, &track_scores, model, &self.config)
                .ok()
                .filter(|p| p.confidence == Confidence::Normal);
            if let Some(profile) = profile {
                tracks.insert(track_id, profile);
            }
        }
        Ok(FittedTrackDemand { global, tracks })
    }
}

impl FittedPredictor for FittedTrackDemand {
    fn predict(
        &self,
        model: &FactorModel,
        observation: &Observation,
    ) -> Result<f64, PredictorError> {
        let scores = model.score(observation)?;
        self.tracks
            .get(observation.track_id())
            .unwrap_or(&self.global)
            .predict(&scores)
            .ok_or(PredictorError::VersionMismatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum ValidationAxis {
    /// Leave one driver out
    #[display("driver")]
    Driver,
    /// Leave one race out
    #[display("race")]
    Race,
}

impl ValidationAxis {
    fn group(self, key: &ObservationKey) -> String {
        match self {
            ValidationAxis::Driver => key.driver_id.to_string(),
            ValidationAxis::Race => format!("{}/{}", key.track_id, key.race_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub axis: ValidationAxis,
    /// Run folds on the rayon thread pool
    pub parallel: bool,
    /// Shrinkage percentage above which the fit is flagged as overfitting
    pub shrinkage_warning_pct: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            axis: ValidationAxis::Driver,
            parallel: true,
            shrinkage_warning_pct: 30.0,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum FoldError {
    #[display("factor model fit failed")]
    Model { source: FactorError },
    #[display("outcome model fit failed")]
    Predictor { source: PredictorError },
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ValidationError {
    #[display("{axis} validation needs at least two groups, found {groups}")]
    TooFewGroups { axis: ValidationAxis, groups: usize },
    #[display("full-sample factor model fit failed")]
    FullSample { source: FactorError },
    #[display("full-sample outcome model fit failed")]
    FullSamplePredictor { source: PredictorError },
    #[display("fold {fold} failed")]
    Fold { fold: String, source: FoldError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldPrediction {
    pub fold: String,
    pub key: ObservationKey,
    pub actual: f64,
    pub predicted: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldSummary {
    /// Held-out group
    pub fold: String,
    pub model_version: ModelVersion,
    pub training_observations: usize,
    pub held_out: usize,
    /// Held-out observations that could not be predicted
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub axis: ValidationAxis,
    /// Version of the model fitted on all observations
    pub model_version: ModelVersion,
    pub folds: Vec<FoldSummary>,
    pub in_sample: FitMetrics,
    /// Observations the full-sample fit could not predict
    pub in_sample_skipped: usize,
    pub out_of_sample: FitMetrics,
    pub shrinkage: f64,
    /// `None` when the in-sample R² is not positive
    pub shrinkage_pct: Option<f64>,
    pub overfitting: bool,
    pub predictions: Vec<FoldPrediction>,
}

struct FoldResult {
    summary: FoldSummary,
    predictions: Vec<FoldPrediction>,
}

/// Cross-validates `builder` + `predictor` on `observations`.
///
/// # Errors
///
/// Fails with fewer than two groups, when the full-sample fit fails, or when
/// any fold fails.
///
/// # Examples
///
/// ```
/// use racecraft_analysis::{
///     factor::FactorConfig,
///     validation::{GlobalRegression, ValidationConfig, validate},
/// };
/// use racecraft_features::synthetic::{SyntheticConfig, SyntheticSeason};
///
/// let season = SyntheticSeason::generate(&SyntheticConfig::default()).unwrap();
/// let report = validate(
///     &season.table.observations,
///     &FactorConfig::default(),
///     &GlobalRegression,
///     &ValidationConfig::default(),
/// )
/// .unwrap();
/// assert_eq!(report.folds.len(), 20);
/// assert!(report.out_of_sample.r_squared <= report.in_sample.r_squared);
/// ```
pub fn validate<B, P>(
    observations: &[Observation],
    builder: &B,
    predictor: &P,
    config: &ValidationConfig,
) -> Result<ValidationReport, ValidationError>
where
    B: ModelBuilder,
    P: Predictor,
{
    let mut groups = BTreeMap::<String, Vec<usize>>::new();
    for (i, observation) in observations.iter().enumerate() {
        groups
            .entry(config.axis.group(observation.key()))
            .or_default()
            .push(i);
    }
    if groups.len() < 2 {
        return Err(ValidationError::TooFewGroups {
            axis: config.axis,
            groups: groups.len(),
        });
    }

    let model = builder
        .build(observations)
        .map_err(|source| ValidationError::FullSample { source })?;
    let fitted = predictor
        .fit(&model, observations)
        .map_err(|source| ValidationError::FullSamplePredictor { source })?;
    let mut actual = Vec::with_capacity(observations.len());
    let mut predicted = Vec::with_capacity(observations.len());
    let mut in_sample_skipped = 0;
    for observation in observations {
        match fitted.predict(&model, observation) {
            Ok(prediction) => {
                actual.push(f64::from(observation.finishing_position()));
                predicted.push(prediction);
            }
            Err(e) => {
                tracing::debug!(key = %observation.key(), error = %e, "no in-sample prediction");
                in_sample_skipped += 1;
            }
        }
    }
    if in_sample_skipped > 0 {
        tracing::warn!(
            skipped = in_sample_skipped,
            observations = observations.len(),
            "in-sample metrics leave out observations that could not be predicted"
        );
    }
    let in_sample = FitMetrics::from_predictions(&actual, &predicted);

    let run = |(fold, held_out): (&String, &Vec<usize>)| {
        run_fold(observations, fold, held_out, builder, predictor).map_err(|source| {
            ValidationError::Fold {
                fold: fold.clone(),
                source,
            }
        })
    };
    let results = if config.parallel {
        groups.par_iter().map(run).collect::<Vec<_>>()
    } else {
        groups.iter().map(run).collect::<Vec<_>>()
    };
    let results = results.into_iter().collect::<Result<Vec<_>, _>>()?;

    let mut folds = Vec::with_capacity(results.len());
    let mut predictions = vec![];
    for result in results {
        folds.push(result.summary);
        predictions.extend(result.predictions);
    }
    let actual = predictions.iter().map(|p| p.actual).collect::<Vec<_>>();
    let predicted = predictions.iter().map(|p| p.predicted).collect::<Vec<_>>();
    let out_of_sample = FitMetrics::from_predictions(&actual, &predicted);

    let shrinkage = in_sample.r_squared - out_of_sample.r_squared;
    let shrinkage_pct = (in_sample.r_squared > 0.0).then(|| shrinkage / in_sample.r_squared * 100.0);
    let overfitting = shrinkage_pct.is_some_and(|pct| pct > config.shrinkage_warning_pct);
    if overfitting {
        tracing::warn!(
            shrinkage_pct = shrinkage_pct.unwrap_or_default(),
            threshold = config.shrinkage_warning_pct,
            "out-of-sample fit shrinks beyond the warning threshold"
        );
    }
    tracing::info!(
        axis = %config.axis,
        folds = folds.len(),
        in_sample_r2 = in_sample.r_squared,
        out_of_sample_r2 = out_of_sample.r_squared,
        "cross-validation finished"
    );

    Ok(ValidationReport {
        axis: config.axis,
        model_version: model.version().clone(),
        folds,
        in_sample,
        in_sample_skipped,
        out_of_sample,
        shrinkage,
        shrinkage_pct,
        overfitting,
        predictions,
    })
}

fn run_fold<B, P>(
    observations: &[Observation],
    fold: &str,
    held_out: &[usize],
    builder: &B,
    predictor: &P,
) -> Result<FoldResult, FoldError>
where
    B: ModelBuilder,
    P: Predictor,
{
    let training = observations
        .iter()
        .enumerate()
        .filter(|(i, _)| !held_out.contains(i))
        .map(|(_, o)| o.clone())
        .collect::<Vec<_>>();
    let model = builder
        .build(&training)
        .map_err(|source| FoldError::Model { source })?;
    let fitted = predictor
        .fit(&model, &training)
        .map_err(|source| FoldError::Predictor { source })?;

    let mut predictions = Vec::with_capacity(held_out.len());
    let mut skipped = 0;
    for observation in held_out.iter().map(|i| &observations[*i]) {
        match fitted.predict(&model, observation) {
            Ok(predicted) => predictions.push(FoldPrediction {
                fold: fold.to_owned(),
                key: observation.key().clone(),
                actual: f64::from(observation.finishing_position()),
                predicted,
            }),
            Err(e) => {
                tracing::warn!(key = %observation.key(), error = %e, "skipping held-out observation");
                skipped += 1;
            }
        }
    }
    tracing::debug!(fold, version = %model.version(), held_out = held_out.len(), "fold done");

    Ok(FoldResult {
        summary: FoldSummary {
            fold: fold.to_owned(),
            model_version: model.version().clone(),
            training_observations: training.len(),
            held_out: held_out.len(),
            skipped,
        },
        predictions,
    })
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, DVector};
    use racecraft_features::synthetic::{SyntheticConfig, SyntheticSeason};
    use racecraft_stats::regression::LinearFit;

    use super::*;

    fn season(drivers: usize, races: usize) -> SyntheticSeason {
        SyntheticSeason::generate(&SyntheticConfig {
            drivers,
            races,
            seed: 51,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_low_dimensional_linear_process_is_recovered() {
        let season = season(10, 20);
        let report = validate(
            &season.table.observations,
            &FactorConfig::default(),
            &GlobalRegression,
            &ValidationConfig::default(),
        )
        .unwrap();
        assert_eq!(report.axis, ValidationAxis::Driver);
        assert_eq!(report.folds.len(), 10);
        assert_eq!(report.predictions.len(), 200);
        assert_eq!(report.in_sample_skipped, 0);

        // best achievable: finishing position regressed on the noise-free outcome
        let n = season.table.len();
        let x = DMatrix::from_iterator(
            n,
            1,
            season.table.observations.iter().map(|o| season.performance[o.key()]),
        );
        let y = DVector::from_iterator(
            n,
            season
                .table
                .observations
                .iter()
                .map(|o| f64::from(o.finishing_position())),
        );
        let ceiling = LinearFit::fit(&x, &y).unwrap().metrics.r_squared;
        let r_squared = report.out_of_sample.r_squared;
        assert!(r_squared <= ceiling + 0.05, "R2 {r_squared} above ceiling {ceiling}");
        assert!((ceiling - r_squared).abs() < 0.25, "R2 {r_squared} vs ceiling {ceiling}");
        assert!(report.shrinkage_pct.is_some_and(|pct| pct < 30.0));
        assert!(!report.overfitting);
    }

    /// Cannot predict any observation of one driver.
    struct BlindTo(&'static str);

    struct FittedBlindTo {
        driver: &'static str,
        inner: TrackDemandProfile,
    }

    impl Predictor for BlindTo {
        type Fitted = FittedBlindTo;

        fn fit(
            &self,
            model: &FactorModel,
            training: &[Observation],
        ) -> Result<Self::Fitted, PredictorError> {
            Ok(FittedBlindTo {
                driver: self.0,
                inner: GlobalRegression.fit(model, training)?,
            })
        }
    }

    impl FittedPredictor for FittedBlindTo {
        fn predict(
            &self,
            model: &FactorModel,
            observation: &Observation,
        ) -> Result<f64, PredictorError> {
            if observation.driver_id().as_str() == self.driver {
                return Err(PredictorError::VersionMismatch);
            }
            FittedPredictor::predict(&self.inner, model, observation)
        }
    }

    #[test]
    fn test_unpredictable_observations_are_counted_on_both_sides() {
        let season = season(10, 12);
        let report = validate(
            &season.table.observations,
            &FactorConfig::default(),
            &BlindTo("D03"),
            &ValidationConfig::default(),
        )
        .unwrap();
        assert_eq!(report.in_sample_skipped, 12);
        assert_eq!(report.in_sample.count, 108);
        let skipped = report.folds.iter().map(|f| f.skipped).sum::<usize>();
        assert_eq!(skipped, 12);
        assert_eq!(report.predictions.len(), 108);
    }

    #[test]
    fn test_every_fold_refits_the_model() {
        let season = season(10, 12);
        let report = validate(
            &season.table.observations,
            &FactorConfig::default(),
            &GlobalRegression,
            &ValidationConfig {
                axis: ValidationAxis::Race,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(report.folds.len(), 12);
        let versions = report
            .folds
            .iter()
            .map(|f| &f.model_version)
            .collect::<BTreeSet<_>>();
        assert_eq!(versions.len(), 12);
        assert!(!versions.contains(&report.model_version));
        assert!(report.folds.iter().all(|f| f.training_observations == 110 && f.held_out == 10));
    }

    #[test]
    fn test_parallel_and_sequential_runs_agree() {
        let season = season(10, 12);
        let run = |parallel| {
            validate(
                &season.table.observations,
                &FactorConfig::default(),
                &TrackDemandPredictor::default(),
                &ValidationConfig {
                    parallel,
                    ..Default::default()
                },
            )
            .unwrap()
        };
        assert_eq!(run(true), run(false));
    }

    #[test]
    fn test_single_group_is_rejected() {
        let season = season(10, 12);
        let one_driver = season
            .table
            .observations
            .iter()
            .filter(|o| o.driver_id().as_str() == "D01")
            .cloned()
            .collect::<Vec<_>>();
        let err = validate(
            &one_driver,
            &FactorConfig::default(),
            &GlobalRegression,
            &ValidationConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::TooFewGroups { groups: 1, .. }));
    }

    /// Fails whenever it sees fewer than `min` observations.
    struct Fussy {
        min: usize,
    }

    impl ModelBuilder for Fussy {
        fn build(&self, observations: &[Observation]) -> Result<FactorModel, FactorError> {
            if observations.len() < self.min {
                return Err(FactorError::InsufficientSample {
                    observations: observations.len(),
                    required: self.min,
                });
            }
            FactorModel::fit(observations, &FactorConfig::default())
        }
    }

    #[test]
    fn test_fold_failures_are_fatal() {
        let season = season(10, 12);
        let err = validate(
            &season.table.observations,
            &Fussy { min: 120 },
            &GlobalRegression,
            &ValidationConfig {
                parallel: false,
                ..Default::default()
            },
        )
        .unwrap_err();
        let ValidationError::Fold { fold, source } = err else {
            panic!("expected a fold error");
        };
        assert_eq!(fold, "D01");
        assert!(matches!(source, FoldError::Model { .. }));
    }
}
