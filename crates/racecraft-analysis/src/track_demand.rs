//! Track-demand profiles: how much each skill factor matters at a track.
//!
//! A profile regresses finishing position on factor z-scores (with intercept)
//! over the observations of one scope and converts the coefficients into
//! signed demand weights:
//!
//! ```text
//! weight_f = -β_f / Σ|β| × total
//! ```
//!
//! Finishing position 1 is best, so a negative coefficient means strength in
//! the factor improves results; it becomes a positive weight. The absolute
//! weights always sum to `total` (100 by default).
//!
//! # Sample size
//!
//! With `k` factors a regression needs at least `k + 2` observations and is
//! refused below that. Below `min_obs_per_factor × k` observations the profile
//! is still fitted but flagged [`Confidence::Low`].

use nalgebra::{DMatrix, DVector};
use racecraft_features::{
    ids::{ObservationKey, RaceId, TrackId},
    observation::Observation,
};
use racecraft_stats::regression::{LinearFit, RegressionError};
use serde::{Deserialize, Serialize};

use crate::factor::{FactorLabel, FactorModel, ModelVersion, scoring::ObservationScores};

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum TrackDemandError {
    #[display("{scope}: {observations} observations, at least {required} are required")]
    #[from(ignore)]
    InsufficientData {
        scope: DemandScope,
        observations: usize,
        required: usize,
    },
    #[display("{scope}: all regression coefficients are zero")]
    #[from(ignore)]
    DegenerateCoefficients { scope: DemandScope },
    #[display("scores come from model {found}, expected {expected}")]
    #[from(ignore)]
    VersionMismatch {
        expected: ModelVersion,
        found: ModelVersion,
    },
    #[display("scores of {key} have no {factor} factor")]
    #[from(ignore)]
    MissingFactor {
        key: ObservationKey,
        factor: FactorLabel,
    },
    #[display("demand regression failed")]
    Regression { source: RegressionError },
}

/// The set of observations a profile is fitted on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DemandScope {
    Global,
    Track { track_id: TrackId },
    TrackRace { track_id: TrackId, race_id: RaceId },
}

impl DemandScope {
    #[must_use]
    pub fn track(track_id: impl Into<TrackId>) -> Self {
        DemandScope::Track {
            track_id: track_id.into(),
        }
    }

    #[must_use]
    pub fn contains(&self, observation: &Observation) -> bool {
        match self {
            DemandScope::Global => true,
            DemandScope::Track { track_id } => observation.track_id() == track_id,
            DemandScope::TrackRace { track_id, race_id } => {
                observation.track_id() == track_id && observation.race_id() == race_id
            }
        }
    }
}

impl std::fmt::Display for DemandScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemandScope::Global => f.write_str("global"),
            DemandScope::Track { track_id } => write!(f, "track {track_id}"),
            DemandScope::TrackRace { track_id, race_id } => {
                write!(f, "track {track_id} race {race_id}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Normal,
    /// Fewer observations than recommended; interpret with care
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackDemandConfig {
    /// Observations per factor below which a profile is low-confidence
    pub min_obs_per_factor: f64,
    /// Sum of absolute demand weights
    pub total: f64,
}

impl Default for TrackDemandConfig {
    fn default() -> Self {
        Self {
            min_obs_per_factor: 4.0,
            total: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorDemand {
    pub factor: FactorLabel,
    /// Signed demand weight; positive means strength in the factor helps
    pub weight: f64,
    /// Raw regression coefficient (finishing positions per z-score unit)
    pub coefficient: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDemandProfile {
    pub scope: DemandScope,
    pub model_version: ModelVersion,
    pub intercept: f64,
    /// One entry per factor, in model order
    pub demands: Vec<FactorDemand>,
    pub total: f64,
    pub r_squared: f64,
    pub observations: usize,
    pub confidence: Confidence,
}

impl TrackDemandProfile {
    /// Fits the profile of `scope` from the observations it contains.
    ///
    /// Observations that the model cannot score are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`TrackDemandError::InsufficientData`] with fewer than `k + 2`
    /// scored observations, and [`TrackDemandError::DegenerateCoefficients`]
    /// when every coefficient is zero.
    pub fn fit(
        scope: DemandScope,
        observations: &[Observation],
        model: &FactorModel,
        config: &TrackDemandConfig,
    ) -> Result<Self, TrackDemandError> {
        let in_scope = observations
            .iter()
            .filter(|o| scope.contains(o))
            .cloned()
            .collect::<Vec<_>>();
        let scores = model.score_all(&in_scope);
        Self::from_scores(scope, &scores, model, config)
    }

    /// Fits the profile from observations already scored by `model`.
    ///
    /// # Errors
    ///
    /// See [`TrackDemandProfile::fit`]. Also returns
    /// [`TrackDemandError::VersionMismatch`] for scores of another model and
    /// [`TrackDemandError::MissingFactor`] for scores lacking one of the
    /// model's factors.
    pub fn from_scores(
        scope: DemandScope,
        scores: &[ObservationScores],
        model: &FactorModel,
        config: &TrackDemandConfig,
    ) -> Result<Self, TrackDemandError> {
        if let Some(other) = scores.iter().find(|s| s.model_version != *model.version()) {
            return Err(TrackDemandError::VersionMismatch {
                expected: model.version().clone(),
                found: other.model_version.clone(),
            });
        }
        let labels = model.labels();
        let k = labels.len();
        let n = scores.len();
        let required = k + 2;
        if n < required {
            return Err(TrackDemandError::InsufficientData {
                scope,
                observations: n,
                required,
            });
        }

        let mut x = DMatrix::zeros(n, k);
        for (i, observation) in scores.iter().enumerate() {
            for (f, factor) in labels.iter().enumerate() {
                let score = observation
                    .get(*factor)
                    .ok_or_else(|| TrackDemandError::MissingFactor {
                        key: observation.key.clone(),
                        factor: *factor,
                    })?;
                x[(i, f)] = score.z_score;
            }
        }
        let y = DVector::from_iterator(n, scores.iter().map(|s| f64::from(s.finishing_position)));
        let fit = LinearFit::fit(&x, &y)?;

        let sum_abs = fit.coefficients.iter().map(|b| b.abs()).sum::<f64>();
        if sum_abs.is_nan() || sum_abs <= f64::EPSILON {
            return Err(TrackDemandError::DegenerateCoefficients { scope });
        }
        let demands = labels
            .iter()
            .zip(&fit.coefficients)
            .map(|(factor, coefficient)| FactorDemand {
                factor: *factor,
                weight: -coefficient / sum_abs * config.total,
                coefficient: *coefficient,
            })
            .collect();

        #[expect(clippy::cast_precision_loss)]
        let recommended = config.min_obs_per_factor * k as f64;
        #[expect(clippy::cast_precision_loss)]
        let confidence = if (n as f64) < recommended {
            tracing::warn!(%scope, observations = n, recommended, "low-confidence track-demand profile");
            Confidence::Low
        } else {
            Confidence::Normal
        };

        Ok(Self {
            scope,
            model_version: model.version().clone(),
            intercept: fit.intercept,
            demands,
            total: config.total,
            r_squared: fit.metrics.r_squared,
            observations: n,
            confidence,
        })
    }

    #[must_use]
    pub fn weight(&self, factor: FactorLabel) -> Option<f64> {
        self.demand(factor).map(|d| d.weight)
    }

    #[must_use]
    pub fn coefficient(&self, factor: FactorLabel) -> Option<f64> {
        self.demand(factor).map(|d| d.coefficient)
    }

    fn demand(&self, factor: FactorLabel) -> Option<&FactorDemand> {
        self.demands.iter().find(|d| d.factor == factor)
    }

    #[must_use]
    pub fn factors(&self) -> Vec<FactorLabel> {
        self.demands.iter().map(|d| d.factor).collect()
    }

    /// Predicted finishing position for scores of the same model version.
    ///
    /// Returns `None` if the version or a factor does not match.
    #[must_use]
    pub fn predict(&self, scores: &ObservationScores) -> Option<f64> {
        if scores.model_version != self.model_version {
            return None;
        }
        self.demands.iter().try_fold(self.intercept, |sum, demand| {
            scores
                .get(demand.factor)
                .map(|score| sum + demand.coefficient * score.z_score)
        })
    }
}

/// A scope whose profile could not be fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandRefusal {
    pub scope: DemandScope,
    pub reason: String,
}

/// Demand profiles of every track in a dataset, plus the global profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackProfileSet {
    pub model_version: ModelVersion,
    pub global: TrackDemandProfile,
    /// Per-track profiles in track order
    pub profiles: Vec<TrackDemandProfile>,
    pub refusals: Vec<DemandRefusal>,
}

impl TrackProfileSet {
    #[must_use]
    pub fn get(&self, track_id: &TrackId) -> Option<&TrackDemandProfile> {
        self.profiles
            .iter()
            .find(|p| matches!(&p.scope, DemandScope::Track { track_id: t } if t == track_id))
    }
}

/// Fits the global profile and one profile per track.
///
/// Tracks that cannot be fitted are listed as refusals instead of failing the
/// whole set.
///
/// # Errors
///
/// Fails only if the global profile cannot be fitted.
pub fn fit_track_profiles(
    observations: &[Observation],
    model: &FactorModel,
    config: &TrackDemandConfig,
) -> Result<TrackProfileSet, TrackDemandError> {
    let scores = model.score_all(observations);
    let global = TrackDemandProfile::from_scores(DemandScope::Global, &scores, model, config)?;

    let tracks = scores
        .iter()
        .map(|s| s.key.track_id.clone())
        .collect::<std::collections::BTreeSet<_>>();
    let mut profiles = vec![];
    let mut refusals = vec![];
    for track_id in tracks {
        let track_scores = scores
            .iter()
            .filter(|s| s.key.track_id == track_id)
            .cloned()
            .collect::<Vec<_>>();
        let scope = DemandScope::Track { track_id };
        match TrackDemandProfile::from_scores(scope.clone(), &track_scores, model, config) {
            Ok(profile) => profiles.push(profile),
            Err(e) => {
                tracing::warn!(%scope, error = %e, "refusing track-demand profile");
                refusals.push(DemandRefusal {
                    scope,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(TrackProfileSet {
        model_version: model.version().clone(),
        global,
        profiles,
        refusals,
    })
}
