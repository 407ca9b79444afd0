//! "What if" skill adjustments for one driver.
//!
//! A request shifts some factor percentiles of a driver up or down; the
//! absolute shifts must fit in a budget of percentile points. The predictor
//! never clamps a request: anything outside the budget or the percentile range
//! is rejected with an [`ImproveError`].
//!
//! For the adjusted profile it reports:
//!
//! - the most similar other drivers (Euclidean distance over percentiles)
//! - one [`Recommendation`] per factor, ranked by
//!   `priority = (100 - percentile) / 100 × max(weight, 0) / total`
//! - the expected finishing-position gain of reaching `target_percentile`,
//!   `max(-β, 0) × (Φ⁻¹(target) - Φ⁻¹(percentile))`
//! - the projected overall score

use racecraft_features::ids::DriverId;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::{
    coaching::{PriorityTier, coaching},
    factor::{FactorLabel, ModelVersion},
    ranking::{DriverProfile, overall_score},
    track_demand::{DemandScope, TrackDemandProfile},
};

/// Percentile range used for the normal quantile, avoiding infinite gains.
const QUANTILE_RANGE: (f64, f64) = (0.5, 99.5);

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ImproveError {
    #[display("budget must be a finite non-negative number, got {budget}")]
    InvalidBudget { budget: f64 },
    #[display("adjustment of {factor} must be a finite number and appear once, got {delta}")]
    InvalidAdjustment { factor: FactorLabel, delta: f64 },
    #[display("adjustments total {requested} points but the budget is {budget}")]
    BudgetExceeded { requested: f64, budget: f64 },
    #[display("adjusted percentile of {factor} would be {percentile}, outside 0-100")]
    PercentileOutOfRange { factor: FactorLabel, percentile: f64 },
    #[display("unknown factor {factor}")]
    UnknownFactor { factor: FactorLabel },
    #[display("unknown driver {driver_id}")]
    UnknownDriver { driver_id: DriverId },
    #[display("inputs come from different model versions ({expected} and {found})")]
    VersionMismatch {
        expected: ModelVersion,
        found: ModelVersion,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImproveConfig {
    /// Number of similar drivers reported
    pub neighbors: usize,
    /// Percentile the expected position gain is computed towards
    pub target_percentile: f64,
}

impl Default for ImproveConfig {
    fn default() -> Self {
        Self {
            neighbors: 3,
            target_percentile: 75.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkillAdjustment {
    pub factor: FactorLabel,
    /// Percentile points to add
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImproveRequest {
    pub driver_id: DriverId,
    pub adjustments: Vec<SkillAdjustment>,
    /// Maximum sum of absolute deltas, in percentile points
    pub budget: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustedFactor {
    pub factor: FactorLabel,
    pub percentile: f64,
    pub adjusted_percentile: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarDriver {
    pub driver_id: DriverId,
    pub distance: f64,
    /// `100 × (1 - distance / (100 × √k))`
    pub match_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub factor: FactorLabel,
    /// Adjusted percentile
    pub percentile: f64,
    pub priority: f64,
    pub tier: PriorityTier,
    /// Finishing positions gained by reaching the target percentile
    pub expected_position_gain: f64,
    pub coaching: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImproveOutcome {
    pub driver_id: DriverId,
    pub model_version: ModelVersion,
    pub scope: DemandScope,
    pub budget: f64,
    pub budget_used: f64,
    pub current_overall: f64,
    pub projected_overall: f64,
    pub factors: Vec<AdjustedFactor>,
    pub similar_drivers: Vec<SimilarDriver>,
    /// Highest priority first
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone)]
pub struct ImprovePredictor {
    config: ImproveConfig,
}

impl ImprovePredictor {
    #[must_use]
    pub fn new(config: &ImproveConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Applies `request` to the driver's profile and evaluates it at the
    /// profile's track.
    ///
    /// # Errors
    ///
    /// Returns an [`ImproveError`] when the request is invalid or exceeds its
    /// budget, or when the inputs come from different models.
    ///
    /// # Examples
    ///
    /// ```
    /// # use racecraft_analysis::{factor::{FactorConfig, FactorLabel, FactorModel}, ranking::DriverRanking};
    /// # use racecraft_analysis::track_demand::{DemandScope, TrackDemandConfig, TrackDemandProfile};
    /// # use racecraft_analysis::improve::{ImproveConfig, ImproveError, ImprovePredictor, ImproveRequest, SkillAdjustment};
    /// # use racecraft_features::{feature::SkillFactor, synthetic::{SyntheticConfig, SyntheticSeason}};
    /// # let season = SyntheticSeason::generate(&SyntheticConfig::default()).unwrap();
    /// # let observations = &season.table.observations;
    /// # let model = FactorModel::fit(observations, &FactorConfig::default()).unwrap();
    /// # let ranking = DriverRanking::build(&model, observations);
    /// # let profile = TrackDemandProfile::fit(DemandScope::Global, observations, &model, &TrackDemandConfig::default()).unwrap();
    /// let predictor = ImprovePredictor::new(&ImproveConfig::default());
    /// let request = ImproveRequest {
    ///     driver_id: ranking.drivers[10].driver_id.clone(),
    ///     adjustments: vec![SkillAdjustment {
    ///         factor: FactorLabel::Skill(SkillFactor::RawSpeed),
    ///         delta: 5.0,
    ///     }],
    ///     budget: 1.0,
    /// };
    /// let err = predictor.predict(&request, &ranking.drivers, &profile).unwrap_err();
    /// assert!(matches!(err, ImproveError::BudgetExceeded { .. }));
    /// ```
    pub fn predict(
        &self,
        request: &ImproveRequest,
        drivers: &[DriverProfile],
        profile: &TrackDemandProfile,
    ) -> Result<ImproveOutcome, ImproveError> {
        let budget_used = validate_budget(request)?;

        let driver = drivers
            .iter()
            .find(|d| d.driver_id == request.driver_id)
            .ok_or_else(|| ImproveError::UnknownDriver {
                driver_id: request.driver_id.clone(),
            })?;
        for version in drivers.iter().map(|d| &d.model_version) {
            if *version != profile.model_version {
                return Err(ImproveError::VersionMismatch {
                    expected: profile.model_version.clone(),
                    found: version.clone(),
                });
            }
        }

        let factors = adjusted_factors(driver, &request.adjustments)?;
        let similar_drivers = self.similar_drivers(driver, &factors, drivers);
        let recommendations = self.recommendations(&factors, profile);

        Ok(ImproveOutcome {
            driver_id: driver.driver_id.clone(),
            model_version: profile.model_version.clone(),
            scope: profile.scope.clone(),
            budget: request.budget,
            budget_used,
            current_overall: driver.overall_score,
            projected_overall: overall_score(factors.iter().map(|f| f.adjusted_percentile)),
            factors,
            similar_drivers,
            recommendations,
        })
    }

    #[expect(clippy::cast_precision_loss)]
    fn similar_drivers(
        &self,
        driver: &DriverProfile,
        factors: &[AdjustedFactor],
        drivers: &[DriverProfile],
    ) -> Vec<SimilarDriver> {
        let max_distance = 100.0 * (factors.len() as f64).sqrt();
        let mut similar = drivers
            .iter()
            .filter(|other| other.driver_id != driver.driver_id)
            .filter_map(|other| {
                let squared = factors
                    .iter()
                    .map(|f| {
                        other
                            .factor(f.factor)
                            .map(|o| (o.percentile - f.adjusted_percentile).powi(2))
                    })
                    .sum::<Option<f64>>()?;
                let distance = squared.sqrt();
                Some(SimilarDriver {
                    driver_id: other.driver_id.clone(),
                    distance,
                    match_pct: 100.0 * (1.0 - distance / max_distance),
                })
            })
            .collect::<Vec<_>>();
        similar.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });
        similar.truncate(self.config.neighbors);
        similar
    }

    fn recommendations(
        &self,
        factors: &[AdjustedFactor],
        profile: &TrackDemandProfile,
    ) -> Vec<Recommendation> {
        let standard = Normal::standard();
        let quantile = |percentile: f64| {
            standard.inverse_cdf(percentile.clamp(QUANTILE_RANGE.0, QUANTILE_RANGE.1) / 100.0)
        };
        let target = quantile(self.config.target_percentile);

        let mut recommendations = factors
            .iter()
            .map(|f| {
                let percentile = f.adjusted_percentile;
                let weight = profile.weight(f.factor).unwrap_or(0.0);
                let coefficient = profile.coefficient(f.factor).unwrap_or(0.0);
                let tier = PriorityTier::from_percentile(percentile);
                Recommendation {
                    factor: f.factor,
                    percentile,
                    priority: (100.0 - percentile) / 100.0 * weight.max(0.0) / profile.total,
                    tier,
                    expected_position_gain: (-coefficient).max(0.0)
                        * (target - quantile(percentile)).max(0.0),
                    coaching: coaching(f.factor, tier).to_owned(),
                }
            })
            .collect::<Vec<_>>();
        // stable: equal priorities keep canonical factor order
        recommendations.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        recommendations
    }
}

/// Checks the budget and every delta, returning the points used.
fn validate_budget(request: &ImproveRequest) -> Result<f64, ImproveError> {
    if !request.budget.is_finite() || request.budget < 0.0 {
        return Err(ImproveError::InvalidBudget {
            budget: request.budget,
        });
    }
    for (i, adjustment) in request.adjustments.iter().enumerate() {
        let duplicate = request.adjustments[..i]
            .iter()
            .any(|a| a.factor == adjustment.factor);
        if !adjustment.delta.is_finite() || duplicate {
            return Err(ImproveError::InvalidAdjustment {
                factor: adjustment.factor,
                delta: adjustment.delta,
            });
        }
    }
    let requested = request
        .adjustments
        .iter()
        .map(|a| a.delta.abs())
        .sum::<f64>();
    if requested > request.budget {
        return Err(ImproveError::BudgetExceeded {
            requested,
            budget: request.budget,
        });
    }
    Ok(requested)
}

fn adjusted_factors(
    driver: &DriverProfile,
    adjustments: &[SkillAdjustment],
) -> Result<Vec<AdjustedFactor>, ImproveError> {
    for adjustment in adjustments {
        if driver.factor(adjustment.factor).is_none() {
            return Err(ImproveError::UnknownFactor {
                factor: adjustment.factor,
            });
        }
    }
    driver
        .factors
        .iter()
        .map(|f| {
            let delta = adjustments
                .iter()
                .find(|a| a.factor == f.factor)
                .map_or(0.0, |a| a.delta);
            let adjusted_percentile = f.percentile + delta;
            if !(0.0..=100.0).contains(&adjusted_percentile) {
                return Err(ImproveError::PercentileOutOfRange {
                    factor: f.factor,
                    percentile: adjusted_percentile,
                });
            }
            Ok(AdjustedFactor {
                factor: f.factor,
                percentile: f.percentile,
                adjusted_percentile,
            })
        })
        .collect()
}
