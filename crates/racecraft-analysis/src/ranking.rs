//! Per-driver skill profiles and dashboard records.
//!
//! A driver's factor z-score is the mean of their observation scores under one
//! model. Drivers are then compared with each other:
//!
//! - `percentile`: mid-rank percentile of the driver's z-score among all drivers
//! - `display_score`: `clamp(50 + 10 × z, 0, 100)`, a T-score style value
//! - `overall_score`: mean of the driver's factor percentiles
//!
//! Everything here is derived through [`FactorModel::score`]; no consumer
//! re-derives scores or percentiles from loadings.

use std::collections::BTreeMap;

use racecraft_features::{ids::DriverId, observation::Observation};
use racecraft_stats::{descriptive, percentiles::percentile_ranks};
use serde::{Deserialize, Serialize};

use crate::{
    circuit_fit::{self, CircuitFit, CircuitFitConfig, FitScoreError},
    factor::{FactorLabel, FactorModel, ModelVersion},
    track_demand::{DemandScope, TrackDemandProfile, TrackProfileSet},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriverFactorScore {
    pub factor: FactorLabel,
    /// Mean observation z-score
    pub z_score: f64,
    /// Percentile among drivers (0-100)
    pub percentile: f64,
    pub display_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverProfile {
    pub driver_id: DriverId,
    pub model_version: ModelVersion,
    /// Number of scored observations
    pub observations: usize,
    pub overall_score: f64,
    /// One entry per factor, in model order
    pub factors: Vec<DriverFactorScore>,
}

impl DriverProfile {
    #[must_use]
    pub fn factor(&self, factor: FactorLabel) -> Option<&DriverFactorScore> {
        self.factors.iter().find(|f| f.factor == factor)
    }

    #[must_use]
    pub fn labels(&self) -> Vec<FactorLabel> {
        self.factors.iter().map(|f| f.factor).collect()
    }
}

/// Display score for a z-score.
#[must_use]
pub fn display_score(z_score: f64) -> f64 {
    (50.0 + 10.0 * z_score).clamp(0.0, 100.0)
}

/// All driver profiles under one model, best overall first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRanking {
    pub model_version: ModelVersion,
    pub drivers: Vec<DriverProfile>,
}

impl DriverRanking {
    /// Builds the ranking of every driver with at least one scoreable observation.
    ///
    /// # Examples
    ///
    /// ```
    /// use racecraft_analysis::{factor::{FactorConfig, FactorModel}, ranking::DriverRanking};
    /// use racecraft_features::synthetic::{SyntheticConfig, SyntheticSeason};
    ///
    /// let season = SyntheticSeason::generate(&SyntheticConfig::default()).unwrap();
    /// let observations = &season.table.observations;
    /// let model = FactorModel::fit(observations, &FactorConfig::default()).unwrap();
    ///
    /// let ranking = DriverRanking::build(&model, observations);
    /// assert_eq!(ranking.drivers.len(), 20);
    /// assert!(ranking.drivers[0].overall_score >= ranking.drivers[19].overall_score);
    /// ```
    #[must_use]
    pub fn build(model: &FactorModel, observations: &[Observation]) -> Self {
        let k = model.factor_count();
        let mut by_driver = BTreeMap::<DriverId, Vec<Vec<f64>>>::new();
        for scores in model.score_all(observations) {
            by_driver
                .entry(scores.key.driver_id.clone())
                .or_default()
                .push(scores.z_scores());
        }

        let driver_ids = by_driver.keys().cloned().collect::<Vec<_>>();
        let means = by_driver
            .values()
            .map(|rows| {
                (0..k)
                    .map(|f| {
                        let column = rows.iter().map(|row| row[f]).collect::<Vec<_>>();
                        descriptive::mean(&column).unwrap_or(0.0)
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let percentiles = (0..k)
            .map(|f| percentile_ranks(&means.iter().map(|m| m[f]).collect::<Vec<_>>()))
            .collect::<Vec<_>>();

        let labels = model.labels();
        let mut drivers = driver_ids
            .into_iter()
            .enumerate()
            .map(|(d, driver_id)| {
                let factors = labels
                    .iter()
                    .enumerate()
                    .map(|(f, label)| DriverFactorScore {
                        factor: *label,
                        z_score: means[d][f],
                        percentile: percentiles[f][d],
                        display_score: display_score(means[d][f]),
                    })
                    .collect::<Vec<_>>();
                DriverProfile {
                    observations: by_driver.get(&driver_id).map_or(0, Vec::len),
                    overall_score: overall_score(factors.iter().map(|f| f.percentile)),
                    driver_id,
                    model_version: model.version().clone(),
                    factors,
                }
            })
            .collect::<Vec<_>>();
        drivers.sort_by(|a, b| {
            b.overall_score
                .total_cmp(&a.overall_score)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });

        Self {
            model_version: model.version().clone(),
            drivers,
        }
    }

    #[must_use]
    pub fn get(&self, driver_id: &DriverId) -> Option<&DriverProfile> {
        self.drivers.iter().find(|d| d.driver_id == *driver_id)
    }
}

/// Mean of factor percentiles; 0 for an empty profile.
pub(crate) fn overall_score(percentiles: impl IntoIterator<Item = f64>) -> f64 {
    let percentiles = percentiles.into_iter().collect::<Vec<_>>();
    descriptive::mean(&percentiles).unwrap_or(0.0)
}

/// Summary of one factor's display scores across drivers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorStats {
    pub factor: FactorLabel,
    pub sample_max: f64,
    /// Mean of the three highest display scores (fewer if fewer drivers)
    pub top3_average: f64,
}

impl FactorStats {
    #[must_use]
    pub fn from_ranking(ranking: &DriverRanking) -> Vec<Self> {
        let Some(first) = ranking.drivers.first() else {
            return vec![];
        };
        first
            .labels()
            .into_iter()
            .map(|factor| {
                let mut scores = ranking
                    .drivers
                    .iter()
                    .filter_map(|d| d.factor(factor).map(|f| f.display_score))
                    .collect::<Vec<_>>();
                scores.sort_by(|a, b| b.total_cmp(a));
                let top = &scores[..scores.len().min(3)];
                Self {
                    factor,
                    sample_max: scores.first().copied().unwrap_or(0.0),
                    top3_average: descriptive::mean(top).unwrap_or(0.0),
                }
            })
            .collect()
    }
}

/// Circuit fits of every driver at one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeFits {
    pub scope: DemandScope,
    pub fits: Vec<CircuitFit>,
}

/// Everything a dashboard needs, tagged with one model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardExport {
    pub model_version: ModelVersion,
    pub drivers: Vec<DriverProfile>,
    pub factor_stats: Vec<FactorStats>,
    pub track_profiles: Vec<TrackDemandProfile>,
    pub circuit_fits: Vec<ScopeFits>,
}

impl DashboardExport {
    /// Combines a ranking with track profiles of the same model.
    ///
    /// Circuit fits are computed for the global profile and every track profile.
    ///
    /// # Errors
    ///
    /// Returns [`FitScoreError::VersionMismatch`] if the ranking and the
    /// profiles come from different models.
    pub fn build(
        ranking: &DriverRanking,
        profiles: &TrackProfileSet,
        config: &CircuitFitConfig,
    ) -> Result<Self, FitScoreError> {
        if ranking.model_version != profiles.model_version {
            return Err(FitScoreError::VersionMismatch {
                driver: ranking.model_version.clone(),
                profile: profiles.model_version.clone(),
            });
        }
        let circuit_fits = std::iter::once(&profiles.global)
            .chain(&profiles.profiles)
            .map(|profile| {
                Ok(ScopeFits {
                    scope: profile.scope.clone(),
                    fits: circuit_fit::rank_for_track(&ranking.drivers, profile, config)?,
                })
            })
            .collect::<Result<Vec<_>, FitScoreError>>()?;

        Ok(Self {
            model_version: ranking.model_version.clone(),
            drivers: ranking.drivers.clone(),
            factor_stats: FactorStats::from_ranking(ranking),
            track_profiles: std::iter::once(&profiles.global)
                .chain(&profiles.profiles)
                .cloned()
                .collect(),
            circuit_fits,
        })
    }
}

#[cfg(test)]
mod tests {
    use racecraft_features::synthetic::{SyntheticConfig, SyntheticSeason};

    use super::*;
    use crate::{
        factor::FactorConfig,
        track_demand::{TrackDemandConfig, fit_track_profiles},
    };

    fn ranked() -> (SyntheticSeason, FactorModel, DriverRanking) {
        let season = SyntheticSeason::generate(&SyntheticConfig {
            seed: 31,
            ..Default::default()
        })
        .unwrap();
        let model = FactorModel::fit(&season.table.observations, &FactorConfig::default()).unwrap();
        let ranking = DriverRanking::build(&model, &season.table.observations);
        (season, model, ranking)
    }

    #[test]
    fn test_profiles_are_sorted_and_bounded() {
        let (_, model, ranking) = ranked();
        assert_eq!(ranking.drivers.len(), 20);
        assert!(ranking
            .drivers
            .windows(2)
            .all(|w| w[0].overall_score >= w[1].overall_score));
        for driver in &ranking.drivers {
            assert_eq!(driver.model_version, *model.version());
            assert_eq!(driver.observations, 20);
            assert_eq!(driver.factors.len(), model.factor_count());
            for factor in &driver.factors {
                assert!((0.0..=100.0).contains(&factor.percentile));
                assert!((0.0..=100.0).contains(&factor.display_score));
            }
        }
        // mid-rank percentiles among 20 drivers average to 50
        let mean = overall_score(ranking.drivers.iter().map(|d| d.overall_score));
        assert!((mean - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_driver_scores_follow_true_skills() {
        let (season, _, ranking) = ranked();
        let best_true = season
            .skills
            .iter()
            .max_by(|a, b| a.1[0].total_cmp(&b.1[0]))
            .map(|(id, _)| id.clone())
            .unwrap();
        let speed = FactorLabel::Skill(racecraft_features::feature::SkillFactor::RawSpeed);
        let best = ranking.get(&best_true).unwrap().factor(speed).unwrap();
        assert!(best.percentile > 75.0);
    }

    #[test]
    fn test_display_score_is_clamped() {
        assert_eq!(display_score(0.0), 50.0);
        assert_eq!(display_score(1.5), 65.0);
        assert_eq!(display_score(7.0), 100.0);
        assert_eq!(display_score(-6.0), 0.0);
    }

    #[test]
    fn test_factor_stats() {
        let (_, model, ranking) = ranked();
        let stats = FactorStats::from_ranking(&ranking);
        assert_eq!(stats.len(), model.factor_count());
        for stat in stats {
            assert!(stat.top3_average <= stat.sample_max);
            let max = ranking
                .drivers
                .iter()
                .map(|d| d.factor(stat.factor).unwrap().display_score)
                .fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(stat.sample_max, max);
        }
    }

    #[test]
    fn test_dashboard_is_version_tagged() {
        let (season, model, ranking) = ranked();
        let profiles =
            fit_track_profiles(&season.table.observations, &model, &TrackDemandConfig::default())
                .unwrap();
        let export = DashboardExport::build(&ranking, &profiles, &CircuitFitConfig::default()).unwrap();
        assert_eq!(export.model_version, *model.version());
        assert_eq!(export.track_profiles.len(), 6);
        assert_eq!(export.circuit_fits.len(), 6);
        assert!(export.circuit_fits.iter().all(|s| s.fits.len() == 20));
        assert!(export
            .circuit_fits
            .iter()
            .flat_map(|s| &s.fits)
            .all(|fit| fit.model_version == *model.version()));
    }
}
