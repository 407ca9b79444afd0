//! How well a driver's skills match what a track demands.
//!
//! ```text
//! raw   = Σ_f z_f × weight_f / total
//! score = clamp(50 + 50 × raw / z_reference, 0, 100)
//! ```
//!
//! With the default `z_reference = 2.0`, a raw fit of -2 maps to 0, an average
//! driver (raw 0) to 50 and a raw fit of +2 to 100. The mapping is fixed, so a
//! driver's score does not depend on which other drivers are scored.

use racecraft_features::ids::DriverId;
use serde::{Deserialize, Serialize};

use crate::{
    factor::ModelVersion,
    ranking::DriverProfile,
    track_demand::{DemandScope, TrackDemandProfile},
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum FitScoreError {
    #[display("driver profile is from model {driver} but track profile is from model {profile}")]
    VersionMismatch {
        driver: ModelVersion,
        profile: ModelVersion,
    },
    #[display("driver {driver_id} and the track profile have different factors")]
    FactorMismatch { driver_id: DriverId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitFitConfig {
    /// Raw fit that maps to a score of 100 (and its negation to 0)
    pub z_reference: f64,
}

impl Default for CircuitFitConfig {
    fn default() -> Self {
        Self { z_reference: 2.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitFit {
    pub driver_id: DriverId,
    pub scope: DemandScope,
    pub model_version: ModelVersion,
    pub raw: f64,
    /// Fit score, 0-100
    pub score: f64,
}

/// Scores one driver against one track profile.
///
/// # Errors
///
/// Fails if the two come from different model versions or factor sets.
pub fn fit_score(
    driver: &DriverProfile,
    profile: &TrackDemandProfile,
    config: &CircuitFitConfig,
) -> Result<CircuitFit, FitScoreError> {
    if driver.model_version != profile.model_version {
        return Err(FitScoreError::VersionMismatch {
            driver: driver.model_version.clone(),
            profile: profile.model_version.clone(),
        });
    }
    let mut driver_factors = driver.labels();
    let mut profile_factors = profile.factors();
    driver_factors.sort();
    profile_factors.sort();
    if driver_factors != profile_factors {
        return Err(FitScoreError::FactorMismatch {
            driver_id: driver.driver_id.clone(),
        });
    }

    let raw = profile
        .demands
        .iter()
        .map(|demand| {
            let z = driver.factor(demand.factor).map_or(0.0, |f| f.z_score);
            z * demand.weight / profile.total
        })
        .sum::<f64>();
    let score = (50.0 + 50.0 * raw / config.z_reference).clamp(0.0, 100.0);

    Ok(CircuitFit {
        driver_id: driver.driver_id.clone(),
        scope: profile.scope.clone(),
        model_version: profile.model_version.clone(),
        raw,
        score,
    })
}

/// Scores every driver at one track, best fit first (ties by driver id).
///
/// # Errors
///
/// Fails on the first driver that cannot be scored.
pub fn rank_for_track(
    drivers: &[DriverProfile],
    profile: &TrackDemandProfile,
    config: &CircuitFitConfig,
) -> Result<Vec<CircuitFit>, FitScoreError> {
    let mut fits = drivers
        .iter()
        .map(|driver| fit_score(driver, profile, config))
        .collect::<Result<Vec<_>, _>>()?;
    fits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.driver_id.cmp(&b.driver_id))
    });
    Ok(fits)
}

#[cfg(test)]
mod tests {
    use racecraft_features::feature::SkillFactor;

    use super::*;
    use crate::{
        factor::FactorLabel,
        ranking::DriverFactorScore,
        track_demand::{Confidence, FactorDemand},
    };

    fn version(v: &str) -> ModelVersion {
        serde_json::from_str(&format!("\"{v}\"")).unwrap()
    }

    fn driver(id: &str, z: [f64; 2]) -> DriverProfile {
        let labels = [SkillFactor::RawSpeed, SkillFactor::Racecraft].map(FactorLabel::Skill);
        DriverProfile {
            driver_id: DriverId::new(id),
            model_version: version("fm-a"),
            observations: 10,
            overall_score: 50.0,
            factors: labels
                .iter()
                .zip(z)
                .map(|(factor, z_score)| DriverFactorScore {
                    factor: *factor,
                    z_score,
                    percentile: 50.0,
                    display_score: 50.0,
                })
                .collect(),
        }
    }

    fn profile(weights: [f64; 2]) -> TrackDemandProfile {
        let labels = [SkillFactor::RawSpeed, SkillFactor::Racecraft].map(FactorLabel::Skill);
        TrackDemandProfile {
            scope: DemandScope::track("T1"),
            model_version: version("fm-a"),
            intercept: 10.0,
            demands: labels
                .iter()
                .zip(weights)
                .map(|(factor, weight)| FactorDemand {
                    factor: *factor,
                    weight,
                    coefficient: -weight / 50.0,
                })
                .collect(),
            total: 100.0,
            r_squared: 0.5,
            observations: 40,
            confidence: Confidence::Normal,
        }
    }

    #[test]
    fn test_reference_points() {
        let config = CircuitFitConfig::default();
        let track = profile([100.0, 0.0]);
        let cases = [(0.0, 50.0), (2.0, 100.0), (-2.0, 0.0), (1.0, 75.0), (5.0, 100.0)];
        for (z, expected) in cases {
            let fit = fit_score(&driver("D01", [z, 0.0]), &track, &config).unwrap();
            assert!((fit.score - expected).abs() < 1e-9, "z = {z}");
        }
    }

    #[test]
    fn test_score_does_not_depend_on_other_drivers() {
        let config = CircuitFitConfig::default();
        let track = profile([60.0, 40.0]);
        let alone = rank_for_track(&[driver("D01", [1.0, 0.5])], &track, &config).unwrap();
        let pool = [driver("D01", [1.0, 0.5]), driver("D02", [3.0, 3.0])];
        let together = rank_for_track(&pool, &track, &config).unwrap();
        let d01 = together.iter().find(|f| f.driver_id.as_str() == "D01").unwrap();
        assert_eq!(alone[0].score, d01.score);
        assert_eq!(together[0].driver_id.as_str(), "D02");
    }

    #[test]
    fn test_ties_are_ordered_by_driver_id() {
        let config = CircuitFitConfig::default();
        let track = profile([50.0, 50.0]);
        let pool = [driver("D03", [1.0, 0.0]), driver("D01", [0.0, 1.0])];
        let fits = rank_for_track(&pool, &track, &config).unwrap();
        assert_eq!(fits[0].driver_id.as_str(), "D01");
        assert_eq!(fits[1].driver_id.as_str(), "D03");
    }

    #[test]
    fn test_mismatches_are_rejected() {
        let config = CircuitFitConfig::default();
        let mut track = profile([50.0, 50.0]);
        track.model_version = version("fm-b");
        let err = fit_score(&driver("D01", [0.0, 0.0]), &track, &config).unwrap_err();
        assert!(matches!(err, FitScoreError::VersionMismatch { .. }));

        let mut track = profile([50.0, 50.0]);
        track.demands.pop();
        let err = fit_score(&driver("D01", [0.0, 0.0]), &track, &config).unwrap_err();
        assert!(matches!(err, FitScoreError::FactorMismatch { .. }));
    }
}
