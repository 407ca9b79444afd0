//! Factor scores and the weights that produce them.
//!
//! Scores are weighted sums of **performance-oriented** z-scores: every
//! standardized variable is multiplied by its direction sign first, so that
//! higher is better for every input. Weights are the salient pattern loadings
//! that point in the performance direction, and are never negative:
//!
//! ```text
//! w_jf = loading_jf × direction_j    if |loading_jf| ≥ threshold and the product is > 0
//!      = 0                            otherwise
//! s_f  = Σ_j w_jf × direction_j × z_j
//! ```
//!
//! Consequently an observation that is at least as good as another on every
//! variable scores at least as high on every factor.

use nalgebra::DMatrix;
use racecraft_features::{feature::Feature, ids::ObservationKey};
use serde::{Deserialize, Serialize};

use super::{FactorLabel, ModelVersion, orientation};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ScoreError {
    #[display("{key}: {missing} of {variables} model variables are missing (at most {allowed} allowed)")]
    TooManyMissing {
        key: ObservationKey,
        missing: usize,
        variables: usize,
        allowed: usize,
    },
}

/// One factor score of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub factor: FactorLabel,
    /// Standardized score: mean 0, standard deviation 1 over the fitting sample
    pub z_score: f64,
    /// Mid-rank percentile (0-100) within the fitting sample
    pub percentile: f64,
}

/// All factor scores of one observation under one model version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationScores {
    pub key: ObservationKey,
    pub model_version: ModelVersion,
    pub finishing_position: u32,
    /// One entry per factor, in model order
    pub scores: Vec<FactorScore>,
    /// Variables that were missing and imputed at the fitting mean
    pub imputed: Vec<Feature>,
}

impl ObservationScores {
    #[must_use]
    pub fn z_scores(&self) -> Vec<f64> {
        self.scores.iter().map(|s| s.z_score).collect()
    }

    #[must_use]
    pub fn get(&self, factor: FactorLabel) -> Option<&FactorScore> {
        self.scores.iter().find(|s| s.factor == factor)
    }
}

/// Non-negative score weights (`p × k`) from reflected pattern loadings.
///
/// A factor without any positively oriented salient loading (only possible for
/// degenerate patterns) falls back to its dominant variable.
pub(crate) fn score_weights(
    pattern: &DMatrix<f64>,
    variables: &[Feature],
    threshold: f64,
) -> DMatrix<f64> {
    let mut weights = DMatrix::from_fn(pattern.nrows(), pattern.ncols(), |j, f| {
        let oriented = pattern[(j, f)] * variables[j].direction().sign();
        if pattern[(j, f)].abs() >= threshold && oriented > 0.0 {
            oriented
        } else {
            0.0
        }
    });
    for f in 0..weights.ncols() {
        if weights.column(f).iter().all(|w| *w <= 0.0) {
            for j in orientation::salient_rows(pattern, f, f64::INFINITY) {
                weights[(j, f)] = pattern[(j, f)].abs();
            }
        }
    }
    weights
}

/// Raw (unnormalized) scores of one observation from its z-scores.
pub(crate) fn raw_scores(weights: &DMatrix<f64>, variables: &[Feature], z: &[f64]) -> Vec<f64> {
    (0..weights.ncols())
        .map(|f| {
            variables
                .iter()
                .zip(z)
                .enumerate()
                .map(|(j, (feature, z))| weights[(j, f)] * feature.direction().sign() * z)
                .sum()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARIABLES: [Feature; 3] = [
        Feature::QualifyingPace,
        Feature::BestLapGap,
        Feature::TopSpeedRank,
    ];

    #[test]
    fn test_weights_are_non_negative() {
        // reflected speed factor with one weak contrary loading
        let pattern = DMatrix::from_column_slice(3, 1, &[-0.8, -0.7, -0.1]);
        let weights = score_weights(&pattern, &VARIABLES, 0.3);
        assert_eq!(weights.as_slice(), &[0.8, 0.7, 0.0]);
    }

    #[test]
    fn test_better_metrics_give_higher_scores() {
        let pattern = DMatrix::from_column_slice(3, 1, &[-0.8, -0.7, 0.5]);
        let weights = score_weights(&pattern, &VARIABLES, 0.3);
        // smaller gaps and a higher speed rank
        let fast = raw_scores(&weights, &VARIABLES, &[-1.0, -0.5, 1.0]);
        let slow = raw_scores(&weights, &VARIABLES, &[1.0, 0.5, -1.0]);
        assert!(fast[0] > slow[0]);
    }

    #[test]
    fn test_degenerate_factor_uses_dominant_variable() {
        let pattern = DMatrix::from_column_slice(3, 1, &[0.2, 0.1, -0.1]);
        let weights = score_weights(&pattern, &VARIABLES, 0.3);
        assert_eq!(weights.as_slice(), &[0.2, 0.0, 0.0]);
    }
}
