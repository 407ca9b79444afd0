//! Sampling adequacy checks run before extraction.
//!
//! - **Bartlett's test of sphericity**: is the correlation matrix distinguishable
//!   from the identity? If not, variables are too uncorrelated to share factors.
//! - **Kaiser-Meyer-Olkin (KMO)**: compares observed correlations with partial
//!   (anti-image) correlations. Values near 1 mean correlations are explained by
//!   common factors; below 0.5 the data is unsuitable for factoring.

use nalgebra::DMatrix;
use racecraft_features::feature::Feature;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::{FactorConfig, FactorError};

/// Measure of sampling adequacy of one variable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableAdequacy {
    pub feature: Feature,
    pub msa: f64,
}

/// Results of the pre-extraction checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdequacyReport {
    /// Determinant of the correlation matrix
    pub determinant: f64,
    pub bartlett_chi_square: f64,
    pub bartlett_degrees_of_freedom: usize,
    pub bartlett_p_value: f64,
    /// Overall KMO measure
    pub kmo: f64,
    pub variables: Vec<VariableAdequacy>,
}

/// Checks that `correlation` (estimated from `observations` rows) is factorable.
///
/// # Errors
///
/// - [`FactorError::DegenerateCorrelation`] if the matrix is not positive definite
/// - [`FactorError::NotFactorable`] if Bartlett's test does not reject sphericity
/// - [`FactorError::InadequateSampling`] if the overall KMO is below the minimum
#[expect(clippy::cast_precision_loss)]
pub(crate) fn assess(
    correlation: &DMatrix<f64>,
    observations: usize,
    variables: &[Feature],
    config: &FactorConfig,
) -> Result<AdequacyReport, FactorError> {
    let p = correlation.nrows();
    let cholesky = correlation
        .clone()
        .cholesky()
        .ok_or(FactorError::DegenerateCorrelation)?;
    let ln_determinant = 2.0 * cholesky.l().diagonal().iter().map(|d| d.ln()).sum::<f64>();
    if !ln_determinant.is_finite() {
        return Err(FactorError::DegenerateCorrelation);
    }

    let n = observations as f64;
    let chi_square = -(n - 1.0 - (2.0 * p as f64 + 5.0) / 6.0) * ln_determinant;
    let degrees_of_freedom = p * (p - 1) / 2;
    let p_value = ChiSquared::new(degrees_of_freedom as f64)
        .map_err(|_| FactorError::DegenerateCorrelation)?
        .sf(chi_square);
    if p_value.is_nan() || p_value > config.bartlett_alpha {
        return Err(FactorError::NotFactorable {
            chi_square,
            p_value,
        });
    }

    let inverse = cholesky.inverse();
    let (kmo, msa) = kaiser_meyer_olkin(correlation, &inverse);
    tracing::debug!(chi_square, p_value, kmo, "sampling adequacy");
    if kmo.is_nan() || kmo < config.min_kmo {
        return Err(FactorError::InadequateSampling { kmo });
    }

    Ok(AdequacyReport {
        determinant: ln_determinant.exp(),
        bartlett_chi_square: chi_square,
        bartlett_degrees_of_freedom: degrees_of_freedom,
        bartlett_p_value: p_value,
        kmo,
        variables: variables
            .iter()
            .zip(msa)
            .map(|(feature, msa)| VariableAdequacy {
                feature: *feature,
                msa,
            })
            .collect(),
    })
}

/// Overall KMO and per-variable MSA from `R` and `R⁻¹`.
///
/// Anti-image correlations are `a_ij = -inv_ij / √(inv_ii × inv_jj)`, and
///
/// ```text
/// KMO = Σ r_ij² / (Σ r_ij² + Σ a_ij²)    over i ≠ j
/// ```
fn kaiser_meyer_olkin(correlation: &DMatrix<f64>, inverse: &DMatrix<f64>) -> (f64, Vec<f64>) {
    let p = correlation.nrows();
    let mut total_r = 0.0;
    let mut total_a = 0.0;
    let mut msa = Vec::with_capacity(p);
    for i in 0..p {
        let mut row_r = 0.0;
        let mut row_a = 0.0;
        for j in (0..p).filter(|j| *j != i) {
            let partial = -inverse[(i, j)] / (inverse[(i, i)] * inverse[(j, j)]).sqrt();
            row_r += correlation[(i, j)].powi(2);
            row_a += partial.powi(2);
        }
        msa.push(row_r / (row_r + row_a));
        total_r += row_r;
        total_a += row_a;
    }
    (total_r / (total_r + total_a), msa)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(p: usize) -> Vec<Feature> {
        Feature::ALL[..p].to_vec()
    }

    fn equicorrelated(p: usize, rho: f64) -> DMatrix<f64> {
        DMatrix::from_fn(p, p, |i, j| if i == j { 1.0 } else { rho })
    }

    #[test]
    fn test_identity_is_not_factorable() {
        let r = DMatrix::identity(4, 4);
        let err = assess(&r, 100, &features(4), &FactorConfig::default()).unwrap_err();
        assert!(matches!(err, FactorError::NotFactorable { .. }));
    }

    #[test]
    fn test_singular_matrix_is_degenerate() {
        let r = equicorrelated(3, 1.0);
        let err = assess(&r, 100, &features(3), &FactorConfig::default()).unwrap_err();
        assert!(matches!(err, FactorError::DegenerateCorrelation));
    }

    #[test]
    fn test_correlated_variables_pass() {
        let r = equicorrelated(4, 0.6);
        let report = assess(&r, 100, &features(4), &FactorConfig::default()).unwrap();
        assert!(report.bartlett_p_value < 1e-6);
        assert_eq!(report.bartlett_degrees_of_freedom, 6);
        assert!(report.kmo > 0.7);
        assert_eq!(report.variables.len(), 4);
        // symmetric structure: every variable is equally adequate
        for variable in &report.variables {
            assert!((variable.msa - report.kmo).abs() < 1e-9);
        }
    }

    #[test]
    fn test_bartlett_statistic_matches_formula() {
        let r = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let config = FactorConfig {
            min_kmo: 0.0,
            ..FactorConfig::default()
        };
        let report = assess(&r, 50, &features(2), &config).unwrap();
        assert!((report.kmo - 0.5).abs() < 1e-9);
        let expected = -(49.0 - 9.0 / 6.0) * 0.75_f64.ln();
        assert!((report.bartlett_chi_square - expected).abs() < 1e-9);
        assert!((report.determinant - 0.75).abs() < 1e-12);
    }
}
