//! Factor count selection and principal-axis extraction.

use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

use super::FactorError;

/// Communality assigned to variables whose estimate reaches 1 (Heywood case).
pub const HEYWOOD_CEILING: f64 = 0.995;

/// How the number of factors was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorCountRule {
    /// Retain factors with eigenvalue greater than 1
    Kaiser,
    /// Supplied by the caller
    Manual,
}

/// Eigen-analysis and extraction diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSummary {
    /// Eigenvalues of the correlation matrix, descending
    pub eigenvalues: Vec<f64>,
    /// Cumulative fraction of total variance explained by the leading eigenvalues
    pub cumulative_variance: Vec<f64>,
    pub n_factors: usize,
    pub rule: FactorCountRule,
    pub iterations: usize,
    pub converged: bool,
}

/// Eigen-decomposition of a symmetric matrix with eigenvalues sorted descending.
#[derive(Debug)]
pub(crate) struct SortedEigen {
    pub values: Vec<f64>,
    /// Eigenvectors as columns, in the order of `values`
    pub vectors: DMatrix<f64>,
}

impl SortedEigen {
    pub(crate) fn new(matrix: &DMatrix<f64>) -> Self {
        let eigen = SymmetricEigen::new(matrix.clone());
        let mut order = (0..eigen.eigenvalues.len()).collect::<Vec<_>>();
        order.sort_by(|a, b| eigen.eigenvalues[*b].total_cmp(&eigen.eigenvalues[*a]));
        let values = order.iter().map(|i| eigen.eigenvalues[*i]).collect();
        let vectors = DMatrix::from_fn(matrix.nrows(), order.len(), |row, column| {
            eigen.eigenvectors[(row, order[column])]
        });
        Self { values, vectors }
    }
}

/// Chooses the number of factors.
///
/// With `requested = None` the Kaiser criterion applies: count eigenvalues
/// above 1, at least one and at most `p - 1`.
pub(crate) fn choose_factor_count(
    eigenvalues: &[f64],
    requested: Option<usize>,
) -> Result<(usize, FactorCountRule), FactorError> {
    let p = eigenvalues.len();
    match requested {
        Some(k) if k >= 1 && k < p => Ok((k, FactorCountRule::Manual)),
        Some(k) => Err(FactorError::InvalidFactorCount {
            requested: k,
            variables: p,
        }),
        None => {
            let k = eigenvalues
                .iter()
                .filter(|v| **v > 1.0)
                .count()
                .clamp(1, p.saturating_sub(1).max(1));
            Ok((k, FactorCountRule::Kaiser))
        }
    }
}

#[expect(clippy::cast_precision_loss)]
pub(crate) fn cumulative_variance(eigenvalues: &[f64]) -> Vec<f64> {
    let p = eigenvalues.len() as f64;
    eigenvalues
        .iter()
        .scan(0.0, |sum, v| {
            *sum += v.max(0.0);
            Some(*sum / p)
        })
        .collect()
}

/// Unrotated principal-axis solution.
#[derive(Debug)]
pub(crate) struct PrincipalAxis {
    /// `p × k` loading matrix
    pub loadings: DMatrix<f64>,
    pub communalities: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
    /// Variables whose communality was clamped to [`HEYWOOD_CEILING`]
    pub heywood: Vec<usize>,
}

/// Iterated principal-axis factoring.
///
/// Starts from squared multiple correlations, replaces the diagonal of `R` with
/// the current communalities, keeps the leading `k` eigenpairs and repeats until
/// the largest communality change is below `tolerance`.
///
/// Each loading column is oriented so its sum is non-negative; orientation
/// relative to performance happens later, in reflection.
pub(crate) fn principal_axis(
    correlation: &DMatrix<f64>,
    k: usize,
    max_iterations: usize,
    tolerance: f64,
) -> Result<PrincipalAxis, FactorError> {
    let p = correlation.nrows();
    let inverse = correlation
        .clone()
        .try_inverse()
        .ok_or(FactorError::DegenerateCorrelation)?;
    let mut communalities = (0..p)
        .map(|i| (1.0 - 1.0 / inverse[(i, i)]).clamp(0.0, HEYWOOD_CEILING))
        .collect::<Vec<_>>();

    let mut loadings = DMatrix::zeros(p, k);
    let mut heywood = vec![];
    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations.max(1) {
        iterations += 1;
        let mut reduced = correlation.clone();
        for (i, h) in communalities.iter().enumerate() {
            reduced[(i, i)] = *h;
        }
        let eigen = SortedEigen::new(&reduced);
        loadings = DMatrix::from_fn(p, k, |row, column| {
            eigen.vectors[(row, column)] * eigen.values[column].max(0.0).sqrt()
        });
        if loadings.iter().any(|v| !v.is_finite()) {
            return Err(FactorError::ExtractionFailed);
        }

        heywood.clear();
        let mut max_change: f64 = 0.0;
        for (i, h) in communalities.iter_mut().enumerate() {
            let mut updated = loadings.row(i).norm_squared();
            if updated >= 1.0 {
                heywood.push(i);
                updated = HEYWOOD_CEILING;
            }
            max_change = max_change.max((updated - *h).abs());
            *h = updated;
        }
        if max_change < tolerance {
            converged = true;
            break;
        }
    }

    for mut column in loadings.column_iter_mut() {
        if column.sum() < 0.0 {
            column.neg_mut();
        }
    }

    Ok(PrincipalAxis {
        loadings,
        communalities,
        iterations,
        converged,
        heywood,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Correlation matrix implied by a known loading matrix.
    fn implied_correlation(loadings: &DMatrix<f64>) -> DMatrix<f64> {
        let mut r = loadings * loadings.transpose();
        for i in 0..r.nrows() {
            r[(i, i)] = 1.0;
        }
        r
    }

    #[test]
    fn test_eigenvalues_are_sorted_descending() {
        let r = DMatrix::from_row_slice(3, 3, &[1.0, 0.2, 0.7, 0.2, 1.0, 0.1, 0.7, 0.1, 1.0]);
        let eigen = SortedEigen::new(&r);
        assert!(eigen.values.windows(2).all(|w| w[0] >= w[1]));
        assert!((eigen.values.iter().sum::<f64>() - 3.0).abs() < 1e-9);
        let cumulative = cumulative_variance(&eigen.values);
        assert!((cumulative[2] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_kaiser_rule_and_manual_override() {
        let eigenvalues = [2.5, 1.3, 0.7, 0.5];
        assert_eq!(
            choose_factor_count(&eigenvalues, None).unwrap(),
            (2, FactorCountRule::Kaiser)
        );
        assert_eq!(
            choose_factor_count(&eigenvalues, Some(3)).unwrap(),
            (3, FactorCountRule::Manual)
        );
        assert!(choose_factor_count(&eigenvalues, Some(0)).is_err());
        assert!(choose_factor_count(&eigenvalues, Some(4)).is_err());
        // no eigenvalue above 1 still keeps one factor
        assert_eq!(choose_factor_count(&[1.0, 1.0], None).unwrap().0, 1);
    }

    #[test]
    fn test_recovers_single_factor_loadings() {
        let truth = DMatrix::from_column_slice(4, 1, &[0.8, 0.7, 0.6, 0.5]);
        let r = implied_correlation(&truth);
        let solution = principal_axis(&r, 1, 1000, 1e-10).unwrap();
        assert!(solution.converged);
        assert!(solution.heywood.is_empty());
        for i in 0..4 {
            assert!((solution.loadings[(i, 0)] - truth[(i, 0)]).abs() < 1e-4);
            assert!((solution.communalities[i] - truth[(i, 0)].powi(2)).abs() < 1e-4);
        }
    }

    #[test]
    fn test_heywood_cases_are_clamped() {
        let truth = DMatrix::from_column_slice(3, 1, &[0.95, 0.9, 0.85]);
        let mut r = implied_correlation(&truth);
        // inflate one correlation so a single factor implies a loading above 1
        r[(0, 1)] = 0.97;
        r[(1, 0)] = 0.97;
        let solution = principal_axis(&r, 1, 100, 1e-8).unwrap();
        assert!(solution.communalities.iter().all(|h| *h <= HEYWOOD_CEILING));
    }
}
