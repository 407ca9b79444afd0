//! Factor rotation.
//!
//! - **Varimax** (orthogonal): maximizes the variance of squared loadings within
//!   each factor, with Kaiser row normalization.
//! - **Promax** (oblique): raises the varimax loadings to a power (keeping signs)
//!   to form a simpler target, then fits an oblique transformation towards it.
//!   Factors may correlate; the factor correlation matrix is reported.
//!
//! Driver skills are expected to correlate (fast drivers also tend to be
//! consistent), so the default is promax with power 4.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::FactorError;

const VARIMAX_MAX_ITERATIONS: usize = 1000;
const VARIMAX_EPSILON: f64 = 1e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Rotation {
    None,
    Varimax,
    Promax { power: u32 },
}

impl Default for Rotation {
    fn default() -> Self {
        Rotation::Promax { power: 4 }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rotation::None => f.write_str("none"),
            Rotation::Varimax => f.write_str("varimax"),
            Rotation::Promax { power } => write!(f, "promax({power})"),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RotatedSolution {
    /// `p × k` pattern loadings
    pub pattern: DMatrix<f64>,
    /// `k × k` factor correlation matrix (identity for orthogonal rotations)
    pub factor_correlations: DMatrix<f64>,
    pub converged: bool,
}

pub(crate) fn rotate(
    loadings: &DMatrix<f64>,
    rotation: Rotation,
) -> Result<RotatedSolution, FactorError> {
    let k = loadings.ncols();
    let identity = DMatrix::identity(k, k);
    if k < 2 {
        return Ok(RotatedSolution {
            pattern: loadings.clone(),
            factor_correlations: identity,
            converged: true,
        });
    }
    match rotation {
        Rotation::None => Ok(RotatedSolution {
            pattern: loadings.clone(),
            factor_correlations: identity,
            converged: true,
        }),
        Rotation::Varimax => {
            let (pattern, converged) = varimax(loadings)?;
            Ok(RotatedSolution {
                pattern,
                factor_correlations: identity,
                converged,
            })
        }
        Rotation::Promax { power } => promax(loadings, power),
    }
}

/// Kaiser-normalized varimax.
///
/// Returns the rotated loadings and whether the criterion converged.
#[expect(clippy::cast_precision_loss)]
fn varimax(loadings: &DMatrix<f64>) -> Result<(DMatrix<f64>, bool), FactorError> {
    let p = loadings.nrows();
    let k = loadings.ncols();
    let row_norms = loadings
        .row_iter()
        .map(|row| row.norm())
        .map(|norm| if norm > 0.0 { norm } else { 1.0 })
        .collect::<Vec<_>>();
    let normalized = DMatrix::from_fn(p, k, |i, j| loadings[(i, j)] / row_norms[i]);

    let mut rotation = DMatrix::<f64>::identity(k, k);
    let mut criterion = 0.0;
    let mut converged = false;
    for _ in 0..VARIMAX_MAX_ITERATIONS {
        let rotated = &normalized * &rotation;
        let column_sums = rotated.map(|v| v * v).row_sum() / p as f64;
        let cubed = rotated.map(|v| v.powi(3));
        let shrink = DMatrix::from_fn(p, k, |i, j| rotated[(i, j)] * column_sums[j]);
        let gradient = normalized.transpose() * (cubed - shrink);

        let svd = gradient.svd(true, true);
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(FactorError::RotationFailed);
        };
        rotation = u * v_t;

        let previous = criterion;
        criterion = svd.singular_values.sum();
        if criterion < previous * (1.0 + VARIMAX_EPSILON) {
            converged = true;
            break;
        }
    }

    let rotated = &normalized * &rotation;
    let pattern = DMatrix::from_fn(p, k, |i, j| rotated[(i, j)] * row_norms[i]);
    Ok((pattern, converged))
}

/// Promax rotation with the given power.
///
/// With varimax loadings `A` and target `Q = A ⊙ |A|^(m-1)`:
///
/// ```text
/// U = (AᵀA)⁻¹ AᵀQ,  columns rescaled so diag((UᵀU)⁻¹) = 1
/// pattern = A U
/// Φ = U⁻¹ U⁻ᵀ
/// ```
fn promax(loadings: &DMatrix<f64>, power: u32) -> Result<RotatedSolution, FactorError> {
    let (varimax_loadings, converged) = varimax(loadings)?;
    let exponent = i32::try_from(power.saturating_sub(1)).map_err(|_| FactorError::RotationFailed)?;
    let target = varimax_loadings.map(|v| v * v.abs().powi(exponent));

    let normal = (varimax_loadings.transpose() * &varimax_loadings)
        .try_inverse()
        .ok_or(FactorError::RotationFailed)?;
    let mut transform = normal * varimax_loadings.transpose() * target;

    let scale = (transform.transpose() * &transform)
        .try_inverse()
        .ok_or(FactorError::RotationFailed)?
        .diagonal();
    if scale.iter().any(|d| d.is_nan() || *d <= 0.0) {
        return Err(FactorError::RotationFailed);
    }
    for (j, mut column) in transform.column_iter_mut().enumerate() {
        column *= scale[j].sqrt();
    }

    let pattern = &varimax_loadings * &transform;
    let inverse = transform
        .try_inverse()
        .ok_or(FactorError::RotationFailed)?;
    let mut factor_correlations = &inverse * inverse.transpose();
    let k = factor_correlations.nrows();
    for i in 0..k {
        factor_correlations[(i, i)] = 1.0;
        for j in 0..i {
            let v = f64::midpoint(factor_correlations[(i, j)], factor_correlations[(j, i)]);
            factor_correlations[(i, j)] = v;
            factor_correlations[(j, i)] = v;
        }
    }

    if pattern.iter().chain(factor_correlations.iter()).any(|v| !v.is_finite()) {
        return Err(FactorError::RotationFailed);
    }
    Ok(RotatedSolution {
        pattern,
        factor_correlations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two clean clusters of variables, mixed by a 30° rotation.
    fn mixed_two_factor() -> DMatrix<f64> {
        let simple = DMatrix::from_row_slice(
            6,
            2,
            &[0.8, 0.0, 0.7, 0.0, 0.75, 0.0, 0.0, 0.8, 0.0, 0.7, 0.0, 0.75],
        );
        let angle = std::f64::consts::FRAC_PI_6;
        let mix = DMatrix::from_row_slice(
            2,
            2,
            &[angle.cos(), -angle.sin(), angle.sin(), angle.cos()],
        );
        simple * mix
    }

    fn max_cross_loading(pattern: &DMatrix<f64>) -> f64 {
        pattern
            .row_iter()
            .map(|row| row.iter().map(|v| v.abs()).fold(f64::INFINITY, f64::min))
            .fold(0.0, f64::max)
    }

    #[test]
    fn test_varimax_recovers_simple_structure() {
        let loadings = mixed_two_factor();
        let (rotated, converged) = varimax(&loadings).unwrap();
        assert!(converged);
        assert!(max_cross_loading(&rotated) < 1e-2);
        // orthogonal rotation preserves communalities
        for i in 0..6 {
            let before = loadings.row(i).norm_squared();
            let after = rotated.row(i).norm_squared();
            assert!((before - after).abs() < 1e-9);
        }
    }

    #[test]
    fn test_promax_reports_unit_diagonal_correlations() {
        let solution = rotate(&mixed_two_factor(), Rotation::default()).unwrap();
        assert!(max_cross_loading(&solution.pattern) < 5e-2);
        let phi = &solution.factor_correlations;
        assert_eq!(phi[(0, 0)], 1.0);
        assert_eq!(phi[(1, 1)], 1.0);
        assert!((phi[(0, 1)] - phi[(1, 0)]).abs() < 1e-12);
        assert!(phi[(0, 1)].abs() < 1.0);
    }

    #[test]
    fn test_single_factor_is_not_rotated() {
        let loadings = DMatrix::from_column_slice(3, 1, &[0.7, 0.6, 0.5]);
        let solution = rotate(&loadings, Rotation::Varimax).unwrap();
        assert_eq!(solution.pattern, loadings);
        assert_eq!(solution.factor_correlations, DMatrix::identity(1, 1));
    }

    #[test]
    fn test_rotation_serializes_with_method_tag() {
        let json = serde_json::to_string(&Rotation::Promax { power: 4 }).unwrap();
        assert_eq!(json, r#"{"method":"promax","power":4}"#);
        let parsed: Rotation = serde_json::from_str(r#"{"method":"varimax"}"#).unwrap();
        assert_eq!(parsed, Rotation::Varimax);
    }
}
