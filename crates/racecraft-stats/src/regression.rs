//! Ordinary least-squares regression.
//!
//! Regressions in the pipeline are tiny (a handful of predictors, at most a few
//! hundred rows), so the design matrix is solved through SVD, which stays
//! well-behaved on tall and nearly collinear designs. Progressively looser
//! singular-value tolerances are tried before giving up.

use nalgebra::{DMatrix, DVector};

use crate::metrics::FitMetrics;

const SVD_TOLERANCES: [f64; 3] = [1e-12, 1e-10, 1e-8];

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum RegressionError {
    #[display("regression needs more observations ({observations}) than parameters ({parameters})")]
    Underdetermined {
        observations: usize,
        parameters: usize,
    },
    #[display("design matrix has {rows} rows but response has {responses} values")]
    LengthMismatch { rows: usize, responses: usize },
    #[display("least-squares system is too ill-conditioned to solve")]
    IllConditioned,
}

/// A fitted linear model `y = intercept + Σ coefficients_i × x_i`.
#[derive(Debug, Clone)]
pub struct LinearFit {
    /// Intercept term
    pub intercept: f64,
    /// One coefficient per predictor column
    pub coefficients: Vec<f64>,
    /// In-sample goodness of fit
    pub metrics: FitMetrics,
    /// Number of observations used
    pub observations: usize,
}

impl LinearFit {
    /// Fits `y` on the columns of `x` with an intercept.
    ///
    /// # Arguments
    ///
    /// * `x` - Predictor matrix (`n × k`)
    /// * `y` - Response vector (length `n`)
    ///
    /// # Errors
    ///
    /// Fails when there are not more observations than parameters, when the
    /// dimensions disagree, or when the system cannot be solved.
    ///
    /// # Examples
    ///
    /// ```
    /// use nalgebra::{DMatrix, DVector};
    /// use racecraft_stats::regression::LinearFit;
    ///
    /// // y = 2 + 3x
    /// let x = DMatrix::from_column_slice(4, 1, &[0.0, 1.0, 2.0, 3.0]);
    /// let y = DVector::from_column_slice(&[2.0, 5.0, 8.0, 11.0]);
    /// let fit = LinearFit::fit(&x, &y).unwrap();
    /// assert!((fit.intercept - 2.0).abs() < 1e-9);
    /// assert!((fit.coefficients[0] - 3.0).abs() < 1e-9);
    /// assert!((fit.metrics.r_squared - 1.0).abs() < 1e-9);
    /// ```
    pub fn fit(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<Self, RegressionError> {
        let n = x.nrows();
        let k = x.ncols();
        if y.len() != n {
            return Err(RegressionError::LengthMismatch {
                rows: n,
                responses: y.len(),
            });
        }
        if n <= k + 1 {
            return Err(RegressionError::Underdetermined {
                observations: n,
                parameters: k + 1,
            });
        }

        let design = DMatrix::from_fn(n, k + 1, |row, column| {
            if column == 0 { 1.0 } else { x[(row, column - 1)] }
        });
        let beta = solve_least_squares(&design, y)?;

        let intercept = beta[0];
        let coefficients = beta.iter().skip(1).copied().collect::<Vec<_>>();
        let fitted = &design * &beta;
        let metrics = FitMetrics::from_predictions(y.as_slice(), fitted.as_slice());

        Ok(Self {
            intercept,
            coefficients,
            metrics,
            observations: n,
        })
    }

    /// Predicts the response for one row of predictors.
    ///
    /// # Panics
    ///
    /// Panics if `row` does not have one value per coefficient.
    #[must_use]
    pub fn predict(&self, row: &[f64]) -> f64 {
        assert_eq!(row.len(), self.coefficients.len(), "predictor count mismatch");
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(b, x)| b * x)
                .sum::<f64>()
    }
}

/// Solves `min ‖x β − y‖²` through SVD.
///
/// # Errors
///
/// Returns [`RegressionError::IllConditioned`] if no tolerance yields a finite solution.
///
/// # Examples
///
/// ```
/// use nalgebra::{DMatrix, DVector};
/// use racecraft_stats::regression::solve_least_squares;
///
/// let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
/// let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);
/// let beta = solve_least_squares(&x, &y).unwrap();
/// assert!((beta[0] - 2.0).abs() < 1e-10);
/// assert!((beta[1] - 3.0).abs() < 1e-10);
/// ```
pub fn solve_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
) -> Result<DVector<f64>, RegressionError> {
    let svd = x.clone().svd(true, true);
    for tolerance in SVD_TOLERANCES {
        match svd.solve(y, tolerance) {
            Ok(beta) if beta.iter().all(|v| v.is_finite()) => return Ok(beta),
            _ => {}
        }
    }
    Err(RegressionError::IllConditioned)
}

/// Slope of the simple regression of `ys` on `xs`.
///
/// Returns `None` if fewer than two points are given or all `xs` are equal.
///
/// # Examples
///
/// ```
/// use racecraft_stats::regression::simple_slope;
///
/// assert_eq!(simple_slope(&[1.0, 2.0, 3.0], &[10.0, 10.5, 11.0]), Some(0.5));
/// assert_eq!(simple_slope(&[1.0, 1.0], &[3.0, 4.0]), None);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn simple_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let sxx = xs.iter().map(|x| (x - mean_x).powi(2)).sum::<f64>();
    if sxx <= f64::EPSILON {
        return None;
    }
    let sxy = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum::<f64>();
    Some(sxy / sxx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_regression_recovers_coefficients() {
        // y = 1 - 2 a + 0.5 b
        let rows = [
            (0.0, 0.0),
            (1.0, 0.0),
            (0.0, 1.0),
            (1.0, 1.0),
            (2.0, 3.0),
            (-1.0, 2.0),
        ];
        let x = DMatrix::from_fn(rows.len(), 2, |r, c| if c == 0 { rows[r].0 } else { rows[r].1 });
        let y = DVector::from_iterator(rows.len(), rows.iter().map(|(a, b)| 1.0 - 2.0 * a + 0.5 * b));
        let fit = LinearFit::fit(&x, &y).unwrap();
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!((fit.coefficients[0] + 2.0).abs() < 1e-9);
        assert!((fit.coefficients[1] - 0.5).abs() < 1e-9);
        assert!((fit.predict(&[3.0, 4.0]) - (1.0 - 6.0 + 2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_underdetermined_is_rejected() {
        let x = DMatrix::from_row_slice(2, 1, &[1.0, 2.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(matches!(
            LinearFit::fit(&x, &y),
            Err(RegressionError::Underdetermined {
                observations: 2,
                parameters: 2
            })
        ));
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, 2.0, 3.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0]);
        assert!(matches!(
            LinearFit::fit(&x, &y),
            Err(RegressionError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_simple_slope_negative() {
        let slope = simple_slope(&[0.0, 1.0, 2.0, 3.0], &[3.0, 2.0, 1.0, 0.0]).unwrap();
        assert!((slope + 1.0).abs() < 1e-12);
    }
}
