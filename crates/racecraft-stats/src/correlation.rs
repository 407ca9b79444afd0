//! Column standardization and Pearson correlation matrices.
//!
//! Data matrices are `n × p` (`n` observations in rows, `p` variables in columns),
//! represented as [`nalgebra::DMatrix<f64>`].

use nalgebra::DMatrix;

use crate::descriptive::DescriptiveStats;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum StandardizeError {
    #[display("at least two observations are required to standardize, got {count}")]
    TooFewObservations { count: usize },
    #[display("column {column} has zero variance")]
    ConstantColumn { column: usize },
}

/// Per-column location and scale of a data matrix.
///
/// Captured once from a reference (fitting) sample and then applied unchanged
/// to any later data, so standardized values stay comparable.
#[derive(Debug, Clone, PartialEq)]
pub struct Standardization {
    /// Column means of the reference sample
    pub means: Vec<f64>,
    /// Column sample standard deviations of the reference sample
    pub std_devs: Vec<f64>,
}

impl Standardization {
    /// Computes column means and sample standard deviations.
    ///
    /// # Errors
    ///
    /// Returns [`StandardizeError::TooFewObservations`] for fewer than two rows and
    /// [`StandardizeError::ConstantColumn`] if any column has zero variance.
    ///
    /// # Examples
    ///
    /// ```
    /// use nalgebra::DMatrix;
    /// use racecraft_stats::correlation::Standardization;
    ///
    /// let data = DMatrix::from_row_slice(3, 2, &[1.0, 10.0, 2.0, 20.0, 3.0, 30.0]);
    /// let standardization = Standardization::from_data(&data).unwrap();
    /// assert_eq!(standardization.means, vec![2.0, 20.0]);
    /// assert_eq!(standardization.std_devs, vec![1.0, 10.0]);
    /// ```
    pub fn from_data(data: &DMatrix<f64>) -> Result<Self, StandardizeError> {
        if data.nrows() < 2 {
            return Err(StandardizeError::TooFewObservations { count: data.nrows() });
        }
        let mut means = Vec::with_capacity(data.ncols());
        let mut std_devs = Vec::with_capacity(data.ncols());
        for (column, values) in data.column_iter().enumerate() {
            let stats = DescriptiveStats::new(values.iter().copied())
                .ok_or(StandardizeError::TooFewObservations { count: 0 })?;
            if stats.std_dev <= f64::EPSILON * stats.mean.abs().max(1.0) {
                return Err(StandardizeError::ConstantColumn { column });
            }
            means.push(stats.mean);
            std_devs.push(stats.std_dev);
        }
        Ok(Self { means, std_devs })
    }

    /// Standardizes a single value of column `column`.
    #[must_use]
    pub fn z_score(&self, column: usize, value: f64) -> f64 {
        (value - self.means[column]) / self.std_devs[column]
    }

    /// Standardizes every column of `data` with the stored parameters.
    ///
    /// # Panics
    ///
    /// Panics if `data` does not have the same number of columns as the reference sample.
    #[must_use]
    pub fn apply(&self, data: &DMatrix<f64>) -> DMatrix<f64> {
        assert_eq!(data.ncols(), self.means.len(), "column count mismatch");
        DMatrix::from_fn(data.nrows(), data.ncols(), |row, column| {
            self.z_score(column, data[(row, column)])
        })
    }
}

/// Pearson correlation matrix of a standardized data matrix.
///
/// With column z-scores computed using the sample standard deviation,
/// `R = ZᵀZ / (n - 1)`.
///
/// # Examples
///
/// ```
/// use nalgebra::DMatrix;
/// use racecraft_stats::correlation::{Standardization, correlation_from_standardized};
///
/// let data = DMatrix::from_row_slice(4, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0, 4.0, 8.0]);
/// let z = Standardization::from_data(&data).unwrap().apply(&data);
/// let r = correlation_from_standardized(&z);
/// assert!((r[(0, 1)] - 1.0).abs() < 1e-12);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn correlation_from_standardized(standardized: &DMatrix<f64>) -> DMatrix<f64> {
    let n = standardized.nrows() as f64;
    let mut r = standardized.transpose() * standardized / (n - 1.0);
    // exact unit diagonal, symmetric up to rounding
    for i in 0..r.nrows() {
        r[(i, i)] = 1.0;
        for j in 0..i {
            let v = f64::midpoint(r[(i, j)], r[(j, i)]);
            r[(i, j)] = v;
            r[(j, i)] = v;
        }
    }
    r
}
