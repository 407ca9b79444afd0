//! Goodness-of-fit metrics for predicted vs. actual outcomes.

use serde::{Deserialize, Serialize};

/// Prediction accuracy summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitMetrics {
    /// Coefficient of determination, `1 - SSE / SST`.
    ///
    /// Can be negative when predictions are worse than the mean of the actuals.
    /// `0.0` when the actual values have no variance.
    pub r_squared: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Root mean squared error
    pub rmse: f64,
    /// Number of (actual, predicted) pairs
    pub count: usize,
}

impl FitMetrics {
    /// Computes metrics from paired actual and predicted values.
    ///
    /// # Panics
    ///
    /// Panics if the slices differ in length.
    ///
    /// # Examples
    ///
    /// ```
    /// use racecraft_stats::metrics::FitMetrics;
    ///
    /// let metrics = FitMetrics::from_predictions(&[1.0, 2.0, 3.0], &[1.0, 2.0, 4.0]);
    /// assert!((metrics.mae - 1.0 / 3.0).abs() < 1e-12);
    /// assert!((metrics.r_squared - 0.5).abs() < 1e-12);
    /// ```
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn from_predictions(actual: &[f64], predicted: &[f64]) -> Self {
        assert_eq!(actual.len(), predicted.len(), "length mismatch");
        let count = actual.len();
        if count == 0 {
            return Self {
                r_squared: 0.0,
                mae: 0.0,
                rmse: 0.0,
                count,
            };
        }
        let n = count as f64;
        let mean = actual.iter().sum::<f64>() / n;
        let sst = actual.iter().map(|a| (a - mean).powi(2)).sum::<f64>();
        let sse = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).powi(2))
            .sum::<f64>();
        let sae = actual
            .iter()
            .zip(predicted)
            .map(|(a, p)| (a - p).abs())
            .sum::<f64>();
        let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { 0.0 };
        Self {
            r_squared,
            mae: sae / n,
            rmse: (sse / n).sqrt(),
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let metrics = FitMetrics::from_predictions(&[3.0, 1.0, 2.0], &[3.0, 1.0, 2.0]);
        assert_eq!(metrics.r_squared, 1.0);
        assert_eq!(metrics.mae, 0.0);
        assert_eq!(metrics.rmse, 0.0);
    }

    #[test]
    fn test_mean_predictor_has_zero_r_squared() {
        let metrics = FitMetrics::from_predictions(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0]);
        assert!(metrics.r_squared.abs() < 1e-12);
    }

    #[test]
    fn test_worse_than_mean_is_negative() {
        let metrics = FitMetrics::from_predictions(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]);
        assert!(metrics.r_squared < 0.0);
    }

    #[test]
    fn test_empty_input() {
        let metrics = FitMetrics::from_predictions(&[], &[]);
        assert_eq!(metrics.count, 0);
    }
}
