//! Rank-based percentiles.
//!
//! Percentiles here are *positions within a reference sample*, not quantile
//! values: a value's percentile is the share of the reference sample lying
//! below it, counting ties as half (mid-rank). This keeps percentiles stable
//! when many values are equal and symmetric around the median.

/// Computes the mid-rank percentile (0.0 to 100.0) of `value` within a sorted reference sample.
///
/// `percentile = 100 × (count_below + 0.5 × count_equal) / n`
///
/// # Arguments
///
/// * `sorted_reference` - Reference values sorted in ascending order
/// * `value` - The value to locate
///
/// # Returns
///
/// The percentile, or `f64::NAN` if the reference sample is empty.
///
/// # Panics
///
/// Panics in debug mode if `sorted_reference` is not sorted in ascending order.
///
/// # Examples
///
/// ```
/// use racecraft_stats::percentiles::rank_percentile;
///
/// let reference = [1.0, 2.0, 3.0, 4.0];
/// assert_eq!(rank_percentile(&reference, 0.0), 0.0);
/// assert_eq!(rank_percentile(&reference, 2.0), 37.5);
/// assert_eq!(rank_percentile(&reference, 10.0), 100.0);
/// ```
#[expect(clippy::cast_precision_loss)]
#[must_use]
pub fn rank_percentile(sorted_reference: &[f64], value: f64) -> f64 {
    debug_assert!(
        sorted_reference.is_sorted_by(|a, b| a <= b),
        "values must be sorted in ascending order"
    );
    if sorted_reference.is_empty() {
        return f64::NAN;
    }
    let below = sorted_reference.partition_point(|v| *v < value);
    let below_or_equal = sorted_reference.partition_point(|v| *v <= value);
    let equal = below_or_equal - below;
    100.0 * (below as f64 + 0.5 * equal as f64) / sorted_reference.len() as f64
}

/// Computes the mid-rank percentile of every value within the values themselves.
///
/// # Examples
///
/// ```
/// use racecraft_stats::percentiles::percentile_ranks;
///
/// let ranks = percentile_ranks(&[30.0, 10.0, 20.0]);
/// assert!((ranks[0] - 500.0 / 6.0).abs() < 1e-9);
/// assert!((ranks[1] - 100.0 / 6.0).abs() < 1e-9);
/// assert!((ranks[2] - 50.0).abs() < 1e-9);
/// ```
#[must_use]
pub fn percentile_ranks(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    values
        .iter()
        .map(|value| rank_percentile(&sorted, *value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_reference_is_nan() {
        assert!(rank_percentile(&[], 1.0).is_nan());
    }

    #[test]
    fn test_ties_use_mid_rank() {
        let reference = [1.0, 1.0, 1.0, 1.0];
        assert_eq!(rank_percentile(&reference, 1.0), 50.0);
    }

    #[test]
    fn test_monotonic_in_value() {
        let reference = [0.5, 1.5, 2.5, 3.5, 4.5];
        let mut previous = -1.0;
        for step in 0..60 {
            let value = f64::from(step) * 0.1;
            let p = rank_percentile(&reference, value);
            assert!(p >= previous);
            previous = p;
        }
    }

    #[test]
    fn test_percentile_ranks_preserve_order() {
        let values = [3.0, -1.0, 8.0, 0.0];
        let ranks = percentile_ranks(&values);
        assert!(ranks[1] < ranks[3]);
        assert!(ranks[3] < ranks[0]);
        assert!(ranks[0] < ranks[2]);
    }
}
