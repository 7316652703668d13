//! Utility functions for working with data slices

/// Calculate the mean of a slice
///
/// Returns 0.0 for empty slices.
///
/// # Examples
///
/// ```rust
/// use design_core::utils::mean;
///
/// assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
/// assert_eq!(mean(&[]), 0.0);
/// ```
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: f64 = data.iter().sum();
    sum / data.len() as f64
}

/// Calculate the sample variance (n - 1 denominator)
///
/// Returns NaN for slices with less than 2 elements.
///
/// # Examples
///
/// ```rust
/// use design_core::utils::sample_variance;
///
/// let var = sample_variance(&[1.0, 2.0, 3.0, 4.0, 5.0]);
/// assert!((var - 2.5).abs() < 1e-12);
/// ```
pub fn sample_variance(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return f64::NAN;
    }
    let m = mean(data);
    data.iter()
        .map(|&x| {
            let diff = x - m;
            diff * diff
        })
        .sum::<f64>()
        / (data.len() - 1) as f64
}

/// Whether all values are equal to the first one
pub fn all_equal(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}
