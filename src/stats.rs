//! Small statistics helpers used by the envelope validator, the normalizer,
//! and the protein roll-up

/// Pearson correlation coefficient between two equally long samples, computed
/// in a single pass. Returns NaN when either variance is zero.
///
/// # Panics
/// When the samples have different lengths.
pub fn pearson(data_a: &[f64], data_b: &[f64]) -> f64 {
    assert_eq!(
        data_a.len(),
        data_b.len(),
        "the samples must have the same length"
    );

    let mut n = 0.0;
    let mut r = 0.0;
    let mut mean_a = 0.0;
    let mut mean_b = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;

    for (&current_a, &current_b) in data_a.iter().zip(data_b) {
        let delta_a = current_a - mean_a;
        n += 1.0;
        let scale_delta_a = delta_a / n;

        let delta_b = current_b - mean_b;
        let scale_delta_b = delta_b / n;

        mean_a += scale_delta_a;
        mean_b += scale_delta_b;

        var_a += scale_delta_a * delta_a * (n - 1.0);
        var_b += scale_delta_b * delta_b * (n - 1.0);
        r += (delta_a * delta_b * (n - 1.0)) / n;
    }

    r / (var_a * var_b).sqrt()
}

/// The median of a sample, NaN for an empty sample
pub fn median(data: &[f64]) -> f64 {
    if data.is_empty() {
        return f64::NAN;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);

    let size = sorted.len();
    if size % 2 == 0 {
        (sorted[size / 2 - 1] + sorted[size / 2]) / 2.0
    } else {
        sorted[size / 2]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pearson_perfect_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        assert!((pearson(&a, &b) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_perfect_anticorrelation() {
        let a = [1.0, 2.0, 3.0];
        let b = [3.0, 2.0, 1.0];
        assert!((pearson(&a, &b) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn pearson_uncorrelated() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [1.0, -1.0, 1.0, -1.0];
        assert!(pearson(&a, &b).abs() < 0.5);
    }

    #[test]
    fn pearson_zero_variance_is_nan() {
        let a = [1.0, 1.0, 1.0];
        let b = [1.0, 2.0, 3.0];
        assert!(pearson(&a, &b).is_nan());
    }

    #[test]
    fn median_odd_and_even() {
        assert!((median(&[3.0, 1.0, 2.0]) - 2.0).abs() < f64::EPSILON);
        assert!((median(&[4.0, 1.0, 2.0, 3.0]) - 2.5).abs() < f64::EPSILON);
        assert!(median(&[]).is_nan());
    }
}
