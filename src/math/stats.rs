//! Small summary statistics over channel series.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Unbiased sample variance (`n - 1` denominator). Zero for fewer than 2 values.
pub fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n as f64 - 1.0)
}

/// `max - min`, or zero for an empty slice.
pub fn value_range(values: &[f64]) -> f64 {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for &v in values {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if hi >= lo { hi - lo } else { 0.0 }
}

pub fn mean_square(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_small_series() {
        let v = [1.0, 2.0, 3.0, 6.0];
        assert!((mean(&v) - 3.0).abs() < 1e-15);
        assert!((sample_variance(&v) - 14.0 / 3.0).abs() < 1e-12);
        assert!((value_range(&v) - 5.0).abs() < 1e-15);
        assert!((mean_square(&v) - 12.5).abs() < 1e-12);
    }

    #[test]
    fn degenerate_inputs() {
        assert_eq!(sample_variance(&[2.0]), 0.0);
        assert_eq!(value_range(&[]), 0.0);
        assert_eq!(value_range(&[4.0, 4.0]), 0.0);
    }
}
