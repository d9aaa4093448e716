//! Summary statistics over plain `f64` samples. Empty samples give NaN.

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() { return f64::NAN }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Linearly interpolated quantile, `q` in `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() { return f64::NAN }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

#[inline]
pub fn median(values: &[f64]) -> f64 { quantile(values, 0.5) }

pub fn iqr(values: &[f64]) -> f64 { quantile(values, 0.75) - quantile(values, 0.25) }

pub fn range(values: &[f64]) -> f64 {
    if values.is_empty() { return f64::NAN }
    let max = values.iter().copied().fold(f64::MIN, f64::max);
    let min = values.iter().copied().fold(f64::MAX, f64::min);
    max - min
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(f64::NAN, f64::max)
}

/// Sample standard deviation (n − 1 denominator).
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 { return f64::NAN }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Gini coefficient of non-negative values: 0 for perfect equality,
/// approaching 1 when one value holds everything.
pub fn gini(values: &[f64]) -> f64 {
    if values.is_empty() { return f64::NAN }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len() as f64;
    let mut running = 0.0;
    let mut cumulative_sum = 0.0;
    for v in &sorted {
        running += v;
        cumulative_sum += running;
    }
    (n + 1.0 - 2.0 * cumulative_sum / running) / n
}

/// Shannon entropy in nats of a histogram, normalising counts to probabilities.
pub fn entropy(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 { return f64::NAN }
    counts.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.ln()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_and_spread() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(mean(&values), 2.5);
        assert_eq!(median(&values), 2.5);
        assert_eq!(quantile(&values, 0.25), 1.75);
        assert_eq!(iqr(&values), 1.5);
        assert_eq!(range(&values), 3.0);
        assert_eq!(max(&values), 4.0);
        assert!((std_dev(&values) - 1.290_994_448_735_805_6).abs() < 1e-12);
        assert!(mean(&[]).is_nan() && std_dev(&[1.0]).is_nan());
    }

    #[test]
    fn gini_bounds() {
        assert!(gini(&[5.0, 5.0, 5.0, 5.0]).abs() < 1e-12);
        assert!((gini(&[0.0, 0.0, 0.0, 1.0]) - 0.75).abs() < 1e-12);
        assert!(gini(&[0.0, 0.0]).is_nan());
    }

    #[test]
    fn entropy_of_uniform_histograms() {
        assert!((entropy(&[1, 1, 1, 1, 0, 0]) - 4f64.ln()).abs() < 1e-12);
        assert_eq!(entropy(&[7, 0, 0]), 0.0);
        assert!(entropy(&[0, 0]).is_nan());
    }
}
