/// Round half away from zero to `places` decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `numerator / denominator` as a percentage with two decimals; zero when
/// the denominator is not positive.
pub fn to_rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round_to(numerator as f64 / denominator as f64 * 100.0, 2)
}

/// Nearest-rank percentile: `sorted[ceil(p/100 * n) - 1]`, index clamped
/// into bounds. No interpolation between ranks.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[index]
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
