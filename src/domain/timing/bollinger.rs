//! Bollinger band position.
//!
//! Middle = mean of the trailing `window` values, bands = middle ± mult ×
//! sample standard deviation. Exposure is where the latest value sits
//! between the lower band (0) and the upper band (1).

use crate::domain::stats;

pub fn band_position(values: &[f64], window: usize, mult: f64) -> Option<f64> {
    let last = *values.last()?;
    let start = values.len().saturating_sub(window.max(1));
    let window = &values[start..];

    let middle = stats::mean(window)?;
    // A single observation has no spread.
    let std = stats::sample_stddev(window).unwrap_or(0.0);
    let upper = middle + mult * std;
    let lower = middle - mult * std;

    let width = upper - lower;
    if !(width.is_finite() && width > 0.0) {
        return Some(0.5);
    }
    Some(((last - lower) / width).clamp(0.0, 1.0))
}
