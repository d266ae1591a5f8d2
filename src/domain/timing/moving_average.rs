//! Dual moving-average exposure.
//!
//! Both means are taken over the trailing window ending at the latest value.
//! A window longer than the available history uses what is there.

use crate::domain::stats;

fn trailing_mean(values: &[f64], window: usize) -> Option<f64> {
    let start = values.len().saturating_sub(window.max(1));
    stats::mean(&values[start..])
}

/// 1 when the fast mean is above the slow mean, else 0. With `ramp_band`
/// set, the step becomes a linear ramp over a relative spread of
/// `±ramp_band` around the crossover.
pub fn dual_ma_exposure(
    values: &[f64],
    fast: usize,
    slow: usize,
    ramp_band: Option<f64>,
) -> Option<f64> {
    let fast_ma = trailing_mean(values, fast)?;
    let slow_ma = trailing_mean(values, slow)?;

    match ramp_band {
        Some(band) if band > 0.0 && slow_ma != 0.0 => {
            let spread = (fast_ma - slow_ma) / slow_ma.abs();
            Some((0.5 + spread / (2.0 * band)).clamp(0.0, 1.0))
        }
        _ => Some(if fast_ma > slow_ma { 1.0 } else { 0.0 }),
    }
}
