//! Trend-slope exposure: `0.5 + scale × slope` of a least-squares line over
//! the trailing window, clipped to [0, 1].

use crate::domain::stats;

pub fn slope_exposure(values: &[f64], window: usize, scale: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let start = values.len().saturating_sub(window.max(2));
    match stats::linear_slope(&values[start..]) {
        Some(slope) if slope.is_finite() => Some((0.5 + scale * slope).clamp(0.0, 1.0)),
        // Not enough points to fit a line.
        _ => Some(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_series_half_exposed() {
        assert_relative_eq!(slope_exposure(&[3.0; 10], 60, 1.0).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn slope_scaled_and_clipped() {
        let values = [1.0, 1.1, 1.2, 1.3];
        assert_relative_eq!(slope_exposure(&values, 60, 1.0).unwrap(), 0.6, epsilon = 1e-12);
        assert_relative_eq!(slope_exposure(&values, 60, 10.0).unwrap(), 1.0, epsilon = 1e-12);
        let falling = [4.0, 3.0, 2.0];
        assert_relative_eq!(slope_exposure(&falling, 60, 1.0).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn window_uses_trailing_values() {
        // earlier crash is outside the window
        let values = [100.0, 1.0, 1.0, 1.0];
        assert_relative_eq!(slope_exposure(&values, 3, 1.0).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn single_point_is_flat() {
        assert_eq!(slope_exposure(&[5.0], 60, 1.0), Some(0.0));
        assert_eq!(slope_exposure(&[], 60, 1.0), None);
    }
}
