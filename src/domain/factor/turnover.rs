//! Average traded amount over the lookback window.

use crate::domain::asset::AssetKey;
use crate::domain::factor::Factor;
use crate::domain::observation::fields;
use crate::domain::panel::PanelSlice;
use crate::domain::stats::mean;

pub const DEFAULT_TURNOVER_LOOKBACK: usize = 20;

#[derive(Debug, Clone, Copy, Default)]
pub struct AverageTurnover;

impl Factor for AverageTurnover {
    fn compute(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64> {
        let amounts: Vec<f64> = slice
            .history(asset, fields::AMOUNT)
            .into_iter()
            .flatten()
            .collect();
        mean(&amounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::factor::test_support::*;
    use approx::assert_relative_eq;

    #[test]
    fn averages_present_amounts() {
        let panel = single_field_panel("amount", &[Some(100.0), None, Some(300.0)]);
        let slice = panel.slice(day(2), Some(2)).unwrap();
        assert_relative_eq!(AverageTurnover.compute(&slice, &asset()).unwrap(), 200.0, epsilon = 1e-12);
    }

    #[test]
    fn no_amounts_is_unavailable() {
        let panel = single_field_panel("close", &[Some(1.0)]);
        let slice = panel.slice(day(0), None).unwrap();
        assert!(AverageTurnover.compute(&slice, &asset()).is_none());
    }
}
