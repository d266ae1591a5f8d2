//! Return volatility.
//!
//! Sample standard deviation of close-to-close returns over the lookback
//! window. `LowVolatility` is its inverse, so calmer assets score higher.

use crate::domain::asset::AssetKey;
use crate::domain::factor::Factor;
use crate::domain::observation::fields;
use crate::domain::panel::PanelSlice;
use crate::domain::stats::{sample_stddev, simple_returns};

pub const DEFAULT_VOLATILITY_LOOKBACK: usize = 30;

#[derive(Debug, Clone, Copy, Default)]
pub struct Volatility;

impl Factor for Volatility {
    fn compute(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64> {
        if !slice.is_complete() {
            return None;
        }
        let returns = simple_returns(&slice.history(asset, fields::CLOSE));
        sample_stddev(&returns)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LowVolatility;

impl Factor for LowVolatility {
    fn compute(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64> {
        Volatility
            .compute(slice, asset)
            .map(|vol| 1.0 / (vol + 1e-9))
    }
}
