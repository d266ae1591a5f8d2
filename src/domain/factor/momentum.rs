//! Price momentum.
//!
//! MOM(L) = close[t] / close[t-L] - 1
//!
//! Unavailable when the window is truncated by the start of the panel or
//! either endpoint is missing.

use crate::domain::asset::AssetKey;
use crate::domain::factor::Factor;
use crate::domain::observation::fields;
use crate::domain::panel::PanelSlice;

pub const DEFAULT_MOMENTUM_LOOKBACK: usize = 60;

#[derive(Debug, Clone, Copy, Default)]
pub struct Momentum;

impl Factor for Momentum {
    fn compute(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64> {
        if !slice.is_complete() || slice.lookback().unwrap_or(0) == 0 {
            return None;
        }
        let history = slice.history(asset, fields::CLOSE);
        let first = (*history.first()?)?;
        let last = (*history.last()?)?;
        if first == 0.0 {
            return None;
        }
        Some(last / first - 1.0)
    }
}
