//! Float market value. Registered ascending so smaller caps rank first.

use crate::domain::asset::AssetKey;
use crate::domain::factor::Factor;
use crate::domain::observation::fields;
use crate::domain::panel::PanelSlice;

#[derive(Debug, Clone, Copy, Default)]
pub struct FloatMarketCap;

impl Factor for FloatMarketCap {
    fn compute(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64> {
        slice.value(asset, fields::FLOAT_MV)
    }
}
