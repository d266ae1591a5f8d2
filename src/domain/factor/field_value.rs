//! Raw panel field exposed as a factor.

use crate::domain::asset::AssetKey;
use crate::domain::factor::Factor;
use crate::domain::panel::PanelSlice;

#[derive(Debug, Clone)]
pub struct FieldValue {
    field: String,
}

impl FieldValue {
    pub fn new(field: &str) -> Self {
        Self {
            field: field.to_string(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl Factor for FieldValue {
    fn compute(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64> {
        slice.value(asset, &self.field)
    }
}
