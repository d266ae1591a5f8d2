//! Data ingestion port trait.
//!
//! Implementations hand over records already validated against their
//! schemas; the engine only reads them into memory.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::observation::{Categories, FinancialRecord, MacroRecord, OhlcvBar};

pub trait DataPort {
    fn fetch_bars(
        &self,
        asset: &AssetKey,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, SamselectError>;

    fn fetch_financials(
        &self,
        asset: &AssetKey,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<FinancialRecord>, SamselectError>;

    fn fetch_macro(
        &self,
        series: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<MacroRecord>, SamselectError>;

    /// Category labels (board, sector, ...) per asset. Sources without
    /// classifications return none.
    fn fetch_categories(
        &self,
        _assets: &[AssetKey],
    ) -> Result<BTreeMap<AssetKey, Categories>, SamselectError> {
        Ok(BTreeMap::new())
    }

    fn list_assets(&self, market: &str) -> Result<Vec<AssetKey>, SamselectError>;
}
