//! Point-in-time observation panel.
//!
//! The panel is indexed by calendar date. Each date carries a snapshot of
//! per-asset fields plus macro fields visible to every asset. Every stored
//! value remembers the timestamp it was observed at, so any snapshot can be
//! checked for lookahead: `observed <= date` must hold for every value.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::observation::Categories;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanelValue {
    pub value: f64,
    pub observed: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    assets: BTreeMap<AssetKey, BTreeMap<String, PanelValue>>,
    macro_fields: BTreeMap<String, PanelValue>,
}

impl Snapshot {
    /// Non-finite values are not stored; the field stays absent.
    pub fn set_asset_value(
        &mut self,
        asset: AssetKey,
        field: &str,
        value: f64,
        observed: NaiveDate,
    ) {
        if !value.is_finite() {
            return;
        }
        self.assets
            .entry(asset)
            .or_default()
            .insert(field.to_string(), PanelValue { value, observed });
    }

    pub fn set_macro_value(&mut self, series: &str, value: f64, observed: NaiveDate) {
        if !value.is_finite() {
            return;
        }
        self.macro_fields
            .insert(series.to_string(), PanelValue { value, observed });
    }

    /// Asset fields shadow macro fields of the same name.
    pub fn get(&self, asset: &AssetKey, field: &str) -> Option<&PanelValue> {
        self.assets
            .get(asset)
            .and_then(|fields| fields.get(field))
            .or_else(|| self.macro_fields.get(field))
    }

    pub fn asset_fields(&self, asset: &AssetKey) -> Option<&BTreeMap<String, PanelValue>> {
        self.assets.get(asset)
    }

    pub fn macro_fields(&self) -> &BTreeMap<String, PanelValue> {
        &self.macro_fields
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetKey> {
        self.assets.keys()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    fn check(&self, date: NaiveDate) -> Result<(), SamselectError> {
        for (asset, fields) in &self.assets {
            for (field, pv) in fields {
                if pv.observed > date {
                    return Err(SamselectError::LookaheadViolation {
                        subject: asset.to_string(),
                        field: field.clone(),
                        observed: pv.observed,
                        as_of: date,
                    });
                }
            }
        }
        for (field, pv) in &self.macro_fields {
            if pv.observed > date {
                return Err(SamselectError::LookaheadViolation {
                    subject: "macro".to_string(),
                    field: field.clone(),
                    observed: pv.observed,
                    as_of: date,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservationPanel {
    dates: Vec<NaiveDate>,
    snapshots: Vec<Snapshot>,
    categories: BTreeMap<AssetKey, Categories>,
}

impl ObservationPanel {
    /// Build a panel from pre-assembled snapshots. Dates must be strictly
    /// increasing and every value must be observed on or before its date.
    pub fn from_snapshots(
        snapshots: Vec<(NaiveDate, Snapshot)>,
        categories: BTreeMap<AssetKey, Categories>,
    ) -> Result<Self, SamselectError> {
        let mut dates = Vec::with_capacity(snapshots.len());
        let mut snaps = Vec::with_capacity(snapshots.len());
        for (date, snapshot) in snapshots {
            if let Some(prev) = dates.last() {
                if *prev >= date {
                    return Err(SamselectError::invalid(
                        "panel",
                        "dates",
                        format!("dates must be strictly increasing ({} then {})", prev, date),
                    ));
                }
            }
            snapshot.check(date)?;
            dates.push(date);
            snaps.push(snapshot);
        }
        Ok(Self {
            dates,
            snapshots: snaps,
            categories,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn snapshot(&self, date: NaiveDate) -> Option<&Snapshot> {
        self.index_of(date).map(|i| &self.snapshots[i])
    }

    pub fn categories(&self, asset: &AssetKey) -> Option<&Categories> {
        self.categories.get(asset)
    }

    /// Label of `asset` in one category dimension. The `market` dimension is
    /// always available from the asset key itself.
    pub fn category<'s>(&'s self, asset: &'s AssetKey, dimension: &str) -> Option<&'s str> {
        if let Some(label) = self.categories.get(asset).and_then(|c| c.get(dimension)) {
            return Some(label.as_str());
        }
        if dimension == "market" {
            return Some(asset.market());
        }
        None
    }

    /// Re-check one date's snapshot for values observed after the date.
    pub fn verify_date(&self, date: NaiveDate) -> Result<(), SamselectError> {
        match self.index_of(date) {
            Some(i) => self.snapshots[i].check(date),
            None => Ok(()),
        }
    }

    pub fn verify_point_in_time(&self) -> Result<(), SamselectError> {
        self.dates
            .iter()
            .zip(&self.snapshots)
            .try_for_each(|(date, snapshot)| snapshot.check(*date))
    }

    /// View of the panel ending at `date`, spanning `lookback + 1` sessions
    /// (or only `date` itself when no lookback is given).
    pub fn slice(&self, date: NaiveDate, lookback: Option<usize>) -> Option<PanelSlice<'_>> {
        let end = self.index_of(date)?;
        let span = lookback.unwrap_or(0);
        let truncated = span > end;
        let start = end.saturating_sub(span);
        Some(PanelSlice {
            panel: self,
            start,
            end,
            lookback,
            truncated,
        })
    }
}

/// Read-only window of the panel handed to factor computations. Nothing after
/// the window's final date is reachable through it.
#[derive(Debug, Clone, Copy)]
pub struct PanelSlice<'a> {
    panel: &'a ObservationPanel,
    start: usize,
    end: usize,
    lookback: Option<usize>,
    truncated: bool,
}

impl<'a> PanelSlice<'a> {
    pub fn date(&self) -> NaiveDate {
        self.panel.dates[self.end]
    }

    pub fn dates(&self) -> &'a [NaiveDate] {
        &self.panel.dates[self.start..=self.end]
    }

    pub fn lookback(&self) -> Option<usize> {
        self.lookback
    }

    /// False when the panel starts inside the requested lookback window.
    pub fn is_complete(&self) -> bool {
        !self.truncated
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        &self.panel.snapshots[self.end]
    }

    pub fn value(&self, asset: &AssetKey, field: &str) -> Option<f64> {
        self.snapshot().get(asset, field).map(|pv| pv.value)
    }

    /// Values of one field over the window, oldest first, `None` where absent.
    pub fn history(&self, asset: &AssetKey, field: &str) -> Vec<Option<f64>> {
        self.panel.snapshots[self.start..=self.end]
            .iter()
            .map(|s| s.get(asset, field).map(|pv| pv.value))
            .collect()
    }

    pub fn assets(&self) -> impl Iterator<Item = &'a AssetKey> {
        self.snapshot().assets()
    }

    pub fn categories(&self, asset: &AssetKey) -> Option<&'a Categories> {
        self.panel.categories(asset)
    }

    pub fn category<'b>(&self, asset: &'b AssetKey, dimension: &str) -> Option<&'b str>
    where
        'a: 'b,
    {
        self.panel.category(asset, dimension)
    }
}
