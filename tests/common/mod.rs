#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use samselect::domain::allocation::AllocationVector;
use samselect::domain::asset::AssetKey;
use samselect::domain::error::SamselectError;
pub use samselect::domain::observation::{Categories, FinancialRecord, MacroRecord, OhlcvBar};
use samselect::ports::calendar_port::CalendarPort;
use samselect::ports::data_port::DataPort;
use samselect::ports::execution_port::ExecutionPort;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn key(market: &str, symbol: &str) -> AssetKey {
    AssetKey::new(market, symbol)
}

pub fn cn(symbol: &str) -> AssetKey {
    key("cn", symbol)
}

/// Weekdays in `[start, end]`.
pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut d = start;
    while d <= end {
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            out.push(d);
        }
        d += Duration::days(1);
    }
    out
}

pub fn make_bar(asset: &AssetKey, date: NaiveDate, close: f64, float_mv: f64) -> OhlcvBar {
    OhlcvBar {
        asset: asset.clone(),
        date,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000.0,
        amount: Some(close * 1_000.0),
        adj_factor: 1.0,
        float_mv: Some(float_mv),
    }
}

/// One bar per date with constant close and float value.
pub fn flat_bars(asset: &AssetKey, dates: &[NaiveDate], close: f64, float_mv: f64) -> Vec<OhlcvBar> {
    dates
        .iter()
        .map(|d| make_bar(asset, *d, close, float_mv))
        .collect()
}

pub fn macro_series(series: &str, points: &[(NaiveDate, f64)]) -> Vec<MacroRecord> {
    points
        .iter()
        .map(|(d, v)| MacroRecord {
            series: series.to_string(),
            release_date: *d,
            value: *v,
        })
        .collect()
}

#[derive(Default)]
pub struct MockDataPort {
    pub bars: HashMap<AssetKey, Vec<OhlcvBar>>,
    pub financials: HashMap<AssetKey, Vec<FinancialRecord>>,
    pub macros: HashMap<String, Vec<MacroRecord>>,
    pub categories: BTreeMap<AssetKey, Categories>,
    pub errors: HashMap<AssetKey, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, bars: Vec<OhlcvBar>) -> Self {
        for bar in bars {
            self.bars.entry(bar.asset.clone()).or_default().push(bar);
        }
        self
    }

    pub fn with_financials(mut self, records: Vec<FinancialRecord>) -> Self {
        for record in records {
            self.financials
                .entry(record.asset.clone())
                .or_default()
                .push(record);
        }
        self
    }

    pub fn with_macro(mut self, records: Vec<MacroRecord>) -> Self {
        for record in records {
            self.macros
                .entry(record.series.clone())
                .or_default()
                .push(record);
        }
        self
    }

    pub fn with_category(mut self, asset: &AssetKey, dimension: &str, label: &str) -> Self {
        self.categories
            .entry(asset.clone())
            .or_default()
            .insert(dimension.to_string(), label.to_string());
        self
    }

    pub fn with_error(mut self, asset: &AssetKey, reason: &str) -> Self {
        self.errors.insert(asset.clone(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        asset: &AssetKey,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, SamselectError> {
        if let Some(reason) = self.errors.get(asset) {
            return Err(SamselectError::Source {
                reason: reason.clone(),
            });
        }
        Ok(self
            .bars
            .get(asset)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_financials(
        &self,
        asset: &AssetKey,
        _start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<FinancialRecord>, SamselectError> {
        Ok(self
            .financials
            .get(asset)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.as_of <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_macro(
        &self,
        series: &str,
        _start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<MacroRecord>, SamselectError> {
        Ok(self
            .macros
            .get(series)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.release_date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn fetch_categories(
        &self,
        assets: &[AssetKey],
    ) -> Result<BTreeMap<AssetKey, Categories>, SamselectError> {
        Ok(self
            .categories
            .iter()
            .filter(|(asset, _)| assets.contains(asset))
            .map(|(asset, c)| (asset.clone(), c.clone()))
            .collect())
    }

    fn list_assets(&self, market: &str) -> Result<Vec<AssetKey>, SamselectError> {
        let assets: BTreeSet<AssetKey> = self
            .bars
            .keys()
            .filter(|a| a.market() == market)
            .cloned()
            .collect();
        Ok(assets.into_iter().collect())
    }
}

/// Sessions per market; markets without an explicit list trade on weekdays.
#[derive(Default)]
pub struct MockCalendar {
    pub sessions: HashMap<String, Vec<NaiveDate>>,
}

impl MockCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(mut self, market: &str, sessions: Vec<NaiveDate>) -> Self {
        self.sessions.insert(market.to_string(), sessions);
        self
    }
}

impl CalendarPort for MockCalendar {
    fn sessions(
        &self,
        market: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, SamselectError> {
        Ok(match self.sessions.get(market) {
            Some(sessions) => sessions
                .iter()
                .copied()
                .filter(|d| *d >= start && *d <= end)
                .collect(),
            None => weekdays(start, end),
        })
    }

    fn is_trading_day(&self, market: &str, date: NaiveDate) -> bool {
        match self.sessions.get(market) {
            Some(sessions) => sessions.contains(&date),
            None => !matches!(date.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }
}

/// Execution collaborator that records every submitted vector.
#[derive(Default)]
pub struct RecordingExecution {
    pub submitted: Vec<(NaiveDate, AllocationVector)>,
}

impl RecordingExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.submitted.iter().map(|(d, _)| *d).collect()
    }
}

impl ExecutionPort for RecordingExecution {
    fn submit(&mut self, date: NaiveDate, weights: &AllocationVector) -> Result<(), SamselectError> {
        self.submitted.push((date, weights.clone()));
        Ok(())
    }
}
