//! Raw source records and the observation stream fed to the panel aligner.
//!
//! Ingestion hands over three record shapes (daily bars, financial statement
//! fields, macro releases). Each is flattened into `Observation`s tagged with
//! the originating source so the aligner can report conflicts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;

/// Field names produced from daily bars.
pub mod fields {
    pub const OPEN: &str = "open";
    pub const HIGH: &str = "high";
    pub const LOW: &str = "low";
    pub const CLOSE: &str = "close";
    pub const VOLUME: &str = "volume";
    pub const AMOUNT: &str = "amount";
    pub const ADJ_CLOSE: &str = "adj_close";
    pub const FLOAT_MV: &str = "float_mv";
}

#[derive(Debug, Clone)]
pub struct OhlcvBar {
    pub asset: AssetKey,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub amount: Option<f64>,
    pub adj_factor: f64,
    pub float_mv: Option<f64>,
}

impl OhlcvBar {
    /// close × adjustment factor
    pub fn adjusted_close(&self) -> f64 {
        self.close * self.adj_factor
    }

    fn fields(&self) -> Vec<(&'static str, f64)> {
        let mut out = vec![
            (fields::OPEN, self.open),
            (fields::HIGH, self.high),
            (fields::LOW, self.low),
            (fields::CLOSE, self.close),
            (fields::VOLUME, self.volume),
            (fields::ADJ_CLOSE, self.adjusted_close()),
        ];
        if let Some(amount) = self.amount {
            out.push((fields::AMOUNT, amount));
        }
        if let Some(float_mv) = self.float_mv {
            out.push((fields::FLOAT_MV, float_mv));
        }
        out
    }
}

/// A single financial statement field, known from `as_of` onwards.
#[derive(Debug, Clone)]
pub struct FinancialRecord {
    pub asset: AssetKey,
    pub report_date: NaiveDate,
    pub as_of: NaiveDate,
    pub field: String,
    pub value: f64,
}

/// A macro series release, broadcast to every asset.
#[derive(Debug, Clone)]
pub struct MacroRecord {
    pub series: String,
    pub release_date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Subject {
    Asset(AssetKey),
    Macro,
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Asset(key) => write!(f, "{}", key),
            Subject::Macro => write!(f, "macro"),
        }
    }
}

/// Source frequency class; decides the forward-fill policy in the aligner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    Price,
    Financial,
    Macro,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub subject: Subject,
    pub timestamp: NaiveDate,
    pub field: String,
    pub value: f64,
    pub kind: SourceKind,
    pub source: String,
}

/// Pre-loaded raw inputs for one run.
#[derive(Debug, Clone, Default)]
pub struct RawSources {
    observations: Vec<Observation>,
    categories: BTreeMap<AssetKey, Categories>,
}

/// Category labels of one asset keyed by dimension, e.g. `board -> ST`.
pub type Categories = BTreeMap<String, String>;

impl RawSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bars(&mut self, source: &str, bars: &[OhlcvBar]) {
        for bar in bars {
            for (field, value) in bar.fields() {
                self.add_observation(Observation {
                    subject: Subject::Asset(bar.asset.clone()),
                    timestamp: bar.date,
                    field: field.to_string(),
                    value,
                    kind: SourceKind::Price,
                    source: source.to_string(),
                });
            }
        }
    }

    /// Financial records are stamped with their as-of date. A record claiming
    /// to be known before its reporting period ended is rejected.
    pub fn add_financials(
        &mut self,
        source: &str,
        records: &[FinancialRecord],
    ) -> Result<(), SamselectError> {
        for record in records {
            if record.as_of < record.report_date {
                return Err(SamselectError::LookaheadViolation {
                    subject: record.asset.to_string(),
                    field: record.field.clone(),
                    observed: record.report_date,
                    as_of: record.as_of,
                });
            }
            self.add_observation(Observation {
                subject: Subject::Asset(record.asset.clone()),
                timestamp: record.as_of,
                field: record.field.clone(),
                value: record.value,
                kind: SourceKind::Financial,
                source: source.to_string(),
            });
        }
        Ok(())
    }

    pub fn add_macro(&mut self, source: &str, records: &[MacroRecord]) {
        for record in records {
            self.add_observation(Observation {
                subject: Subject::Macro,
                timestamp: record.release_date,
                field: record.series.clone(),
                value: record.value,
                kind: SourceKind::Macro,
                source: source.to_string(),
            });
        }
    }

    /// Non-finite values are dropped: the field stays absent for that
    /// timestamp rather than entering rankings as a number.
    pub fn add_observation(&mut self, observation: Observation) {
        if !observation.value.is_finite() {
            debug!(
                subject = %observation.subject,
                field = %observation.field,
                timestamp = %observation.timestamp,
                source = %observation.source,
                "dropping non-finite observation"
            );
            return;
        }
        self.observations.push(observation);
    }

    pub fn set_categories(&mut self, asset: AssetKey, categories: Categories) {
        self.categories.insert(asset, categories);
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn categories(&self) -> &BTreeMap<AssetKey, Categories> {
        &self.categories
    }

    pub fn assets(&self) -> BTreeSet<AssetKey> {
        self.observations
            .iter()
            .filter_map(|o| match &o.subject {
                Subject::Asset(key) => Some(key.clone()),
                Subject::Macro => None,
            })
            .chain(self.categories.keys().cloned())
            .collect()
    }

    /// Date-ordered values of one subject/field. Later duplicates of the same
    /// timestamp are left for the aligner to report.
    pub fn series(&self, subject: &Subject, field: &str) -> Vec<(NaiveDate, f64)> {
        let mut points: Vec<(NaiveDate, f64)> = self
            .observations
            .iter()
            .filter(|o| &o.subject == subject && o.field == field)
            .map(|o| (o.timestamp, o.value))
            .collect();
        points.sort_by_key(|(date, _)| *date);
        points
    }

    pub fn has_series(&self, subject: &Subject, field: &str) -> bool {
        self.observations
            .iter()
            .any(|o| &o.subject == subject && o.field == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn bar(symbol: &str, day: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            asset: AssetKey::new("cn", symbol),
            date: date(2024, 1, day),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
            amount: Some(close * 1000.0),
            adj_factor: 2.0,
            float_mv: None,
        }
    }

    #[test]
    fn bars_expand_to_price_fields() {
        let mut raw = RawSources::new();
        raw.add_bars("daily_bar", &[bar("600000", 2, 10.0)]);
        let fields: BTreeSet<&str> = raw.observations().iter().map(|o| o.field.as_str()).collect();
        assert!(fields.contains("close"));
        assert!(fields.contains("adj_close"));
        assert!(fields.contains("amount"));
        assert!(!fields.contains("float_mv"));
        assert!(raw.observations().iter().all(|o| o.kind == SourceKind::Price));
    }

    #[test]
    fn adjusted_close_applies_factor() {
        assert!((bar("600000", 2, 10.0).adjusted_close() - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn financial_stamped_with_as_of() {
        let mut raw = RawSources::new();
        raw.add_financials(
            "financial",
            &[FinancialRecord {
                asset: AssetKey::new("cn", "600000"),
                report_date: date(2023, 12, 31),
                as_of: date(2024, 3, 28),
                field: "roe".into(),
                value: 0.12,
            }],
        )
        .unwrap();
        assert_eq!(raw.observations()[0].timestamp, date(2024, 3, 28));
        assert_eq!(raw.observations()[0].kind, SourceKind::Financial);
    }

    #[test]
    fn financial_known_before_period_end_is_rejected() {
        let mut raw = RawSources::new();
        let err = raw
            .add_financials(
                "financial",
                &[FinancialRecord {
                    asset: AssetKey::new("cn", "600000"),
                    report_date: date(2024, 3, 31),
                    as_of: date(2024, 3, 1),
                    field: "roe".into(),
                    value: 0.12,
                }],
            )
            .unwrap_err();
        assert!(matches!(err, SamselectError::LookaheadViolation { .. }));
    }

    #[test]
    fn non_finite_values_are_dropped() {
        let mut broken = bar("600000", 2, f64::NAN);
        broken.float_mv = Some(f64::INFINITY);
        broken.volume = 500.0;
        let mut raw = RawSources::new();
        raw.add_bars("daily_bar", &[broken]);
        raw.add_macro(
            "macro",
            &[MacroRecord {
                series: "PMI".into(),
                release_date: date(2024, 1, 2),
                value: f64::NAN,
            }],
        );

        assert!(raw.observations().iter().all(|o| o.value.is_finite()));
        let key = Subject::Asset(AssetKey::new("cn", "600000"));
        assert!(!raw.has_series(&key, "close"));
        assert!(!raw.has_series(&key, "float_mv"));
        assert!(raw.has_series(&key, "volume"));
        assert!(!raw.has_series(&Subject::Macro, "PMI"));
    }

    #[test]
    fn series_sorted_by_date() {
        let mut raw = RawSources::new();
        raw.add_bars("daily_bar", &[bar("600000", 5, 12.0), bar("600000", 2, 10.0)]);
        let series = raw.series(&Subject::Asset(AssetKey::new("cn", "600000")), "close");
        assert_eq!(series, vec![(date(2024, 1, 2), 10.0), (date(2024, 1, 5), 12.0)]);
    }

    #[test]
    fn macro_records_use_macro_subject() {
        let mut raw = RawSources::new();
        raw.add_macro(
            "macro",
            &[MacroRecord {
                series: "CPI".into(),
                release_date: date(2024, 1, 10),
                value: 0.3,
            }],
        );
        assert!(raw.has_series(&Subject::Macro, "CPI"));
        assert!(raw.assets().is_empty());
    }
}
