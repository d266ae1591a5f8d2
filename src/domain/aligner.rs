//! Panel aligner.
//!
//! Merges raw observations from every source onto one ordered calendar.
//! A value is attached to calendar date `d` only if its timestamp is `<= d`.
//! Price series are carried forward for at most `price_fill_limit` sessions;
//! financial and macro series are carried forward until superseded (or until
//! they exceed `stale_after_days`). Absent stays absent, never zero.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::domain::error::SamselectError;
use crate::domain::observation::{RawSources, SourceKind, Subject};
use crate::domain::panel::{ObservationPanel, Snapshot};

#[derive(Debug, Clone, PartialEq)]
pub struct AlignerConfig {
    /// Sessions a price value may be carried past the session it first
    /// became visible on. 0 means prices only appear on their own session.
    pub price_fill_limit: usize,
    /// Maximum age in days of a forward-filled financial or macro value.
    pub stale_after_days: Option<i64>,
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            price_fill_limit: 0,
            stale_after_days: None,
        }
    }
}

struct SeriesPoints<'a> {
    kind: SourceKind,
    points: BTreeMap<NaiveDate, (f64, &'a str)>,
}

/// Sorted, de-duplicated calendar.
pub fn build_unified_calendar(dates: &[NaiveDate]) -> Vec<NaiveDate> {
    let unique: BTreeSet<NaiveDate> = dates.iter().copied().collect();
    unique.into_iter().collect()
}

pub struct PanelAligner {
    config: AlignerConfig,
}

impl PanelAligner {
    pub fn new(config: AlignerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlignerConfig {
        &self.config
    }

    pub fn align(
        &self,
        raw: &RawSources,
        calendar: &[NaiveDate],
    ) -> Result<ObservationPanel, SamselectError> {
        let calendar = build_unified_calendar(calendar);
        let series = group_series(raw)?;

        let mut snapshots: Vec<Snapshot> = vec![Snapshot::default(); calendar.len()];
        for ((subject, field), series) in &series {
            self.fill_series(subject, field, series, &calendar, &mut snapshots);
        }

        info!(
            dates = calendar.len(),
            series = series.len(),
            "aligned observation panel"
        );

        ObservationPanel::from_snapshots(
            calendar.into_iter().zip(snapshots).collect(),
            raw.categories().clone(),
        )
    }

    fn fill_series(
        &self,
        subject: &Subject,
        field: &str,
        series: &SeriesPoints<'_>,
        calendar: &[NaiveDate],
        snapshots: &mut [Snapshot],
    ) {
        let points: Vec<(NaiveDate, f64)> =
            series.points.iter().map(|(d, (v, _))| (*d, *v)).collect();
        let mut cursor = 0;
        let mut attached = 0usize;

        for (i, &date) in calendar.iter().enumerate() {
            while cursor < points.len() && points[cursor].0 <= date {
                cursor += 1;
            }
            if cursor == 0 {
                continue;
            }
            let (observed, value) = points[cursor - 1];
            if !self.is_fresh(series.kind, observed, i, date, calendar) {
                continue;
            }
            match subject {
                Subject::Asset(asset) => {
                    snapshots[i].set_asset_value(asset.clone(), field, value, observed)
                }
                Subject::Macro => snapshots[i].set_macro_value(field, value, observed),
            }
            attached += 1;
        }

        debug!(%subject, field, points = points.len(), attached, "aligned series");
    }

    fn is_fresh(
        &self,
        kind: SourceKind,
        observed: NaiveDate,
        index: usize,
        date: NaiveDate,
        calendar: &[NaiveDate],
    ) -> bool {
        match kind {
            SourceKind::Price => {
                let first_visible = calendar.partition_point(|c| *c < observed);
                index - first_visible <= self.config.price_fill_limit
            }
            SourceKind::Financial | SourceKind::Macro => match self.config.stale_after_days {
                Some(limit) => (date - observed).num_days() <= limit,
                None => true,
            },
        }
    }
}

fn group_series(
    raw: &RawSources,
) -> Result<BTreeMap<(Subject, String), SeriesPoints<'_>>, SamselectError> {
    let mut series: BTreeMap<(Subject, String), SeriesPoints<'_>> = BTreeMap::new();

    for obs in raw.observations() {
        let entry = series
            .entry((obs.subject.clone(), obs.field.clone()))
            .or_insert_with(|| SeriesPoints {
                kind: obs.kind,
                points: BTreeMap::new(),
            });
        // The longest-lived fill policy wins so grouping does not depend on input order.
        entry.kind = entry.kind.max(obs.kind);

        if let Some((_, existing)) = entry.points.get(&obs.timestamp) {
            let (first, second) = if *existing <= obs.source.as_str() {
                (existing.to_string(), obs.source.clone())
            } else {
                (obs.source.clone(), existing.to_string())
            };
            return Err(SamselectError::ConflictingObservation {
                subject: obs.subject.to_string(),
                field: obs.field.clone(),
                timestamp: obs.timestamp,
                first,
                second,
            });
        }
        entry
            .points
            .insert(obs.timestamp, (obs.value, obs.source.as_str()));
    }

    Ok(series)
}
