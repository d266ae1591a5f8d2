//! Factor research helpers.
//!
//! These look forward in time on purpose and are never used inside the
//! allocation pipeline.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::panel::ObservationPanel;
use crate::domain::stats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BinMethod {
    /// Equal-count buckets from score quantiles.
    #[default]
    Quantile,
    /// Equal-width buckets between the lowest and highest score.
    EqualWidth,
}

/// Forward-return statistics of one score bucket, lowest scores first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Rank correlation of score and return inside the bucket.
    pub ic: Option<f64>,
}

fn paired(
    scores: &BTreeMap<AssetKey, f64>,
    returns: &BTreeMap<AssetKey, f64>,
) -> Vec<(f64, f64)> {
    scores
        .iter()
        .filter_map(|(asset, s)| returns.get(asset).map(|r| (*s, *r)))
        .filter(|(s, r)| s.is_finite() && r.is_finite())
        .collect()
}

fn spearman(pairs: &[(f64, f64)]) -> Option<f64> {
    let x: Vec<f64> = pairs.iter().map(|(s, _)| *s).collect();
    let y: Vec<f64> = pairs.iter().map(|(_, r)| *r).collect();
    stats::pearson(&stats::average_ranks(&x), &stats::average_ranks(&y))
}

/// Spearman rank correlation between scores and forward returns over the
/// assets present in both. `None` with fewer than two pairs or no variance.
pub fn information_coefficient(
    scores: &BTreeMap<AssetKey, f64>,
    forward_returns: &BTreeMap<AssetKey, f64>,
) -> Option<f64> {
    spearman(&paired(scores, forward_returns))
}

pub fn quantile_returns(
    scores: &BTreeMap<AssetKey, f64>,
    forward_returns: &BTreeMap<AssetKey, f64>,
    bins: usize,
) -> Result<Vec<ScoreBin>, SamselectError> {
    factor_binning(scores, forward_returns, bins, BinMethod::Quantile)
}

/// Bucket assets by score and aggregate their forward returns. Duplicate
/// bucket edges collapse, so fewer than `bins` buckets may come back.
pub fn factor_binning(
    scores: &BTreeMap<AssetKey, f64>,
    forward_returns: &BTreeMap<AssetKey, f64>,
    bins: usize,
    method: BinMethod,
) -> Result<Vec<ScoreBin>, SamselectError> {
    if bins == 0 {
        return Err(SamselectError::invalid("analysis", "bins", "bins must be positive"));
    }
    let pairs = paired(scores, forward_returns);
    if pairs.is_empty() {
        return Err(SamselectError::NoData {
            subject: "scores and forward returns do not overlap".to_string(),
        });
    }

    let mut sorted: Vec<f64> = pairs.iter().map(|(s, _)| *s).collect();
    sorted.sort_by(f64::total_cmp);
    let (lo, hi) = (sorted[0], sorted[sorted.len() - 1]);

    let mut edges: Vec<f64> = (0..=bins)
        .filter_map(|k| {
            let q = k as f64 / bins as f64;
            match method {
                BinMethod::Quantile => stats::quantile_sorted(&sorted, q),
                BinMethod::EqualWidth => Some(lo + (hi - lo) * q),
            }
        })
        .collect();
    edges.dedup();
    if edges.len() < 2 {
        edges = vec![lo, hi];
    }

    let mut buckets: Vec<Vec<(f64, f64)>> = vec![Vec::new(); edges.len() - 1];
    for (s, r) in pairs {
        let idx = edges[1..]
            .iter()
            .position(|upper| s <= *upper)
            .unwrap_or(edges.len() - 2);
        buckets[idx].push((s, r));
    }

    Ok(buckets
        .into_iter()
        .enumerate()
        .filter(|(_, members)| !members.is_empty())
        .filter_map(|(i, members)| {
            let returns: Vec<f64> = members.iter().map(|(_, r)| *r).collect();
            Some(ScoreBin {
                lower: edges[i],
                upper: edges[i + 1],
                count: members.len(),
                mean: stats::mean(&returns)?,
                median: stats::median(&returns)?,
                ic: spearman(&members),
            })
        })
        .collect())
}

/// Return of `field` from `date` to `horizon` sessions later, for every
/// asset with a non-zero value on both dates.
pub fn forward_returns(
    panel: &ObservationPanel,
    field: &str,
    date: NaiveDate,
    horizon: usize,
) -> Result<BTreeMap<AssetKey, f64>, SamselectError> {
    let start = panel
        .index_of(date)
        .ok_or_else(|| SamselectError::DataAvailability {
            date,
            reason: "date is not on the panel calendar".to_string(),
        })?;
    let end_date = panel
        .dates()
        .get(start + horizon)
        .copied()
        .ok_or_else(|| SamselectError::DataAvailability {
            date,
            reason: format!("no session {} sessions ahead", horizon),
        })?;

    let (Some(now), Some(later)) = (panel.snapshot(date), panel.snapshot(end_date)) else {
        return Ok(BTreeMap::new());
    };
    Ok(now
        .assets()
        .filter_map(|asset| {
            let v0 = now.get(asset, field)?.value;
            let v1 = later.get(asset, field)?.value;
            (v0 != 0.0).then(|| (asset.clone(), v1 / v0 - 1.0))
        })
        .collect())
}
