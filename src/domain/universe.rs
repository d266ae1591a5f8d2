//! Universe loading.
//!
//! Parses asset lists from configuration and pulls each asset's raw records
//! through the data port, skipping assets without enough history.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::domain::asset::AssetKey;
use crate::domain::error::{ParseError, SamselectError};
use crate::domain::observation::RawSources;
use crate::ports::data_port::DataPort;

pub const MIN_BARS: usize = 30;

/// Source names attached to observations loaded through a [`DataPort`].
pub const BAR_SOURCE: &str = "bars";
pub const FINANCIAL_SOURCE: &str = "financials";
pub const MACRO_SOURCE: &str = "macro";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(AssetKey),

    #[error(transparent)]
    InvalidAsset(#[from] ParseError),
}

/// Parse `market:symbol, market:symbol, ...`.
pub fn parse_assets(input: &str) -> Result<Vec<AssetKey>, UniverseError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let asset: AssetKey = trimmed.parse()?;
        if !seen.insert(asset.clone()) {
            return Err(UniverseError::DuplicateAsset(asset));
        }
        assets.push(asset);
    }

    Ok(assets)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAsset {
    pub asset: AssetKey,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct LoadedUniverse {
    pub sources: RawSources,
    pub assets: Vec<AssetKey>,
    pub skipped: Vec<SkippedAsset>,
}

/// Load bars, financials and categories of `assets` plus the listed macro
/// series. Assets with no bars or fewer than `min_bars` are skipped; if
/// every asset is skipped the load fails.
pub fn load_universe(
    port: &dyn DataPort,
    assets: &[AssetKey],
    macro_series: &[&str],
    start_date: NaiveDate,
    end_date: NaiveDate,
    min_bars: usize,
) -> Result<LoadedUniverse, SamselectError> {
    let mut sources = RawSources::new();
    let mut kept = Vec::new();
    let mut skipped = Vec::new();

    for asset in assets {
        let bars = match port.fetch_bars(asset, start_date, end_date) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(%asset, error = %e, "skipping asset");
                skipped.push(SkippedAsset {
                    asset: asset.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if bars.is_empty() {
            warn!(%asset, "skipping asset (no data found)");
            skipped.push(SkippedAsset {
                asset: asset.clone(),
                reason: SkipReason::NoData,
            });
            continue;
        }

        if bars.len() < min_bars {
            warn!(%asset, bars = bars.len(), minimum = min_bars, "skipping asset (insufficient bars)");
            skipped.push(SkippedAsset {
                asset: asset.clone(),
                reason: SkipReason::InsufficientBars { bars: bars.len() },
            });
            continue;
        }

        sources.add_bars(BAR_SOURCE, &bars);
        let financials = port.fetch_financials(asset, start_date, end_date)?;
        sources.add_financials(FINANCIAL_SOURCE, &financials)?;
        kept.push(asset.clone());
    }

    if kept.is_empty() {
        return Err(SamselectError::NoData {
            subject: "universe".to_string(),
        });
    }

    for (asset, categories) in port.fetch_categories(&kept)? {
        if kept.contains(&asset) {
            sources.set_categories(asset, categories);
        }
    }

    for series in macro_series {
        let records = port.fetch_macro(series, start_date, end_date)?;
        if records.is_empty() {
            return Err(SamselectError::UnknownSource {
                reference: format!("macro:{}", series),
            });
        }
        sources.add_macro(MACRO_SOURCE, &records);
    }

    info!(
        loaded = kept.len(),
        requested = assets.len(),
        macro_series = macro_series.len(),
        "loaded universe"
    );

    Ok(LoadedUniverse {
        sources,
        assets: kept,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_assets_basic() {
        let result = parse_assets("cn:600000, us:aapl").unwrap();
        assert_eq!(
            result,
            vec![AssetKey::new("cn", "600000"), AssetKey::new("us", "AAPL")]
        );
    }

    #[test]
    fn parse_assets_empty_token() {
        assert!(matches!(
            parse_assets("cn:600000,,cn:000001"),
            Err(UniverseError::EmptyToken)
        ));
    }

    #[test]
    fn parse_assets_duplicate_after_normalising() {
        let result = parse_assets("cn:sh600000, CN:SH600000");
        assert!(matches!(
            result,
            Err(UniverseError::DuplicateAsset(a)) if a == AssetKey::new("cn", "SH600000")
        ));
    }

    #[test]
    fn parse_assets_missing_market() {
        assert!(matches!(
            parse_assets("600000"),
            Err(UniverseError::InvalidAsset(_))
        ));
    }
}
