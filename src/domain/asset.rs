//! Asset identity.
//!
//! An `AssetKey` is the (market, symbol) pair. Ordering is lexical on market
//! then symbol and is the tie-break used everywhere a ranking needs one.

use std::fmt;
use std::str::FromStr;

use crate::domain::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AssetKey {
    market: String,
    symbol: String,
}

impl AssetKey {
    /// Market codes are lower-cased and symbols upper-cased so that
    /// `cn:sh600000` and `CN:SH600000` name the same asset.
    pub fn new(market: &str, symbol: &str) -> Self {
        Self {
            market: market.trim().to_lowercase(),
            symbol: symbol.trim().to_uppercase(),
        }
    }

    pub fn market(&self) -> &str {
        &self.market
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.market, self.symbol)
    }
}

impl FromStr for AssetKey {
    type Err = ParseError;

    /// Parses `market:symbol`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (market, symbol) = trimmed.split_once(':').ok_or_else(|| ParseError {
            message: format!("expected market:symbol, found '{}'", trimmed),
            position: 0,
        })?;
        if market.trim().is_empty() {
            return Err(ParseError {
                message: "empty market code".to_string(),
                position: 0,
            });
        }
        if symbol.trim().is_empty() {
            return Err(ParseError {
                message: "empty symbol".to_string(),
                position: market.len() + 1,
            });
        }
        Ok(AssetKey::new(market, symbol))
    }
}
