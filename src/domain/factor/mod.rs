//! Factor capability and definitions.
//!
//! Any type implementing [`Factor`] can be registered: a single pure method
//! from a panel slice and an asset to a score, or `None` when the inputs it
//! needs are absent. The slice already spans the factor's lookback window, so
//! a factor never sees data outside `[date - lookback, date]`.

pub mod field_value;
pub mod market_cap;
pub mod momentum;
pub mod turnover;
pub mod volatility;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::domain::asset::AssetKey;
use crate::domain::error::ParseError;
use crate::domain::panel::PanelSlice;

pub use field_value::FieldValue;
pub use market_cap::FloatMarketCap;
pub use momentum::Momentum;
pub use turnover::AverageTurnover;
pub use volatility::{LowVolatility, Volatility};

pub trait Factor: Send + Sync {
    fn compute(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64>;
}

/// Adapts a plain function or closure to [`Factor`].
pub struct FnFactor<F>(pub F);

impl<F> Factor for FnFactor<F>
where
    F: Fn(&PanelSlice<'_>, &AssetKey) -> Option<f64> + Send + Sync,
{
    fn compute(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64> {
        (self.0)(slice, asset)
    }
}

/// Which end of a factor's range is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Smaller values rank first.
    Ascending,
    /// Larger values rank first.
    Descending,
}

impl Direction {
    /// Map a value so that larger always means better.
    pub fn orient(self, value: f64) -> f64 {
        match self {
            Direction::Ascending => -value,
            Direction::Descending => value,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Ascending => write!(f, "asc"),
            Direction::Descending => write!(f, "desc"),
        }
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Ascending),
            "desc" | "descending" => Ok(Direction::Descending),
            other => Err(ParseError {
                message: format!("expected direction (asc, desc), found '{}'", other),
                position: 0,
            }),
        }
    }
}

#[derive(Clone)]
pub struct FactorDefinition {
    pub name: String,
    pub version: u32,
    pub direction: Direction,
    pub lookback: Option<usize>,
    computation: Arc<dyn Factor>,
}

impl FactorDefinition {
    pub fn new(name: &str, computation: impl Factor + 'static, direction: Direction) -> Self {
        Self {
            name: name.to_string(),
            version: 1,
            direction,
            lookback: None,
            computation: Arc::new(computation),
        }
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = Some(lookback);
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Non-finite results are reported as unavailable.
    pub fn evaluate(&self, slice: &PanelSlice<'_>, asset: &AssetKey) -> Option<f64> {
        self.computation
            .compute(slice, asset)
            .filter(|v| v.is_finite())
    }
}

impl fmt::Debug for FactorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactorDefinition")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("direction", &self.direction)
            .field("lookback", &self.lookback)
            .finish_non_exhaustive()
    }
}
