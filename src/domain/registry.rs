//! Factor registry.
//!
//! Name-keyed store of factor definitions. Names are unique; registering a
//! second definition under an existing name fails. The registry is built
//! once, then shared read-only (behind an `Arc`) for evaluation.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::factor::momentum::DEFAULT_MOMENTUM_LOOKBACK;
use crate::domain::factor::turnover::DEFAULT_TURNOVER_LOOKBACK;
use crate::domain::factor::volatility::DEFAULT_VOLATILITY_LOOKBACK;
use crate::domain::factor::{
    AverageTurnover, Direction, FactorDefinition, FloatMarketCap, FnFactor, LowVolatility,
    Momentum, Volatility,
};
use crate::domain::panel::PanelSlice;

#[derive(Debug, Clone, Default)]
pub struct FactorRegistry {
    factors: BTreeMap<String, FactorDefinition>,
}

impl FactorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in price and size factors.
    pub fn with_builtins() -> Self {
        let builtins = [
            FactorDefinition::new("Momentum", Momentum, Direction::Descending)
                .with_lookback(DEFAULT_MOMENTUM_LOOKBACK),
            FactorDefinition::new("AverageTurnover", AverageTurnover, Direction::Descending)
                .with_lookback(DEFAULT_TURNOVER_LOOKBACK),
            FactorDefinition::new("Volatility", Volatility, Direction::Ascending)
                .with_lookback(DEFAULT_VOLATILITY_LOOKBACK),
            FactorDefinition::new("LowVolatility", LowVolatility, Direction::Descending)
                .with_lookback(DEFAULT_VOLATILITY_LOOKBACK),
            FactorDefinition::new("FloatMarketCap", FloatMarketCap, Direction::Ascending),
        ];
        let factors = builtins
            .into_iter()
            .map(|def| (def.name.clone(), def))
            .collect();
        Self { factors }
    }

    pub fn register(&mut self, definition: FactorDefinition) -> Result<(), SamselectError> {
        if self.factors.contains_key(&definition.name) {
            return Err(SamselectError::DuplicateFactor {
                name: definition.name,
            });
        }
        debug!(name = %definition.name, version = definition.version, "registered factor");
        self.factors.insert(definition.name.clone(), definition);
        Ok(())
    }

    pub fn register_fn<F>(
        &mut self,
        name: &str,
        computation: F,
        direction: Direction,
    ) -> Result<(), SamselectError>
    where
        F: Fn(&PanelSlice<'_>, &AssetKey) -> Option<f64> + Send + Sync + 'static,
    {
        self.register(FactorDefinition::new(name, FnFactor(computation), direction))
    }

    pub fn get(&self, name: &str) -> Option<&FactorDefinition> {
        self.factors.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&FactorDefinition, SamselectError> {
        self.get(name).ok_or_else(|| SamselectError::UnknownFactor {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factors.contains_key(name)
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<&str> {
        self.factors.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}
