//! Strategy configuration.
//!
//! Everything the engine needs to turn a scored cross-section into target
//! weights: the factor list, filters, sizing, weighting, optional timing
//! signal and the rebalance cadence.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::allocation::{SizingPolicy, WeightScheme};
use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::factor::Direction;
use crate::domain::registry::FactorRegistry;
use crate::domain::rule::{FilterDefinition, FilterRule, FilterTarget};
use crate::domain::schedule::HoldPeriod;
use crate::domain::scoring::FactorSpec;
use crate::domain::timing::TimingSignal;

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub factors: Vec<FactorSpec>,
    pub filters: Vec<FilterDefinition>,
    pub sizing: SizingPolicy,
    pub weighting: WeightScheme,
    pub timing: Option<TimingSignal>,
    /// Restricts the cross-section to these assets when set.
    pub universe: Option<Vec<AssetKey>>,
    /// Fail a date on missing data instead of emitting an empty allocation.
    pub strict: bool,
    pub hold_period: HoldPeriod,
    pub rebalance_offset: i64,
}

impl StrategyConfig {
    pub fn new(name: &str, factors: Vec<FactorSpec>) -> Self {
        Self {
            name: name.to_string(),
            factors,
            filters: Vec::new(),
            sizing: SizingPolicy::Full,
            weighting: WeightScheme::Equal,
            timing: None,
            universe: None,
            strict: false,
            hold_period: HoldPeriod::default(),
            rebalance_offset: 0,
        }
    }

    pub fn with_filter(mut self, filter: FilterDefinition) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_sizing(mut self, sizing: SizingPolicy) -> Self {
        self.sizing = sizing;
        self
    }

    pub fn with_weighting(mut self, weighting: WeightScheme) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn with_timing(mut self, timing: TimingSignal) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_universe(mut self, universe: Vec<AssetKey>) -> Self {
        self.universe = Some(universe);
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Check the configuration against `registry`. Every problem found here
    /// is a configuration error.
    pub fn validate(&self, registry: &FactorRegistry) -> Result<(), SamselectError> {
        if self.factors.is_empty() {
            return Err(SamselectError::ConfigMissing {
                section: "strategy".to_string(),
                key: "factors".to_string(),
            });
        }

        let mut seen = BTreeSet::new();
        for spec in &self.factors {
            registry.require(&spec.name)?;
            if !seen.insert(spec.name.as_str()) {
                return Err(SamselectError::invalid(
                    "strategy",
                    "factors",
                    format!("factor '{}' listed twice", spec.name),
                ));
            }
            if !spec.weight.is_finite() {
                return Err(SamselectError::invalid(
                    "strategy",
                    "factors",
                    format!("weight of '{}' must be finite", spec.name),
                ));
            }
            if spec.lookback == Some(0) {
                return Err(SamselectError::invalid(
                    "strategy",
                    "factors",
                    format!("lookback of '{}' must be positive", spec.name),
                ));
            }
        }
        if !self.factors.iter().any(FactorSpec::contributes) {
            return Err(SamselectError::invalid(
                "strategy",
                "factors",
                "at least one factor needs a non-zero weight",
            ));
        }

        for filter in &self.filters {
            validate_filter(filter, registry)?;
        }

        match self.sizing {
            SizingPolicy::Count(0) => {
                return Err(SamselectError::invalid(
                    "strategy",
                    "select_count",
                    "count must be at least 1",
                ));
            }
            SizingPolicy::Percentage(p) if !(p > 0.0 && p <= 1.0) => {
                return Err(SamselectError::invalid(
                    "strategy",
                    "select_count",
                    format!("percentage must be in (0, 1], got {}", p),
                ));
            }
            _ => {}
        }

        if let Some(universe) = &self.universe {
            if universe.is_empty() {
                return Err(SamselectError::invalid(
                    "strategy",
                    "universe",
                    "universe restriction is empty",
                ));
            }
        }
        Ok(())
    }

    /// The factor list to score: the configured factors, then every
    /// registered factor a filter refers to that is not already listed, with
    /// weight zero so it stays out of the composite.
    pub fn scored_specs(&self, registry: &FactorRegistry) -> Vec<FactorSpec> {
        let mut specs = self.factors.clone();
        for filter in &self.filters {
            if let FilterTarget::Factor(name) = &filter.target {
                if registry.contains(name) && !specs.iter().any(|s| &s.name == name) {
                    specs.push(FactorSpec::new(name).with_weight(0.0));
                }
            }
        }
        specs
    }

    /// Resolved direction of every scored factor.
    pub fn directions(&self, registry: &FactorRegistry) -> BTreeMap<String, Direction> {
        self.scored_specs(registry)
            .iter()
            .filter_map(|spec| {
                registry
                    .get(&spec.name)
                    .map(|def| (spec.name.clone(), spec.resolved_direction(def)))
            })
            .collect()
    }
}

fn validate_filter(filter: &FilterDefinition, registry: &FactorRegistry) -> Result<(), SamselectError> {
    let invalid = |reason: String| SamselectError::invalid("strategy", "filters", reason);
    if let FilterTarget::Factor(name) = &filter.target {
        registry.require(name)?;
    }
    match &filter.rule {
        FilterRule::Percentile { threshold, .. } if !(0.0..=1.0).contains(threshold) => Err(invalid(
            format!("percentile threshold must be in [0, 1] in '{}'", filter),
        )),
        FilterRule::Absolute { threshold, .. } if !threshold.is_finite() => {
            Err(invalid(format!("threshold must be finite in '{}'", filter)))
        }
        FilterRule::CategoryExclude(_) if !matches!(filter.target, FilterTarget::Field(_)) => {
            Err(invalid(format!(
                "category exclusion needs a category dimension, not '{}'",
                filter.target.name()
            )))
        }
        FilterRule::CategoryExclude(labels) if labels.is_empty() => {
            Err(invalid(format!("empty exclusion set in '{}'", filter)))
        }
        _ => Ok(()),
    }
}
