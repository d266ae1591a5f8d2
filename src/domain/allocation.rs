//! Allocation builder.
//!
//! Picks the top-K survivors of a ranked, filtered universe and assigns
//! weights that sum to one. An empty survivor set yields the empty vector
//! (fully in cash).

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::ranking::RankedUniverse;

/// Tolerance on the sum of a non-empty allocation.
pub const WEIGHT_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum SizingPolicy {
    /// At most `n` assets.
    Count(usize),
    /// ⌊fraction × survivors⌋ assets, at least one.
    Percentage(f64),
    /// Every survivor.
    Full,
}

impl SizingPolicy {
    /// Number of assets to hold out of `survivors`.
    pub fn select_count(&self, survivors: usize) -> usize {
        if survivors == 0 {
            return 0;
        }
        match self {
            SizingPolicy::Count(n) => (*n).min(survivors),
            SizingPolicy::Percentage(fraction) => {
                let k = ((fraction * survivors as f64) + 1e-9).floor() as usize;
                k.clamp(1, survivors)
            }
            SizingPolicy::Full => survivors,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeightScheme {
    Equal,
    /// Proportional to `score - min(score) + 1` over the selected assets.
    ScoreWeighted,
    /// Caller-supplied weights, re-normalized over the selected assets.
    External(BTreeMap<AssetKey, f64>),
}

impl WeightScheme {
    /// Validate caller-supplied weights up front.
    pub fn external(weights: BTreeMap<AssetKey, f64>) -> Result<Self, SamselectError> {
        if let Some((asset, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(SamselectError::invalid(
                "strategy",
                "weights",
                format!("weight for {} must be a non-negative number, got {}", asset, w),
            ));
        }
        Ok(WeightScheme::External(weights))
    }
}

/// Target weights for one date, keyed and iterated in `AssetKey` order.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AllocationVector {
    weights: BTreeMap<AssetKey, f64>,
}

impl AllocationVector {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Vector from explicit weights: each non-negative, summing to at most one.
    pub fn from_weights(weights: BTreeMap<AssetKey, f64>) -> Result<Self, SamselectError> {
        if let Some((asset, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(SamselectError::invalid(
                "allocation",
                "weights",
                format!("weight for {} must be a non-negative number, got {}", asset, w),
            ));
        }
        let total: f64 = weights.values().sum();
        if total > 1.0 + WEIGHT_TOLERANCE {
            return Err(SamselectError::invalid(
                "allocation",
                "weights",
                format!("weights sum to {}, more than 1", total),
            ));
        }
        Ok(Self { weights })
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn get(&self, asset: &AssetKey) -> Option<f64> {
        self.weights.get(asset).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AssetKey, f64)> {
        self.weights.iter().map(|(k, w)| (k, *w))
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Every weight multiplied by `factor`; the remainder is implicit cash.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            weights: self
                .weights
                .iter()
                .map(|(k, w)| (k.clone(), w * factor))
                .collect(),
        }
    }

    pub fn into_inner(self) -> BTreeMap<AssetKey, f64> {
        self.weights
    }
}

pub struct AllocationBuilder {
    sizing: SizingPolicy,
    scheme: WeightScheme,
}

impl AllocationBuilder {
    pub fn new(sizing: SizingPolicy, scheme: WeightScheme) -> Self {
        Self { sizing, scheme }
    }

    pub fn sizing(&self) -> &SizingPolicy {
        &self.sizing
    }

    pub fn scheme(&self) -> &WeightScheme {
        &self.scheme
    }

    pub fn build(&self, universe: &RankedUniverse) -> Result<AllocationVector, SamselectError> {
        let k = self.sizing.select_count(universe.len());
        let selected = &universe.entries()[..k];
        if selected.is_empty() {
            return Ok(AllocationVector::empty());
        }

        let raw: Vec<(AssetKey, f64)> = match &self.scheme {
            WeightScheme::Equal => selected.iter().map(|e| (e.asset.clone(), 1.0)).collect(),
            WeightScheme::ScoreWeighted => {
                let min = selected
                    .iter()
                    .filter_map(|e| e.score)
                    .fold(f64::INFINITY, f64::min);
                let min = if min.is_finite() { min } else { 0.0 };
                selected
                    .iter()
                    .map(|e| (e.asset.clone(), e.score.unwrap_or(min) - min + 1.0))
                    .collect()
            }
            WeightScheme::External(weights) => selected
                .iter()
                .map(|e| (e.asset.clone(), weights.get(&e.asset).copied().unwrap_or(0.0)))
                .collect(),
        };

        let total: f64 = raw.iter().map(|(_, w)| w).sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(SamselectError::DataAvailability {
                date: universe.date(),
                reason: "selected assets carry no positive weight".to_string(),
            });
        }

        let weights: BTreeMap<AssetKey, f64> = raw
            .into_iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(k, w)| (k, w / total))
            .collect();

        debug!(date = %universe.date(), selected = k, held = weights.len(), "built allocation");
        Ok(AllocationVector { weights })
    }
}
