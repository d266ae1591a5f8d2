//! Cross-sectional ranking and filtering.
//!
//! The ranked universe is ordered by composite score, best first, with
//! unavailable composites after every scored asset and ties broken by
//! ascending `AssetKey`. Filters run in declaration order, each over the
//! survivors of the previous one; surviving assets keep their composite order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::domain::asset::AssetKey;
use crate::domain::factor::Direction;
use crate::domain::panel::PanelSlice;
use crate::domain::rule::{FilterDefinition, FilterRule, FilterTarget, PercentileSide};
use crate::domain::scoring::ScoredDate;

#[derive(Debug, Clone, PartialEq)]
pub struct RankedAsset {
    pub asset: AssetKey,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedUniverse {
    date: NaiveDate,
    entries: Vec<RankedAsset>,
}

impl RankedUniverse {
    pub fn new(date: NaiveDate, scores: impl IntoIterator<Item = (AssetKey, Option<f64>)>) -> Self {
        let mut entries: Vec<RankedAsset> = scores
            .into_iter()
            .map(|(asset, score)| RankedAsset { asset, score })
            .collect();
        entries.sort_by(|a, b| {
            compare_values(a.score, b.score, Direction::Descending).then_with(|| a.asset.cmp(&b.asset))
        });
        Self { date, entries }
    }

    pub fn from_scored(scored: &ScoredDate) -> Self {
        Self::new(
            scored.date,
            scored
                .composite
                .iter()
                .map(|(asset, score)| (asset.clone(), *score)),
        )
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn entries(&self) -> &[RankedAsset] {
        &self.entries
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetKey> {
        self.entries.iter().map(|e| &e.asset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn retain(&mut self, keep: &BTreeSet<AssetKey>) {
        self.entries.retain(|e| keep.contains(&e.asset));
    }
}

/// Order two optional values so the better one comes first; `None` is last.
fn compare_values(a: Option<f64>, b: Option<f64>, direction: Direction) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => match direction {
            Direction::Descending => y.total_cmp(&x),
            Direction::Ascending => x.total_cmp(&y),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Everything a filter may look at on one date.
pub struct FilterContext<'a> {
    scored: &'a ScoredDate,
    directions: &'a BTreeMap<String, Direction>,
    slice: PanelSlice<'a>,
}

impl<'a> FilterContext<'a> {
    /// `directions` holds the resolved direction of every scored factor.
    pub fn new(
        scored: &'a ScoredDate,
        directions: &'a BTreeMap<String, Direction>,
        slice: PanelSlice<'a>,
    ) -> Self {
        Self {
            scored,
            directions,
            slice,
        }
    }

    pub fn value(&self, target: &FilterTarget, asset: &AssetKey) -> Option<f64> {
        match target {
            FilterTarget::Composite => self.scored.composite(asset),
            FilterTarget::Factor(name) => self.scored.score(asset, name),
            FilterTarget::Field(name) => self.slice.value(asset, name),
        }
        .filter(|v| v.is_finite())
    }

    /// Ordering used by percentile rules: the composite is descending, a
    /// factor follows its direction, a raw field follows the hint (ascending
    /// when none is given).
    pub fn direction(&self, target: &FilterTarget, hint: Option<Direction>) -> Direction {
        match target {
            FilterTarget::Composite => Direction::Descending,
            FilterTarget::Factor(name) => self
                .directions
                .get(name)
                .copied()
                .or(hint)
                .unwrap_or(Direction::Descending),
            FilterTarget::Field(_) => hint.unwrap_or(Direction::Ascending),
        }
    }

    pub fn category<'b>(&self, asset: &'b AssetKey, dimension: &str) -> Option<&'b str>
    where
        'a: 'b,
    {
        self.slice.category(asset, dimension)
    }
}

/// Apply `filters` in order. An empty result is valid.
pub fn apply_filters(
    mut universe: RankedUniverse,
    filters: &[FilterDefinition],
    ctx: &FilterContext<'_>,
) -> RankedUniverse {
    for filter in filters {
        let before = universe.len();
        let keep = survivors(&universe, filter, ctx);
        universe.retain(&keep);
        debug!(
            date = %universe.date,
            filter = %filter,
            before,
            after = universe.len(),
            "applied filter"
        );
    }
    universe
}

fn survivors(
    universe: &RankedUniverse,
    filter: &FilterDefinition,
    ctx: &FilterContext<'_>,
) -> BTreeSet<AssetKey> {
    let assets = universe.assets();
    match &filter.rule {
        FilterRule::Percentile { side, threshold } => {
            let direction = ctx.direction(&filter.target, filter.weighting_hint);
            let values: Vec<(AssetKey, Option<f64>)> = assets
                .map(|a| (a.clone(), ctx.value(&filter.target, a)))
                .collect();
            percentile_cut(values, *side, *threshold, direction)
        }
        FilterRule::Absolute { op, threshold } => assets
            .filter(|a| {
                ctx.value(&filter.target, a)
                    .is_some_and(|v| op.apply(v, *threshold))
            })
            .cloned()
            .collect(),
        FilterRule::CategoryExclude(labels) => {
            let dimension = filter.target.name();
            assets
                .filter(|a| {
                    ctx.category(a, dimension)
                        .is_none_or(|label| !labels.contains(label))
                })
                .cloned()
                .collect()
        }
    }
}

/// Keep a fraction of `values` ordered by `direction`, ties broken by
/// ascending key. The kept count is ⌊p·n⌋ for the head, ⌊(1-p)·n⌋ for the
/// tail, over the whole survivor set. Unavailable and non-finite values sit after every
/// available one and are never taken from the tail.
pub fn percentile_cut(
    mut values: Vec<(AssetKey, Option<f64>)>,
    side: PercentileSide,
    threshold: f64,
    direction: Direction,
) -> BTreeSet<AssetKey> {
    for (_, v) in values.iter_mut() {
        *v = v.filter(|x| x.is_finite());
    }
    values.sort_by(|(ka, va), (kb, vb)| compare_values(*va, *vb, direction).then_with(|| ka.cmp(kb)));
    let n = values.len();
    let fraction = match side {
        PercentileSide::Head => threshold,
        PercentileSide::Tail => 1.0 - threshold,
    };
    // Nudge before flooring so 0.29 × 100 keeps 29, not 28.
    let count = ((fraction * n as f64) + 1e-9).floor().max(0.0) as usize;
    let count = count.min(n);

    match side {
        PercentileSide::Head => values.into_iter().take(count).map(|(k, _)| k).collect(),
        PercentileSide::Tail => {
            let available: Vec<AssetKey> = values
                .into_iter()
                .filter(|(_, v)| v.is_some())
                .map(|(k, _)| k)
                .collect();
            let skip = available.len().saturating_sub(count);
            available.into_iter().skip(skip).collect()
        }
    }
}
