//! Factor evaluation and composite scoring.
//!
//! For one rebalance date every configured factor is evaluated for every
//! asset in the cross-section (in parallel across assets), z-scored across
//! the available values, and combined into a weighted composite where higher
//! is always better.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::factor::{Direction, FactorDefinition};
use crate::domain::panel::ObservationPanel;
use crate::domain::registry::FactorRegistry;
use crate::domain::stats;

/// One entry of the configured factor list.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorSpec {
    pub name: String,
    /// Overrides the registered direction when set.
    pub direction: Option<Direction>,
    pub weight: f64,
    /// Overrides the registered lookback when set.
    pub lookback: Option<usize>,
}

impl FactorSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            direction: None,
            weight: 1.0,
            lookback: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = Some(lookback);
        self
    }

    /// Zero-weight factors are scored (for filters) but left out of the
    /// composite.
    pub fn contributes(&self) -> bool {
        self.weight != 0.0
    }

    pub fn resolved_direction(&self, definition: &FactorDefinition) -> Direction {
        self.direction.unwrap_or(definition.direction)
    }

    pub fn resolved_lookback(&self, definition: &FactorDefinition) -> Option<usize> {
        self.lookback.or(definition.lookback)
    }
}

/// Scores of one rebalance date.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDate {
    pub date: NaiveDate,
    /// Raw factor values; unavailable entries are absent.
    pub scores: BTreeMap<AssetKey, BTreeMap<String, f64>>,
    /// Cross-sectional z-scores of the raw values.
    pub zscores: BTreeMap<AssetKey, BTreeMap<String, f64>>,
    /// `None` when any component factor is unavailable for the asset.
    pub composite: BTreeMap<AssetKey, Option<f64>>,
    /// Factors whose cross-section had zero variance on this date.
    pub degenerate_factors: Vec<String>,
}

impl ScoredDate {
    pub fn score(&self, asset: &AssetKey, factor: &str) -> Option<f64> {
        self.scores.get(asset).and_then(|s| s.get(factor)).copied()
    }

    pub fn composite(&self, asset: &AssetKey) -> Option<f64> {
        self.composite.get(asset).copied().flatten()
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetKey> {
        self.composite.keys()
    }
}

/// date → asset → factor → score
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorScoreTable {
    dates: BTreeMap<NaiveDate, BTreeMap<AssetKey, BTreeMap<String, f64>>>,
}

impl FactorScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A date's scores are written once; re-inserting a date keeps the first.
    pub fn insert(&mut self, scored: &ScoredDate) {
        self.dates
            .entry(scored.date)
            .or_insert_with(|| scored.scores.clone());
    }

    pub fn get(&self, date: NaiveDate) -> Option<&BTreeMap<AssetKey, BTreeMap<String, f64>>> {
        self.dates.get(&date)
    }

    pub fn score(&self, date: NaiveDate, asset: &AssetKey, factor: &str) -> Option<f64> {
        self.dates
            .get(&date)
            .and_then(|assets| assets.get(asset))
            .and_then(|factors| factors.get(factor))
            .copied()
    }

    /// Cross-section of one factor on one date.
    pub fn column(&self, date: NaiveDate, factor: &str) -> BTreeMap<AssetKey, f64> {
        self.dates
            .get(&date)
            .map(|assets| {
                assets
                    .iter()
                    .filter_map(|(asset, factors)| {
                        factors.get(factor).map(|v| (asset.clone(), *v))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.dates.keys()
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Evaluates a factor list against a read-only panel and registry.
pub struct FactorEvaluator<'a> {
    panel: &'a ObservationPanel,
    registry: &'a FactorRegistry,
    specs: &'a [FactorSpec],
}

impl<'a> FactorEvaluator<'a> {
    pub fn new(
        panel: &'a ObservationPanel,
        registry: &'a FactorRegistry,
        specs: &'a [FactorSpec],
    ) -> Self {
        Self {
            panel,
            registry,
            specs,
        }
    }

    /// Single score of one factor for one asset on one date.
    pub fn evaluate(
        &self,
        date: NaiveDate,
        asset: &AssetKey,
        spec: &FactorSpec,
    ) -> Result<Option<f64>, SamselectError> {
        let definition = self.registry.require(&spec.name)?;
        Ok(self
            .panel
            .slice(date, spec.resolved_lookback(definition))
            .and_then(|slice| definition.evaluate(&slice, asset)))
    }

    pub fn score_date(
        &self,
        date: NaiveDate,
        assets: &[AssetKey],
    ) -> Result<ScoredDate, SamselectError> {
        self.panel.verify_date(date)?;

        let mut scores: BTreeMap<AssetKey, BTreeMap<String, f64>> = assets
            .iter()
            .map(|a| (a.clone(), BTreeMap::new()))
            .collect();
        let mut zscores = scores.clone();
        let mut oriented: BTreeMap<AssetKey, Vec<Option<f64>>> = assets
            .iter()
            .map(|a| (a.clone(), Vec::with_capacity(self.specs.len())))
            .collect();
        let mut degenerate_factors = Vec::new();

        for spec in self.specs {
            let definition = self.registry.require(&spec.name)?;
            let direction = spec.resolved_direction(definition);
            let column = self.evaluate_column(date, assets, spec, definition)?;

            let present: Vec<f64> = column.iter().filter_map(|(_, v)| *v).collect();
            if !assets.is_empty() && present.is_empty() {
                return Err(SamselectError::DataAvailability {
                    date,
                    reason: format!("factor '{}' unavailable for every asset", spec.name),
                });
            }

            let z = standardize(&present);
            if z.is_none() && !present.is_empty() {
                warn!(%date, factor = %spec.name, n = present.len(), "zero-variance cross-section, scores treated as equal");
                degenerate_factors.push(spec.name.clone());
            }

            for (asset, value) in column {
                let zscore = value.map(|v| match z {
                    Some((mean, std)) => (v - mean) / std,
                    None => 0.0,
                });
                if let Some(v) = value {
                    if let Some(entry) = scores.get_mut(&asset) {
                        entry.insert(spec.name.clone(), v);
                    }
                }
                if let Some(zv) = zscore {
                    if let Some(entry) = zscores.get_mut(&asset) {
                        entry.insert(spec.name.clone(), zv);
                    }
                }
                if spec.contributes() {
                    if let Some(parts) = oriented.get_mut(&asset) {
                        parts.push(zscore.map(|zv| spec.weight * direction.orient(zv)));
                    }
                }
            }
        }

        let total_weight: f64 = self.specs.iter().map(|s| s.weight.abs()).sum();
        let composite = oriented
            .into_iter()
            .map(|(asset, parts)| {
                let combined = parts
                    .into_iter()
                    .try_fold(0.0, |acc, part| part.map(|p| acc + p))
                    .filter(|_| total_weight > 0.0)
                    .map(|sum| sum / total_weight);
                (asset, combined)
            })
            .collect();

        debug!(%date, assets = assets.len(), factors = self.specs.len(), "scored date");

        Ok(ScoredDate {
            date,
            scores,
            zscores,
            composite,
            degenerate_factors,
        })
    }

    fn evaluate_column(
        &self,
        date: NaiveDate,
        assets: &[AssetKey],
        spec: &FactorSpec,
        definition: &FactorDefinition,
    ) -> Result<Vec<(AssetKey, Option<f64>)>, SamselectError> {
        let slice = self
            .panel
            .slice(date, spec.resolved_lookback(definition))
            .ok_or_else(|| SamselectError::DataAvailability {
                date,
                reason: "date is not on the panel calendar".to_string(),
            })?;
        Ok(assets
            .par_iter()
            .map(|asset| (asset.clone(), definition.evaluate(&slice, asset)))
            .collect())
    }
}

/// Mean and population standard deviation, or `None` for a degenerate
/// cross-section.
fn standardize(values: &[f64]) -> Option<(f64, f64)> {
    let mean = stats::mean(values)?;
    let std = stats::population_stddev(values)?;
    if std.is_finite() && std > f64::EPSILON * mean.abs().max(1.0) {
        Some((mean, std))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::factor::FieldValue;
    use crate::domain::panel::Snapshot;
    use approx::assert_relative_eq;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn key(s: &str) -> AssetKey {
        AssetKey::new("cn", s)
    }

    fn panel(field: &str, values: &[(&str, Option<f64>)]) -> ObservationPanel {
        let mut snap = Snapshot::default();
        for (symbol, v) in values {
            snap.set_asset_value(key(symbol), "close", 1.0, date());
            if let Some(v) = v {
                snap.set_asset_value(key(symbol), field, *v, date());
            }
        }
        ObservationPanel::from_snapshots(vec![(date(), snap)], BTreeMap::new()).unwrap()
    }

    fn registry() -> FactorRegistry {
        let mut r = FactorRegistry::new();
        r.register(FactorDefinition::new("cap", FieldValue::new("cap"), Direction::Ascending))
            .unwrap();
        r.register(FactorDefinition::new("roe", FieldValue::new("roe"), Direction::Descending))
            .unwrap();
        r
    }

    fn universe(symbols: &[&str]) -> Vec<AssetKey> {
        symbols.iter().map(|s| key(s)).collect()
    }

    #[test]
    fn ascending_factor_ranks_small_values_best() {
        let p = panel(
            "cap",
            &[("A", Some(10.0)), ("B", Some(20.0)), ("C", Some(30.0)), ("D", Some(40.0))],
        );
        let reg = registry();
        let specs = [FactorSpec::new("cap")];
        let scored = FactorEvaluator::new(&p, &reg, &specs)
            .score_date(date(), &universe(&["A", "B", "C", "D"]))
            .unwrap();

        let a = scored.composite(&key("A")).unwrap();
        let d = scored.composite(&key("D")).unwrap();
        assert!(a > d);
        assert_relative_eq!(scored.zscores[&key("A")]["cap"], -3.0 / 5.0f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(a, 3.0 / 5.0f64.sqrt(), epsilon = 1e-12);
        assert!(scored.degenerate_factors.is_empty());
    }

    #[test]
    fn zero_variance_falls_back_to_equal_scores() {
        let p = panel(
            "cap",
            &[("A", Some(5.0)), ("B", Some(5.0)), ("C", Some(5.0)), ("D", Some(5.0))],
        );
        let reg = registry();
        let specs = [FactorSpec::new("cap")];
        let scored = FactorEvaluator::new(&p, &reg, &specs)
            .score_date(date(), &universe(&["A", "B", "C", "D"]))
            .unwrap();
        assert_eq!(scored.degenerate_factors, vec!["cap".to_string()]);
        for s in ["A", "B", "C", "D"] {
            assert_eq!(scored.composite(&key(s)), Some(0.0));
        }
    }

    #[test]
    fn unavailable_entries_excluded_from_statistics() {
        let p = panel("cap", &[("A", Some(10.0)), ("B", None), ("C", Some(30.0))]);
        let reg = registry();
        let specs = [FactorSpec::new("cap")];
        let scored = FactorEvaluator::new(&p, &reg, &specs)
            .score_date(date(), &universe(&["A", "B", "C"]))
            .unwrap();
        assert_relative_eq!(scored.zscores[&key("A")]["cap"], -1.0, epsilon = 1e-12);
        assert_relative_eq!(scored.zscores[&key("C")]["cap"], 1.0, epsilon = 1e-12);
        assert!(scored.composite(&key("B")).is_none());
        assert!(scored.score(&key("B"), "cap").is_none());
    }

    #[test]
    fn factor_missing_everywhere_is_data_availability() {
        let p = panel("cap", &[("A", None), ("B", None)]);
        let reg = registry();
        let specs = [FactorSpec::new("cap")];
        let err = FactorEvaluator::new(&p, &reg, &specs)
            .score_date(date(), &universe(&["A", "B"]))
            .unwrap_err();
        assert!(matches!(err, SamselectError::DataAvailability { .. }));
    }

    #[test]
    fn weights_and_direction_override_combine() {
        let mut snap = Snapshot::default();
        for (s, cap, roe) in [("A", 10.0, 0.1), ("B", 20.0, 0.3)] {
            snap.set_asset_value(key(s), "cap", cap, date());
            snap.set_asset_value(key(s), "roe", roe, date());
        }
        let p = ObservationPanel::from_snapshots(vec![(date(), snap)], BTreeMap::new()).unwrap();
        let reg = registry();
        // z(cap) = [-1, 1] ascending -> [1, -1]; z(roe) = [-1, 1] descending -> [-1, 1]
        let specs = [
            FactorSpec::new("cap").with_weight(3.0),
            FactorSpec::new("roe").with_weight(1.0),
        ];
        let scored = FactorEvaluator::new(&p, &reg, &specs)
            .score_date(date(), &universe(&["A", "B"]))
            .unwrap();
        assert_relative_eq!(scored.composite(&key("A")).unwrap(), 0.5, epsilon = 1e-12);
        assert_relative_eq!(scored.composite(&key("B")).unwrap(), -0.5, epsilon = 1e-12);

        let flipped = [FactorSpec::new("cap").with_direction(Direction::Descending)];
        let scored = FactorEvaluator::new(&p, &reg, &flipped)
            .score_date(date(), &universe(&["A", "B"]))
            .unwrap();
        assert!(scored.composite(&key("B")).unwrap() > scored.composite(&key("A")).unwrap());
    }

    #[test]
    fn zero_weight_factor_scored_but_not_combined() {
        let mut snap = Snapshot::default();
        snap.set_asset_value(key("A"), "cap", 10.0, date());
        snap.set_asset_value(key("B"), "cap", 20.0, date());
        snap.set_asset_value(key("A"), "roe", 0.2, date());
        let p = ObservationPanel::from_snapshots(vec![(date(), snap)], BTreeMap::new()).unwrap();
        let reg = registry();
        let specs = [FactorSpec::new("cap"), FactorSpec::new("roe").with_weight(0.0)];
        let scored = FactorEvaluator::new(&p, &reg, &specs)
            .score_date(date(), &universe(&["A", "B"]))
            .unwrap();
        assert_eq!(scored.score(&key("A"), "roe"), Some(0.2));
        assert!(scored.composite(&key("B")).is_some());
        assert_relative_eq!(scored.composite(&key("A")).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn unknown_factor_is_reported() {
        let p = panel("cap", &[("A", Some(1.0))]);
        let reg = registry();
        let specs = [FactorSpec::new("nope")];
        let err = FactorEvaluator::new(&p, &reg, &specs)
            .score_date(date(), &universe(&["A"]))
            .unwrap_err();
        assert!(matches!(err, SamselectError::UnknownFactor { .. }));
    }

    #[test]
    fn scoring_is_repeatable() {
        let p = panel("cap", &[("A", Some(3.0)), ("B", Some(7.0)), ("C", Some(1.0))]);
        let reg = registry();
        let specs = [FactorSpec::new("cap")];
        let eval = FactorEvaluator::new(&p, &reg, &specs);
        let assets = universe(&["A", "B", "C"]);
        assert_eq!(
            eval.score_date(date(), &assets).unwrap(),
            eval.score_date(date(), &assets).unwrap()
        );
    }

    #[test]
    fn score_table_keeps_first_write() {
        let p = panel("cap", &[("A", Some(3.0)), ("B", Some(7.0))]);
        let reg = registry();
        let specs = [FactorSpec::new("cap")];
        let scored = FactorEvaluator::new(&p, &reg, &specs)
            .score_date(date(), &universe(&["A", "B"]))
            .unwrap();
        let mut table = FactorScoreTable::new();
        table.insert(&scored);
        let mut altered = scored.clone();
        altered
            .scores
            .get_mut(&key("A"))
            .unwrap()
            .insert("cap".into(), 99.0);
        table.insert(&altered);
        assert_eq!(table.score(date(), &key("A"), "cap"), Some(3.0));
        assert_eq!(table.column(date(), "cap").len(), 2);
    }
}
