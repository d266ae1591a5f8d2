//! Configuration loading and validation.
//!
//! Every section is parsed and checked up front so that configuration
//! errors surface before any rebalance date is processed.

use std::collections::BTreeMap;

use crate::domain::aligner::AlignerConfig;
use crate::domain::allocation::{SizingPolicy, WeightScheme};
use crate::domain::asset::AssetKey;
use crate::domain::error::{ParseError, SamselectError};
use crate::domain::factor::Direction;
use crate::domain::registry::FactorRegistry;
use crate::domain::rule::{FilterDefinition, FilterTarget};
use crate::domain::rule_parser::parse_filter;
use crate::domain::schedule::HoldPeriod;
use crate::domain::scoring::FactorSpec;
use crate::domain::strategy::StrategyConfig;
use crate::domain::timing::{TimingMethod, TimingSignal, TimingSource};
use crate::domain::universe::parse_assets;
use crate::ports::config_port::ConfigPort;

const STRATEGY: &str = "strategy";
const TIMING: &str = "timing";
const ALIGNER: &str = "aligner";

pub fn load_strategy_config(
    config: &dyn ConfigPort,
    registry: &FactorRegistry,
) -> Result<StrategyConfig, SamselectError> {
    let name = config
        .get_string(STRATEGY, "name")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "strategy".to_string());

    let strategy = StrategyConfig {
        name,
        factors: load_factors(config)?,
        filters: load_filters(config, registry)?,
        sizing: load_sizing(config)?,
        weighting: load_weighting(config)?,
        timing: load_timing_signal(config)?,
        universe: load_universe_restriction(config)?,
        strict: config.get_bool(STRATEGY, "strict", false),
        hold_period: load_hold_period(config)?,
        rebalance_offset: config.get_int(STRATEGY, "rebalance_offset", 0),
    };
    strategy.validate(registry)?;
    Ok(strategy)
}

pub fn load_aligner_config(config: &dyn ConfigPort) -> Result<AlignerConfig, SamselectError> {
    let fill_limit = config.get_int(ALIGNER, "price_fill_limit", 0);
    if fill_limit < 0 {
        return Err(SamselectError::invalid(
            ALIGNER,
            "price_fill_limit",
            "price_fill_limit must be non-negative",
        ));
    }

    let stale_after_days = match non_empty(config, ALIGNER, "stale_after_days") {
        None => None,
        Some(s) => match s.parse::<i64>() {
            Ok(days) if days > 0 => Some(days),
            _ => {
                return Err(SamselectError::invalid(
                    ALIGNER,
                    "stale_after_days",
                    format!("stale_after_days must be a positive integer, got '{}'", s),
                ));
            }
        },
    };

    Ok(AlignerConfig {
        price_fill_limit: fill_limit as usize,
        stale_after_days,
    })
}

/// `[timing]` is optional; without a `source` there is no overlay.
pub fn load_timing_signal(config: &dyn ConfigPort) -> Result<Option<TimingSignal>, SamselectError> {
    let Some(source) = non_empty(config, TIMING, "source") else {
        return Ok(None);
    };
    let source: TimingSource = source.parse()?;

    let method = non_empty(config, TIMING, "method").unwrap_or_else(|| "ma".to_string());
    let params = match non_empty(config, TIMING, "params") {
        None => Vec::new(),
        Some(s) => parse_numbers(&s).ok_or_else(|| {
            SamselectError::invalid(
                TIMING,
                "params",
                format!("params must be comma-separated numbers, got '{}'", s),
            )
        })?,
    };

    Ok(Some(TimingSignal {
        source,
        method: TimingMethod::from_params(&method, &params)?,
    }))
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_numbers(input: &str) -> Option<Vec<f64>> {
    input
        .split(',')
        .map(|p| p.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

fn load_factors(config: &dyn ConfigPort) -> Result<Vec<FactorSpec>, SamselectError> {
    let Some(list) = non_empty(config, STRATEGY, "factors") else {
        return Err(SamselectError::ConfigMissing {
            section: STRATEGY.to_string(),
            key: "factors".to_string(),
        });
    };
    list.split(',').map(parse_factor_spec).collect()
}

/// `Name[:dir[:weight[:lookback]]]`; an empty direction keeps the registered
/// one.
pub fn parse_factor_spec(entry: &str) -> Result<FactorSpec, SamselectError> {
    let invalid = |reason: String| SamselectError::invalid(STRATEGY, "factors", reason);
    let parts: Vec<&str> = entry.trim().split(':').map(str::trim).collect();
    if parts.len() > 4 {
        return Err(invalid(format!("too many fields in '{}'", entry.trim())));
    }

    let name = parts[0];
    if name.is_empty() {
        return Err(invalid(format!("missing factor name in '{}'", entry.trim())));
    }
    let mut spec = FactorSpec::new(name);

    if let Some(dir) = parts.get(1).filter(|d| !d.is_empty()) {
        let direction: Direction = dir.parse().map_err(|e: ParseError| {
            invalid(format!("{} in '{}'", e.message, entry.trim()))
        })?;
        spec = spec.with_direction(direction);
    }
    if let Some(weight) = parts.get(2).filter(|w| !w.is_empty()) {
        let weight = weight
            .parse::<f64>()
            .ok()
            .filter(|w| w.is_finite())
            .ok_or_else(|| invalid(format!("invalid weight '{}' for {}", weight, name)))?;
        spec = spec.with_weight(weight);
    }
    if let Some(lookback) = parts.get(3).filter(|l| !l.is_empty()) {
        let lookback = lookback
            .parse::<usize>()
            .ok()
            .filter(|l| *l > 0)
            .ok_or_else(|| invalid(format!("invalid lookback '{}' for {}", lookback, name)))?;
        spec = spec.with_lookback(lookback);
    }
    Ok(spec)
}

/// `filter_1`, `filter_2`, ... up to the first missing number.
fn load_filters(
    config: &dyn ConfigPort,
    registry: &FactorRegistry,
) -> Result<Vec<FilterDefinition>, SamselectError> {
    let mut filters = Vec::new();
    for n in 1.. {
        let key = format!("filter_{}", n);
        let Some(text) = config.get_string(STRATEGY, &key) else {
            break;
        };
        let raw = parse_filter(&text)?;
        filters.push(FilterDefinition {
            target: FilterTarget::resolve(&raw.target, |name| registry.contains(name)),
            weighting_hint: raw.weighting_hint,
            rule: raw.rule,
        });
    }
    Ok(filters)
}

/// Integer = fixed count, a value in (0, 1) = percentage, `all` = every
/// survivor. Missing means every survivor.
fn load_sizing(config: &dyn ConfigPort) -> Result<SizingPolicy, SamselectError> {
    let Some(value) = non_empty(config, STRATEGY, "select_count") else {
        return Ok(SizingPolicy::Full);
    };
    if value.eq_ignore_ascii_case("all") {
        return Ok(SizingPolicy::Full);
    }
    let invalid = || {
        SamselectError::invalid(
            STRATEGY,
            "select_count",
            format!(
                "select_count must be a positive integer, a fraction in (0, 1) or 'all', got '{}'",
                value
            ),
        )
    };
    if let Ok(count) = value.parse::<usize>() {
        return if count >= 1 {
            Ok(SizingPolicy::Count(count))
        } else {
            Err(invalid())
        };
    }
    match value.parse::<f64>() {
        Ok(fraction) if fraction > 0.0 && fraction < 1.0 => Ok(SizingPolicy::Percentage(fraction)),
        _ => Err(invalid()),
    }
}

fn load_weighting(config: &dyn ConfigPort) -> Result<WeightScheme, SamselectError> {
    let scheme = non_empty(config, STRATEGY, "weighting").unwrap_or_else(|| "equal".to_string());
    match scheme.to_lowercase().as_str() {
        "equal" => Ok(WeightScheme::Equal),
        "score" => Ok(WeightScheme::ScoreWeighted),
        "external" => {
            let Some(list) = non_empty(config, STRATEGY, "weights") else {
                return Err(SamselectError::ConfigMissing {
                    section: STRATEGY.to_string(),
                    key: "weights".to_string(),
                });
            };
            WeightScheme::external(parse_weights(&list)?)
        }
        other => Err(SamselectError::invalid(
            STRATEGY,
            "weighting",
            format!("unknown weighting '{}' (expected equal, score, external)", other),
        )),
    }
}

/// `market:symbol=weight, ...`
fn parse_weights(input: &str) -> Result<BTreeMap<AssetKey, f64>, SamselectError> {
    let invalid = |reason: String| SamselectError::invalid(STRATEGY, "weights", reason);
    let mut weights = BTreeMap::new();
    for entry in input.split(',') {
        let (asset, weight) = entry
            .split_once('=')
            .ok_or_else(|| invalid(format!("expected asset=weight, found '{}'", entry.trim())))?;
        let asset: AssetKey = asset
            .parse()
            .map_err(|e: ParseError| invalid(e.message))?;
        let weight = weight
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("invalid weight '{}' for {}", weight.trim(), asset)))?;
        if weights.insert(asset.clone(), weight).is_some() {
            return Err(invalid(format!("duplicate weight for {}", asset)));
        }
    }
    Ok(weights)
}

fn load_universe_restriction(
    config: &dyn ConfigPort,
) -> Result<Option<Vec<AssetKey>>, SamselectError> {
    match non_empty(config, STRATEGY, "universe") {
        None => Ok(None),
        Some(list) => parse_assets(&list)
            .map(Some)
            .map_err(|e| SamselectError::invalid(STRATEGY, "universe", e.to_string())),
    }
}

fn load_hold_period(config: &dyn ConfigPort) -> Result<HoldPeriod, SamselectError> {
    match non_empty(config, STRATEGY, "hold_period") {
        None => Ok(HoldPeriod::default()),
        Some(s) => s
            .parse()
            .map_err(|e: ParseError| {
                SamselectError::invalid(STRATEGY, "hold_period", e.message)
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::rule::{CompareOp, FilterRule, PercentileSide};

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    fn load(content: &str) -> Result<StrategyConfig, SamselectError> {
        load_strategy_config(&make_config(content), &FactorRegistry::with_builtins())
    }

    #[test]
    fn full_strategy_config_loads() {
        let strategy = load(
            r#"
[strategy]
name = SmallCapAlpha
factors = FloatMarketCap:asc:0.7, Momentum:desc:0.3:60
filter_1 = close|val:>=3
filter_2 = composite|pct:<=0.5
filter_3 = board|cat:exclude(ST,BJ)
select_count = 30
weighting = equal
strict = true
hold_period = 2W
rebalance_offset = 1

[timing]
source = pricing:close:cn:000300
method = ma
params = 5, 20
"#,
        )
        .unwrap();

        assert_eq!(strategy.name, "SmallCapAlpha");
        assert_eq!(strategy.factors.len(), 2);
        assert_eq!(strategy.factors[0].direction, Some(Direction::Ascending));
        assert_eq!(strategy.factors[0].weight, 0.7);
        assert_eq!(strategy.factors[1].lookback, Some(60));

        assert_eq!(strategy.filters.len(), 3);
        assert_eq!(strategy.filters[0].target, FilterTarget::Field("close".into()));
        assert_eq!(
            strategy.filters[0].rule,
            FilterRule::Absolute {
                op: CompareOp::Ge,
                threshold: 3.0
            }
        );
        assert_eq!(strategy.filters[1].target, FilterTarget::Composite);
        assert_eq!(
            strategy.filters[1].rule,
            FilterRule::Percentile {
                side: PercentileSide::Head,
                threshold: 0.5
            }
        );
        assert_eq!(strategy.filters[2].to_string(), "board|cat:exclude(BJ,ST)");

        assert_eq!(strategy.sizing, SizingPolicy::Count(30));
        assert_eq!(strategy.weighting, WeightScheme::Equal);
        assert!(strategy.strict);
        assert_eq!(strategy.hold_period, HoldPeriod::Weeks(2));
        assert_eq!(strategy.rebalance_offset, 1);

        let timing = strategy.timing.unwrap();
        assert_eq!(timing.source.to_string(), "pricing:close:cn:000300");
        assert_eq!(
            timing.method,
            TimingMethod::DualMovingAverage {
                fast: 5,
                slow: 20,
                ramp_band: None
            }
        );
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let strategy = load("[strategy]\nfactors = Momentum\n").unwrap();
        assert_eq!(strategy.name, "strategy");
        assert_eq!(strategy.sizing, SizingPolicy::Full);
        assert_eq!(strategy.weighting, WeightScheme::Equal);
        assert_eq!(strategy.hold_period, HoldPeriod::Months(1));
        assert!(strategy.filters.is_empty());
        assert!(strategy.timing.is_none());
        assert!(strategy.universe.is_none());
        assert_eq!(strategy.factors[0].direction, None);
        assert_eq!(strategy.factors[0].weight, 1.0);
    }

    #[test]
    fn missing_factors_fails() {
        let err = load("[strategy]\nname = x\n").unwrap_err();
        assert!(matches!(err, SamselectError::ConfigMissing { key, .. } if key == "factors"));
    }

    #[test]
    fn unknown_factor_fails() {
        let err = load("[strategy]\nfactors = Sentiment:desc:1\n").unwrap_err();
        assert!(matches!(err, SamselectError::UnknownFactor { name } if name == "Sentiment"));
    }

    #[test]
    fn bad_direction_fails() {
        let err = load("[strategy]\nfactors = Momentum:up:1\n").unwrap_err();
        assert!(matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "factors"));
    }

    #[test]
    fn unparseable_filter_is_rule_parse_error() {
        let err = load("[strategy]\nfactors = Momentum\nfilter_1 = close|val:=>3\n").unwrap_err();
        assert!(matches!(err, SamselectError::RuleParse(_)));
        assert!(err.is_configuration());
    }

    #[test]
    fn filters_stop_at_first_gap() {
        let strategy = load(
            "[strategy]\nfactors = Momentum\nfilter_1 = close|val:>1\nfilter_3 = close|val:>2\n",
        )
        .unwrap();
        assert_eq!(strategy.filters.len(), 1);
    }

    #[test]
    fn factor_filter_target_resolved_through_registry() {
        let strategy = load(
            "[strategy]\nfactors = Momentum\nfilter_1 = Volatility|pct:<=0.8\n",
        )
        .unwrap();
        assert_eq!(
            strategy.filters[0].target,
            FilterTarget::Factor("Volatility".into())
        );
    }

    #[test]
    fn select_count_forms() {
        let s = load("[strategy]\nfactors = Momentum\nselect_count = 0.25\n").unwrap();
        assert_eq!(s.sizing, SizingPolicy::Percentage(0.25));
        let s = load("[strategy]\nfactors = Momentum\nselect_count = all\n").unwrap();
        assert_eq!(s.sizing, SizingPolicy::Full);
        let err = load("[strategy]\nfactors = Momentum\nselect_count = 0\n").unwrap_err();
        assert!(matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "select_count"));
        let err = load("[strategy]\nfactors = Momentum\nselect_count = 2.5\n").unwrap_err();
        assert!(matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "select_count"));
    }

    #[test]
    fn external_weights_parsed() {
        let s = load(
            "[strategy]\nfactors = Momentum\nweighting = external\nweights = cn:600000=0.6, cn:000001=0.4\n",
        )
        .unwrap();
        match s.weighting {
            WeightScheme::External(w) => {
                assert_eq!(w[&AssetKey::new("cn", "600000")], 0.6);
                assert_eq!(w[&AssetKey::new("cn", "000001")], 0.4);
            }
            other => panic!("expected external weights, got {:?}", other),
        }
    }

    #[test]
    fn external_without_weights_fails() {
        let err = load("[strategy]\nfactors = Momentum\nweighting = external\n").unwrap_err();
        assert!(matches!(err, SamselectError::ConfigMissing { key, .. } if key == "weights"));
    }

    #[test]
    fn negative_external_weight_fails() {
        let err = load(
            "[strategy]\nfactors = Momentum\nweighting = external\nweights = cn:600000=-1\n",
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn unknown_weighting_fails() {
        let err = load("[strategy]\nfactors = Momentum\nweighting = magic\n").unwrap_err();
        assert!(matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "weighting"));
    }

    #[test]
    fn universe_restriction_parsed() {
        let s = load("[strategy]\nfactors = Momentum\nuniverse = cn:600000, us:AAPL\n").unwrap();
        assert_eq!(s.universe.unwrap().len(), 2);
        let err = load("[strategy]\nfactors = Momentum\nuniverse = cn:1, cn:1\n").unwrap_err();
        assert!(matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "universe"));
    }

    #[test]
    fn bad_hold_period_fails() {
        let err = load("[strategy]\nfactors = Momentum\nhold_period = 3Y\n").unwrap_err();
        assert!(matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "hold_period"));
    }

    #[test]
    fn unknown_timing_source_fails() {
        let err = load("[strategy]\nfactors = Momentum\n[timing]\nsource = weather:rain\n")
            .unwrap_err();
        assert!(matches!(err, SamselectError::UnknownSource { .. }));
    }

    #[test]
    fn timing_defaults_and_bad_params() {
        let signal = load_timing_signal(&make_config("[timing]\nsource = macro:PMI\n"))
            .unwrap()
            .unwrap();
        assert_eq!(
            signal.method,
            TimingMethod::DualMovingAverage {
                fast: 5,
                slow: 20,
                ramp_band: None
            }
        );

        let err = load_timing_signal(&make_config(
            "[timing]\nsource = macro:PMI\nmethod = bollinger\nparams = 20, x\n",
        ))
        .unwrap_err();
        assert!(matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "params"));

        let err = load_timing_signal(&make_config(
            "[timing]\nsource = macro:PMI\nmethod = rsi\n",
        ))
        .unwrap_err();
        assert!(matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "method"));
    }

    #[test]
    fn aligner_config_loads() {
        let aligner = load_aligner_config(&make_config(
            "[aligner]\nprice_fill_limit = 2\nstale_after_days = 400\n",
        ))
        .unwrap();
        assert_eq!(aligner.price_fill_limit, 2);
        assert_eq!(aligner.stale_after_days, Some(400));

        let aligner = load_aligner_config(&make_config("[strategy]\n")).unwrap();
        assert_eq!(aligner, AlignerConfig::default());
    }

    #[test]
    fn aligner_config_rejects_bad_values() {
        let err = load_aligner_config(&make_config("[aligner]\nprice_fill_limit = -1\n"))
            .unwrap_err();
        assert!(
            matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "price_fill_limit")
        );
        let err = load_aligner_config(&make_config("[aligner]\nstale_after_days = 0\n"))
            .unwrap_err();
        assert!(
            matches!(err, SamselectError::ConfigInvalid { key, .. } if key == "stale_after_days")
        );
    }
}
