//! Timing overlay.
//!
//! A timing signal names an external series (a price field of one asset or a
//! macro series) and a method that turns the series up to a rebalance date
//! into an exposure multiplier in [0, 1]. The multiplier scales every weight
//! of the allocation; the remainder stays in cash.

pub mod bollinger;
pub mod moving_average;
pub mod trend_slope;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::domain::allocation::AllocationVector;
use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::observation::{fields, RawSources, Subject};

pub const DEFAULT_MA_FAST: usize = 5;
pub const DEFAULT_MA_SLOW: usize = 20;
pub const DEFAULT_BOLLINGER_WINDOW: usize = 20;
pub const DEFAULT_BOLLINGER_MULT: f64 = 2.0;
pub const DEFAULT_TREND_WINDOW: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimingSource {
    Price { asset: AssetKey, field: String },
    Macro { series: String },
}

impl TimingSource {
    fn subject(&self) -> (Subject, &str) {
        match self {
            TimingSource::Price { asset, field } => (Subject::Asset(asset.clone()), field),
            TimingSource::Macro { series } => (Subject::Macro, series),
        }
    }
}

impl fmt::Display for TimingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingSource::Price { asset, field } => write!(f, "pricing:{}:{}", field, asset),
            TimingSource::Macro { series } => write!(f, "macro:{}", series),
        }
    }
}

impl FromStr for TimingSource {
    type Err = SamselectError;

    /// `pricing:<field>:<market>:<symbol>`, `pricing:<market>:<symbol>`
    /// (close) or `macro:<series>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || SamselectError::UnknownSource {
            reference: s.to_string(),
        };
        let trimmed = s.trim();
        if let Some(rest) = trimmed.strip_prefix("pricing:") {
            let parts: Vec<&str> = rest.split(':').collect();
            let (field, asset) = match parts.as_slice() {
                [field, market, symbol] => (field.to_lowercase(), format!("{}:{}", market, symbol)),
                [market, symbol] => (fields::CLOSE.to_string(), format!("{}:{}", market, symbol)),
                _ => return Err(unknown()),
            };
            let asset = asset.parse::<AssetKey>().map_err(|_| unknown())?;
            if field.is_empty() {
                return Err(unknown());
            }
            return Ok(TimingSource::Price { asset, field });
        }
        if let Some(series) = trimmed.strip_prefix("macro:") {
            if series.trim().is_empty() {
                return Err(unknown());
            }
            return Ok(TimingSource::Macro {
                series: series.trim().to_string(),
            });
        }
        Err(unknown())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TimingMethod {
    DualMovingAverage {
        fast: usize,
        slow: usize,
        ramp_band: Option<f64>,
    },
    Bollinger {
        window: usize,
        mult: f64,
    },
    TrendSlope {
        window: usize,
        scale: f64,
    },
}

impl TimingMethod {
    /// Build a method from its name and positional parameters; missing
    /// parameters take the defaults.
    pub fn from_params(name: &str, params: &[f64]) -> Result<Self, SamselectError> {
        let invalid = |reason: String| SamselectError::invalid("timing", "params", reason);
        let window = |v: f64, what: &str, min: usize| -> Result<usize, SamselectError> {
            if v.fract() != 0.0 || v < min as f64 {
                return Err(invalid(format!("{} must be an integer >= {}, got {}", what, min, v)));
            }
            Ok(v as usize)
        };

        match name.trim().to_lowercase().as_str() {
            "ma" | "ma_double" => {
                let fast = params.first().map_or(Ok(DEFAULT_MA_FAST), |v| window(*v, "fast window", 1))?;
                let slow = params.get(1).map_or(Ok(DEFAULT_MA_SLOW), |v| window(*v, "slow window", 1))?;
                let ramp_band = params.get(2).copied();
                if ramp_band.is_some_and(|b| !(b > 0.0)) {
                    return Err(invalid("ramp band must be positive".to_string()));
                }
                Ok(TimingMethod::DualMovingAverage {
                    fast,
                    slow,
                    ramp_band,
                })
            }
            "bollinger" | "bb" => {
                let w = params
                    .first()
                    .map_or(Ok(DEFAULT_BOLLINGER_WINDOW), |v| window(*v, "window", 1))?;
                let mult = params.get(1).copied().unwrap_or(DEFAULT_BOLLINGER_MULT);
                if !(mult > 0.0 && mult.is_finite()) {
                    return Err(invalid(format!("band multiplier must be positive, got {}", mult)));
                }
                Ok(TimingMethod::Bollinger { window: w, mult })
            }
            "trend" | "slope" => {
                let w = params
                    .first()
                    .map_or(Ok(DEFAULT_TREND_WINDOW), |v| window(*v, "window", 2))?;
                let scale = params.get(1).copied().unwrap_or(1.0);
                if !scale.is_finite() {
                    return Err(invalid(format!("slope scale must be finite, got {}", scale)));
                }
                Ok(TimingMethod::TrendSlope { window: w, scale })
            }
            other => Err(SamselectError::invalid(
                "timing",
                "method",
                format!("unknown timing method '{}' (expected ma, bollinger, trend)", other),
            )),
        }
    }

    /// Exposure from the series values up to and including the rebalance date.
    pub fn exposure(&self, values: &[f64]) -> Option<f64> {
        match self {
            TimingMethod::DualMovingAverage {
                fast,
                slow,
                ramp_band,
            } => moving_average::dual_ma_exposure(values, *fast, *slow, *ramp_band),
            TimingMethod::Bollinger { window, mult } => {
                bollinger::band_position(values, *window, *mult)
            }
            TimingMethod::TrendSlope { window, scale } => {
                trend_slope::slope_exposure(values, *window, *scale)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingSignal {
    pub source: TimingSource,
    pub method: TimingMethod,
}

/// A timing signal bound to its series.
#[derive(Debug, Clone)]
pub struct TimingOverlay {
    signal: TimingSignal,
    points: Vec<(NaiveDate, f64)>,
}

impl TimingOverlay {
    /// Bind `signal` to its series in `raw`. A reference to a series that is
    /// not present is a configuration error.
    pub fn resolve(signal: TimingSignal, raw: &RawSources) -> Result<Self, SamselectError> {
        let (subject, field) = signal.source.subject();
        let mut points: BTreeMap<NaiveDate, (f64, &str)> = BTreeMap::new();
        for obs in raw
            .observations()
            .iter()
            .filter(|o| o.subject == subject && o.field == field && o.value.is_finite())
        {
            if let Some((_, existing)) = points.get(&obs.timestamp) {
                let (first, second) = if *existing <= obs.source.as_str() {
                    (existing.to_string(), obs.source.clone())
                } else {
                    (obs.source.clone(), existing.to_string())
                };
                return Err(SamselectError::ConflictingObservation {
                    subject: subject.to_string(),
                    field: field.to_string(),
                    timestamp: obs.timestamp,
                    first,
                    second,
                });
            }
            points.insert(obs.timestamp, (obs.value, obs.source.as_str()));
        }
        if points.is_empty() {
            return Err(SamselectError::UnknownSource {
                reference: signal.source.to_string(),
            });
        }
        let points = points.into_iter().map(|(d, (v, _))| (d, v)).collect();
        Ok(Self { signal, points })
    }

    /// Overlay over an already extracted series. Non-finite points are
    /// dropped.
    pub fn from_points(
        signal: TimingSignal,
        mut points: Vec<(NaiveDate, f64)>,
    ) -> Result<Self, SamselectError> {
        points.retain(|(_, v)| v.is_finite());
        points.sort_by_key(|(d, _)| *d);
        if let Some(w) = points.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(SamselectError::ConflictingObservation {
                subject: signal.source.to_string(),
                field: signal.source.subject().1.to_string(),
                timestamp: w[0].0,
                first: "points".to_string(),
                second: "points".to_string(),
            });
        }
        Ok(Self { signal, points })
    }

    pub fn signal(&self) -> &TimingSignal {
        &self.signal
    }

    /// Multiplier for `date`, computed only from points dated on or before
    /// it. With no such point the overlay does not scale (1.0); a
    /// non-finite signal holds no exposure (0.0).
    pub fn exposure(&self, date: NaiveDate) -> f64 {
        let visible = self.points.partition_point(|(d, _)| *d <= date);
        if visible == 0 {
            return 1.0;
        }
        let values: Vec<f64> = self.points[..visible].iter().map(|(_, v)| *v).collect();
        let exposure = match self.signal.method.exposure(&values) {
            None => 1.0,
            Some(e) if e.is_finite() => e.clamp(0.0, 1.0),
            Some(e) => {
                warn!(%date, source = %self.signal.source, value = e, "non-finite timing signal");
                0.0
            }
        };
        debug!(%date, source = %self.signal.source, exposure, "timing exposure");
        exposure
    }

    pub fn apply(&self, date: NaiveDate, weights: &AllocationVector) -> (AllocationVector, f64) {
        let exposure = self.exposure(date);
        (weights.scaled(exposure), exposure)
    }
}
