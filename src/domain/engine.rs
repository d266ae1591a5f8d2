//! Strategy decision engine.
//!
//! Drives one rebalance date through the pipeline
//! `PanelReady -> Scored -> Ranked -> Filtered -> Allocated -> Overlaid -> Emitted`.
//! A failing stage ends that date only; other dates are unaffected. Dates
//! are independent and are computed in parallel.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::domain::aligner::{AlignerConfig, PanelAligner};
use crate::domain::allocation::{AllocationBuilder, AllocationVector};
use crate::domain::asset::AssetKey;
use crate::domain::error::SamselectError;
use crate::domain::factor::Direction;
use crate::domain::observation::RawSources;
use crate::domain::panel::ObservationPanel;
use crate::domain::ranking::{apply_filters, FilterContext, RankedUniverse};
use crate::domain::registry::FactorRegistry;
use crate::domain::schedule::rebalance_schedule;
use crate::domain::scoring::{FactorEvaluator, FactorScoreTable, FactorSpec, ScoredDate};
use crate::domain::strategy::StrategyConfig;
use crate::domain::timing::TimingOverlay;
use crate::ports::execution_port::ExecutionPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    PanelReady,
    Scored,
    Ranked,
    Filtered,
    Allocated,
    Overlaid,
    Emitted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::PanelReady => "panel_ready",
            PipelineStage::Scored => "scored",
            PipelineStage::Ranked => "ranked",
            PipelineStage::Filtered => "filtered",
            PipelineStage::Allocated => "allocated",
            PipelineStage::Overlaid => "overlaid",
            PipelineStage::Emitted => "emitted",
        };
        write!(f, "{}", name)
    }
}

/// Terminal failure of one rebalance date. `stage` is the stage that could
/// not be reached.
#[derive(Debug, thiserror::Error)]
#[error("rebalance {date} failed before {stage}: {error}")]
pub struct DateFailure {
    pub date: NaiveDate,
    pub stage: PipelineStage,
    #[source]
    pub error: SamselectError,
}

/// Final target weights of one rebalance date.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Allocation {
    pub date: NaiveDate,
    pub weights: AllocationVector,
    /// Timing multiplier applied to the raw weights.
    pub exposure: f64,
}

impl Allocation {
    /// Fully in cash.
    pub fn is_cash(&self) -> bool {
        self.weights.is_empty()
    }
}

pub type DateResult = Result<Allocation, DateFailure>;

#[derive(Debug, Default)]
pub struct RunReport {
    /// Dates handed to execution with at least one position.
    pub emitted: Vec<NaiveDate>,
    /// Dates handed to execution as an empty (all cash) allocation.
    pub empty: Vec<NaiveDate>,
    pub failed: Vec<DateFailure>,
}

pub struct StrategyEngine {
    panel: Arc<ObservationPanel>,
    registry: Arc<FactorRegistry>,
    config: StrategyConfig,
    specs: Vec<FactorSpec>,
    directions: BTreeMap<String, Direction>,
    universe: Option<BTreeSet<AssetKey>>,
    builder: AllocationBuilder,
    overlay: Option<TimingOverlay>,
}

impl StrategyEngine {
    /// Validates `config` against `registry`; any problem is returned here,
    /// before a single date is computed.
    pub fn new(
        panel: Arc<ObservationPanel>,
        registry: Arc<FactorRegistry>,
        config: StrategyConfig,
        overlay: Option<TimingOverlay>,
    ) -> Result<Self, SamselectError> {
        config.validate(&registry)?;
        if config.timing.is_some() && overlay.is_none() {
            return Err(SamselectError::invalid(
                "timing",
                "source",
                "timing signal is configured but no series was bound to it",
            ));
        }

        let specs = config.scored_specs(&registry);
        let directions = config.directions(&registry);
        let universe = config
            .universe
            .as_ref()
            .map(|assets| assets.iter().cloned().collect());
        let builder = AllocationBuilder::new(config.sizing.clone(), config.weighting.clone());

        info!(
            strategy = %config.name,
            factors = specs.len(),
            filters = config.filters.len(),
            dates = panel.len(),
            timing = overlay.is_some(),
            "strategy engine ready"
        );

        Ok(Self {
            panel,
            registry,
            config,
            specs,
            directions,
            universe,
            builder,
            overlay,
        })
    }

    /// Align `raw` onto `calendar` and bind the configured timing signal to
    /// its series, then build the engine.
    pub fn from_sources(
        raw: &RawSources,
        calendar: &[NaiveDate],
        aligner: AlignerConfig,
        registry: Arc<FactorRegistry>,
        config: StrategyConfig,
    ) -> Result<Self, SamselectError> {
        let panel = PanelAligner::new(aligner).align(raw, calendar)?;
        let overlay = config
            .timing
            .clone()
            .map(|signal| TimingOverlay::resolve(signal, raw))
            .transpose()?;
        Self::new(Arc::new(panel), registry, config, overlay)
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn panel(&self) -> &ObservationPanel {
        &self.panel
    }

    /// Rebalance dates on the panel calendar for the configured hold period
    /// and offset.
    pub fn rebalance_dates(&self) -> Vec<NaiveDate> {
        rebalance_schedule(
            self.panel.dates(),
            self.config.hold_period,
            self.config.rebalance_offset,
        )
    }

    /// Cross-section of `date`: every asset on the snapshot, narrowed to the
    /// configured universe.
    fn assets_on(&self, date: NaiveDate) -> Vec<AssetKey> {
        self.panel
            .snapshot(date)
            .map(|snapshot| {
                snapshot
                    .assets()
                    .filter(|a| self.universe.as_ref().is_none_or(|u| u.contains(a)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn score_date(&self, date: NaiveDate) -> Result<ScoredDate, SamselectError> {
        if self.panel.index_of(date).is_none() {
            return Err(SamselectError::DataAvailability {
                date,
                reason: "date is not on the panel calendar".to_string(),
            });
        }
        let assets = self.assets_on(date);
        FactorEvaluator::new(&self.panel, &self.registry, &self.specs).score_date(date, &assets)
    }

    /// Scores of every date that could be scored, computed in parallel.
    pub fn score_table(&self, dates: &[NaiveDate]) -> FactorScoreTable {
        let scored: Vec<(NaiveDate, Result<ScoredDate, SamselectError>)> = dates
            .par_iter()
            .map(|date| (*date, self.score_date(*date)))
            .collect();

        let mut table = FactorScoreTable::new();
        for (date, result) in scored {
            match result {
                Ok(s) => table.insert(&s),
                Err(e) => warn!(%date, error = %e, "date left out of score table"),
            }
        }
        table
    }

    /// Target allocation for one rebalance date.
    pub fn compute_allocation(&self, date: NaiveDate) -> DateResult {
        let fail = |stage: PipelineStage| move |error: SamselectError| DateFailure { date, stage, error };

        // PanelReady: a date the panel does not carry fails whatever the strictness.
        if self.panel.index_of(date).is_none() {
            let error = SamselectError::DataAvailability {
                date,
                reason: "date is not on the panel calendar".to_string(),
            };
            warn!(%date, error = %error, "rebalance date failed");
            return Err(fail(PipelineStage::PanelReady)(error));
        }
        self.panel
            .verify_date(date)
            .map_err(fail(PipelineStage::PanelReady))?;

        // Scored
        let scored = match self.score_date(date) {
            Ok(scored) => scored,
            Err(error) => return self.degrade(date, PipelineStage::Scored, error),
        };

        // Ranked
        let ranked = RankedUniverse::from_scored(&scored);
        debug!(%date, ranked = ranked.len(), "ranked universe");

        // Filtered
        let slice = self
            .panel
            .slice(date, None)
            .ok_or_else(|| SamselectError::DataAvailability {
                date,
                reason: "date is not on the panel calendar".to_string(),
            })
            .map_err(fail(PipelineStage::Filtered))?;
        let ctx = FilterContext::new(&scored, &self.directions, slice);
        let survivors = apply_filters(ranked, &self.config.filters, &ctx);

        // Allocated
        let raw = match self.builder.build(&survivors) {
            Ok(raw) => raw,
            Err(error) => return self.degrade(date, PipelineStage::Allocated, error),
        };

        // Overlaid
        let (weights, exposure) = match &self.overlay {
            Some(overlay) => overlay.apply(date, &raw),
            None => (raw, 1.0),
        };

        debug!(
            %date,
            survivors = survivors.len(),
            held = weights.len(),
            exposure,
            "allocation emitted"
        );
        Ok(Allocation {
            date,
            weights,
            exposure,
        })
    }

    /// Missing data empties the date's allocation unless the strategy is
    /// strict; every other error fails the date.
    fn degrade(&self, date: NaiveDate, stage: PipelineStage, error: SamselectError) -> DateResult {
        if matches!(error, SamselectError::DataAvailability { .. }) && !self.config.strict {
            warn!(%date, %stage, error = %error, "no eligible assets, allocating to cash");
            return Ok(Allocation {
                date,
                weights: AllocationVector::empty(),
                exposure: self.overlay.as_ref().map_or(1.0, |o| o.exposure(date)),
            });
        }
        warn!(%date, %stage, error = %error, "rebalance date failed");
        Err(DateFailure { date, stage, error })
    }

    /// Compute every date in parallel; results keep the order of `dates`.
    pub fn run(&self, dates: &[NaiveDate]) -> Vec<DateResult> {
        dates
            .par_iter()
            .map(|date| self.compute_allocation(*date))
            .collect()
    }

    /// Compute every date, then hand the results to `execution` in calendar
    /// order.
    pub fn drive(&self, dates: &[NaiveDate], execution: &mut dyn ExecutionPort) -> RunReport {
        let mut ordered = dates.to_vec();
        ordered.sort();
        ordered.dedup();

        let mut report = RunReport::default();
        for result in self.run(&ordered) {
            match result {
                Ok(allocation) => match execution.submit(allocation.date, &allocation.weights) {
                    Ok(()) if allocation.is_cash() => report.empty.push(allocation.date),
                    Ok(()) => report.emitted.push(allocation.date),
                    Err(error) => {
                        warn!(date = %allocation.date, error = %error, "execution rejected allocation");
                        report.failed.push(DateFailure {
                            date: allocation.date,
                            stage: PipelineStage::Emitted,
                            error,
                        });
                    }
                },
                Err(failure) => report.failed.push(failure),
            }
        }

        info!(
            strategy = %self.config.name,
            emitted = report.emitted.len(),
            empty = report.empty.len(),
            failed = report.failed.len(),
            "run complete"
        );
        report
    }
}
