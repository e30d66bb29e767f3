//! Entry/exit policies driven by the state machine in [`crate::engine`].
//!
//! A [`Policy`] only evaluates predicates: it never owns position state.
//! The engine applies stop/take checks, exits before entries and the
//! crossover memory update, so all four variants share one driver.

pub mod alignment;
pub mod bias;
pub mod cross;
pub mod crossover;
pub mod filtered;
pub mod snapshot;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::align::{AlignedRow, TrendKey, TrendValue};
use crate::config::EvaluationConfig;
use crate::error::{CoreError, Result};
use crate::exits::Levels;
use crate::indicators::IndicatorKind;
use crate::position::PositionType;
use crate::reason_codes::ExitReason;
use crate::timeframe::Timeframe;

pub use alignment::AlignmentPolicy;
pub use bias::BiasCrossoverPolicy;
pub use crossover::CrossoverPolicy;
pub use filtered::FilteredCrossoverPolicy;

// ---------------------------------------------------------------------------
// Variant selection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    #[serde(alias = "1")]
    Alignment,
    #[serde(alias = "2")]
    Crossover,
    #[serde(alias = "3")]
    FilteredCrossover,
    #[serde(alias = "4")]
    BiasCrossover,
}

impl Variant {
    pub const ALL: [Variant; 4] = [
        Variant::Alignment,
        Variant::Crossover,
        Variant::FilteredCrossover,
        Variant::BiasCrossover,
    ];

    /// Numeric id used by the strategy menu.
    pub fn id(self) -> &'static str {
        match self {
            Variant::Alignment => "1",
            Variant::Crossover => "2",
            Variant::FilteredCrossover => "3",
            Variant::BiasCrossover => "4",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Variant::Alignment => "alignment",
            Variant::Crossover => "crossover",
            Variant::FilteredCrossover => "filtered_crossover",
            Variant::BiasCrossover => "bias_crossover",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Variant::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s) || v.id() == s)
            .ok_or_else(|| CoreError::invalid(format!("unknown strategy variant {s:?}")))
    }
}

// ---------------------------------------------------------------------------
// Policy contract
// ---------------------------------------------------------------------------

/// Columns a policy needs joined onto the base timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    pub trend: Vec<TrendKey>,
    pub atr_period: Option<usize>,
    pub volume_period: Option<usize>,
}

/// Previous-row values used for crossover detection.
///
/// Cleared on every hard reset, so the first row after warm-up can never
/// produce a crossover.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossMemory {
    pub prev_base: Option<f64>,
    pub prev_trend: Vec<TrendValue>,
}

impl CrossMemory {
    pub fn prev(&self, indicator: IndicatorKind, timeframe: Timeframe) -> Option<f64> {
        self.prev_trend
            .iter()
            .find(|tv| tv.key.indicator == indicator && tv.key.timeframe == timeframe)
            .and_then(|tv| tv.value)
    }

    /// Overwrite with the row's base and trend values.
    pub fn record(&mut self, row: &AlignedRow) {
        self.prev_base = row.base;
        self.prev_trend.clone_from(&row.trend);
    }

    pub fn clear(&mut self) {
        self.prev_base = None;
        self.prev_trend.clear();
    }
}

/// Entry predicates for one row. Long wins when both are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntrySignal {
    pub long: bool,
    pub short: bool,
}

/// One timeframe's slice of the evaluation record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreakdownEntry {
    pub price: f64,
    pub indicator: Option<f64>,
    pub condition_met: bool,
    pub condition_long: bool,
    pub condition_short: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_on_body_break: Option<bool>,
}

impl BreakdownEntry {
    pub fn new(price: f64, indicator: Option<f64>, long: bool, short: bool) -> Self {
        Self {
            price,
            indicator,
            condition_met: long || short,
            condition_long: long,
            condition_short: short,
            exit_on_body_break: None,
        }
    }
}

pub type Breakdown = BTreeMap<Timeframe, BreakdownEntry>;

/// Extra columns reported by the filtered crossover variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FilterReport {
    pub atr: Option<f64>,
    pub atr_percent: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub volatility_ok: bool,
    pub volume_ok: bool,
    pub crossover_long: bool,
    pub crossover_short: bool,
    pub stop_loss_long: Option<f64>,
    pub take_profit_long: Option<f64>,
    pub stop_loss_short: Option<f64>,
    pub take_profit_short: Option<f64>,
}

/// Predicate set for one strategy variant.
pub trait Policy: Send + Sync {
    fn variant(&self) -> Variant;

    fn requirements(&self) -> Requirements;

    /// Whether positions carry stop/take levels checked each row.
    fn manages_risk(&self) -> bool {
        false
    }

    /// Policy exit for the held side; stop/take are checked by the engine first.
    fn evaluate_exit(
        &self,
        row: &AlignedRow,
        memory: &CrossMemory,
        held: PositionType,
    ) -> Option<ExitReason>;

    fn evaluate_entry(&self, row: &AlignedRow, memory: &CrossMemory) -> EntrySignal;

    /// Levels for a position opened at this row's close.
    fn levels(&self, _row: &AlignedRow, _pos_type: PositionType) -> Levels {
        Levels::default()
    }

    /// Per-timeframe breakdown. `held` is the side at the start of the row.
    fn breakdown(
        &self,
        row: &AlignedRow,
        memory: &CrossMemory,
        held: Option<PositionType>,
        entry: EntrySignal,
    ) -> Breakdown;

    fn filters(&self, _row: &AlignedRow, _memory: &CrossMemory) -> Option<FilterReport> {
        None
    }

    /// Update crossover memory after the row.
    fn remember(&self, row: &AlignedRow, memory: &mut CrossMemory) {
        memory.record(row);
    }
}

/// Build the policy for `variant` over `base` and `trends` (finest first).
///
/// Alignment and crossover variants need two trend timeframes, the bias
/// variant one; the bias timeframe, risk and filter settings come from
/// `cfg`.
pub fn build_policy(
    variant: Variant,
    base: Timeframe,
    trends: &[Timeframe],
    cfg: &EvaluationConfig,
) -> Result<Box<dyn Policy>> {
    let need = match variant {
        Variant::BiasCrossover => 1,
        _ => 2,
    };
    if trends.len() < need {
        return Err(CoreError::Configuration {
            message: format!(
                "variant {variant} needs {need} trend timeframes, got {}",
                trends.len()
            ),
        });
    }
    let (t1, t2) = (trends[0], trends.get(1).copied().unwrap_or(trends[0]));

    let policy: Box<dyn Policy> = match variant {
        Variant::Alignment => Box::new(AlignmentPolicy::new(base, t1, t2)),
        Variant::Crossover => Box::new(CrossoverPolicy::new(base, t1, t2, cfg.risk.clone())),
        Variant::FilteredCrossover => Box::new(FilteredCrossoverPolicy::new(
            base,
            t1,
            t2,
            cfg.filtered.clone(),
        )),
        Variant::BiasCrossover => Box::new(BiasCrossoverPolicy::new(
            base,
            t1,
            cfg.strategy.bias_timeframe,
            cfg.strategy.bias_source,
            cfg.risk.clone(),
        )),
    };
    Ok(policy)
}
