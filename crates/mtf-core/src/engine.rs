//! Signal replay loop.
//!
//! Processes aligned rows in ascending timestamp order, single pass:
//! warm-up reset → stop/take check → policy exit → entry → crossover memory
//! update. The policy only evaluates predicates; position state lives here.

use serde::Serialize;
use tracing::debug;

use crate::align::AlignedRow;
use crate::error::{CoreError, Result};
use crate::exits::{self, RiskCheck};
use crate::position::{PositionState, PositionType, Side, SignalEvent};
use crate::reason_codes::ExitReason;
use crate::signals::{Breakdown, CrossMemory, EntrySignal, FilterReport, Policy};

// ---------------------------------------------------------------------------
// Evaluation record
// ---------------------------------------------------------------------------

/// Active levels at the start of the row and what the bar touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RiskReport {
    pub active_stop_loss_long: Option<f64>,
    pub active_take_profit_long: Option<f64>,
    pub active_stop_loss_short: Option<f64>,
    pub active_take_profit_short: Option<f64>,
    pub stop_loss_triggered_long: bool,
    pub take_profit_triggered_long: bool,
    pub stop_loss_triggered_short: bool,
    pub take_profit_triggered_short: bool,
}

impl RiskReport {
    fn new(position: &PositionState, check: &RiskCheck) -> Self {
        let mut out = Self::default();
        match position.held() {
            Some(PositionType::Long) => {
                out.active_stop_loss_long = position.stop_price;
                out.active_take_profit_long = position.take_price;
                out.stop_loss_triggered_long = check.stop_triggered;
                out.take_profit_triggered_long = check.take_triggered;
            }
            Some(PositionType::Short) => {
                out.active_stop_loss_short = position.stop_price;
                out.active_take_profit_short = position.take_price;
                out.stop_loss_triggered_short = check.stop_triggered;
                out.take_profit_triggered_short = check.take_triggered;
            }
            None => {}
        }
        out
    }
}

/// Per-row decision record, one for every row with a defined base indicator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    #[serde(with = "crate::timestamp::iso_ms")]
    pub time: i64,
    pub should_enter: bool,
    pub should_enter_long: bool,
    pub should_enter_short: bool,
    pub should_exit_long: bool,
    pub should_exit_short: bool,
    pub exit_reason_long: Option<ExitReason>,
    pub exit_reason_short: Option<ExitReason>,
    /// Side after the row.
    pub position: Side,
    pub breakdown: Breakdown,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskReport>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterReport>,
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// `None` for warm-up rows.
    pub evaluation: Option<Evaluation>,
    pub events: Vec<SignalEvent>,
    pub position: Side,
}

/// Owns the position and crossover memory for one run.
pub struct SignalMachine<'a> {
    policy: &'a dyn Policy,
    position: PositionState,
    memory: CrossMemory,
}

impl<'a> SignalMachine<'a> {
    pub fn new(policy: &'a dyn Policy) -> Self {
        Self {
            policy,
            position: PositionState::flat(),
            memory: CrossMemory::default(),
        }
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub fn memory(&self) -> &CrossMemory {
        &self.memory
    }

    /// Process one row. At most one exit and one entry per row, exit first.
    pub fn step(&mut self, row: &AlignedRow) -> StepOutput {
        // Hard reset: position, levels and memory all go.
        if row.base.is_none() {
            self.position.close();
            self.memory.clear();
            return StepOutput {
                evaluation: None,
                events: Vec::new(),
                position: Side::Flat,
            };
        }

        let policy = self.policy;
        let held = self.position.held();

        let check = if policy.manages_risk() {
            exits::check_risk(&self.position, row)
        } else {
            RiskCheck::default()
        };
        let risk = policy
            .manages_risk()
            .then(|| RiskReport::new(&self.position, &check));

        // ── 1. Exit: stop > take > policy ──────────────────────────────────
        let exit = held.and_then(|side| {
            check.exit(&self.position).or_else(|| {
                policy
                    .evaluate_exit(row, &self.memory, side)
                    .map(|reason| (reason, row.close))
            })
        });

        // ── 2. Entry predicates (evaluated against the pre-row memory) ────
        let entry = policy.evaluate_entry(row, &self.memory);
        let breakdown = policy.breakdown(row, &self.memory, held, entry);
        let filters = policy.filters(row, &self.memory);

        let mut events = Vec::new();
        if let (Some(side), Some((reason, price))) = (held, exit) {
            debug!(t = row.t, side = ?side, reason = reason.as_str(), price, "exit");
            events.push(SignalEvent::exit(row.t, side, price, reason));
            self.position.close();
        }

        // ── 3. Open only from flat, long first ───────────────────────────
        if self.position.is_flat() {
            if let Some(pos_type) = entry_side(entry) {
                let levels = policy.levels(row, pos_type);
                events.push(SignalEvent::entry(row.t, pos_type, row.close, &levels));
                self.position.open(pos_type, row.close, &levels);
            }
        }

        // ── 4. Memory for the next row ───────────────────────────────────
        policy.remember(row, &mut self.memory);

        let exit_reason_long = exit.filter(|_| held == Some(PositionType::Long)).map(|(r, _)| r);
        let exit_reason_short = exit.filter(|_| held == Some(PositionType::Short)).map(|(r, _)| r);

        let evaluation = Evaluation {
            time: row.t,
            should_enter: entry.long || entry.short,
            should_enter_long: entry.long,
            should_enter_short: entry.short,
            should_exit_long: exit_reason_long.is_some(),
            should_exit_short: exit_reason_short.is_some(),
            exit_reason_long,
            exit_reason_short,
            position: self.position.side,
            breakdown,
            risk,
            filters,
        };

        StepOutput {
            evaluation: Some(evaluation),
            events,
            position: self.position.side,
        }
    }
}

fn entry_side(entry: EntrySignal) -> Option<PositionType> {
    if entry.long {
        Some(PositionType::Long)
    } else if entry.short {
        Some(PositionType::Short)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Full replay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MachineResult {
    pub timeline: Vec<Evaluation>,
    pub events: Vec<SignalEvent>,
    pub final_position: PositionState,
}

/// Replay `rows` (strictly ascending timestamps) through `policy`.
pub fn run_machine(rows: &[AlignedRow], policy: &dyn Policy) -> Result<MachineResult> {
    if rows.windows(2).any(|w| w[1].t <= w[0].t) {
        return Err(CoreError::invalid(
            "aligned rows must have strictly increasing timestamps",
        ));
    }

    let mut machine = SignalMachine::new(policy);
    let mut out = MachineResult {
        timeline: Vec::with_capacity(rows.len()),
        events: Vec::new(),
        final_position: PositionState::flat(),
    };
    for row in rows {
        let step = machine.step(row);
        out.timeline.extend(step.evaluation);
        out.events.extend(step.events);
    }
    out.final_position = machine.position().clone();

    debug!(
        variant = %policy.variant(),
        rows = rows.len(),
        evaluated = out.timeline.len(),
        events = out.events.len(),
        "replay finished"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::{TrendKey, TrendValue};
    use crate::config::RiskConfig;
    use crate::indicators::IndicatorKind;
    use crate::position::Direction;
    use crate::signals::{AlignmentPolicy, CrossoverPolicy};
    use crate::timeframe::Timeframe;

    fn row(t: i64, close: f64, sma: Option<f64>, h1: f64, h4: f64) -> AlignedRow {
        AlignedRow {
            t,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
            base: sma,
            atr: None,
            volume_avg: None,
            trend: vec![
                TrendValue {
                    key: TrendKey::new(IndicatorKind::Hma, Timeframe::H1),
                    value: Some(h1),
                },
                TrendValue {
                    key: TrendKey::new(IndicatorKind::Hma, Timeframe::H4),
                    value: Some(h4),
                },
            ],
        }
    }

    fn alignment() -> AlignmentPolicy {
        AlignmentPolicy::new(Timeframe::M5, Timeframe::H1, Timeframe::H4)
    }

    fn crossover(risk: RiskConfig) -> CrossoverPolicy {
        CrossoverPolicy::new(Timeframe::M5, Timeframe::H1, Timeframe::H4, risk)
    }

    #[test]
    fn test_warmup_rows_have_no_record() {
        let p = alignment();
        let rows = vec![
            row(0, 110.0, None, 100.0, 100.0),
            row(1, 110.0, Some(100.0), 100.0, 100.0),
        ];
        let out = run_machine(&rows, &p).unwrap();
        assert_eq!(out.timeline.len(), 1);
        assert_eq!(out.timeline[0].time, 1);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].direction, Direction::Long);
    }

    #[test]
    fn test_undefined_base_resets_position() {
        let p = alignment();
        let mut m = SignalMachine::new(&p);
        m.step(&row(0, 110.0, Some(100.0), 100.0, 100.0));
        assert_eq!(m.position().side, Side::Long);

        let out = m.step(&row(1, 110.0, None, 100.0, 100.0));
        assert!(out.events.is_empty());
        assert_eq!(out.position, Side::Flat);
        assert!(m.position().is_flat());
        assert_eq!(*m.memory(), CrossMemory::default());

        // Still aligned: re-entry is a fresh entry, not a continuation.
        let out = m.step(&row(2, 110.0, Some(100.0), 100.0, 100.0));
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].direction, Direction::Long);
    }

    #[test]
    fn test_no_double_open_while_held() {
        let p = alignment();
        let rows: Vec<_> = (0..10).map(|t| row(t, 110.0, Some(100.0), 100.0, 100.0)).collect();
        let out = run_machine(&rows, &p).unwrap();
        assert_eq!(out.events.len(), 1);
        assert!(out.timeline.iter().all(|e| e.should_enter_long));
        assert!(out.timeline.iter().all(|e| e.position == Side::Long));
    }

    #[test]
    fn test_stop_fills_at_level_and_blocks_policy_exit() {
        let risk = RiskConfig {
            stop_loss_percent: 1.0,
            ..RiskConfig::default()
        };
        let p = crossover(risk);
        let mut m = SignalMachine::new(&p);
        // Cross up against the 4h HMA.
        m.step(&row(0, 100.0, Some(99.0), 90.0, 100.0));
        let open = m.step(&row(1, 100.0, Some(101.0), 90.0, 100.0));
        assert_eq!(open.events[0].direction, Direction::Long);
        assert_eq!(open.events[0].stop_loss, Some(99.0));
        assert_eq!(open.events[0].stop_loss_percent, Some(1.0));

        let mut drop = row(2, 98.5, Some(101.5), 90.0, 100.0);
        drop.low = 98.0;
        let out = m.step(&drop);
        assert_eq!(out.events.len(), 1);
        let exit = &out.events[0];
        assert_eq!(exit.direction, Direction::LongExit);
        assert_eq!(exit.reason, Some(ExitReason::StopLoss));
        assert_eq!(exit.price, 99.0);

        let eval = out.evaluation.unwrap();
        let risk = eval.risk.unwrap();
        assert_eq!(risk.active_stop_loss_long, Some(99.0));
        assert!(risk.stop_loss_triggered_long);
        assert_eq!(eval.exit_reason_long, Some(ExitReason::StopLoss));
        assert_eq!(eval.position, Side::Flat);
    }

    #[test]
    fn test_exit_then_entry_in_same_row() {
        let p = crossover(RiskConfig {
            stop_loss_enabled: false,
            ..RiskConfig::default()
        });
        let mut m = SignalMachine::new(&p);
        m.step(&row(0, 100.0, Some(101.0), 90.0, 100.0));
        // Cross down against 4h opens short.
        let out = m.step(&row(1, 100.0, Some(99.0), 90.0, 100.0));
        assert_eq!(out.events[0].direction, Direction::Short);
        // Cross back up: crossover exit for the short, then a long entry.
        let out = m.step(&row(2, 99.5, Some(100.5), 90.0, 100.0));
        let dirs: Vec<_> = out.events.iter().map(|e| e.direction).collect();
        assert_eq!(dirs, vec![Direction::ShortExit, Direction::Long]);
        assert_eq!(out.events[0].reason, Some(ExitReason::Crossover));
        assert_eq!(out.position, Side::Long);
    }

    #[test]
    fn test_rejects_unsorted_rows() {
        let p = alignment();
        let rows = vec![row(5, 1.0, Some(1.0), 1.0, 1.0), row(5, 1.0, Some(1.0), 1.0, 1.0)];
        assert!(run_machine(&rows, &p).is_err());
    }

    #[test]
    fn test_evaluation_json_flattens_risk() {
        let p = crossover(RiskConfig::default());
        let rows = vec![row(0, 100.0, Some(99.0), 90.0, 100.0)];
        let out = run_machine(&rows, &p).unwrap();
        let json = serde_json::to_value(&out.timeline[0]).unwrap();
        assert_eq!(json["time"], "1970-01-01T00:00:00+00:00");
        assert_eq!(json["position"], "flat");
        assert_eq!(json["stop_loss_triggered_long"], false);
        assert!(json["breakdown"]["5m"].is_object());
        assert!(json["breakdown"]["1h"]["exit_on_body_break"].is_boolean());
        assert!(json.get("volatility_ok").is_none());
    }
}
