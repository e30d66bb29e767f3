//! JSON payloads for signal runs.
//!
//! A [`RunResult`] carries the view candles, the exposed indicator series,
//! entries projected onto the view timeframe, the raw base events, the
//! per-row evaluation timeline and a small summary with counts per
//! direction and exit reason.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::candle::Candle;
use crate::engine::Evaluation;
use crate::entry_align::AlignedEntry;
use crate::indicators::IndicatorKind;
use crate::position::{Direction, PositionState, Side, SignalEvent};
use crate::reason_codes::ExitReason;
use crate::series::Series;
use crate::timeframe::Timeframe;

// ---------------------------------------------------------------------------
// Report types (all Serialize for JSON output)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorPoint {
    #[serde(with = "crate::timestamp::iso_ms")]
    pub time: i64,
    pub value: f64,
}

/// Exposed indicator series keyed by kind, then timeframe.
pub type IndicatorPayload = BTreeMap<IndicatorKind, BTreeMap<Timeframe, Vec<IndicatorPoint>>>;

/// Defined points of `series` in order; the warm-up prefix is dropped.
pub fn indicator_points(series: &Series) -> Vec<IndicatorPoint> {
    series
        .defined()
        .map(|(time, value)| IndicatorPoint { time, value })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitBucket {
    pub reason: ExitReason,
    pub exits: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub evaluated_rows: usize,
    pub long_entries: u32,
    pub short_entries: u32,
    pub long_exits: u32,
    pub short_exits: u32,
    /// Sorted by reason; reasons with no exits are omitted.
    pub by_exit_reason: Vec<ExitBucket>,
    pub final_position: Side,
    /// Entry price of the position still open at the end of the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_entry_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub symbol: String,
    #[serde(rename = "timeframe")]
    pub view_timeframe: Timeframe,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorPayload,
    pub entries: Vec<AlignedEntry>,
    pub events: Vec<SignalEvent>,
    #[serde(rename = "signal_timeline")]
    pub timeline: Vec<Evaluation>,
    #[serde(rename = "latest_signal")]
    pub latest: Option<Evaluation>,
    pub summary: RunSummary,
}

impl RunResult {
    /// Result for a run with no view or base candles.
    pub fn empty(symbol: &str, view_timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_string(),
            view_timeframe,
            candles: Vec::new(),
            indicators: IndicatorPayload::new(),
            entries: Vec::new(),
            events: Vec::new(),
            timeline: Vec::new(),
            latest: None,
            summary: build_summary(&[], &[], &PositionState::flat()),
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn build_summary(
    timeline: &[Evaluation],
    events: &[SignalEvent],
    final_position: &PositionState,
) -> RunSummary {
    let count = |d: Direction| events.iter().filter(|e| e.direction == d).count() as u32;

    let mut by_reason: BTreeMap<ExitReason, u32> = BTreeMap::new();
    for reason in events.iter().filter_map(|e| e.reason) {
        *by_reason.entry(reason).or_insert(0) += 1;
    }

    RunSummary {
        evaluated_rows: timeline.len(),
        long_entries: count(Direction::Long),
        short_entries: count(Direction::Short),
        long_exits: count(Direction::LongExit),
        short_exits: count(Direction::ShortExit),
        by_exit_reason: by_reason
            .into_iter()
            .map(|(reason, exits)| ExitBucket { reason, exits })
            .collect(),
        final_position: final_position.side,
        open_entry_price: if final_position.is_flat() {
            None
        } else {
            final_position.entry_price
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exits::Levels;
    use crate::position::PositionType;

    #[test]
    fn test_indicator_points_drop_warmup() {
        let s = Series::new(vec![1, 2, 3], vec![None, Some(2.0), Some(3.0)]).unwrap();
        let pts = indicator_points(&s);
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0], IndicatorPoint { time: 2, value: 2.0 });
    }

    #[test]
    fn test_summary_counts_by_direction_and_reason() {
        let events = vec![
            SignalEvent::entry(1, PositionType::Long, 10.0, &Levels::default()),
            SignalEvent::exit(2, PositionType::Long, 9.0, ExitReason::StopLoss),
            SignalEvent::entry(3, PositionType::Short, 9.0, &Levels::default()),
            SignalEvent::exit(4, PositionType::Short, 8.0, ExitReason::Crossover),
            SignalEvent::entry(5, PositionType::Long, 8.0, &Levels::default()),
            SignalEvent::exit(6, PositionType::Long, 7.0, ExitReason::StopLoss),
        ];
        let s = build_summary(&[], &events, &PositionState::flat());
        assert_eq!((s.long_entries, s.short_entries), (2, 1));
        assert_eq!((s.long_exits, s.short_exits), (2, 1));
        assert_eq!(s.by_exit_reason.len(), 2);
        let stops = s.by_exit_reason.iter().find(|b| b.reason == ExitReason::StopLoss).unwrap();
        assert_eq!(stops.exits, 2);
        assert_eq!(s.final_position, Side::Flat);
        assert_eq!(s.open_entry_price, None);
    }

    #[test]
    fn test_empty_result_serializes_wire_names() {
        let r = RunResult::empty("BTC", Timeframe::H1);
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["timeframe"], "1h");
        assert!(v["latest_signal"].is_null());
        assert_eq!(v["signal_timeline"].as_array().unwrap().len(), 0);
        assert_eq!(v["candles"].as_array().unwrap().len(), 0);
    }
}
