//! Projection of base-resolution events onto a coarser display timeframe.
//!
//! Each event lands on the view candle whose window `[t_i, t_{i+1})`
//! contains it; the last window is open-ended. Events before the first view
//! candle are dropped.

use serde::Serialize;

use crate::candle::Candle;
use crate::position::{Direction, SignalEvent};
use crate::timeframe::Timeframe;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedEntry {
    /// Open time of the view candle.
    #[serde(with = "crate::timestamp::iso_ms")]
    pub time: i64,
    /// Timestamp of the underlying base event.
    #[serde(with = "crate::timestamp::iso_ms")]
    pub source_time: i64,
    pub direction: Direction,
    pub price: f64,
}

pub fn align_entries(
    events: &[SignalEvent],
    view: &[Candle],
    view_timeframe: Timeframe,
    base_timeframe: Timeframe,
) -> Vec<AlignedEntry> {
    if view_timeframe == base_timeframe {
        return events
            .iter()
            .map(|e| AlignedEntry {
                time: e.timestamp,
                source_time: e.timestamp,
                direction: e.direction,
                price: e.price,
            })
            .collect();
    }

    events
        .iter()
        .filter_map(|e| {
            let idx = view.partition_point(|c| c.t <= e.timestamp);
            let candle = view.get(idx.checked_sub(1)?)?;
            Some(AlignedEntry {
                time: candle.t,
                source_time: e.timestamp,
                direction: e.direction,
                price: e.price,
            })
        })
        .collect()
}
