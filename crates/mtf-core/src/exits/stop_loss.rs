//! Stop-loss level construction and intrabar trigger.
//!
//! A long stop triggers when the bar trades through it (`low <= stop`) or
//! opens beyond it (`open <= stop`); shorts are mirrored. The fill is the
//! stop level itself, never the gap price.

use crate::align::AlignedRow;
use crate::position::PositionType;

/// Stop `factor` (fraction, 0.1 = 10%) away from `entry`, against the position.
pub fn percent_stop(pos_type: PositionType, entry: f64, factor: f64) -> f64 {
    match pos_type {
        PositionType::Long => entry * (1.0 - factor),
        PositionType::Short => entry * (1.0 + factor),
    }
}

/// Stop a fixed price `distance` away from `entry`.
pub fn offset_stop(pos_type: PositionType, entry: f64, distance: f64) -> f64 {
    match pos_type {
        PositionType::Long => entry - distance,
        PositionType::Short => entry + distance,
    }
}

pub fn stop_hit(pos_type: PositionType, stop: f64, row: &AlignedRow) -> bool {
    match pos_type {
        PositionType::Long => row.low <= stop || row.open <= stop,
        PositionType::Short => row.high >= stop || row.open >= stop,
    }
}
