//! Take-profit level construction and intrabar trigger, mirroring the stop.

use crate::align::AlignedRow;
use crate::position::PositionType;

/// Take `factor` (fraction) away from `entry`, in favour of the position.
pub fn percent_take(pos_type: PositionType, entry: f64, factor: f64) -> f64 {
    match pos_type {
        PositionType::Long => entry * (1.0 + factor),
        PositionType::Short => entry * (1.0 - factor),
    }
}

pub fn offset_take(pos_type: PositionType, entry: f64, distance: f64) -> f64 {
    match pos_type {
        PositionType::Long => entry + distance,
        PositionType::Short => entry - distance,
    }
}

pub fn take_hit(pos_type: PositionType, take: f64, row: &AlignedRow) -> bool {
    match pos_type {
        PositionType::Long => row.high >= take || row.open >= take,
        PositionType::Short => row.low <= take || row.open <= take,
    }
}
