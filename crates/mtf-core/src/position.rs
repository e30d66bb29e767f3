//! Position state for a signal replay and the events emitted on transitions.
//!
//! Provides [`PositionState`] (one per run, owned by the state machine) and
//! [`SignalEvent`], the append-only entry/exit log.

use serde::Serialize;

use crate::exits::Levels;
use crate::reason_codes::ExitReason;

// ---------------------------------------------------------------------------
// Sides
// ---------------------------------------------------------------------------

/// The direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionType {
    Long,
    Short,
}

impl PositionType {
    pub fn entry_direction(self) -> Direction {
        match self {
            PositionType::Long => Direction::Long,
            PositionType::Short => Direction::Short,
        }
    }

    pub fn exit_direction(self) -> Direction {
        match self {
            PositionType::Long => Direction::LongExit,
            PositionType::Short => Direction::ShortExit,
        }
    }
}

impl std::fmt::Display for PositionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionType::Long => write!(f, "long"),
            PositionType::Short => write!(f, "short"),
        }
    }
}

/// Position side as reported in the timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    #[default]
    Flat,
    Long,
    Short,
}

impl From<Option<PositionType>> for Side {
    fn from(held: Option<PositionType>) -> Self {
        match held {
            None => Side::Flat,
            Some(PositionType::Long) => Side::Long,
            Some(PositionType::Short) => Side::Short,
        }
    }
}

// ---------------------------------------------------------------------------
// PositionState
// ---------------------------------------------------------------------------

/// Open position (if any) plus its active stop/take levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionState {
    pub side: Side,
    pub entry_price: Option<f64>,
    pub stop_price: Option<f64>,
    pub take_price: Option<f64>,
}

impl PositionState {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn is_flat(&self) -> bool {
        self.side == Side::Flat
    }

    pub fn held(&self) -> Option<PositionType> {
        match self.side {
            Side::Flat => None,
            Side::Long => Some(PositionType::Long),
            Side::Short => Some(PositionType::Short),
        }
    }

    pub(crate) fn open(&mut self, pos_type: PositionType, price: f64, levels: &Levels) {
        self.side = Some(pos_type).into();
        self.entry_price = Some(price);
        self.stop_price = levels.stop;
        self.take_price = levels.take;
    }

    /// Back to flat with every level cleared.
    pub(crate) fn close(&mut self) {
        *self = Self::flat();
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    LongExit,
    ShortExit,
}

/// An entry or exit emitted by the state machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalEvent {
    #[serde(with = "crate::timestamp::iso_ms")]
    pub timestamp: i64,
    pub direction: Direction,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ExitReason>,
}

impl SignalEvent {
    pub fn entry(timestamp: i64, pos_type: PositionType, price: f64, levels: &Levels) -> Self {
        Self {
            timestamp,
            direction: pos_type.entry_direction(),
            price,
            stop_loss: levels.stop,
            take_profit: levels.take,
            stop_loss_percent: levels.stop_percent,
            take_profit_percent: levels.take_percent,
            atr: levels.atr,
            risk_percent: levels.risk_percent,
            reason: None,
        }
    }

    pub fn exit(timestamp: i64, pos_type: PositionType, price: f64, reason: ExitReason) -> Self {
        Self {
            timestamp,
            direction: pos_type.exit_direction(),
            price,
            stop_loss: None,
            take_profit: None,
            stop_loss_percent: None,
            take_profit_percent: None,
            atr: None,
            risk_percent: None,
            reason: Some(reason),
        }
    }
}
