//! Per-trade risk levels and the intrabar stop/take check.
//!
//! Priority order: Stop Loss > Take Profit > policy exits.
//!
//! All functions are pure; the state machine owns the [`PositionState`] and
//! applies the result.

pub mod stop_loss;
pub mod take_profit;

use serde::Serialize;

use crate::align::AlignedRow;
use crate::config::{FilteredConfig, RiskConfig};
use crate::position::{PositionState, PositionType};
use crate::reason_codes::ExitReason;

/// Stop/take levels chosen at entry, plus what the entry event reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Levels {
    pub stop: Option<f64>,
    pub take: Option<f64>,
    pub stop_percent: Option<f64>,
    pub take_percent: Option<f64>,
    pub atr: Option<f64>,
    pub risk_percent: Option<f64>,
}

impl Levels {
    /// Percentage levels off the entry close.
    pub fn percent(risk: &RiskConfig, pos_type: PositionType, close: f64) -> Self {
        let stop_factor = risk.stop_factor();
        let take_factor = risk.take_factor();
        Self {
            stop: stop_factor.map(|f| stop_loss::percent_stop(pos_type, close, f)),
            take: take_factor.map(|f| take_profit::percent_take(pos_type, close, f)),
            stop_percent: stop_factor.map(|_| risk.stop_loss_percent),
            take_percent: take_factor.map(|_| risk.take_profit_percent),
            atr: None,
            risk_percent: None,
        }
    }

    /// ATR-multiple levels; no levels when ATR is unknown.
    pub fn atr_multiple(
        cfg: &FilteredConfig,
        pos_type: PositionType,
        close: f64,
        atr: Option<f64>,
    ) -> Self {
        let distance = atr.map(|a| a * cfg.atr_multiplier);
        Self {
            stop: distance.map(|d| stop_loss::offset_stop(pos_type, close, d)),
            take: distance.map(|d| take_profit::offset_take(pos_type, close, d * cfg.min_reward_ratio)),
            stop_percent: None,
            take_percent: None,
            atr,
            risk_percent: Some(cfg.risk_per_trade),
        }
    }
}

/// Which active levels the current bar touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskCheck {
    pub stop_triggered: bool,
    pub take_triggered: bool,
}

impl RiskCheck {
    /// The exit to apply, stop first.
    pub fn exit(&self, position: &PositionState) -> Option<(ExitReason, f64)> {
        if self.stop_triggered {
            return position.stop_price.map(|p| (ExitReason::StopLoss, p));
        }
        if self.take_triggered {
            return position.take_price.map(|p| (ExitReason::TakeProfit, p));
        }
        None
    }
}

/// Check the held position's levels against the bar's open/high/low.
pub fn check_risk(position: &PositionState, row: &AlignedRow) -> RiskCheck {
    let Some(pos_type) = position.held() else {
        return RiskCheck::default();
    };
    RiskCheck {
        stop_triggered: position
            .stop_price
            .is_some_and(|stop| stop_loss::stop_hit(pos_type, stop, row)),
        take_triggered: position
            .take_price
            .is_some_and(|take| take_profit::take_hit(pos_type, take, row)),
    }
}
