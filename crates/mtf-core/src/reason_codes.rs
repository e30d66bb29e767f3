//! Canonical exit reason codes.
//!
//! Stable across releases and serialised as snake_case so downstream
//! consumers can match on them.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    // Risk levels
    StopLoss,
    TakeProfit,

    // Policy exits
    /// Candle body beyond both trend HMAs.
    BodyBreak,
    /// Base SMA crossed a trend HMA against the position.
    Crossover,
    /// Candle body beyond the base SMA.
    SmaBreak,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::BodyBreak => "body_break",
            ExitReason::Crossover => "crossover",
            ExitReason::SmaBreak => "sma_break",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
