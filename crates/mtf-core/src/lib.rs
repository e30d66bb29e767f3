//! Multi-timeframe signal evaluation.
//!
//! Indicators (SMA/WMA/HMA, EMA, MACD, RSI, ATR) are computed per timeframe,
//! joined onto the base timeline with a tolerance-bounded as-of join, and
//! replayed row by row through a position state machine parameterised by a
//! strategy [`signals::Policy`]. Divergences between price and MACD/RSI are
//! detected by extreme matching.

pub mod align;
pub mod candle;
pub mod config;
pub mod divergence;
pub mod engine;
pub mod entry_align;
pub mod error;
pub mod exits;
pub mod indicators;
pub mod position;
pub mod reason_codes;
pub mod report;
pub mod runner;
pub mod series;
pub mod signals;
pub mod source;
pub mod timeframe;
pub mod timestamp;

pub use candle::Candle;
pub use config::{load_config, parse_config_str, EvaluationConfig};
pub use divergence::{Divergence, DivergenceKind};
pub use engine::{run_machine, Evaluation, MachineResult, SignalMachine};
pub use error::{CoreError, Result};
pub use position::{Direction, PositionType, Side, SignalEvent};
pub use report::RunResult;
pub use runner::{
    detect_divergences, detect_divergences_batch, run_signal_evaluation,
    run_signal_evaluation_many, RunRequest,
};
pub use series::Series;
pub use signals::snapshot::{evaluate_signal, SignalSnapshot, SnapshotParams};
pub use signals::Variant;
pub use source::{CandleSource, MemorySource, TimeRange};
pub use timeframe::Timeframe;
