//! Error types for the signal core.
//!
//! Insufficient history is deliberately absent: indicators surface it as an
//! undefined prefix and the divergence detector as an empty result.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Zero period, empty required input, malformed series or time range.
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// A required timeframe has no data at all.
    #[error("missing timeframes for evaluation: {timeframes}")]
    MissingTimeframe { timeframes: String },

    #[error("unknown timeframe: {0:?}")]
    UnknownTimeframe(String),

    /// Failure reported by a candle source implementation.
    #[error("candle source error: {message}")]
    Source { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl CoreError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CoreError::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn source(message: impl Into<String>) -> Self {
        CoreError::Source {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_message() {
        let e = CoreError::invalid("period must be positive");
        assert_eq!(e.to_string(), "invalid parameter: period must be positive");

        let e = CoreError::MissingTimeframe {
            timeframes: "1h, 4h".to_string(),
        };
        assert_eq!(e.to_string(), "missing timeframes for evaluation: 1h, 4h");
    }
}
