//! Timeframe labels for uniform candle intervals.
//!
//! A [`Timeframe`] is `amount × unit` (`"5m"`, `"4h"`, `"1d"`, `"1w"`). Months are
//! not supported because every timeframe must have a fixed duration: the
//! aligner derives its as-of tolerance from it and the entry aligner its
//! bucket width.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeUnit {
    Minute,
    Hour,
    Day,
    /// Fixed seven-day span, no calendar anchoring.
    Week,
}

impl TimeframeUnit {
    fn millis(self) -> i64 {
        match self {
            TimeframeUnit::Minute => MINUTE_MS,
            TimeframeUnit::Hour => 60 * MINUTE_MS,
            TimeframeUnit::Day => 24 * 60 * MINUTE_MS,
            TimeframeUnit::Week => 7 * 24 * 60 * MINUTE_MS,
        }
    }

    fn suffix(self) -> char {
        match self {
            TimeframeUnit::Minute => 'm',
            TimeframeUnit::Hour => 'h',
            TimeframeUnit::Day => 'd',
            TimeframeUnit::Week => 'w',
        }
    }
}

/// A candle interval. The amount is always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeframe {
    amount: u32,
    unit: TimeframeUnit,
}

impl Timeframe {
    pub const M5: Timeframe = Timeframe { amount: 5, unit: TimeframeUnit::Minute };
    pub const M30: Timeframe = Timeframe { amount: 30, unit: TimeframeUnit::Minute };
    pub const H1: Timeframe = Timeframe { amount: 1, unit: TimeframeUnit::Hour };
    pub const H4: Timeframe = Timeframe { amount: 4, unit: TimeframeUnit::Hour };
    pub const D1: Timeframe = Timeframe { amount: 1, unit: TimeframeUnit::Day };

    pub fn new(amount: u32, unit: TimeframeUnit) -> Result<Self, CoreError> {
        if amount == 0 {
            return Err(CoreError::invalid("timeframe amount must be > 0"));
        }
        Ok(Self { amount, unit })
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn unit(&self) -> TimeframeUnit {
        self.unit
    }

    /// Nominal candle duration in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        self.amount as i64 * self.unit.millis()
    }

    /// How many `finer` candles fit in one candle of `self` (at least 1).
    pub fn ratio_to(&self, finer: Timeframe) -> u64 {
        let r = self.duration_ms() / finer.duration_ms();
        r.max(1) as u64
    }
}

impl Ord for Timeframe {
    fn cmp(&self, other: &Self) -> Ordering {
        self.duration_ms()
            .cmp(&other.duration_ms())
            .then_with(|| self.amount.cmp(&other.amount))
    }
}

impl PartialOrd for Timeframe {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(last) = s.chars().last() else {
            return Err(CoreError::UnknownTimeframe(s.to_string()));
        };
        let unit = match last {
            'm' => TimeframeUnit::Minute,
            'h' | 'H' => TimeframeUnit::Hour,
            'd' | 'D' => TimeframeUnit::Day,
            'w' | 'W' => TimeframeUnit::Week,
            _ => return Err(CoreError::UnknownTimeframe(s.to_string())),
        };
        let digits = &s[..s.len() - last.len_utf8()];
        let amount: u32 = digits
            .parse()
            .map_err(|_| CoreError::UnknownTimeframe(s.to_string()))?;
        Timeframe::new(amount, unit).map_err(|_| CoreError::UnknownTimeframe(s.to_string()))
    }
}

// Timeframes travel as their label so they work as YAML/JSON map keys.
impl Serialize for Timeframe {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timeframe {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_roundtrip() {
        for label in ["5m", "30m", "1h", "4h", "1d", "1w"] {
            let tf: Timeframe = label.parse().unwrap();
            assert_eq!(tf.to_string(), label);
        }
        assert_eq!("1D".parse::<Timeframe>().unwrap(), Timeframe::D1);
    }

    #[test]
    fn test_rejects_malformed_labels() {
        for label in ["", "m", "0m", "5x", "-1h", "1.5h"] {
            assert!(label.parse::<Timeframe>().is_err(), "{label} should fail");
        }
    }

    #[test]
    fn test_ordering_is_by_duration() {
        let mut tfs = vec![Timeframe::D1, Timeframe::M30, Timeframe::H4, Timeframe::M5, Timeframe::H1];
        tfs.sort();
        assert_eq!(
            tfs,
            vec![Timeframe::M5, Timeframe::M30, Timeframe::H1, Timeframe::H4, Timeframe::D1]
        );
        let sixty_m: Timeframe = "60m".parse().unwrap();
        assert_eq!(sixty_m.duration_ms(), Timeframe::H1.duration_ms());
        assert_ne!(sixty_m, Timeframe::H1);
    }

    #[test]
    fn test_ratio_matches_view_table() {
        assert_eq!(Timeframe::M5.ratio_to(Timeframe::M5), 1);
        assert_eq!(Timeframe::M30.ratio_to(Timeframe::M5), 6);
        assert_eq!(Timeframe::H1.ratio_to(Timeframe::M5), 12);
        assert_eq!(Timeframe::H4.ratio_to(Timeframe::M5), 48);
        assert_eq!(Timeframe::D1.ratio_to(Timeframe::M5), 288);
        // Coarser "finer" argument clamps to 1.
        assert_eq!(Timeframe::M5.ratio_to(Timeframe::H1), 1);
    }

    #[test]
    fn test_serde_uses_label() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let back: Timeframe = serde_json::from_str("\"1d\"").unwrap();
        assert_eq!(back, Timeframe::D1);
    }
}
