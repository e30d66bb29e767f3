//! Candle source abstraction.
//!
//! The core never talks to storage directly; runs fetch through a
//! [`CandleSource`]. Implementations must be `Sync` so batch runs can share
//! one source across rayon workers.

use rustc_hash::FxHashMap;

use crate::candle::{normalize, Candle};
use crate::error::{CoreError, Result};
use crate::timeframe::Timeframe;

/// Inclusive time window in ms; `end = None` means open-ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeRange {
    pub const ALL: TimeRange = TimeRange { start: None, end: None };

    pub fn new(start: Option<i64>, end: Option<i64>) -> Result<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(CoreError::invalid(format!(
                    "time range start {s} is after end {e}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, t: i64) -> bool {
        self.start.map_or(true, |s| t >= s) && self.end.map_or(true, |e| t <= e)
    }
}

pub trait CandleSource: Sync {
    /// Ascending, deduplicated candles in `range`. With `limit`, only the most
    /// recent `limit` candles of the range.
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>>;

    fn symbols(&self) -> Result<Vec<String>>;
}

/// In-memory source keyed by (symbol, timeframe).
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: FxHashMap<(String, Timeframe), Vec<Candle>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or extend) a partition; the stored candles are re-normalised.
    pub fn insert(&mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        let entry = self.data.entry((symbol.to_string(), timeframe)).or_default();
        entry.extend(candles);
        normalize(entry);
    }

    pub fn with(mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.insert(symbol, timeframe, candles);
        self
    }
}

impl CandleSource for MemorySource {
    fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>> {
        let Some(all) = self.data.get(&(symbol.to_string(), timeframe)) else {
            return Ok(Vec::new());
        };
        let in_range: Vec<Candle> = all.iter().filter(|c| range.contains(c.t)).copied().collect();
        Ok(match limit {
            Some(n) if in_range.len() > n => in_range[in_range.len() - n..].to_vec(),
            _ => in_range,
        })
    }

    fn symbols(&self) -> Result<Vec<String>> {
        let mut out: Vec<String> = self.data.keys().map(|(s, _)| s.clone()).collect();
        out.sort();
        out.dedup();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(t: i64) -> Candle {
        Candle { t, o: 1.0, h: 1.0, l: 1.0, c: t as f64, v: 1.0 }
    }

    #[test]
    fn test_fetch_range_and_limit() {
        let src = MemorySource::new().with("BTC", Timeframe::M5, vec![c(3), c(1), c(2), c(2), c(5)]);
        let all = src.fetch("BTC", Timeframe::M5, TimeRange::ALL, None).unwrap();
        assert_eq!(all.iter().map(|x| x.t).collect::<Vec<_>>(), vec![1, 2, 3, 5]);

        let tail = src.fetch("BTC", Timeframe::M5, TimeRange::ALL, Some(2)).unwrap();
        assert_eq!(tail.iter().map(|x| x.t).collect::<Vec<_>>(), vec![3, 5]);

        let r = TimeRange::new(Some(2), Some(3)).unwrap();
        let mid = src.fetch("BTC", Timeframe::M5, r, Some(10)).unwrap();
        assert_eq!(mid.iter().map(|x| x.t).collect::<Vec<_>>(), vec![2, 3]);

        assert!(src.fetch("ETH", Timeframe::M5, TimeRange::ALL, None).unwrap().is_empty());
        assert!(src.fetch("BTC", Timeframe::H1, TimeRange::ALL, None).unwrap().is_empty());
    }

    #[test]
    fn test_symbols_sorted_unique() {
        let src = MemorySource::new()
            .with("ETH", Timeframe::M5, vec![c(1)])
            .with("BTC", Timeframe::M5, vec![c(1)])
            .with("BTC", Timeframe::H1, vec![c(1)]);
        assert_eq!(src.symbols().unwrap(), vec!["BTC".to_string(), "ETH".to_string()]);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(TimeRange::new(Some(5), Some(1)).is_err());
    }
}
