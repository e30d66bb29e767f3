//! Indicator library: pure functions over a [`Series`].
//!
//! Every function validates its inputs the same way (positive period,
//! non-empty, strictly increasing timestamps) and returns a series of the
//! same length whose warm-up prefix is `None`.

pub mod atr;
pub mod ema;
pub mod ma;
pub mod macd;
pub mod rsi;
pub mod volume;

pub use atr::{atr, true_range};
pub use ema::{ema, Ema};
pub use ma::{hma, sma, wma};
pub use macd::{macd, MacdSeries};
pub use rsi::rsi;
pub use volume::volume_average;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::series::Series;

/// Ring buffer for rolling-window computations (SMA, WMA, TR mean, RSI legs).
#[derive(Debug, Clone)]
pub struct RingBuf {
    buf: Vec<f64>,
    pos: usize,
    len: usize,
    cap: usize,
}

impl RingBuf {
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(1);
        Self {
            buf: vec![0.0; cap],
            pos: 0,
            len: 0,
            cap,
        }
    }

    pub fn push(&mut self, val: f64) {
        self.buf[self.pos] = val;
        self.pos = (self.pos + 1) % self.cap;
        if self.len < self.cap {
            self.len += 1;
        }
    }

    pub fn full(&self) -> bool {
        self.len == self.cap
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget all values; the next window starts from scratch.
    pub fn clear(&mut self) {
        self.pos = 0;
        self.len = 0;
    }

    /// Iterate over values in insertion order (oldest first).
    pub fn iter(&self) -> RingBufIter<'_> {
        RingBufIter {
            buf: &self.buf,
            start: if self.len < self.cap { 0 } else { self.pos },
            count: 0,
            total: self.len,
            cap: self.cap,
        }
    }

    pub fn mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.iter().sum::<f64>() / self.len as f64
    }

    /// Linear-weighted mean, weights 1..len with the newest value heaviest.
    pub fn weighted_mean(&self) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        let n = self.len as f64;
        let weight_sum = n * (n + 1.0) / 2.0;
        let dot: f64 = self
            .iter()
            .enumerate()
            .map(|(i, v)| (i as f64 + 1.0) * v)
            .sum();
        dot / weight_sum
    }
}

pub struct RingBufIter<'a> {
    buf: &'a [f64],
    start: usize,
    count: usize,
    total: usize,
    cap: usize,
}

impl<'a> Iterator for RingBufIter<'a> {
    type Item = f64;
    fn next(&mut self) -> Option<f64> {
        if self.count >= self.total {
            return None;
        }
        let idx = (self.start + self.count) % self.cap;
        self.count += 1;
        Some(self.buf[idx])
    }
}

/// Shared input contract for every indicator function.
pub(crate) fn validate(series: &Series, period: usize) -> Result<()> {
    if period == 0 {
        return Err(CoreError::invalid("period must be a positive integer"));
    }
    if series.is_empty() {
        return Err(CoreError::invalid("indicator input series is empty"));
    }
    series.check()
}

/// Apply `f` to every complete trailing window of `period` defined values.
///
/// An undefined input value empties the window, so the output stays undefined
/// until `period` consecutive defined values have been seen again.
pub(crate) fn rolling(
    values: &[Option<f64>],
    period: usize,
    f: impl Fn(&RingBuf) -> f64,
) -> Vec<Option<f64>> {
    let mut buf = RingBuf::new(period);
    values
        .iter()
        .map(|v| match v {
            Some(v) => {
                buf.push(*v);
                buf.full().then(|| f(&buf))
            }
            None => {
                buf.clear();
                None
            }
        })
        .collect()
}

/// Moving-average family selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Sma,
    Wma,
    Hma,
}

impl IndicatorKind {
    pub fn compute(&self, series: &Series, period: usize) -> Result<Series> {
        match self {
            IndicatorKind::Sma => sma(series, period),
            IndicatorKind::Wma => wma(series, period),
            IndicatorKind::Hma => hma(series, period),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            IndicatorKind::Sma => "SMA",
            IndicatorKind::Wma => "WMA",
            IndicatorKind::Hma => "HMA",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ringbuf_wraps_in_insertion_order() {
        let mut rb = RingBuf::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            rb.push(v);
        }
        assert!(rb.full());
        assert_eq!(rb.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert!((rb.mean() - 3.0).abs() < 1e-12);
        // (1*2 + 2*3 + 3*4) / 6
        assert!((rb.weighted_mean() - 20.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_restarts_after_gap() {
        let vals = [Some(1.0), Some(2.0), None, Some(3.0), Some(5.0)];
        let out = rolling(&vals, 2, |b| b.mean());
        assert_eq!(out, vec![None, Some(1.5), None, None, Some(4.0)]);
    }

    #[test]
    fn test_validate_contract() {
        let s = Series::from_values(vec![1, 2], vec![1.0, 2.0]).unwrap();
        assert!(validate(&s, 0).is_err());
        assert!(validate(&Series::default(), 3).is_err());
        assert!(validate(&s, 5).is_ok());
    }

    #[test]
    fn test_kind_parses_lowercase() {
        let k: IndicatorKind = serde_json::from_str("\"hma\"").unwrap();
        assert_eq!(k, IndicatorKind::Hma);
        assert_eq!(k.to_string(), "HMA");
    }
}
