//! Price/indicator divergence detection by extreme matching.
//!
//! Local extremes are found independently in price (high/low columns) and in
//! an indicator (MACD line or RSI). Each consecutive pair of price extremes is
//! matched to the indicator extremes closest in time; the pair is a
//! divergence when price and indicator move in opposite directions.
//!
//! Insufficient history yields an empty result, never an error.

use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::candle::{closes, highs, lows, Candle};
use crate::config::DivergenceConfig;
use crate::error::{CoreError, Result};
use crate::indicators::{macd, rsi};
use crate::series::Series;
use crate::timeframe::Timeframe;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Indicator compared against price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorFamily {
    Macd,
    Rsi,
}

impl IndicatorFamily {
    fn kind(self, bullish: bool) -> DivergenceKind {
        match (self, bullish) {
            (IndicatorFamily::Macd, true) => DivergenceKind::MacdBullish,
            (IndicatorFamily::Macd, false) => DivergenceKind::MacdBearish,
            (IndicatorFamily::Rsi, true) => DivergenceKind::RsiBullish,
            (IndicatorFamily::Rsi, false) => DivergenceKind::RsiBearish,
        }
    }

    fn min_bars(self, cfg: &DivergenceConfig) -> usize {
        match self {
            IndicatorFamily::Macd => cfg.macd_min_bars,
            IndicatorFamily::Rsi => cfg.rsi_min_bars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceKind {
    MacdBullish,
    MacdBearish,
    RsiBullish,
    RsiBearish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremeType {
    High,
    Low,
}

/// A local extreme at `index` of the analysed series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extreme {
    pub index: usize,
    pub t: i64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DivergencePoint {
    #[serde(with = "crate::timestamp::iso_ms")]
    pub t: i64,
    pub price: f64,
    pub indicator_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Divergence {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub kind: DivergenceKind,
    pub start: DivergencePoint,
    pub end: DivergencePoint,
}

/// Natural key: re-detecting over the same data yields the same keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DivergenceKey {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub kind: DivergenceKind,
    pub start_t: i64,
    pub end_t: i64,
}

impl Divergence {
    pub fn key(&self) -> DivergenceKey {
        DivergenceKey {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            kind: self.kind,
            start_t: self.start.t,
            end_t: self.end.t,
        }
    }
}

// ---------------------------------------------------------------------------
// Extremes
// ---------------------------------------------------------------------------

/// Points equal to the max (or min) of `[i−window, i+window]`, for
/// `i ∈ [window, len−window)`. Undefined neighbours are ignored and an
/// undefined centre is never an extreme. Plateaus yield every tied point.
pub fn local_extremes(series: &Series, kind: ExtremeType, window: usize) -> Vec<Extreme> {
    let values = series.values();
    let ts = series.timestamps();
    let len = values.len();
    if len < 2 * window + 1 {
        return Vec::new();
    }

    (window..len - window)
        .filter_map(|i| {
            let centre = values[i]?;
            let span = values[i - window..=i + window].iter().flatten();
            let is_extreme = match kind {
                ExtremeType::High => span.fold(f64::NEG_INFINITY, |a, &b| a.max(b)) == centre,
                ExtremeType::Low => span.fold(f64::INFINITY, |a, &b| a.min(b)) == centre,
            };
            is_extreme.then_some(Extreme { index: i, t: ts[i], value: centre })
        })
        .collect()
}

/// Extreme closest in time to `t`, accepted only within `max_gap_ms`.
/// On equal distance the earlier candidate wins.
pub fn closest_extreme(t: i64, extremes: &[Extreme], max_gap_ms: i64) -> Option<Extreme> {
    let mut best: Option<(i64, Extreme)> = None;
    for e in extremes {
        let gap = (e.t - t).abs();
        if best.map_or(true, |(g, _)| gap < g) {
            best = Some((gap, *e));
        }
    }
    best.filter(|(gap, _)| *gap <= max_gap_ms).map(|(_, e)| e)
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Match price extremes from `candles` against a caller-supplied indicator
/// series on the same timeline.
pub fn detect_against(
    family: IndicatorFamily,
    symbol: &str,
    timeframe: Timeframe,
    candles: &[Candle],
    indicator: &Series,
    cfg: &DivergenceConfig,
) -> Result<Vec<Divergence>> {
    if indicator.len() != candles.len()
        || indicator.timestamps().iter().zip(candles).any(|(t, c)| *t != c.t)
    {
        return Err(CoreError::invalid(
            "indicator series must share the candle timeline",
        ));
    }
    if candles.len() < family.min_bars(cfg) {
        return Ok(Vec::new());
    }

    let max_gap = timeframe.duration_ms() * i64::from(cfg.match_window_bars);
    let w = cfg.window;
    let mut out = Vec::new();

    for (price_col, extreme_type) in [(highs(candles), ExtremeType::High), (lows(candles), ExtremeType::Low)] {
        let price_ext = local_extremes(&price_col, extreme_type, w);
        let ind_ext = local_extremes(indicator, extreme_type, w);
        if ind_ext.is_empty() {
            continue;
        }

        for pair in price_ext.windows(2) {
            let (prev, cur) = (pair[0], pair[1]);
            let (Some(prev_ind), Some(cur_ind)) = (
                closest_extreme(prev.t, &ind_ext, max_gap),
                closest_extreme(cur.t, &ind_ext, max_gap),
            ) else {
                continue;
            };

            let diverges = match extreme_type {
                // Higher price high, lower indicator high.
                ExtremeType::High => cur.value > prev.value && cur_ind.value < prev_ind.value,
                // Lower price low, higher indicator low.
                ExtremeType::Low => cur.value < prev.value && cur_ind.value > prev_ind.value,
            };
            if diverges {
                out.push(Divergence {
                    symbol: symbol.to_string(),
                    timeframe,
                    kind: family.kind(extreme_type == ExtremeType::Low),
                    start: DivergencePoint {
                        t: prev.t,
                        price: prev.value,
                        indicator_value: prev_ind.value,
                    },
                    end: DivergencePoint {
                        t: cur.t,
                        price: cur.value,
                        indicator_value: cur_ind.value,
                    },
                });
            }
        }
    }
    Ok(out)
}

/// MACD and RSI divergences for one (symbol, timeframe) candle set.
pub fn detect_all(
    symbol: &str,
    timeframe: Timeframe,
    candles: &[Candle],
    cfg: &DivergenceConfig,
) -> Result<Vec<Divergence>> {
    if candles.is_empty() || candles.len() < cfg.lookback {
        return Ok(Vec::new());
    }
    let close = closes(candles);
    let mut out = Vec::new();

    if candles.len() >= cfg.macd_min_bars {
        let m = macd(&close, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal)?;
        out.extend(detect_against(IndicatorFamily::Macd, symbol, timeframe, candles, &m.macd, cfg)?);
    }
    if candles.len() >= cfg.rsi_min_bars {
        let r = rsi(&close, cfg.rsi_period)?;
        out.extend(detect_against(IndicatorFamily::Rsi, symbol, timeframe, candles, &r, cfg)?);
    }
    Ok(out)
}

/// Drop repeats of the same natural key, keeping the first.
pub fn dedup_divergences(items: Vec<Divergence>) -> Vec<Divergence> {
    let mut seen = FxHashSet::default();
    items.into_iter().filter(|d| seen.insert(d.key())).collect()
}
