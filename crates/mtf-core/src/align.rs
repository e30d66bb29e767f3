//! Backward as-of join of coarser trend series onto the base timeline.
//!
//! For every base timestamp the latest trend point at or before it is taken,
//! provided it is no older than the column's tolerance. Anything else is
//! `None`: the aligner never fails on missing trend data.

use serde::Serialize;

use crate::candle::Candle;
use crate::error::{CoreError, Result};
use crate::indicators::IndicatorKind;
use crate::series::Series;
use crate::timeframe::Timeframe;

/// Identifies one trend column of an [`AlignedRow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrendKey {
    pub indicator: IndicatorKind,
    pub timeframe: Timeframe,
}

impl TrendKey {
    pub fn new(indicator: IndicatorKind, timeframe: Timeframe) -> Self {
        Self { indicator, timeframe }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendValue {
    pub key: TrendKey,
    pub value: Option<f64>,
}

/// A trend indicator series waiting to be joined onto the base timeline.
#[derive(Debug, Clone, Copy)]
pub struct TrendInput<'a> {
    pub key: TrendKey,
    pub series: &'a Series,
    pub tolerance_ms: i64,
}

/// Optional volatility/volume columns computed on the base timeframe.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaseExtras<'a> {
    pub atr: Option<&'a Series>,
    pub volume_avg: Option<&'a Series>,
}

/// One row per base timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedRow {
    pub t: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Base SMA; `None` during warm-up.
    pub base: Option<f64>,
    pub atr: Option<f64>,
    pub volume_avg: Option<f64>,
    pub trend: Vec<TrendValue>,
}

impl AlignedRow {
    /// Value of the `(indicator, timeframe)` trend column, `None` when the
    /// column is unknown at this row or was never joined.
    pub fn trend(&self, indicator: IndicatorKind, timeframe: Timeframe) -> Option<f64> {
        self.trend
            .iter()
            .find(|tv| tv.key.indicator == indicator && tv.key.timeframe == timeframe)
            .and_then(|tv| tv.value)
    }
}

/// Latest `trend` value at or before each base timestamp, within `tolerance_ms`.
///
/// The accepted point's value may itself be undefined (trend warm-up); that
/// stays `None`.
pub fn asof_backward(base_ts: &[i64], trend: &Series, tolerance_ms: i64) -> Vec<Option<f64>> {
    let trend_ts = trend.timestamps();
    let trend_vals = trend.values();
    base_ts
        .iter()
        .map(|&t| {
            let idx = match trend_ts.binary_search(&t) {
                Ok(i) => i,
                Err(0) => return None,
                Err(i) => i - 1,
            };
            if t - trend_ts[idx] <= tolerance_ms {
                trend_vals[idx]
            } else {
                None
            }
        })
        .collect()
}

/// Build the aligned timeline: base OHLCV plus the base indicator, optional
/// base extras and every trend column.
pub fn align(
    base: &[Candle],
    base_indicator: &Series,
    extras: BaseExtras<'_>,
    trends: &[TrendInput<'_>],
) -> Result<Vec<AlignedRow>> {
    if base.is_empty() {
        return Ok(Vec::new());
    }
    let same_timeline = |s: &Series| {
        s.len() == base.len() && s.timestamps().iter().zip(base).all(|(t, c)| *t == c.t)
    };
    if !same_timeline(base_indicator) {
        return Err(CoreError::invalid(
            "base indicator must share the base candle timeline",
        ));
    }
    for extra in [extras.atr, extras.volume_avg].into_iter().flatten() {
        if !same_timeline(extra) {
            return Err(CoreError::invalid(
                "base volatility columns must share the base candle timeline",
            ));
        }
    }

    let base_ts: Vec<i64> = base.iter().map(|c| c.t).collect();
    let columns: Vec<Vec<Option<f64>>> = trends
        .iter()
        .map(|input| asof_backward(&base_ts, input.series, input.tolerance_ms))
        .collect();

    let rows = base
        .iter()
        .enumerate()
        .map(|(i, c)| AlignedRow {
            t: c.t,
            open: c.o,
            high: c.h,
            low: c.l,
            close: c.c,
            volume: c.v,
            base: base_indicator.get(i),
            atr: extras.atr.and_then(|s| s.get(i)),
            volume_avg: extras.volume_avg.and_then(|s| s.get(i)),
            trend: trends
                .iter()
                .zip(&columns)
                .map(|(input, col)| TrendValue {
                    key: input.key,
                    value: col[i],
                })
                .collect(),
        })
        .collect();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const M5: i64 = 300_000;
    const H1: i64 = 3_600_000;

    fn candle(t: i64, c: f64) -> Candle {
        Candle { t, o: c, h: c, l: c, c, v: 1.0 }
    }

    #[test]
    fn test_asof_picks_latest_at_or_before() {
        let trend = Series::from_values(vec![0, H1, 2 * H1], vec![1.0, 2.0, 3.0]).unwrap();
        let base = [0, M5, H1 - 1, H1, H1 + M5, 2 * H1 + 11 * M5];
        let out = asof_backward(&base, &trend, 6 * H1);
        assert_eq!(
            out,
            vec![Some(1.0), Some(1.0), Some(1.0), Some(2.0), Some(2.0), Some(3.0)]
        );
    }

    #[test]
    fn test_asof_tolerance_is_inclusive() {
        let trend = Series::from_values(vec![0], vec![5.0]).unwrap();
        let out = asof_backward(&[6 * H1, 6 * H1 + 1], &trend, 6 * H1);
        assert_eq!(out, vec![Some(5.0), None]);
    }

    #[test]
    fn test_asof_before_first_trend_point_is_unknown() {
        let trend = Series::from_values(vec![H1], vec![5.0]).unwrap();
        assert_eq!(asof_backward(&[0, H1 - 1], &trend, 6 * H1), vec![None, None]);
    }

    #[test]
    fn test_asof_keeps_undefined_trend_value() {
        let trend = Series::new(vec![0, H1], vec![None, Some(2.0)]).unwrap();
        assert_eq!(asof_backward(&[M5, H1], &trend, 6 * H1), vec![None, Some(2.0)]);
    }

    #[test]
    fn test_align_empty_base_and_empty_trend() {
        let empty = Series::new(Vec::new(), Vec::new()).unwrap();
        let rows = align(&[], &empty, BaseExtras::default(), &[]).unwrap();
        assert!(rows.is_empty());

        let base = vec![candle(0, 1.0), candle(M5, 2.0)];
        let ind = Series::from_values(vec![0, M5], vec![1.0, 1.5]).unwrap();
        let key = TrendKey::new(IndicatorKind::Hma, Timeframe::H1);
        let rows = align(
            &base,
            &ind,
            BaseExtras::default(),
            &[TrendInput { key, series: &empty, tolerance_ms: 6 * H1 }],
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.trend(IndicatorKind::Hma, Timeframe::H1).is_none()));
        assert_eq!(rows[1].base, Some(1.5));
        assert_eq!(rows[1].atr, None);
    }

    #[test]
    fn test_align_rejects_foreign_base_indicator() {
        let base = vec![candle(0, 1.0), candle(M5, 2.0)];
        let ind = Series::from_values(vec![0, 2 * M5], vec![1.0, 1.5]).unwrap();
        assert!(align(&base, &ind, BaseExtras::default(), &[]).is_err());
    }
}
