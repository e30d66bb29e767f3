use serde::{Deserialize, Serialize};

use crate::series::Series;

/// OHLCV candle with contiguous layout, prices as `f64` for in-memory work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(rename = "time", with = "crate::timestamp::iso_ms")]
    pub t: i64, // open time (ms since epoch, UTC)
    #[serde(rename = "open")]
    pub o: f64,
    #[serde(rename = "high")]
    pub h: f64,
    #[serde(rename = "low")]
    pub l: f64,
    #[serde(rename = "close")]
    pub c: f64,
    #[serde(rename = "volume")]
    pub v: f64,
}

fn column(candles: &[Candle], f: impl Fn(&Candle) -> f64) -> Series {
    Series::from_parts(
        candles.iter().map(|c| c.t).collect(),
        candles.iter().map(|c| Some(f(c))).collect(),
    )
}

pub fn highs(candles: &[Candle]) -> Series {
    column(candles, |c| c.h)
}

pub fn lows(candles: &[Candle]) -> Series {
    column(candles, |c| c.l)
}

pub fn closes(candles: &[Candle]) -> Series {
    column(candles, |c| c.c)
}

pub fn volumes(candles: &[Candle]) -> Series {
    column(candles, |c| c.v)
}

/// Sort ascending by open time and drop duplicate timestamps (first wins).
pub fn normalize(candles: &mut Vec<Candle>) {
    candles.sort_by_key(|c| c.t);
    candles.dedup_by_key(|c| c.t);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(t: i64, c: f64) -> Candle {
        Candle { t, o: c, h: c + 1.0, l: c - 1.0, c, v: 1.0 }
    }

    #[test]
    fn test_normalize_sorts_and_dedupes() {
        let mut v = vec![bar(3, 3.0), bar(1, 1.0), bar(3, 9.0), bar(2, 2.0)];
        normalize(&mut v);
        assert_eq!(v.iter().map(|c| c.t).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(v[2].c, 3.0);
    }

    #[test]
    fn test_columns_follow_candles() {
        let v = vec![bar(0, 10.0), bar(300_000, 11.0)];
        let h = highs(&v);
        assert_eq!(h.timestamps(), &[0, 300_000]);
        assert_eq!(h.values(), &[Some(11.0), Some(12.0)]);
        assert_eq!(closes(&v).values(), &[Some(10.0), Some(11.0)]);
    }

    #[test]
    fn test_serializes_with_iso_time() {
        let json = serde_json::to_value(bar(0, 1.0)).unwrap();
        assert_eq!(json["time"], "1970-01-01T00:00:00+00:00");
        assert_eq!(json["close"], 1.0);
    }
}
