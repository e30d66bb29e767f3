//! Simple, linear-weighted and Hull moving averages.

use crate::error::Result;
use crate::indicators::{rolling, validate};
use crate::series::Series;

/// Arithmetic mean over exactly `period` trailing points.
pub fn sma(series: &Series, period: usize) -> Result<Series> {
    validate(series, period)?;
    Ok(series.with_values(rolling(series.values(), period, |w| w.mean())))
}

/// Linear-weighted mean, weights 1..period (newest heaviest).
pub fn wma(series: &Series, period: usize) -> Result<Series> {
    validate(series, period)?;
    Ok(series.with_values(rolling(series.values(), period, |w| w.weighted_mean())))
}

/// Hull moving average:
///
/// `wma(2·wma(s, period/2) − wma(s, period), round(√period))`
///
/// Both inner windows are floored at 1. The undefined prefix is
/// `(period − 1) + (√period − 1)` for a fully defined input.
pub fn hma(series: &Series, period: usize) -> Result<Series> {
    validate(series, period)?;
    let half = (period / 2).max(1);
    let root = ((period as f64).sqrt().round() as usize).max(1);

    let wma_half = wma(series, half)?;
    let wma_full = wma(series, period)?;
    let hull_input = wma_half.zip_with(&wma_full, |h, f| 2.0 * h - f)?;
    wma(&hull_input, root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(n: usize) -> Series {
        Series::from_values(
            (0..n as i64).map(|i| i * 300_000).collect(),
            (1..=n).map(|v| v as f64).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_sma_window_completeness() {
        let s = linear(5);
        let out = sma(&s, 3).unwrap();
        assert_eq!(out.values(), &[None, None, Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn test_wma_weights_newest_highest() {
        let s = Series::from_values(vec![1, 2, 3], vec![10.0, 20.0, 40.0]).unwrap();
        let out = wma(&s, 3).unwrap();
        // (10*1 + 20*2 + 40*3) / 6
        let expected = 170.0 / 6.0;
        assert!((out.get(2).unwrap() - expected).abs() < 1e-12);
        assert_eq!(out.undefined_prefix(), 2);
    }

    #[test]
    fn test_hma_undefined_prefix_is_longer_than_sma() {
        let s = linear(40);
        let h = hma(&s, 16).unwrap();
        // 15 for wma(16) plus 3 for wma(4)
        assert_eq!(h.undefined_prefix(), 18);
        assert_eq!(sma(&s, 16).unwrap().undefined_prefix(), 15);
    }

    #[test]
    fn test_hma_period_one_is_identity() {
        let s = linear(4);
        let h = hma(&s, 1).unwrap();
        for (a, b) in h.values().iter().zip(s.values()) {
            assert!((a.unwrap() - b.unwrap()).abs() < 1e-12);
        }
    }

    #[test]
    fn test_hma_tracks_linear_input_without_lag() {
        // A Hull MA of a straight line lands on the line.
        let s = linear(60);
        let h = hma(&s, 9).unwrap();
        let last = h.last().unwrap();
        assert!((last - 60.0).abs() < 1e-9, "got {last}");
    }

    #[test]
    fn test_rejects_zero_period_and_empty_input() {
        assert!(sma(&linear(3), 0).is_err());
        assert!(wma(&Series::default(), 2).is_err());
        assert!(hma(&Series::default(), 2).is_err());
    }
}
