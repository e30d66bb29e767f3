use crate::error::{CoreError, Result};
use crate::indicators::{rolling, validate};
use crate::series::Series;

/// Per-bar true range: `max(h−l, |h−c_prev|, |l−c_prev|)`.
///
/// The first bar (or any bar whose previous close is undefined) uses `h−l`.
pub fn true_range(high: &Series, low: &Series, close: &Series) -> Result<Series> {
    if high.timestamps() != low.timestamps() || high.timestamps() != close.timestamps() {
        return Err(CoreError::invalid(
            "high, low and close must share one timeline",
        ));
    }
    high.check()?;

    let h = high.values();
    let l = low.values();
    let c = close.values();
    let tr = (0..h.len())
        .map(|i| {
            let (hi, lo) = (h[i]?, l[i]?);
            let hl = hi - lo;
            let prev_close = if i == 0 { None } else { c[i - 1] };
            Some(match prev_close {
                Some(pc) => hl.max((hi - pc).abs()).max((lo - pc).abs()),
                None => hl,
            })
        })
        .collect();
    Ok(high.with_values(tr))
}

/// Average true range: trailing mean of the true range over `period` bars.
pub fn atr(high: &Series, low: &Series, close: &Series, period: usize) -> Result<Series> {
    validate(high, period)?;
    let tr = true_range(high, low, close)?;
    Ok(tr.with_values(rolling(tr.values(), period, |w| w.mean())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(vals: &[f64]) -> Series {
        Series::from_values((0..vals.len() as i64).collect(), vals.to_vec()).unwrap()
    }

    #[test]
    fn test_first_bar_is_high_minus_low() {
        let tr = true_range(&s(&[12.0, 15.0]), &s(&[10.0, 14.0]), &s(&[11.0, 14.5])).unwrap();
        assert_eq!(tr.get(0), Some(2.0));
        // Gap up: |15 - 11| = 4 beats h-l = 1
        assert_eq!(tr.get(1), Some(4.0));
    }

    #[test]
    fn test_atr_is_trailing_mean() {
        let high = s(&[12.0, 15.0, 16.0]);
        let low = s(&[10.0, 14.0, 13.0]);
        let close = s(&[11.0, 14.5, 15.0]);
        let out = atr(&high, &low, &close, 2).unwrap();
        assert_eq!(out.get(0), None);
        // TR = [2, 4, 3]
        assert_eq!(out.get(1), Some(3.0));
        assert_eq!(out.get(2), Some(3.5));
    }

    #[test]
    fn test_rejects_mismatched_inputs() {
        let r = atr(&s(&[1.0, 2.0]), &s(&[1.0]), &s(&[1.0, 2.0]), 1);
        assert!(r.is_err());
    }
}
