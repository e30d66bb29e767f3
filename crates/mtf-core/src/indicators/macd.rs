use crate::error::{CoreError, Result};
use crate::indicators::ema::ema_values;
use crate::indicators::validate;
use crate::series::Series;

/// MACD output: all three lines share the input timeline.
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd: Series,
    pub signal: Series,
    pub histogram: Series,
}

/// MACD from three first-value-seeded EMAs.
///
/// `macd = ema(fast) − ema(slow)`, `signal = ema(macd, signal)`,
/// `histogram = macd − signal`. Defined from the first point.
pub fn macd(close: &Series, fast: usize, slow: usize, signal: usize) -> Result<MacdSeries> {
    validate(close, fast)?;
    if slow == 0 || signal == 0 {
        return Err(CoreError::invalid("macd periods must be positive"));
    }

    let fast_line = ema_values(close.values(), fast);
    let slow_line = ema_values(close.values(), slow);
    let macd_line: Vec<Option<f64>> = fast_line
        .iter()
        .zip(slow_line.iter())
        .map(|(f, s)| match (f, s) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();
    let signal_line = ema_values(&macd_line, signal);
    let hist: Vec<Option<f64>> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| match (m, s) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();

    Ok(MacdSeries {
        macd: close.with_values(macd_line),
        signal: close.with_values(signal_line),
        histogram: close.with_values(hist),
    })
}
