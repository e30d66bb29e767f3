//! Relative Strength Index over trailing-window means of gains and losses.
//!
//! The first point has no delta, so with a fully defined input the RSI is
//! defined from index `period` onward.
//!
//! Zero-loss convention: when the average loss over the window is exactly 0
//! the RSI is 100.0, including a perfectly flat window.

use crate::error::Result;
use crate::indicators::{rolling, validate};
use crate::series::Series;

pub fn rsi(close: &Series, period: usize) -> Result<Series> {
    validate(close, period)?;
    let values = close.values();

    let mut gains = Vec::with_capacity(values.len());
    let mut losses = Vec::with_capacity(values.len());
    gains.push(None);
    losses.push(None);
    for w in values.windows(2) {
        match (w[0], w[1]) {
            (Some(prev), Some(cur)) => {
                let delta = cur - prev;
                gains.push(Some(delta.max(0.0)));
                losses.push(Some((-delta).max(0.0)));
            }
            _ => {
                gains.push(None);
                losses.push(None);
            }
        }
    }

    let avg_gain = rolling(&gains, period, |w| w.mean());
    let avg_loss = rolling(&losses, period, |w| w.mean());

    let out = avg_gain
        .iter()
        .zip(avg_loss.iter())
        .map(|(g, l)| match (g, l) {
            (Some(g), Some(l)) => Some(rsi_from_averages(*g, *l)),
            _ => None,
        })
        .collect();
    Ok(close.with_values(out))
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
