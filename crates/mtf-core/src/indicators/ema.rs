use crate::error::Result;
use crate::indicators::validate;
use crate::series::Series;

/// Exponential Moving Average, computed incrementally.
///
/// Behaviour:
///   bar 0  → value = price (first observation)
///   bar 1+ → value = α·price + (1−α)·prev   where α = 2/(span+1)
///
/// Unlike the window averages there is no warm-up gap: the EMA is defined
/// from the first point.
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    pub value: f64,
    count: usize,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        Self {
            alpha: 2.0 / (span as f64 + 1.0),
            value: 0.0,
            count: 0,
        }
    }

    /// Feed one price, return the current EMA value.
    pub fn update(&mut self, price: f64) -> f64 {
        if self.count == 0 {
            self.value = price;
        } else {
            self.value = self.alpha * price + (1.0 - self.alpha) * self.value;
        }
        self.count += 1;
        self.value
    }
}

/// EMA over a series. Undefined inputs stay undefined and do not advance the
/// average.
pub fn ema(series: &Series, span: usize) -> Result<Series> {
    validate(series, span)?;
    Ok(series.with_values(ema_values(series.values(), span)))
}

pub(crate) fn ema_values(values: &[Option<f64>], span: usize) -> Vec<Option<f64>> {
    let mut e = Ema::new(span);
    values.iter().map(|v| v.map(|v| e.update(v))).collect()
}
