//! Timestamped value series with an explicit "undefined" state.
//!
//! Indicator outputs keep the input length; positions without a full window
//! hold `None` instead of a partial or zero value.

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    t: Vec<i64>,
    values: Vec<Option<f64>>,
}

impl Series {
    /// Build a checked series: equal lengths and strictly increasing timestamps.
    pub fn new(t: Vec<i64>, values: Vec<Option<f64>>) -> Result<Self> {
        let s = Self { t, values };
        s.check()?;
        Ok(s)
    }

    /// Build a checked series from plain values (all defined).
    pub fn from_values(t: Vec<i64>, values: Vec<f64>) -> Result<Self> {
        Self::new(t, values.into_iter().map(Some).collect())
    }

    /// Unchecked constructor for columns derived from an existing timeline.
    pub(crate) fn from_parts(t: Vec<i64>, values: Vec<Option<f64>>) -> Self {
        debug_assert_eq!(t.len(), values.len());
        Self { t, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.t
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, i: usize) -> Option<f64> {
        self.values.get(i).copied().flatten()
    }

    /// Last value of the series, undefined when empty or still warming up.
    pub fn last(&self) -> Option<f64> {
        self.values.last().copied().flatten()
    }

    /// `(timestamp, value)` pairs including undefined positions.
    pub fn iter(&self) -> impl Iterator<Item = (i64, Option<f64>)> + '_ {
        self.t.iter().copied().zip(self.values.iter().copied())
    }

    /// Only the defined points.
    pub fn defined(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.iter().filter_map(|(t, v)| v.map(|v| (t, v)))
    }

    /// Number of leading undefined values.
    pub fn undefined_prefix(&self) -> usize {
        self.values.iter().take_while(|v| v.is_none()).count()
    }

    /// Same timeline, replacement values.
    pub(crate) fn with_values(&self, values: Vec<Option<f64>>) -> Series {
        Series::from_parts(self.t.clone(), values)
    }

    /// Point-wise combination of two series on the same timeline.
    pub fn zip_with(
        &self,
        other: &Series,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<Series> {
        if self.t != other.t {
            return Err(CoreError::invalid("series timelines differ"));
        }
        let values = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => Some(f(*a, *b)),
                _ => None,
            })
            .collect();
        Ok(self.with_values(values))
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.t.len() != self.values.len() {
            return Err(CoreError::invalid(format!(
                "series has {} timestamps but {} values",
                self.t.len(),
                self.values.len()
            )));
        }
        if let Some(w) = self.t.windows(2).find(|w| w[1] <= w[0]) {
            return Err(CoreError::invalid(format!(
                "series timestamps must be strictly increasing ({} then {})",
                w[0], w[1]
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_unordered_timestamps() {
        assert!(Series::from_values(vec![1, 1], vec![1.0, 2.0]).is_err());
        assert!(Series::from_values(vec![2, 1], vec![1.0, 2.0]).is_err());
        assert!(Series::from_values(vec![1, 2], vec![1.0]).is_err());
        assert!(Series::from_values(vec![1, 2], vec![1.0, 2.0]).is_ok());
    }

    #[test]
    fn test_zip_with_propagates_undefined() {
        let a = Series::new(vec![1, 2, 3], vec![None, Some(2.0), Some(3.0)]).unwrap();
        let b = Series::new(vec![1, 2, 3], vec![Some(1.0), None, Some(1.0)]).unwrap();
        let c = a.zip_with(&b, |x, y| x - y).unwrap();
        assert_eq!(c.values(), &[None, None, Some(2.0)]);
        assert_eq!(c.undefined_prefix(), 2);
        assert_eq!(c.defined().collect::<Vec<_>>(), vec![(3, 2.0)]);
    }
}
