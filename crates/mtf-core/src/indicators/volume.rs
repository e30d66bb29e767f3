use crate::error::Result;
use crate::indicators::{rolling, validate};
use crate::series::Series;

/// Trailing mean of volume; same completeness rule as the SMA.
pub fn volume_average(volume: &Series, period: usize) -> Result<Series> {
    validate(volume, period)?;
    Ok(volume.with_values(rolling(volume.values(), period, |w| w.mean())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_average_window() {
        let v = Series::from_values(vec![1, 2, 3, 4], vec![10.0, 20.0, 30.0, 100.0]).unwrap();
        let out = volume_average(&v, 3).unwrap();
        assert_eq!(out.values(), &[None, None, Some(20.0), Some(50.0)]);
    }
}
