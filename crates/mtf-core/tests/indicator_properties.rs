use mtf_core::align::asof_backward;
use mtf_core::indicators::{hma, sma};
use mtf_core::series::Series;
use proptest::prelude::*;

const M5: i64 = 300_000;
const H1: i64 = 3_600_000;

fn series(values: &[f64]) -> Series {
    Series::from_values((0..values.len() as i64).collect(), values.to_vec()).unwrap()
}

/// Plain loop WMA used as the reference: weights 1..=p, newest heaviest.
fn reference_wma(values: &[Option<f64>], p: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            if i + 1 < p {
                return None;
            }
            let mut num = 0.0;
            for (w, v) in values[i + 1 - p..=i].iter().enumerate() {
                num += (w + 1) as f64 * (*v)?;
            }
            Some(num / (p * (p + 1) / 2) as f64)
        })
        .collect()
}

proptest! {
    #[test]
    fn sma_is_exact_mean_of_complete_windows(
        values in prop::collection::vec(-1_000.0f64..1_000.0, 1..80),
        period in 1usize..25,
    ) {
        let out = sma(&series(&values), period).unwrap();
        prop_assert_eq!(out.len(), values.len());
        for (i, v) in out.values().iter().enumerate() {
            if i + 1 < period {
                prop_assert!(v.is_none());
            } else {
                let window = &values[i + 1 - period..=i];
                let mean = window.iter().sum::<f64>() / period as f64;
                let got = v.unwrap();
                prop_assert!((got - mean).abs() <= 1e-9 * mean.abs().max(1.0));
            }
        }
    }
}

#[test]
fn hma_matches_reference_formula() {
    let values: Vec<f64> = (1..=300).map(f64::from).collect();
    let got = hma(&series(&values), 200).unwrap();

    let defined: Vec<Option<f64>> = values.iter().map(|v| Some(*v)).collect();
    let half = reference_wma(&defined, 100);
    let full = reference_wma(&defined, 200);
    let diff: Vec<Option<f64>> = half
        .iter()
        .zip(&full)
        .map(|(h, f)| Some(2.0 * (*h)? - (*f)?))
        .collect();
    let expected = reference_wma(&diff, 14);

    assert_eq!(got.undefined_prefix(), 199 + 13);
    for (i, (g, e)) in got.values().iter().zip(&expected).enumerate() {
        match (g, e) {
            (Some(g), Some(e)) => assert!((g - e).abs() < 1e-9, "index {i}: {g} vs {e}"),
            (None, None) => {}
            _ => panic!("definedness differs at index {i}"),
        }
    }
}

#[test]
fn asof_join_takes_latest_hourly_value() {
    // Base every 5 minutes; hourly points every 12 base rows, first one at
    // base row 3.
    let base_ts: Vec<i64> = (0..60).map(|i| i * M5).collect();
    let hourly_ts: Vec<i64> = (0..5).map(|k| 3 * M5 + k * H1).collect();
    let hourly = Series::from_values(hourly_ts.clone(), (0..5).map(|k| 10.0 * (k + 1) as f64).collect()).unwrap();

    let joined = asof_backward(&base_ts, &hourly, 6 * H1);
    for (i, (t, v)) in base_ts.iter().zip(&joined).enumerate() {
        let latest = hourly_ts.iter().rposition(|ht| ht <= t);
        match latest {
            None => assert_eq!(*v, None, "row {i} precedes the first hourly point"),
            Some(k) => assert_eq!(*v, Some(10.0 * (k + 1) as f64), "row {i}"),
        }
    }
    assert_eq!(joined[2], None);
    assert_eq!(joined[3], Some(10.0));
    assert_eq!(joined[14], Some(10.0));
    assert_eq!(joined[15], Some(20.0));
}

#[test]
fn asof_join_respects_tolerance() {
    let hourly = Series::from_values(vec![0], vec![1.0]).unwrap();
    let joined = asof_backward(&[0, 6 * H1, 6 * H1 + 1], &hourly, 6 * H1);
    assert_eq!(joined, vec![Some(1.0), Some(1.0), None]);
}
