//! Latest-bar signal snapshot.
//!
//! Compares each timeframe's last close with its reference indicator: the
//! base SMA on the base timeframe and the HMA on every trend timeframe. A
//! direction triggers only when all comparisons hold.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::error::{CoreError, Result};
use crate::indicators::IndicatorKind;
use crate::position::PositionType;
use crate::series::Series;
use crate::timeframe::Timeframe;

/// Timeframes and periods for [`evaluate_signal`].
#[derive(Debug, Clone)]
pub struct SnapshotParams {
    pub base: Timeframe,
    pub trends: Vec<Timeframe>,
    pub sma_period: usize,
    pub hma_period: usize,
}

impl Default for SnapshotParams {
    fn default() -> Self {
        Self {
            base: Timeframe::M5,
            trends: vec![Timeframe::H1, Timeframe::H4],
            sma_period: 200,
            hma_period: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotEntry {
    pub price: Option<f64>,
    pub indicator_value: Option<f64>,
    pub condition_met: bool,
    /// e.g. `SMA200`.
    pub indicator_name: String,
    pub comparator: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalSnapshot {
    pub should_enter: bool,
    /// Set only when `should_enter`.
    pub direction: Option<PositionType>,
    pub breakdown: BTreeMap<Timeframe, SnapshotEntry>,
}

/// Evaluate the latest bar of each timeframe for `direction`.
///
/// Fails with `MissingTimeframe` when any required timeframe is absent from
/// `closes`; a present but too-short series just fails its comparison.
pub fn evaluate_signal(
    closes: &FxHashMap<Timeframe, Series>,
    direction: PositionType,
    params: &SnapshotParams,
) -> Result<SignalSnapshot> {
    let required: Vec<(Timeframe, IndicatorKind, usize)> = std::iter::once((
        params.base,
        IndicatorKind::Sma,
        params.sma_period,
    ))
    .chain(params.trends.iter().map(|tf| (*tf, IndicatorKind::Hma, params.hma_period)))
    .collect();

    let mut missing: Vec<Timeframe> = required
        .iter()
        .map(|(tf, _, _)| *tf)
        .filter(|tf| !closes.contains_key(tf))
        .collect();
    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        let timeframes = missing.iter().map(|tf| tf.to_string()).collect::<Vec<_>>().join(", ");
        return Err(CoreError::MissingTimeframe { timeframes });
    }

    let comparator = match direction {
        PositionType::Long => ">",
        PositionType::Short => "<",
    };

    let mut breakdown = BTreeMap::new();
    for (tf, kind, period) in required {
        let Some(series) = closes.get(&tf) else {
            continue;
        };
        let price = series.last();
        let indicator_value = if series.is_empty() {
            None
        } else {
            kind.compute(series, period)?.last()
        };
        let condition_met = match (price, indicator_value) {
            (Some(p), Some(v)) => match direction {
                PositionType::Long => p > v,
                PositionType::Short => p < v,
            },
            _ => false,
        };
        breakdown.insert(
            tf,
            SnapshotEntry {
                price,
                indicator_value,
                condition_met,
                indicator_name: format!("{}{period}", kind.label()),
                comparator,
            },
        );
    }

    let should_enter = breakdown.values().all(|e| e.condition_met);
    Ok(SignalSnapshot {
        should_enter,
        direction: should_enter.then_some(direction),
        breakdown,
    })
}
