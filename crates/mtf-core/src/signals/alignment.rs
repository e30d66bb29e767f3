//! Multi-timeframe alignment: close on the same side of the base SMA and of
//! both trend HMAs. Exit on a candle body back across the base SMA.

use crate::align::{AlignedRow, TrendKey};
use crate::indicators::IndicatorKind;
use crate::position::PositionType;
use crate::reason_codes::ExitReason;
use crate::timeframe::Timeframe;

use super::{Breakdown, BreakdownEntry, CrossMemory, EntrySignal, Policy, Requirements, Variant};

#[derive(Debug, Clone)]
pub struct AlignmentPolicy {
    base: Timeframe,
    trend_one: Timeframe,
    trend_two: Timeframe,
}

/// Close vs one reference level; unknown reference → neither side.
fn side_of(close: f64, level: Option<f64>) -> (bool, bool) {
    match level {
        Some(v) => (close > v, close < v),
        None => (false, false),
    }
}

impl AlignmentPolicy {
    pub fn new(base: Timeframe, trend_one: Timeframe, trend_two: Timeframe) -> Self {
        Self { base, trend_one, trend_two }
    }

    fn levels(&self, row: &AlignedRow) -> [(Timeframe, Option<f64>); 3] {
        [
            (self.base, row.base),
            (self.trend_one, row.trend(IndicatorKind::Hma, self.trend_one)),
            (self.trend_two, row.trend(IndicatorKind::Hma, self.trend_two)),
        ]
    }
}

impl Policy for AlignmentPolicy {
    fn variant(&self) -> Variant {
        Variant::Alignment
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            trend: vec![
                TrendKey::new(IndicatorKind::Hma, self.trend_one),
                TrendKey::new(IndicatorKind::Hma, self.trend_two),
            ],
            ..Requirements::default()
        }
    }

    fn evaluate_exit(&self, row: &AlignedRow, _memory: &CrossMemory, held: PositionType) -> Option<ExitReason> {
        let sma = row.base?;
        let broken = match held {
            PositionType::Long => row.open < sma && row.close < sma,
            PositionType::Short => row.open > sma && row.close > sma,
        };
        broken.then_some(ExitReason::SmaBreak)
    }

    fn evaluate_entry(&self, row: &AlignedRow, _memory: &CrossMemory) -> EntrySignal {
        self.levels(row)
            .iter()
            .map(|(_, level)| side_of(row.close, *level))
            .fold(EntrySignal { long: true, short: true }, |acc, (l, s)| EntrySignal {
                long: acc.long && l,
                short: acc.short && s,
            })
    }

    fn breakdown(
        &self,
        row: &AlignedRow,
        _memory: &CrossMemory,
        _held: Option<PositionType>,
        _entry: EntrySignal,
    ) -> Breakdown {
        self.levels(row)
            .into_iter()
            .map(|(tf, level)| {
                let (long, short) = side_of(row.close, level);
                (tf, BreakdownEntry::new(row.close, level, long, short))
            })
            .collect()
    }
}
