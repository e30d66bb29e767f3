//! Long-term bias plus crossover.
//!
//! Bias: the configured source above/below the bias-timeframe HMA.
//! Filter: HMA vs SMA ordering on the first trend timeframe (long wants the
//! HMA below the SMA, i.e. a pullback). Entry: the base SMA crossing the
//! first trend HMA in the bias direction. Exit: stop/take, then the opposite
//! crossing.

use crate::align::{AlignedRow, TrendKey};
use crate::config::{BiasSource, RiskConfig};
use crate::exits::Levels;
use crate::indicators::IndicatorKind;
use crate::position::PositionType;
use crate::reason_codes::ExitReason;
use crate::timeframe::Timeframe;

use super::cross::{cross, Cross};
use super::{Breakdown, BreakdownEntry, CrossMemory, EntrySignal, Policy, Requirements, Variant};

#[derive(Debug, Clone)]
pub struct BiasCrossoverPolicy {
    base: Timeframe,
    trend: Timeframe,
    bias: Timeframe,
    source: BiasSource,
    risk: RiskConfig,
}

impl BiasCrossoverPolicy {
    pub fn new(
        base: Timeframe,
        trend: Timeframe,
        bias: Timeframe,
        source: BiasSource,
        risk: RiskConfig,
    ) -> Self {
        Self { base, trend, bias, source, risk }
    }

    fn bias(&self, row: &AlignedRow) -> (bool, bool) {
        let src = match self.source {
            BiasSource::Close => Some(row.close),
            BiasSource::BaseIndicator => row.base,
        };
        match (src, row.trend(IndicatorKind::Hma, self.bias)) {
            (Some(s), Some(h)) => (s > h, s < h),
            _ => (false, false),
        }
    }

    fn filter(&self, row: &AlignedRow) -> (bool, bool) {
        match (
            row.trend(IndicatorKind::Hma, self.trend),
            row.trend(IndicatorKind::Sma, self.trend),
        ) {
            (Some(h), Some(s)) => (h < s, h > s),
            _ => (false, false),
        }
    }

    fn cross(&self, row: &AlignedRow, memory: &CrossMemory) -> Cross {
        cross(
            memory.prev_base,
            memory.prev(IndicatorKind::Hma, self.trend),
            row.base,
            row.trend(IndicatorKind::Hma, self.trend),
        )
    }
}

impl Policy for BiasCrossoverPolicy {
    fn variant(&self) -> Variant {
        Variant::BiasCrossover
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            trend: vec![
                TrendKey::new(IndicatorKind::Hma, self.trend),
                TrendKey::new(IndicatorKind::Sma, self.trend),
                TrendKey::new(IndicatorKind::Hma, self.bias),
            ],
            ..Requirements::default()
        }
    }

    fn manages_risk(&self) -> bool {
        true
    }

    fn evaluate_exit(&self, row: &AlignedRow, memory: &CrossMemory, held: PositionType) -> Option<ExitReason> {
        let c = self.cross(row, memory);
        let against = match held {
            PositionType::Long => c.down,
            PositionType::Short => c.up,
        };
        against.then_some(ExitReason::Crossover)
    }

    fn evaluate_entry(&self, row: &AlignedRow, memory: &CrossMemory) -> EntrySignal {
        let (bias_long, bias_short) = self.bias(row);
        let (filter_long, filter_short) = self.filter(row);
        let c = self.cross(row, memory);
        EntrySignal {
            long: bias_long && filter_long && c.up,
            short: bias_short && filter_short && c.down,
        }
    }

    fn levels(&self, row: &AlignedRow, pos_type: PositionType) -> Levels {
        Levels::percent(&self.risk, pos_type, row.close)
    }

    fn breakdown(
        &self,
        row: &AlignedRow,
        _memory: &CrossMemory,
        _held: Option<PositionType>,
        entry: EntrySignal,
    ) -> Breakdown {
        let (filter_long, filter_short) = self.filter(row);
        let (bias_long, bias_short) = self.bias(row);
        let mut out = Breakdown::new();
        out.insert(self.base, BreakdownEntry::new(row.close, row.base, entry.long, entry.short));
        out.insert(
            self.trend,
            BreakdownEntry::new(
                row.close,
                row.trend(IndicatorKind::Hma, self.trend),
                filter_long,
                filter_short,
            ),
        );
        out.insert(
            self.bias,
            BreakdownEntry::new(
                row.close,
                row.trend(IndicatorKind::Hma, self.bias),
                bias_long,
                bias_short,
            ),
        );
        out
    }

    /// An unknown trend HMA keeps the last known one for the next crossing.
    fn remember(&self, row: &AlignedRow, memory: &mut CrossMemory) {
        let key = TrendKey::new(IndicatorKind::Hma, self.trend);
        let kept = memory.prev(key.indicator, key.timeframe);
        memory.record(row);
        if row.trend(key.indicator, key.timeframe).is_none() {
            if let Some(tv) = memory.prev_trend.iter_mut().find(|tv| tv.key == key) {
                tv.value = kept;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_rows::row;

    fn policy(source: BiasSource) -> BiasCrossoverPolicy {
        BiasCrossoverPolicy::new(Timeframe::M5, Timeframe::H1, Timeframe::D1, source, RiskConfig::default())
    }

    fn r(close: f64, sma: f64, h1: Option<f64>, s1: f64, d1: f64) -> AlignedRow {
        row(
            close,
            Some(sma),
            &[
                (IndicatorKind::Hma, Timeframe::H1, h1),
                (IndicatorKind::Sma, Timeframe::H1, Some(s1)),
                (IndicatorKind::Hma, Timeframe::D1, Some(d1)),
            ],
        )
    }

    #[test]
    fn test_long_entry_needs_bias_filter_and_cross() {
        let p = policy(BiasSource::Close);
        let mut m = CrossMemory::default();
        p.remember(&r(110.0, 99.0, Some(100.0), 105.0, 90.0), &mut m);
        let cur = r(110.0, 101.0, Some(100.0), 105.0, 90.0);
        assert_eq!(p.evaluate_entry(&cur, &m), EntrySignal { long: true, short: false });

        // Bias flips when the daily HMA is above the close.
        let cur = r(110.0, 101.0, Some(100.0), 105.0, 120.0);
        assert!(!p.evaluate_entry(&cur, &m).long);

        // Filter fails when the 1h HMA is above the 1h SMA.
        let cur = r(110.0, 101.0, Some(100.0), 95.0, 90.0);
        assert!(!p.evaluate_entry(&cur, &m).long);
    }

    #[test]
    fn test_bias_source_base_indicator() {
        let p = policy(BiasSource::BaseIndicator);
        // Close above the daily HMA but the base SMA below it.
        let cur = r(110.0, 101.0, Some(100.0), 105.0, 105.0);
        assert_eq!(p.bias(&cur), (false, true));
        assert_eq!(policy(BiasSource::Close).bias(&cur), (true, false));
    }

    #[test]
    fn test_memory_keeps_last_known_trend_hma() {
        let p = policy(BiasSource::Close);
        let mut m = CrossMemory::default();
        p.remember(&r(110.0, 99.0, Some(100.0), 105.0, 90.0), &mut m);
        p.remember(&r(110.0, 99.5, None, 105.0, 90.0), &mut m);
        assert_eq!(m.prev_base, Some(99.5));
        assert_eq!(m.prev(IndicatorKind::Hma, Timeframe::H1), Some(100.0));

        let cur = r(110.0, 101.0, Some(100.0), 105.0, 90.0);
        assert!(p.evaluate_entry(&cur, &m).long);
    }

    #[test]
    fn test_exit_on_opposite_cross() {
        let p = policy(BiasSource::Close);
        let mut m = CrossMemory::default();
        p.remember(&r(100.0, 101.0, Some(100.0), 105.0, 90.0), &mut m);
        let cur = r(100.0, 99.0, Some(100.0), 105.0, 90.0);
        assert_eq!(p.evaluate_exit(&cur, &m, PositionType::Long), Some(ExitReason::Crossover));
        assert_eq!(p.evaluate_exit(&cur, &m, PositionType::Short), None);
    }
}
