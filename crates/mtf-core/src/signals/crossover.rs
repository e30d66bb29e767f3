//! Base SMA / trend HMA crossover with percentage stop/take.
//!
//! Entry is the crossing against the second (slower) trend HMA. While in a
//! position the exit ladder is stop > take > body break > crossover against
//! either trend HMA.

use crate::align::{AlignedRow, TrendKey};
use crate::config::RiskConfig;
use crate::exits::Levels;
use crate::indicators::IndicatorKind;
use crate::position::PositionType;
use crate::reason_codes::ExitReason;
use crate::timeframe::Timeframe;

use super::cross::{cross, Cross};
use super::{Breakdown, BreakdownEntry, CrossMemory, EntrySignal, Policy, Requirements, Variant};

#[derive(Debug, Clone)]
pub struct CrossoverPolicy {
    base: Timeframe,
    trend_one: Timeframe,
    trend_two: Timeframe,
    risk: RiskConfig,
}

impl CrossoverPolicy {
    pub fn new(base: Timeframe, trend_one: Timeframe, trend_two: Timeframe, risk: RiskConfig) -> Self {
        Self { base, trend_one, trend_two, risk }
    }

    fn cross_against(&self, row: &AlignedRow, memory: &CrossMemory, tf: Timeframe) -> Cross {
        cross(
            memory.prev_base,
            memory.prev(IndicatorKind::Hma, tf),
            row.base,
            row.trend(IndicatorKind::Hma, tf),
        )
    }

    /// Open and close beyond both trend HMAs, against `held`.
    fn body_break(&self, row: &AlignedRow, held: PositionType) -> bool {
        let (Some(h1), Some(h2)) = (
            row.trend(IndicatorKind::Hma, self.trend_one),
            row.trend(IndicatorKind::Hma, self.trend_two),
        ) else {
            return false;
        };
        let beyond = |level: f64| match held {
            PositionType::Long => row.open < level && row.close < level,
            PositionType::Short => row.open > level && row.close > level,
        };
        beyond(h1) && beyond(h2)
    }
}

impl Policy for CrossoverPolicy {
    fn variant(&self) -> Variant {
        Variant::Crossover
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

    fn manages_risk(&self) -> bool {
        true
    }

    fn evaluate_exit(&self, row: &AlignedRow, memory: &CrossMemory, held: PositionType) -> Option<ExitReason> {
        if self.body_break(row, held) {
            return Some(ExitReason::BodyBreak);
        }
        let c1 = self.cross_against(row, memory, self.trend_one);
        let c2 = self.cross_against(row, memory, self.trend_two);
        let crossed = match held {
            PositionType::Long => c1.down || c2.down,
            PositionType::Short => c1.up || c2.up,
        };
        crossed.then_some(ExitReason::Crossover)
    }

    fn evaluate_entry(&self, row: &AlignedRow, memory: &CrossMemory) -> EntrySignal {
        let c = self.cross_against(row, memory, self.trend_two);
        EntrySignal { long: c.up, short: c.down }
    }

    fn levels(&self, row: &AlignedRow, pos_type: PositionType) -> Levels {
        Levels::percent(&self.risk, pos_type, row.close)
    }

    /// Trend one never gates an entry. While long it reports that the base
    /// SMA is still holding above it (no down-cross); while short, that it
    /// has crossed back up. Trend two reports the entry crossings.
    fn breakdown(
        &self,
        row: &AlignedRow,
        memory: &CrossMemory,
        held: Option<PositionType>,
        entry: EntrySignal,
    ) -> Breakdown {
        let body_break = held.map(|side| self.body_break(row, side));
        let c1 = self.cross_against(row, memory, self.trend_one);
        let holding_long = held == Some(PositionType::Long) && !c1.down;
        let crossed_short = held == Some(PositionType::Short) && c1.up;

        let mut trend_one = BreakdownEntry::new(
            row.close,
            row.trend(IndicatorKind::Hma, self.trend_one),
            holding_long,
            crossed_short,
        );
        trend_one.condition_met = false;
        trend_one.exit_on_body_break = Some(body_break.unwrap_or(false));

        let mut trend_two = BreakdownEntry::new(
            row.close,
            row.trend(IndicatorKind::Hma, self.trend_two),
            entry.long,
            entry.short,
        );
        trend_two.exit_on_body_break = Some(body_break.unwrap_or(false));

        let mut out = Breakdown::new();
        out.insert(self.base, BreakdownEntry::new(row.close, row.base, entry.long, entry.short));
        out.insert(self.trend_one, trend_one);
        out.insert(self.trend_two, trend_two);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::test_rows::row;

    fn policy() -> CrossoverPolicy {
        CrossoverPolicy::new(Timeframe::M5, Timeframe::H1, Timeframe::H4, RiskConfig::default())
    }

    fn r(close: f64, sma: f64, h1: f64, h4: f64) -> AlignedRow {
        row(
            close,
            Some(sma),
            &[
                (IndicatorKind::Hma, Timeframe::H1, Some(h1)),
                (IndicatorKind::Hma, Timeframe::H4, Some(h4)),
            ],
        )
    }

    fn memory_of(prev: &AlignedRow) -> CrossMemory {
        let mut m = CrossMemory::default();
        m.record(prev);
        m
    }

    #[test]
    fn test_entry_on_cross_against_trend_two() {
        let prev = r(100.0, 99.0, 90.0, 100.0);
        let cur = r(101.0, 101.0, 90.0, 100.0);
        let e = policy().evaluate_entry(&cur, &memory_of(&prev));
        assert_eq!(e, EntrySignal { long: true, short: false });

        // No memory → no crossover.
        let e = policy().evaluate_entry(&cur, &CrossMemory::default());
        assert_eq!(e, EntrySignal::default());
    }

    #[test]
    fn test_body_break_precedes_crossover() {
        let prev = r(100.0, 100.0, 99.0, 98.0);
        // SMA drops under trend one and the body is below both HMAs.
        let cur = r(97.0, 98.5, 99.0, 98.0);
        let exit = policy().evaluate_exit(&cur, &memory_of(&prev), PositionType::Long);
        assert_eq!(exit, Some(ExitReason::BodyBreak));
    }

    #[test]
    fn test_crossover_exit_on_trend_one() {
        let prev = r(100.0, 100.0, 99.0, 101.0);
        let cur = r(100.0, 98.0, 99.0, 101.0);
        let exit = policy().evaluate_exit(&cur, &memory_of(&prev), PositionType::Long);
        assert_eq!(exit, Some(ExitReason::Crossover));
        assert_eq!(policy().evaluate_exit(&cur, &memory_of(&prev), PositionType::Short), None);
    }

    #[test]
    fn test_trend_one_breakdown_tracks_held_side() {
        let p = policy();
        let prev = r(100.0, 100.0, 99.0, 101.0);
        let mem = memory_of(&prev);

        // SMA stays above trend one: a held long is still intact.
        let steady = r(100.0, 100.5, 99.0, 101.0);
        let b = p.breakdown(&steady, &mem, Some(PositionType::Long), EntrySignal::default());
        let one = b[&Timeframe::H1];
        assert!(one.condition_long);
        assert!(!one.condition_short);
        assert!(!one.condition_met);
        assert_eq!(one.exit_on_body_break, Some(false));

        // SMA crosses below trend one: the long is no longer holding.
        let broken = r(100.0, 98.0, 99.0, 101.0);
        let b = p.breakdown(&broken, &mem, Some(PositionType::Long), EntrySignal::default());
        assert!(!b[&Timeframe::H1].condition_long);

        // Flat: nothing to report on trend one.
        let b = p.breakdown(&steady, &mem, None, EntrySignal::default());
        let one = b[&Timeframe::H1];
        assert!(!one.condition_long && !one.condition_short && !one.condition_met);
        assert_eq!(one.exit_on_body_break, Some(false));

        // Held short, SMA crosses back above trend one.
        let prev = r(100.0, 98.0, 99.0, 101.0);
        let up = r(100.0, 100.0, 99.0, 101.0);
        let b = p.breakdown(&up, &memory_of(&prev), Some(PositionType::Short), EntrySignal::default());
        let one = b[&Timeframe::H1];
        assert!(one.condition_short);
        assert!(!one.condition_met);
    }

    #[test]
    fn test_percent_levels_from_close() {
        let l = policy().levels(&r(200.0, 1.0, 1.0, 1.0), PositionType::Long);
        assert!((l.stop.unwrap() - 180.0).abs() < 1e-9);
        assert_eq!(l.take, None);
    }
}
