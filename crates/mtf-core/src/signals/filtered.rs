//! Crossover entry gated by volatility, volume, trend and HMA-ordering
//! filters, with ATR-multiple stop/take.
//!
//! Exits: stop/take first (engine), then a candle body back across the base
//! SMA.

use crate::align::{AlignedRow, TrendKey};
use crate::config::FilteredConfig;
use crate::exits::Levels;
use crate::indicators::IndicatorKind;
use crate::position::PositionType;
use crate::reason_codes::ExitReason;
use crate::timeframe::Timeframe;

use super::cross::{cross, Cross};
use super::{
    Breakdown, BreakdownEntry, CrossMemory, EntrySignal, FilterReport, Policy, Requirements,
    Variant,
};

#[derive(Debug, Clone)]
pub struct FilteredCrossoverPolicy {
    base: Timeframe,
    trend_one: Timeframe,
    trend_two: Timeframe,
    cfg: FilteredConfig,
}

/// ATR as a percentage of `close`; unknown when `close` is zero.
pub fn atr_percent(atr: Option<f64>, close: f64) -> Option<f64> {
    let atr = atr?;
    (close != 0.0).then(|| atr / close * 100.0)
}

/// Volume over its rolling average; unknown when the average is zero.
pub fn volume_ratio(volume: f64, average: Option<f64>) -> Option<f64> {
    let avg = average?;
    (avg != 0.0).then(|| volume / avg)
}

struct Gates {
    cross: Cross,
    volatility_ok: bool,
    volume_ok: bool,
    mtf_long: bool,
    mtf_short: bool,
    trend_long: bool,
    trend_short: bool,
    atr_percent: Option<f64>,
    volume_ratio: Option<f64>,
}

impl FilteredCrossoverPolicy {
    pub fn new(base: Timeframe, trend_one: Timeframe, trend_two: Timeframe, cfg: FilteredConfig) -> Self {
        Self { base, trend_one, trend_two, cfg }
    }

    fn gates(&self, row: &AlignedRow, memory: &CrossMemory) -> Gates {
        let h1 = row.trend(IndicatorKind::Hma, self.trend_one);
        let h2 = row.trend(IndicatorKind::Hma, self.trend_two);
        let atr_pct = atr_percent(row.atr, row.close);
        let vol_ratio = volume_ratio(row.volume, row.volume_avg);
        let (mtf_long, mtf_short) = match (h1, h2) {
            (Some(a), Some(b)) => (a > b, a < b),
            _ => (false, false),
        };
        let (trend_long, trend_short) = match row.base {
            Some(sma) => (row.close > sma, row.close < sma),
            None => (false, false),
        };
        Gates {
            cross: cross(
                memory.prev_base,
                memory.prev(IndicatorKind::Hma, self.trend_two),
                row.base,
                h2,
            ),
            volatility_ok: atr_pct.map_or(true, |p| p <= self.cfg.max_atr_percent),
            volume_ok: vol_ratio.map_or(true, |r| r > 1.0),
            mtf_long,
            mtf_short,
            trend_long,
            trend_short,
            atr_percent: atr_pct,
            volume_ratio: vol_ratio,
        }
    }
}

impl Policy for FilteredCrossoverPolicy {
    fn variant(&self) -> Variant {
        Variant::FilteredCrossover
    }

    fn requirements(&self) -> Requirements {
        Requirements {
            trend: vec![
                TrendKey::new(IndicatorKind::Hma, self.trend_one),
                TrendKey::new(IndicatorKind::Hma, self.trend_two),
            ],
            atr_period: Some(self.cfg.atr_period),
            volume_period: Some(self.cfg.volume_period),
        }
    }

    fn manages_risk(&self) -> bool {
        true
    }

    fn evaluate_exit(&self, row: &AlignedRow, _memory: &CrossMemory, held: PositionType) -> Option<ExitReason> {
        let sma = row.base?;
        let broken = match held {
            PositionType::Long => row.open < sma && row.close < sma,
            PositionType::Short => row.open > sma && row.close > sma,
        };
        broken.then_some(ExitReason::SmaBreak)
    }

    fn evaluate_entry(&self, row: &AlignedRow, memory: &CrossMemory) -> EntrySignal {
        let g = self.gates(row, memory);
        let common = g.volatility_ok && g.volume_ok;
        EntrySignal {
            long: g.cross.up && common && g.trend_long && g.mtf_long,
            short: g.cross.down && common && g.trend_short && g.mtf_short,
        }
    }

    fn levels(&self, row: &AlignedRow, pos_type: PositionType) -> Levels {
        Levels::atr_multiple(&self.cfg, pos_type, row.close, row.atr)
    }

    fn breakdown(
        &self,
        row: &AlignedRow,
        memory: &CrossMemory,
        _held: Option<PositionType>,
        entry: EntrySignal,
    ) -> Breakdown {
        let g = self.gates(row, memory);
        let mut out = Breakdown::new();
        out.insert(self.base, BreakdownEntry::new(row.close, row.base, entry.long, entry.short));
        out.insert(
            self.trend_one,
            BreakdownEntry::new(
                row.close,
                row.trend(IndicatorKind::Hma, self.trend_one),
                g.mtf_long,
                g.mtf_short,
            ),
        );
        out.insert(
            self.trend_two,
            BreakdownEntry::new(
                row.close,
                row.trend(IndicatorKind::Hma, self.trend_two),
                g.cross.up,
                g.cross.down,
            ),
        );
        out
    }

    fn filters(&self, row: &AlignedRow, memory: &CrossMemory) -> Option<FilterReport> {
        let g = self.gates(row, memory);
        let long = self.levels(row, PositionType::Long);
        let short = self.levels(row, PositionType::Short);
        Some(FilterReport {
            atr: row.atr,
            atr_percent: g.atr_percent,
            volume_ratio: g.volume_ratio,
            volatility_ok: g.volatility_ok,
            volume_ok: g.volume_ok,
            crossover_long: g.cross.up,
            crossover_short: g.cross.down,
            stop_loss_long: long.stop,
            take_profit_long: long.take,
            stop_loss_short: short.stop,
            take_profit_short: short.take,
        })
    }
}
