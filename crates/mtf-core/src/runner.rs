//! Run orchestration: fetch candles, compute indicators, align, replay.
//!
//! A run fetches the view candles first (nothing to show means nothing to
//! compute), then a bounded window of base candles, then every trend
//! timeframe the chosen policy reads. Batch entry points fan out over rayon;
//! the candle source is the only shared state.

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::align::{align, BaseExtras, TrendInput, TrendKey};
use crate::candle::{closes, highs, lows, volumes, Candle};
use crate::config::EvaluationConfig;
use crate::divergence::{dedup_divergences, detect_all, Divergence};
use crate::engine::run_machine;
use crate::entry_align::align_entries;
use crate::error::{CoreError, Result};
use crate::indicators::{atr, sma, volume_average, IndicatorKind};
use crate::report::{build_summary, indicator_points, IndicatorPayload, RunResult};
use crate::series::Series;
use crate::signals::{build_policy, Variant};
use crate::source::{CandleSource, TimeRange};
use crate::timeframe::Timeframe;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub symbol: String,
    /// Display timeframe; entries are projected onto its candles.
    pub view_timeframe: Timeframe,
    pub base_timeframe: Timeframe,
    /// Finest first.
    pub trend_timeframes: Vec<Timeframe>,
    pub variant: Variant,
    pub range: TimeRange,
    /// Most recent view candles to return.
    pub limit: Option<usize>,
}

impl RunRequest {
    /// Request using the configured timeframes and variant over all data.
    pub fn from_config(symbol: &str, view_timeframe: Timeframe, cfg: &EvaluationConfig) -> Self {
        Self {
            symbol: symbol.to_string(),
            view_timeframe,
            base_timeframe: cfg.strategy.base_timeframe,
            trend_timeframes: cfg.strategy.trend_timeframes.clone(),
            variant: cfg.strategy.variant,
            range: TimeRange::ALL,
            limit: None,
        }
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_range(mut self, range: TimeRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    fn validate(&self, cfg: &EvaluationConfig) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(CoreError::invalid("symbol is required"));
        }
        if !cfg.view.timeframes.contains(&self.view_timeframe) {
            return Err(CoreError::invalid(format!(
                "unsupported view timeframe '{}'",
                self.view_timeframe
            )));
        }
        if self.limit == Some(0) {
            return Err(CoreError::invalid("limit must be positive"));
        }
        if let Some(tf) = self.trend_timeframes.iter().find(|tf| **tf < self.base_timeframe) {
            return Err(CoreError::invalid(format!(
                "trend timeframe {tf} is finer than base timeframe {}",
                self.base_timeframe
            )));
        }
        if cfg.strategy.period == 0 {
            return Err(CoreError::invalid("period must be a positive integer"));
        }
        Ok(())
    }
}

/// Number of base candles to fetch so the base indicator is warm across the
/// requested view window.
pub fn base_limit(
    period: usize,
    padding: usize,
    view: Timeframe,
    base: Timeframe,
    limit: Option<usize>,
    max_base: usize,
) -> usize {
    let ratio = view.ratio_to(base) as usize;
    let wanted = match limit {
        Some(n) => n.saturating_mul(ratio).saturating_add(period),
        None => period.saturating_mul(ratio).saturating_mul(2),
    };
    wanted.max(period.saturating_add(padding)).min(max_base)
}

// ---------------------------------------------------------------------------
// Signal run
// ---------------------------------------------------------------------------

/// Fetch, align and replay one (symbol, view timeframe) request.
pub fn run_signal_evaluation(
    source: &dyn CandleSource,
    request: &RunRequest,
    cfg: &EvaluationConfig,
) -> Result<RunResult> {
    request.validate(cfg)?;
    let symbol = request.symbol.as_str();
    let period = cfg.strategy.period;
    let base_tf = request.base_timeframe;
    let view_tf = request.view_timeframe;
    let policy = build_policy(request.variant, base_tf, &request.trend_timeframes, cfg)?;

    let view = source.fetch(symbol, view_tf, request.range, request.limit)?;
    if view.is_empty() {
        info!(symbol, timeframe = %view_tf, "no view candles; empty run");
        return Ok(RunResult::empty(symbol, view_tf));
    }

    let budget = base_limit(
        period,
        cfg.view.warmup_padding,
        view_tf,
        base_tf,
        request.limit,
        cfg.view.max_base_candles,
    );
    let base = source.fetch(symbol, base_tf, request.range, Some(budget))?;
    if base.is_empty() {
        info!(symbol, timeframe = %base_tf, "no base candles; empty run");
        return Ok(RunResult::empty(symbol, view_tf));
    }
    debug!(symbol, view = view.len(), base = base.len(), budget, "candles fetched");

    // Trend frames are fetched without a limit so long periods can warm up.
    let requirements = policy.requirements();
    let mut fetched: FxHashMap<Timeframe, Vec<Candle>> = FxHashMap::default();
    for key in &requirements.trend {
        let tf = key.timeframe;
        if tf != base_tf && !fetched.contains_key(&tf) {
            fetched.insert(tf, source.fetch(symbol, tf, request.range, None)?);
        }
    }
    let payload_tfs: Vec<Timeframe> = cfg
        .indicators
        .values()
        .flat_map(|m| m.iter().filter(|(_, t)| t.compute).map(|(tf, _)| *tf))
        .collect();
    for tf in payload_tfs {
        if tf != base_tf && tf != view_tf && !fetched.contains_key(&tf) {
            fetched.insert(tf, source.fetch(symbol, tf, request.range, request.limit)?);
        }
    }
    let frames = Frames {
        base_tf,
        base: &base,
        view_tf,
        view: &view,
        extra: &fetched,
    };

    // Base columns.
    let base_close = closes(&base);
    let base_sma = sma(&base_close, period)?;
    let base_atr = requirements
        .atr_period
        .map(|p| atr(&highs(&base), &lows(&base), &base_close, p))
        .transpose()?;
    let base_volume = requirements
        .volume_period
        .map(|p| volume_average(&volumes(&base), p))
        .transpose()?;

    // Trend columns; a timeframe with no candles is simply not joined.
    let mut trend_series: Vec<(TrendKey, Series)> = Vec::with_capacity(requirements.trend.len());
    for key in &requirements.trend {
        let candles = frames.get(key.timeframe);
        if candles.is_empty() {
            debug!(symbol, timeframe = %key.timeframe, "no trend candles");
            continue;
        }
        trend_series.push((*key, key.indicator.compute(&closes(candles), period)?));
    }
    let inputs: Vec<TrendInput<'_>> = trend_series
        .iter()
        .map(|(key, series)| TrendInput {
            key: *key,
            series,
            tolerance_ms: cfg.align.tolerance_ms(key.timeframe),
        })
        .collect();

    let rows = align(
        &base,
        &base_sma,
        BaseExtras {
            atr: base_atr.as_ref(),
            volume_avg: base_volume.as_ref(),
        },
        &inputs,
    )?;
    let machine = run_machine(&rows, policy.as_ref())?;
    let entries = align_entries(&machine.events, &view, view_tf, base_tf);
    let indicators = build_indicator_payload(cfg, period, &frames)?;
    let summary = build_summary(&machine.timeline, &machine.events, &machine.final_position);

    info!(
        symbol,
        view = %view_tf,
        variant = %request.variant,
        rows = rows.len(),
        evaluated = machine.timeline.len(),
        events = machine.events.len(),
        "signal run complete"
    );

    Ok(RunResult {
        symbol: symbol.to_string(),
        view_timeframe: view_tf,
        candles: view,
        indicators,
        entries,
        latest: machine.timeline.last().cloned(),
        events: machine.events,
        timeline: machine.timeline,
        summary,
    })
}

/// Candles fetched for one run, by timeframe.
struct Frames<'a> {
    base_tf: Timeframe,
    base: &'a [Candle],
    view_tf: Timeframe,
    view: &'a [Candle],
    extra: &'a FxHashMap<Timeframe, Vec<Candle>>,
}

impl<'a> Frames<'a> {
    /// Base candles win, then unlimited trend/extra fetches, then the view.
    fn get(&self, tf: Timeframe) -> &'a [Candle] {
        if tf == self.base_tf {
            self.base
        } else if let Some(c) = self.extra.get(&tf) {
            c
        } else if tf == self.view_tf {
            self.view
        } else {
            &[]
        }
    }
}

/// Computed `(kind, timeframe)` pairs; exposed ones land in the payload.
/// An exposed pair with no candles yields an empty list.
fn build_indicator_payload(
    cfg: &EvaluationConfig,
    period: usize,
    frames: &Frames<'_>,
) -> Result<IndicatorPayload> {
    let mut payload = IndicatorPayload::new();
    for (kind, toggles) in &cfg.indicators {
        let per_tf = payload.entry(*kind).or_default();
        for (tf, toggle) in toggles {
            if !toggle.compute {
                continue;
            }
            let candles = frames.get(*tf);
            if candles.is_empty() {
                if toggle.expose {
                    per_tf.insert(*tf, Vec::new());
                }
                continue;
            }
            let series = kind.compute(&closes(candles), period)?;
            if toggle.expose {
                per_tf.insert(*tf, indicator_points(&series));
            }
        }
    }
    Ok(payload)
}

/// Run many requests in parallel; results come back in request order.
/// `cfg_for` resolves the config per symbol so symbol overlays apply.
pub fn run_signal_evaluation_many<F>(
    source: &dyn CandleSource,
    requests: &[RunRequest],
    cfg_for: F,
) -> Vec<Result<RunResult>>
where
    F: Fn(&str) -> EvaluationConfig + Sync,
{
    info!(runs = requests.len(), "starting batch signal runs");
    requests
        .par_iter()
        .map(|request| run_signal_evaluation(source, request, &cfg_for(&request.symbol)))
        .collect()
}

/// Latest-bar and full-history SMA/WMA/HMA of one timeframe's closes.
pub fn compute_indicator(
    source: &dyn CandleSource,
    symbol: &str,
    timeframe: Timeframe,
    kind: IndicatorKind,
    period: usize,
    range: TimeRange,
) -> Result<Series> {
    let candles = source.fetch(symbol, timeframe, range, None)?;
    if candles.is_empty() {
        return Err(CoreError::invalid(format!(
            "no {timeframe} candles for {symbol}"
        )));
    }
    kind.compute(&closes(&candles), period)
}

// ---------------------------------------------------------------------------
// Divergences
// ---------------------------------------------------------------------------

/// MACD and RSI divergences over the full history of one (symbol, timeframe).
pub fn detect_divergences(
    source: &dyn CandleSource,
    symbol: &str,
    timeframe: Timeframe,
    cfg: &EvaluationConfig,
) -> Result<Vec<Divergence>> {
    let candles = source.fetch(symbol, timeframe, TimeRange::ALL, None)?;
    let found = detect_all(symbol, timeframe, &candles, &cfg.divergence)?;
    debug!(symbol, timeframe = %timeframe, candles = candles.len(), found = found.len(), "divergence scan");
    Ok(found)
}

/// Scan every `symbols × timeframes` pair in parallel and drop repeats of
/// the same natural key. Empty `timeframes` means the configured ones. A
/// failing pair is logged and skipped.
pub fn detect_divergences_batch(
    source: &dyn CandleSource,
    symbols: &[String],
    timeframes: &[Timeframe],
    cfg: &EvaluationConfig,
) -> Vec<Divergence> {
    let timeframes = if timeframes.is_empty() {
        cfg.divergence.timeframes.as_slice()
    } else {
        timeframes
    };
    let pairs: Vec<(&str, Timeframe)> = symbols
        .iter()
        .flat_map(|s| timeframes.iter().map(move |tf| (s.as_str(), *tf)))
        .collect();

    let found: Vec<Divergence> = pairs
        .par_iter()
        .flat_map_iter(|(symbol, tf)| match detect_divergences(source, symbol, *tf, cfg) {
            Ok(found) => found,
            Err(e) => {
                warn!(symbol = *symbol, timeframe = %tf, error = %e, "divergence scan failed");
                Vec::new()
            }
        })
        .collect();

    let total = found.len();
    let unique = dedup_divergences(found);
    info!(pairs = pairs.len(), total, unique = unique.len(), "divergence batch complete");
    unique
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
