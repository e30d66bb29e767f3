//! Evaluation configuration.
//!
//! YAML merge hierarchy: defaults <- global <- symbols.<SYMBOL>. Everything is
//! read once at startup; the core never branches on config shape at runtime.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::indicators::IndicatorKind;
use crate::signals::Variant;
use crate::timeframe::{Timeframe, TimeframeUnit};

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// Which value the daily bias filter compares against the bias HMA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasSource {
    /// Base candle close.
    Close,
    /// The base SMA.
    BaseIndicator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Finest timeframe; drives the row-by-row replay.
    pub base_timeframe: Timeframe,
    /// Trend timeframes, finest first. Alignment/crossover variants read the
    /// first two, the bias variant reads the first.
    pub trend_timeframes: Vec<Timeframe>,
    /// Long-term bias timeframe for the bias variant.
    pub bias_timeframe: Timeframe,
    /// Window for every SMA/HMA in the run.
    pub period: usize,
    pub variant: Variant,
    pub bias_source: BiasSource,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            base_timeframe: Timeframe::M5,
            trend_timeframes: vec![Timeframe::H1, Timeframe::H4],
            bias_timeframe: Timeframe::D1,
            period: 200,
            variant: Variant::BiasCrossover,
            bias_source: BiasSource::Close,
        }
    }
}

// ---------------------------------------------------------------------------
// Risk (percentage stop/take)
// ---------------------------------------------------------------------------

/// Percentages are whole numbers: 2.5 = 2.5%.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub stop_loss_enabled: bool,
    pub stop_loss_percent: f64,
    pub take_profit_enabled: bool,
    pub take_profit_percent: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_enabled: true,
            stop_loss_percent: 10.0,
            take_profit_enabled: false,
            take_profit_percent: 20.0,
        }
    }
}

impl RiskConfig {
    /// Fractional stop distance, `None` when disabled or non-positive.
    pub fn stop_factor(&self) -> Option<f64> {
        (self.stop_loss_enabled && self.stop_loss_percent > 0.0)
            .then(|| self.stop_loss_percent / 100.0)
    }

    /// Fractional take distance, `None` when disabled or non-positive.
    pub fn take_factor(&self) -> Option<f64> {
        (self.take_profit_enabled && self.take_profit_percent > 0.0)
            .then(|| self.take_profit_percent / 100.0)
    }
}

// ---------------------------------------------------------------------------
// Filtered crossover (ATR / volume filters, ATR-multiple stops)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilteredConfig {
    pub atr_period: usize,
    pub volume_period: usize,
    pub atr_multiplier: f64,
    /// Entries are skipped while ATR exceeds this % of price.
    pub max_atr_percent: f64,
    /// Reported on entry events; sizing is out of scope.
    pub risk_per_trade: f64,
    /// Take distance = stop distance × this ratio.
    pub min_reward_ratio: f64,
}

impl Default for FilteredConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            volume_period: 20,
            atr_multiplier: 2.0,
            max_atr_percent: 3.0,
            risk_per_trade: 1.0,
            min_reward_ratio: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Aligner tolerance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Default tolerance = this many trend-candle durations.
    pub tolerance_multiple: u32,
    /// Per-trend-timeframe tolerance, written as a span (`1d: 5d`).
    pub tolerance_overrides: BTreeMap<Timeframe, Timeframe>,
}

impl Default for AlignConfig {
    fn default() -> Self {
        let mut tolerance_overrides = BTreeMap::new();
        if let Ok(five_days) = Timeframe::new(5, TimeframeUnit::Day) {
            tolerance_overrides.insert(Timeframe::D1, five_days);
        }
        Self {
            tolerance_multiple: 6,
            tolerance_overrides,
        }
    }
}

impl AlignConfig {
    /// As-of tolerance in ms for values coming from `trend`.
    pub fn tolerance_ms(&self, trend: Timeframe) -> i64 {
        match self.tolerance_overrides.get(&trend) {
            Some(span) => span.duration_ms(),
            None => trend
                .duration_ms()
                .saturating_mul(i64::from(self.tolerance_multiple.max(1))),
        }
    }
}

// ---------------------------------------------------------------------------
// View / payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Display timeframes a run may be requested for.
    pub timeframes: Vec<Timeframe>,
    /// Extra base candles beyond `period` fetched for warm-up.
    pub warmup_padding: usize,
    /// Hard cap on base candles per run.
    pub max_base_candles: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![
                Timeframe::M5,
                Timeframe::M30,
                Timeframe::H1,
                Timeframe::H4,
                Timeframe::D1,
            ],
            warmup_padding: 50,
            max_base_candles: 100_000,
        }
    }
}

/// Per-(indicator, timeframe) switch. `compute` makes the series available,
/// `expose` includes it in the run payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ToggleRepr")]
pub struct IndicatorToggle {
    pub compute: bool,
    pub expose: bool,
}

impl IndicatorToggle {
    pub const ON: IndicatorToggle = IndicatorToggle { compute: true, expose: true };
    pub const OFF: IndicatorToggle = IndicatorToggle { compute: false, expose: false };
}

/// Accepted YAML shapes: a bare bool (compute = expose), or a mapping where
/// `expose` defaults to `compute`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ToggleRepr {
    Flag(bool),
    Flags {
        #[serde(default, alias = "calc")]
        compute: bool,
        #[serde(default, alias = "plot")]
        expose: Option<bool>,
    },
}

impl From<ToggleRepr> for IndicatorToggle {
    fn from(repr: ToggleRepr) -> Self {
        match repr {
            ToggleRepr::Flag(on) => IndicatorToggle { compute: on, expose: on },
            ToggleRepr::Flags { compute, expose } => IndicatorToggle {
                compute,
                expose: expose.unwrap_or(compute),
            },
        }
    }
}

pub type IndicatorMap = BTreeMap<IndicatorKind, BTreeMap<Timeframe, IndicatorToggle>>;

fn default_indicator_map() -> IndicatorMap {
    let tfs = [Timeframe::M5, Timeframe::M30, Timeframe::H1, Timeframe::H4, Timeframe::D1];
    let sma_on = [Timeframe::M5, Timeframe::H1, Timeframe::H4];
    let hma_on = [Timeframe::H1, Timeframe::D1];

    let build = |on: &[Timeframe]| {
        tfs.iter()
            .map(|tf| {
                let toggle = if on.contains(tf) { IndicatorToggle::ON } else { IndicatorToggle::OFF };
                (*tf, toggle)
            })
            .collect::<BTreeMap<_, _>>()
    };

    let mut map = IndicatorMap::new();
    map.insert(IndicatorKind::Sma, build(&sma_on));
    map.insert(IndicatorKind::Hma, build(&hma_on));
    map
}

// ---------------------------------------------------------------------------
// Divergence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DivergenceConfig {
    /// Local-extreme radius: a point is compared with `window` bars each side.
    pub window: usize,
    /// Max price/indicator extreme gap, in candles of the analysed timeframe.
    pub match_window_bars: u32,
    /// Below this many candles nothing is analysed.
    pub lookback: usize,
    pub macd_min_bars: usize,
    pub rsi_min_bars: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    /// Timeframes scanned by the batch command.
    pub timeframes: Vec<Timeframe>,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            window: 5,
            match_window_bars: 10,
            lookback: 50,
            macd_min_bars: 50,
            rsi_min_bars: 30,
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            timeframes: vec![Timeframe::M5, Timeframe::H1, Timeframe::H4],
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy menu
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub id: String,
    pub label: String,
    pub variant: Variant,
    #[serde(default)]
    pub enabled: bool,
}

fn default_strategies() -> Vec<StrategyDefinition> {
    [
        ("1", "Multi-timeframe alignment", Variant::Alignment, false),
        ("2", "SMA/HMA crossover", Variant::Crossover, false),
        ("3", "Filtered crossover with ATR risk", Variant::FilteredCrossover, false),
        ("4", "Daily bias crossover", Variant::BiasCrossover, true),
    ]
    .into_iter()
    .map(|(id, label, variant, enabled)| StrategyDefinition {
        id: id.to_string(),
        label: label.to_string(),
        variant,
        enabled,
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub filtered: FilteredConfig,
    pub align: AlignConfig,
    pub view: ViewConfig,
    pub indicators: IndicatorMap,
    pub divergence: DivergenceConfig,
    pub strategies: Vec<StrategyDefinition>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyConfig::default(),
            risk: RiskConfig::default(),
            filtered: FilteredConfig::default(),
            align: AlignConfig::default(),
            view: ViewConfig::default(),
            indicators: default_indicator_map(),
            divergence: DivergenceConfig::default(),
            strategies: default_strategies(),
        }
    }
}

impl EvaluationConfig {
    pub fn enabled_strategies(&self) -> impl Iterator<Item = &StrategyDefinition> {
        self.strategies.iter().filter(|s| s.enabled)
    }

    /// Toggle for `(kind, timeframe)`; absent entries are off.
    pub fn indicator_toggle(&self, kind: IndicatorKind, timeframe: Timeframe) -> IndicatorToggle {
        self.indicators
            .get(&kind)
            .and_then(|m| m.get(&timeframe))
            .copied()
            .unwrap_or(IndicatorToggle::OFF)
    }

    /// Reject values no run could work with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if s.period == 0 {
            return Err(CoreError::Configuration {
                message: "strategy.period must be > 0".to_string(),
            });
        }
        if let Some(tf) = s.trend_timeframes.iter().find(|tf| **tf < s.base_timeframe) {
            return Err(CoreError::Configuration {
                message: format!(
                    "trend timeframe {tf} is finer than base timeframe {}",
                    s.base_timeframe
                ),
            });
        }
        let f = &self.filtered;
        if f.atr_period == 0 || f.volume_period == 0 {
            return Err(CoreError::Configuration {
                message: "filtered.atr_period and filtered.volume_period must be > 0".to_string(),
            });
        }
        let d = &self.divergence;
        if d.rsi_period == 0 || d.macd_fast == 0 || d.macd_slow == 0 || d.macd_signal == 0 {
            return Err(CoreError::Configuration {
                message: "divergence indicator periods must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// YAML overlay structure
// ---------------------------------------------------------------------------
//
// ```yaml
// global:
//   strategy: { variant: crossover, period: 100 }
//   risk: { take_profit_enabled: true }
// symbols:
//   BTC:
//     risk: { stop_loss_percent: 5.0 }
// ```
//
// Merging happens on `serde_yaml::Value` so a symbol can override a single
// leaf without restating its section.

#[derive(Debug, Deserialize)]
struct YamlRoot {
    #[serde(default)]
    global: serde_yaml::Value,
    #[serde(default)]
    symbols: serde_yaml::Value,
}

/// Recursively merge `overlay` into `base`.
///
/// - If both are `Mapping`, iterate overlay keys and recurse.
/// - Otherwise overlay wins (scalar / sequence replacement); a null overlay
///   keeps the base value.
fn deep_merge(base: &mut serde_yaml::Value, overlay: &serde_yaml::Value) {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(ref mut base_map), serde_yaml::Value::Mapping(overlay_map)) => {
            for (key, overlay_val) in overlay_map.iter() {
                if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_map.insert(key.clone(), overlay_val.clone());
                }
            }
        }
        (base, overlay) => {
            if !overlay.is_null() {
                *base = overlay.clone();
            }
        }
    }
}

fn defaults_as_value() -> Result<serde_yaml::Value> {
    serde_yaml::to_value(EvaluationConfig::default()).map_err(|e| CoreError::Configuration {
        message: format!("cannot serialise defaults: {e}"),
    })
}

/// Parse a YAML document and apply the merge hierarchy for `symbol`.
pub fn parse_config_str(raw: &str, symbol: Option<&str>) -> Result<EvaluationConfig> {
    let root: YamlRoot = if raw.trim().is_empty() {
        YamlRoot {
            global: serde_yaml::Value::Null,
            symbols: serde_yaml::Value::Null,
        }
    } else {
        serde_yaml::from_str(raw).map_err(|e| CoreError::Configuration {
            message: format!("invalid YAML: {e}"),
        })?
    };

    let mut merged = defaults_as_value()?;

    if !root.global.is_null() {
        deep_merge(&mut merged, &root.global);
    }

    if let Some(sym) = symbol {
        if let serde_yaml::Value::Mapping(ref symbols_map) = root.symbols {
            // Exact key first, then uppercase.
            let sym_key = serde_yaml::Value::String(sym.to_string());
            let sym_key_upper = serde_yaml::Value::String(sym.to_uppercase());
            let overrides = symbols_map
                .get(&sym_key)
                .or_else(|| symbols_map.get(&sym_key_upper));
            if let Some(overrides) = overrides {
                deep_merge(&mut merged, overrides);
            }
        }
    }

    let cfg: EvaluationConfig =
        serde_yaml::from_value(merged).map_err(|e| CoreError::Configuration {
            message: format!("cannot deserialise merged config: {e}"),
        })?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load config from `yaml_path`, falling back to defaults (with a warning)
/// when the file is missing, unreadable or invalid.
pub fn load_config(yaml_path: &str, symbol: Option<&str>) -> EvaluationConfig {
    let path = Path::new(yaml_path);
    let raw = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = yaml_path, "config file does not exist, using defaults");
            return EvaluationConfig::default();
        }
        Err(e) => {
            warn!(path = yaml_path, error = %e, "failed to read config, using defaults");
            return EvaluationConfig::default();
        }
    };

    match parse_config_str(&raw, symbol) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = yaml_path, error = %e, "failed to load config, using defaults");
            EvaluationConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
