//! CLI entry point for multi-timeframe signal evaluation.
//!
//! Subcommands:
//!   - `run`            : Replay a strategy variant and emit the run payload
//!   - `divergences`    : Scan symbols × timeframes for MACD/RSI divergences
//!   - `snapshot`       : Latest-bar long/short check per timeframe
//!   - `dump-indicator` : Dump one SMA/WMA/HMA series as CSV for debugging
//!   - `strategies`     : List the enabled strategy variants

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mtf_core::candle::closes;
use mtf_core::config::{load_config, EvaluationConfig};
use mtf_core::indicators::IndicatorKind;
use mtf_core::position::PositionType;
use mtf_core::runner::{
    compute_indicator, detect_divergences_batch, run_signal_evaluation, run_signal_evaluation_many,
    RunRequest,
};
use mtf_core::signals::snapshot::{evaluate_signal, SnapshotParams};
use mtf_core::signals::Variant;
use mtf_core::source::{CandleSource, TimeRange};
use mtf_core::timeframe::Timeframe;
use mtf_core::timestamp::{parse_datetime, to_iso};
use mtf_data::SqliteCandleSource;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_SHA: &str = env!("MTF_GIT_SHA");

// ---------------------------------------------------------------------------
// CLI argument structs
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "mtf-signals",
    version = VERSION,
    about = "Multi-timeframe SMA/HMA signal evaluation and divergence detection",
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a strategy variant over stored candles
    Run(RunArgs),
    /// Detect MACD/RSI divergences
    Divergences(DivergenceArgs),
    /// Latest-bar long/short snapshot
    Snapshot(SnapshotArgs),
    /// Dump one indicator series as CSV
    DumpIndicator(DumpArgs),
    /// List enabled strategy variants
    Strategies(StrategiesArgs),
}

/// Options shared by every subcommand that reads candles.
#[derive(Parser)]
struct SourceArgs {
    /// Path to the strategy YAML config
    #[arg(long, default_value = "mtf_config.yaml")]
    config: String,

    /// SQLite candle database; repeat for partitioned history
    #[arg(long = "candles-db", required = true)]
    candles_db: Vec<PathBuf>,

    /// Write output to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Parser)]
struct RunArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Symbols to evaluate; all symbols in the DB when omitted
    #[arg(long)]
    symbol: Vec<String>,

    /// View timeframe (defaults to the base timeframe)
    #[arg(long)]
    timeframe: Option<Timeframe>,

    /// Strategy variant: alignment, crossover, filtered_crossover,
    /// bias_crossover (or 1-4). Defaults to the config.
    #[arg(long)]
    variant: Option<Variant>,

    /// Inclusive start, ISO-8601 (UTC when no offset)
    #[arg(long)]
    start: Option<String>,

    /// Inclusive end, ISO-8601 (UTC when no offset)
    #[arg(long)]
    end: Option<String>,

    /// Most recent view candles to evaluate
    #[arg(long)]
    limit: Option<usize>,

    /// Omit the per-row signal timeline from the output
    #[arg(long, default_value_t = false)]
    no_timeline: bool,
}

#[derive(Parser)]
struct DivergenceArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Symbols to scan; all symbols in the DB when omitted
    #[arg(long)]
    symbol: Vec<String>,

    /// Timeframes to scan; the configured ones when omitted
    #[arg(long)]
    timeframe: Vec<Timeframe>,
}

#[derive(Parser)]
struct SnapshotArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    symbol: String,

    /// long or short
    #[arg(long, default_value = "long")]
    direction: String,
}

#[derive(Parser)]
struct DumpArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[arg(long)]
    symbol: String,

    #[arg(long)]
    timeframe: Timeframe,

    /// sma, wma or hma
    #[arg(long, default_value = "hma")]
    kind: String,

    /// Window; defaults to the configured period
    #[arg(long)]
    period: Option<usize>,

    #[arg(long)]
    start: Option<String>,

    #[arg(long)]
    end: Option<String>,
}

#[derive(Parser)]
struct StrategiesArgs {
    #[arg(long, default_value = "mtf_config.yaml")]
    config: String,

    /// Include disabled entries
    #[arg(long, default_value_t = false)]
    all: bool,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_source(paths: &[PathBuf]) -> Result<SqliteCandleSource> {
    let source = SqliteCandleSource::with_partitions(paths.to_vec())
        .with_context(|| format!("cannot open candle database(s) {paths:?}"))?;
    for p in source.paths() {
        debug!(path = %p.display(), "candle partition");
    }
    Ok(source)
}

fn parse_range(start: Option<&str>, end: Option<&str>) -> Result<TimeRange> {
    let start = start.map(parse_datetime).transpose().context("invalid --start")?;
    let end = end.map(parse_datetime).transpose().context("invalid --end")?;
    Ok(TimeRange::new(start, end)?)
}

fn resolve_symbols(source: &dyn CandleSource, requested: &[String]) -> Result<Vec<String>> {
    if !requested.is_empty() {
        return Ok(requested.iter().map(|s| s.to_uppercase()).collect());
    }
    let all = source.symbols().context("cannot list symbols")?;
    if all.is_empty() {
        bail!("candle database contains no symbols");
    }
    Ok(all)
}

fn output_writer(output: Option<&PathBuf>) -> Result<Box<dyn Write>> {
    Ok(match output {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("cannot create {path:?}"))?,
        )),
        None => Box::new(std::io::BufWriter::new(std::io::stdout().lock())),
    })
}

fn write_json<T: Serialize>(value: &T, output: Option<&PathBuf>) -> Result<()> {
    let mut writer = output_writer(output)?;
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    if let Some(path) = output {
        info!(path = %path.display(), "wrote output");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_run(args: RunArgs) -> Result<()> {
    let source = open_source(&args.source.candles_db)?;
    let symbols = resolve_symbols(&source, &args.symbol)?;
    let range = parse_range(args.start.as_deref(), args.end.as_deref())?;
    let config_path = args.source.config.as_str();

    let requests: Vec<RunRequest> = symbols
        .iter()
        .map(|symbol| {
            let cfg = load_config(config_path, Some(symbol.as_str()));
            let view = args.timeframe.unwrap_or(cfg.strategy.base_timeframe);
            let mut req = RunRequest::from_config(symbol, view, &cfg)
                .with_range(range)
                .with_limit(args.limit);
            if let Some(variant) = args.variant {
                req = req.with_variant(variant);
            }
            req
        })
        .collect();

    let start = Instant::now();
    let mut results = Vec::with_capacity(requests.len());
    if let [request] = requests.as_slice() {
        let cfg = load_config(config_path, Some(request.symbol.as_str()));
        results.push(
            run_signal_evaluation(&source, request, &cfg)
                .with_context(|| format!("run failed for {}", request.symbol))?,
        );
    } else {
        let outcomes = run_signal_evaluation_many(&source, &requests, |symbol| {
            load_config(config_path, Some(symbol))
        });
        for (request, outcome) in requests.iter().zip(outcomes) {
            match outcome {
                Ok(r) => results.push(r),
                Err(e) => tracing::warn!(symbol = %request.symbol, error = %e, "run failed"),
            }
        }
    }

    for r in &results {
        let s = &r.summary;
        info!(
            symbol = %r.symbol,
            rows = s.evaluated_rows,
            long_entries = s.long_entries,
            short_entries = s.short_entries,
            position = ?s.final_position,
            "run summary"
        );
    }
    info!(runs = results.len(), elapsed_s = start.elapsed().as_secs_f64(), "runs complete");

    if args.no_timeline {
        for r in &mut results {
            r.timeline.clear();
        }
    }
    if let [single] = results.as_slice() {
        write_json(single, args.source.output.as_ref())
    } else {
        write_json(&results, args.source.output.as_ref())
    }
}

fn cmd_divergences(args: DivergenceArgs) -> Result<()> {
    let source = open_source(&args.source.candles_db)?;
    let symbols = resolve_symbols(&source, &args.symbol)?;
    let cfg = load_config(&args.source.config, None);

    let start = Instant::now();
    let found = detect_divergences_batch(&source, &symbols, &args.timeframe, &cfg);
    info!(
        symbols = symbols.len(),
        divergences = found.len(),
        elapsed_s = start.elapsed().as_secs_f64(),
        "divergence scan complete"
    );
    write_json(&found, args.source.output.as_ref())
}

fn cmd_snapshot(args: SnapshotArgs) -> Result<()> {
    let source = open_source(&args.source.candles_db)?;
    let cfg = load_config(&args.source.config, Some(args.symbol.as_str()));
    let direction = match args.direction.to_ascii_lowercase().as_str() {
        "long" => PositionType::Long,
        "short" => PositionType::Short,
        other => bail!("direction must be long or short, got {other:?}"),
    };

    let params = SnapshotParams {
        base: cfg.strategy.base_timeframe,
        trends: cfg.strategy.trend_timeframes.clone(),
        sma_period: cfg.strategy.period,
        hma_period: cfg.strategy.period,
    };
    // Enough history for the HMA warm-up on every timeframe.
    let limit = cfg.strategy.period * 2 + cfg.view.warmup_padding;
    let mut by_tf = FxHashMap::default();
    for tf in std::iter::once(params.base).chain(params.trends.iter().copied()) {
        let candles = source.fetch(&args.symbol, tf, TimeRange::ALL, Some(limit))?;
        if !candles.is_empty() {
            by_tf.insert(tf, closes(&candles));
        }
    }

    let snapshot = evaluate_signal(&by_tf, direction, &params)
        .with_context(|| format!("snapshot failed for {}", args.symbol))?;
    write_json(&snapshot, args.source.output.as_ref())
}

fn cmd_dump_indicator(args: DumpArgs) -> Result<()> {
    let source = open_source(&args.source.candles_db)?;
    let cfg = load_config(&args.source.config, Some(args.symbol.as_str()));
    let kind = match args.kind.to_ascii_lowercase().as_str() {
        "sma" => IndicatorKind::Sma,
        "wma" => IndicatorKind::Wma,
        "hma" => IndicatorKind::Hma,
        other => bail!("unknown indicator kind {other:?}"),
    };
    let period = args.period.unwrap_or(cfg.strategy.period);
    let range = parse_range(args.start.as_deref(), args.end.as_deref())?;

    let series = compute_indicator(&source, &args.symbol, args.timeframe, kind, period, range)?;
    info!(
        symbol = %args.symbol,
        timeframe = %args.timeframe,
        kind = %kind,
        period,
        bars = series.len(),
        warmup = series.undefined_prefix(),
        "dumping indicator"
    );

    let mut writer = output_writer(args.source.output.as_ref())?;
    writeln!(writer, "time,{}{}", kind.label().to_lowercase(), period)?;
    for (t, v) in series.iter() {
        match v {
            Some(v) => writeln!(writer, "{},{v}", to_iso(t))?,
            None => writeln!(writer, "{},", to_iso(t))?,
        }
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct StrategyListing<'a> {
    id: &'a str,
    label: &'a str,
    variant: Variant,
    enabled: bool,
}

fn cmd_strategies(args: StrategiesArgs) -> Result<()> {
    let cfg: EvaluationConfig = load_config(&args.config, None);
    let listing: Vec<StrategyListing<'_>> = cfg
        .strategies
        .iter()
        .filter(|s| args.all || s.enabled)
        .map(|s| StrategyListing {
            id: &s.id,
            label: &s.label,
            variant: s.variant,
            enabled: s.enabled,
        })
        .collect();
    write_json(&listing, None)
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() {
    // Logs go to stderr so JSON on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(version = VERSION, git = GIT_SHA, "mtf-signals");

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(args) => cmd_run(args),
        Commands::Divergences(args) => cmd_divergences(args),
        Commands::Snapshot(args) => cmd_snapshot(args),
        Commands::DumpIndicator(args) => cmd_dump_indicator(args),
        Commands::Strategies(args) => cmd_strategies(args),
    };

    if let Err(e) = result {
        eprintln!("[error] {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_accepts_iso_and_rejects_inverted() {
        let r = parse_range(Some("2024-01-01T00:00:00Z"), Some("2024-01-02")).unwrap();
        assert_eq!(r.start, Some(1_704_067_200_000));
        assert_eq!(r.end, Some(1_704_153_600_000));
        assert!(parse_range(Some("2024-01-02"), Some("2024-01-01")).is_err());
        assert!(parse_range(Some("yesterday"), None).is_err());
        assert_eq!(parse_range(None, None).unwrap(), TimeRange::ALL);
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "mtf-signals",
            "run",
            "--candles-db",
            "a.db",
            "--candles-db",
            "b.db",
            "--symbol",
            "btc",
            "--timeframe",
            "1h",
            "--variant",
            "2",
            "--limit",
            "100",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.source.candles_db.len(), 2);
                assert_eq!(args.timeframe, Some(Timeframe::H1));
                assert_eq!(args.variant, Some(Variant::Crossover));
                assert_eq!(args.limit, Some(100));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn cli_rejects_unknown_timeframe() {
        let parsed = Cli::try_parse_from([
            "mtf-signals",
            "divergences",
            "--candles-db",
            "a.db",
            "--timeframe",
            "7x",
        ]);
        assert!(parsed.is_err());
    }
}
