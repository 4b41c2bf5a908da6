//! ATR Replay — offline trail-indicator backtests over local candle files
//!
//! Usage:
//!   atr-replay run --candles data/btc-15m.json          — Backtest and print a summary
//!   atr-replay indicators --candles data/btc-15m.json   — Dump Trail1/Trail2/ATR points
//!   atr-replay check-config --config backtest.json      — Validate a config file

use anyhow::Context;
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use engine::{
    normalize_klines, sanitize_candles, BacktestConfig, BacktestEngine, BacktestReport,
    CapitalModel, Candle, Kline, Normalized,
};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

const APP_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "-", env!("GIT_HASH"));

#[derive(Parser)]
#[command(name = "atr-replay")]
#[command(about = "Replay candles through the ATR trail engine", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full backtest and print the entries and statistics
    Run {
        #[command(flatten)]
        input: InputArgs,
        /// Optional JSON export path for the full report
        #[arg(long)]
        export: Option<String>,
    },
    /// Compute indicator points only
    Indicators {
        #[command(flatten)]
        input: InputArgs,
        /// Optional JSON export path for the points
        #[arg(long)]
        export: Option<String>,
    },
    /// Validate a config file without running anything
    CheckConfig {
        /// JSON config file
        #[arg(long)]
        config: String,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Candle file (JSON array of klines or candles); falls back to ATR_REPLAY_CANDLES
    #[arg(long)]
    candles: Option<String>,
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    ema_length: Option<usize>,
    #[arg(long)]
    atr_length: Option<usize>,
    #[arg(long)]
    atr_multiplier: Option<f64>,
    /// Margin per entry (USDT)
    #[arg(long)]
    capital: Option<f64>,
    #[arg(long)]
    leverage: Option<f64>,
    /// ROE % (margin model) or USD max PnL (fixed-notional model)
    #[arg(long)]
    win_threshold: Option<f64>,
    /// Candles between signal detection and execution
    #[arg(long)]
    delay: Option<usize>,
    /// Size entries as capital / price without leverage
    #[arg(long)]
    fixed_notional: bool,
}

impl InputArgs {
    fn build_config(&self) -> anyhow::Result<BacktestConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => BacktestConfig::default(),
        };

        if let Some(v) = self.ema_length {
            config.ema_length = v;
        }
        if let Some(v) = self.atr_length {
            config.atr_length = v;
        }
        if let Some(v) = self.atr_multiplier {
            config.atr_multiplier = v;
        }
        if let Some(v) = self.capital {
            config.initial_capital = v;
        }
        if let Some(v) = self.leverage {
            config.leverage = v;
        }
        if let Some(v) = self.win_threshold {
            config.win_threshold = v;
        }
        if let Some(v) = self.delay {
            config.signal_delay_candles = v;
        }
        if self.fixed_notional {
            config.capital_model = CapitalModel::FixedNotional;
        }

        let errors = config.validation_errors();
        if !errors.is_empty() {
            for e in &errors {
                println!("  config: {}", e);
            }
            anyhow::bail!("Invalid configuration ({} problems)", errors.len());
        }
        Ok(config)
    }

    fn candles_path(&self) -> anyhow::Result<String> {
        self.candles
            .clone()
            .or_else(|| std::env::var("ATR_REPLAY_CANDLES").ok())
            .context("No candle file given (use --candles or ATR_REPLAY_CANDLES)")
    }
}

/// Accepted candle file layouts
#[derive(Deserialize)]
#[serde(untagged)]
enum CandleFile {
    Klines(Vec<Kline>),
    Candles(Vec<Candle>),
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,atr_replay=debug")
    } else {
        EnvFilter::new("info,engine=info,atr_replay=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    match cli.command {
        Commands::Run { input, export } => cmd_run(&input, export)?,
        Commands::Indicators { input, export } => cmd_indicators(&input, export)?,
        Commands::CheckConfig { config } => cmd_check_config(&config)?,
    }

    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<BacktestConfig> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Reading config {}", path))?;
    serde_json::from_str(&raw).with_context(|| format!("Parsing config {}", path))
}

fn load_candles(path: &str) -> anyhow::Result<Vec<Candle>> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("Reading candles {}", path))?;
    let file: CandleFile =
        serde_json::from_str(&raw).with_context(|| format!("Parsing candles {}", path))?;

    let Normalized { candles, dropped } = match file {
        CandleFile::Klines(klines) => normalize_klines(&klines),
        CandleFile::Candles(candles) => sanitize_candles(candles),
    };
    if dropped > 0 {
        warn!(dropped, path, "Skipped malformed candles");
    }
    if candles.is_empty() {
        anyhow::bail!("No usable candles in {}", path);
    }
    info!(count = candles.len(), path, "Loaded candles");
    Ok(candles)
}

fn write_json<T: serde::Serialize>(path: &str, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, &json).with_context(|| format!("Writing {}", path))?;
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_run(input: &InputArgs, export: Option<String>) -> anyhow::Result<()> {
    println!("\n=== ATR Replay v{} ===", APP_VERSION);

    let config = input.build_config()?;
    let path = input.candles_path()?;
    let candles = load_candles(&path)?;

    println!("Candles: {} ({} bars)", path, candles.len());
    println!(
        "Trail: EMA {} / ATR {} x{:.2}   Capital: {:.2} @ {}x ({:?}), delay {}",
        config.ema_length,
        config.atr_length,
        config.atr_multiplier,
        config.initial_capital,
        config.leverage,
        config.capital_model,
        config.signal_delay_candles,
    );

    let report = BacktestEngine::run(&config, &candles)?;
    print_entries(&report);
    print_statistics(&report);

    if let Some(export_path) = export {
        write_json(&export_path, &report)?;
        println!("\nReport exported to {}", export_path);
    }

    Ok(())
}

fn cmd_indicators(input: &InputArgs, export: Option<String>) -> anyhow::Result<()> {
    let config = input.build_config()?;
    let path = input.candles_path()?;
    let candles = load_candles(&path)?;

    let points = BacktestEngine::indicators(&config, &candles)?;

    match export {
        Some(export_path) => {
            write_json(&export_path, &points)?;
            println!("{} points exported to {}", points.len(), export_path);
        }
        None => {
            println!(
                "  {:<17} {:>12} {:>12} {:>10}",
                "Time", "Trail1", "Trail2", "ATR"
            );
            for p in &points {
                println!(
                    "  {:<17} {:>12.4} {:>12.4} {:>10.4}",
                    format_time(p.time),
                    p.trail1,
                    p.trail2,
                    p.atr
                );
            }
        }
    }

    Ok(())
}

fn cmd_check_config(path: &str) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let errors = config.validation_errors();
    if errors.is_empty() {
        println!("{}: OK", path);
        return Ok(());
    }
    for e in &errors {
        println!("  {}", e);
    }
    anyhow::bail!("{}: {} problems", path, errors.len())
}

fn format_time(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn print_entries(report: &BacktestReport) {
    if report.entries.is_empty() {
        println!("\nNo entries.");
        return;
    }

    println!("\nEntries:");
    println!(
        "  {:>3}  {:<5} {:<17} {:>10} {:<17} {:>10} {:>10} {:>8} {:>4}",
        "#", "Side", "Entry", "Price", "Exit", "Price", "PnL", "ROE%", "Win"
    );
    println!("  {}", "-".repeat(96));
    for e in &report.entries {
        println!(
            "  {:>3}  {:<5} {:<17} {:>10.4} {:<17} {:>10.4} {:>+10.2} {:>+8.2} {:>4}",
            e.id,
            e.direction.to_string(),
            format_time(e.entry_time),
            e.entry_price,
            e.exit_time.map(format_time).unwrap_or_default(),
            e.exit_price.unwrap_or_default(),
            e.pnl,
            e.roe,
            if e.is_win == Some(true) { "yes" } else { "no" },
        );
    }
}

fn print_statistics(report: &BacktestReport) {
    let s = &report.statistics;
    println!("\nStatistics:");
    println!(
        "  Entries: {} ({} long / {} short)",
        s.total_entries, s.long_entries, s.short_entries
    );
    println!(
        "  Win rate: {:.1}% ({} wins / {} losses)",
        s.win_rate, s.winning_entries, s.losing_entries
    );
    println!(
        "  Total PnL: {:+.2}   Avg PnL: {:+.2}",
        s.total_pnl, s.average_pnl
    );
    println!(
        "  Avg ROE: {:+.2}%   Peak ROE: {:+.2}%   Worst ROE: {:+.2}%",
        s.average_roe, s.peak_roe, s.worst_roe
    );
    if let (Some(best), Some(worst)) = (&s.best_entry, &s.worst_entry) {
        println!(
            "  Best: #{} {:+.2}   Worst: #{} {:+.2}",
            best.id, best.pnl, worst.id, worst.pnl
        );
    }
    println!(
        "  Profit factor: {:.2}   Max drawdown: {:.2}",
        s.profit_factor, s.max_drawdown
    );
    println!(
        "  Time in market: {:.1}h (avg {:.1}h per entry)",
        s.total_duration_secs as f64 / 3600.0,
        s.average_duration_secs / 3600.0
    );
}
