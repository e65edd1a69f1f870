use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use trade_chart_core::candle::Candle;
use trade_chart_core::config::EngineConfig;
use trade_chart_core::granularity::Granularity;
use trade_chart_core::records::{self, PerformanceRecord};
use trade_chart_core::resample::{infer_base_interval, resample};
use trade_chart_core::study::{StudySettings, StudyToggles, build_study_lines};
use trade_chart_core::summary::{DurationBins, HoldType, OhlcRange, SizeBucket, TradeFilter};
use trade_chart_core::trade::{SnappedTrade, TradeMarker, snap_trades};
use trade_chart_overlay::chart::TradingChart;
use trade_chart_overlay::memory::{MemoryChart, MemoryFigure};
use trade_chart_overlay::surface::{Overlay, TraceVisibility};
use trade_chart_overlay::synchronizer::OverlayRole;
use trade_chart_overlay::visibility::{
    hide_trading_traces, reconcile_annotations, spawn_visibility_sync, toggle_trading_traces,
};

#[derive(Parser)]
#[command(
    name = "trade-chart",
    about = "Resample candle feeds and lay studies and trades over them"
)]
struct Cli {
    /// JSON engine config (falls back to $TRADE_CHART_CONFIG, then defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct FeedArgs {
    /// Candle feed: JSON array of {time, open, high, low, close, volume?}
    #[arg(long)]
    candles: PathBuf,

    /// Target timeframe (5m, 15m, 30m, 1h, 4h, 1d, 1w)
    #[arg(short, long, default_value = "5m")]
    timeframe: Granularity,
}

#[derive(Args, Debug, Clone, Copy, Default)]
struct StudyFlags {
    /// Exponential moving average of closes
    #[arg(long)]
    ema: bool,

    /// Cumulative volume-weighted average price
    #[arg(long)]
    vwap: bool,

    /// 1-based bar number labels
    #[arg(long)]
    bar_count: bool,
}

impl From<StudyFlags> for StudyToggles {
    fn from(flags: StudyFlags) -> Self {
        StudyToggles {
            ema: flags.ema,
            vwap: flags.vwap,
            bar_count: flags.bar_count,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the selectable timeframes
    Timeframes,

    /// Resample a candle feed and print the bars as JSON
    Resample {
        #[command(flatten)]
        feed: FeedArgs,
    },

    /// Compute study lines over the resampled feed
    Studies {
        #[command(flatten)]
        feed: FeedArgs,

        #[command(flatten)]
        studies: StudyFlags,
    },

    /// Snap performance records onto the resampled feed
    Trades {
        #[command(flatten)]
        feed: FeedArgs,

        /// Performance records: JSON array of objects
        #[arg(long)]
        trades: PathBuf,

        /// Only trades of this direction (e.g. Long, Short)
        #[arg(long)]
        direction: Option<String>,

        /// Only trades of this hold type: Sc, Sc/w, Sw
        #[arg(long)]
        hold: Option<HoldType>,

        /// Only trades of this size bucket: S, M, L
        #[arg(long)]
        size: Option<SizeBucket>,
    },

    /// Run the full pipeline against a headless chart and report overlays
    Render {
        #[command(flatten)]
        feed: FeedArgs,

        #[command(flatten)]
        studies: StudyFlags,

        /// Performance records to overlay
        #[arg(long)]
        trades: Option<PathBuf>,
    },

    /// Sync a saved figure's annotations with its trace visibility
    Annotations {
        /// Figure state: {"traces": ["visible" | "legendonly", ...], "annotations": [bool, ...]}
        #[arg(long)]
        figure: PathBuf,

        /// Hide every trading trace first
        #[arg(long, conflicts_with = "toggle_trading")]
        hide_trading: bool,

        /// Flip every trading trace first
        #[arg(long)]
        toggle_trading: bool,

        /// Keep syncing on the configured period for this many milliseconds
        #[arg(long)]
        watch_ms: Option<u64>,
    },
}

fn load_config(path: Option<&Path>) -> EngineConfig {
    match path {
        Some(path) => EngineConfig::load_or_default(path),
        None => EngineConfig::from_env(),
    }
}

fn load_candles(path: &Path) -> Result<Vec<Candle>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read candle feed {}", path.display()))?;
    let rows: Vec<Value> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse candle feed {}", path.display()))?;
    let candles = records::parse_candle_values(&rows);
    info!(
        "loaded {} candle(s) from {} ({} skipped)",
        candles.len(),
        path.display(),
        rows.len() - candles.len()
    );
    Ok(candles)
}

fn load_trades(path: &Path) -> Result<Vec<TradeMarker>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read performance records {}", path.display()))?;
    let raw: Vec<PerformanceRecord> = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse performance records {}", path.display()))?;
    let trades = records::trades_from_records(&raw);
    info!("loaded {} trade(s) from {}", trades.len(), path.display());
    Ok(trades)
}

fn ensure_offered(config: &EngineConfig, timeframe: Granularity) -> Result<()> {
    if !config.timeframes.contains(&timeframe) {
        let offered: Vec<&str> = config.timeframes.iter().map(|g| g.label()).collect();
        anyhow::bail!(
            "timeframe {timeframe} is not enabled. Expected one of: {}",
            offered.join(", ")
        );
    }
    Ok(())
}

fn load_feed(config: &EngineConfig, feed: &FeedArgs) -> Result<Vec<Candle>> {
    ensure_offered(config, feed.timeframe)?;
    let candles = load_candles(&feed.candles)?;
    info!(
        "base interval {}s, resampling to {}",
        infer_base_interval(&candles).num_seconds(),
        feed.timeframe
    );
    Ok(resample(&candles, feed.timeframe))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    println!("{out}");
    Ok(())
}

fn cmd_timeframes(config: &EngineConfig) {
    for g in &config.timeframes {
        let marker = if *g == Granularity::BASE { " (base)" } else { "" };
        println!("{g}{marker}");
    }
}

#[derive(Serialize)]
struct TradeReport<'a> {
    ohlc: Option<OhlcRange>,
    duration_bins: DurationBins,
    trades: &'a [SnappedTrade],
}

fn cmd_trades(
    config: &EngineConfig,
    feed: &FeedArgs,
    trades_path: &Path,
    filter: &TradeFilter,
) -> Result<()> {
    let rendered = load_feed(config, feed)?;
    let trades = load_trades(trades_path)?;
    let selected: Vec<TradeMarker> = filter.apply(&trades).into_iter().cloned().collect();
    let snapped = snap_trades(&rendered, &selected);
    info!(
        "{} of {} selected trade(s) placed on {} bar(s)",
        snapped.len(),
        selected.len(),
        rendered.len()
    );

    print_json(&TradeReport {
        ohlc: OhlcRange::of(&rendered),
        duration_bins: DurationBins::from_trades(&selected),
        trades: &snapped,
    })
}

fn cmd_render(
    config: &EngineConfig,
    feed: &FeedArgs,
    studies: StudyFlags,
    trades_path: Option<&Path>,
) -> Result<()> {
    ensure_offered(config, feed.timeframe)?;
    let mut chart = TradingChart::from_config("cli", config);
    chart.set_candles(load_candles(&feed.candles)?);
    chart.set_granularity(feed.timeframe);
    chart.set_toggles(studies.into());
    if let Some(path) = trades_path {
        chart.set_trades(load_trades(path)?);
        chart.set_show_trades(true);
    }

    let mut surface = MemoryChart::new();
    let report = chart.recompute(&mut surface);

    println!("{}: {} bar(s)", feed.timeframe, surface.candles().len());
    for role in OverlayRole::ALL {
        println!("{role:?}: {} overlay(s)", chart.overlays().owned(role).len());
    }
    let (mut segments, mut labels, mut markers) = (0, 0, 0);
    for (_, overlay) in surface.overlays() {
        match overlay {
            Overlay::Segment { .. } => segments += 1,
            Overlay::Text { .. } => labels += 1,
            Overlay::Markers { points } => markers += points.len(),
        }
    }
    println!("{segments} segment(s), {labels} label(s), {markers} marker point(s)");

    let failed = report.studies.map_or(0, |r| r.failed) + report.trades.map_or(0, |r| r.failed);
    if failed > 0 {
        println!("{failed} overlay(s) rejected by the surface.");
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct FigureState {
    traces: Vec<TraceVisibility>,
    #[serde(default)]
    annotations: Vec<bool>,
}

impl From<FigureState> for MemoryFigure {
    fn from(state: FigureState) -> Self {
        MemoryFigure::from_parts(state.traces, state.annotations)
    }
}

impl From<&MemoryFigure> for FigureState {
    fn from(figure: &MemoryFigure) -> Self {
        FigureState {
            traces: figure.traces().to_vec(),
            annotations: figure.annotations().to_vec(),
        }
    }
}

fn load_figure(path: &Path) -> Result<MemoryFigure> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read figure {}", path.display()))?;
    let state: FigureState = serde_json::from_str(&text)
        .with_context(|| format!("failed to parse figure {}", path.display()))?;
    Ok(state.into())
}

#[derive(Debug, Clone, Copy, Default)]
struct TraceAction {
    hide_trading: bool,
    toggle_trading: bool,
}

async fn sync_figure(
    config: &EngineConfig,
    mut figure: MemoryFigure,
    action: TraceAction,
    watch: Option<Duration>,
) -> FigureState {
    let layout = &config.layout;
    if action.hide_trading {
        let changed = hide_trading_traces(&mut figure, layout);
        info!("hid {changed} trading trace(s) from index {}", layout.trading_traces_start);
    } else if action.toggle_trading {
        let changed = toggle_trading_traces(&mut figure, layout);
        info!("toggled {changed} trading trace(s) from index {}", layout.trading_traces_start);
    }

    let changed = reconcile_annotations(&mut figure, layout.annotation_offset);
    info!("{changed} annotation(s) updated");

    let Some(watch) = watch else {
        return FigureState::from(&figure);
    };

    let shared = Arc::new(Mutex::new(figure));
    let handle = spawn_visibility_sync(shared.clone(), config);
    tokio::time::sleep(watch).await;
    handle.cancel();

    let figure = shared.lock().unwrap_or_else(|e| e.into_inner());
    FigureState::from(&*figure)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref());

    match &cli.command {
        Commands::Timeframes => cmd_timeframes(&config),
        Commands::Resample { feed } => {
            let bars = load_feed(&config, feed)?;
            print_json(&bars)?;
        }
        Commands::Studies { feed, studies } => {
            let bars = load_feed(&config, feed)?;
            let settings = StudySettings {
                ema_period: config.ema_period,
            };
            let lines = build_study_lines(&bars, (*studies).into(), settings);
            print_json(&lines)?;
        }
        Commands::Trades {
            feed,
            trades,
            direction,
            hold,
            size,
        } => {
            let filter = TradeFilter {
                direction: direction.clone(),
                hold_type: *hold,
                size: *size,
            };
            cmd_trades(&config, feed, trades, &filter)?;
        }
        Commands::Render {
            feed,
            studies,
            trades,
        } => {
            cmd_render(&config, feed, *studies, trades.as_deref())?;
        }
        Commands::Annotations {
            figure,
            hide_trading,
            toggle_trading,
            watch_ms,
        } => {
            let action = TraceAction {
                hide_trading: *hide_trading,
                toggle_trading: *toggle_trading,
            };
            let state = sync_figure(
                &config,
                load_figure(figure)?,
                action,
                watch_ms.map(Duration::from_millis),
            )
            .await;
            print_json(&state)?;
        }
    }

    Ok(())
}
