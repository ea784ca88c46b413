mod analysis;
mod config;
mod error;
mod exchange;
mod export;
mod model;
mod notifier;
mod storage;
mod wave;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, MarketConfig};
use exchange::Exchange;
use exchange::binance::BinanceExchange;
use model::TimeFrame;
use notifier::Notifier;
use notifier::json::JsonNotifier;
use notifier::terminal::TerminalNotifier;
use storage::Storage;
use storage::sqlite::SqliteStorage;
use wave::{WaveStrategy, build_strategy};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("storage error")]
    Storage,
    #[display("exchange error")]
    Exchange,
    #[display("analysis error")]
    Analysis,
    #[display("export error")]
    Export,
}

#[derive(Parser)]
#[command(name = "coin-wave", about = "Candle fetcher and heuristic wave stage detector")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch candles from Binance and store them
    Fetch,
    /// Classify the most recent stored candles
    Analyze {
        /// Print the report as JSON instead of a text panel
        #[arg(long)]
        json: bool,
    },
    /// Fetch and analyze on a fixed interval until Ctrl+C
    Watch {
        #[arg(long)]
        json: bool,
    },
    /// Write stored candles to a CSV file
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List previously recorded analyses
    History {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let data_dir = &config.general.data_dir;
    std::fs::create_dir_all(data_dir)
        .change_context(AppError::Storage)
        .attach_with(|| format!("data_dir: {data_dir}"))?;

    let db_path = format!("{data_dir}/coin-wave.db");
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::open(Path::new(&db_path))
            .await
            .change_context(AppError::Storage)?,
    );

    match cli.command {
        Command::Fetch => {
            let exchange = BinanceExchange::new();
            fetch_and_store(&exchange, storage.as_ref(), &config.market).await
        }
        Command::Analyze { json } => {
            let strategy = build_strategy(&config.wave).change_context(AppError::Config)?;
            let notifier = build_notifier(json);
            analyze_stored(&config, storage.as_ref(), strategy.as_ref(), notifier.as_ref()).await
        }
        Command::Watch { json } => {
            let exchange: Arc<dyn Exchange> = Arc::new(BinanceExchange::new());
            let strategy = build_strategy(&config.wave).change_context(AppError::Config)?;
            let notifier = build_notifier(json);
            watch(&config, exchange, storage, strategy, notifier).await
        }
        Command::Export { output } => export_stored(&config, storage.as_ref(), &output).await,
        Command::History { limit } => print_history(&config, storage.as_ref(), limit).await,
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn build_notifier(json: bool) -> Arc<dyn Notifier> {
    if json {
        Arc::new(JsonNotifier)
    } else {
        Arc::new(TerminalNotifier)
    }
}

fn market_timeframe(market: &MarketConfig) -> Result<TimeFrame, Report<AppError>> {
    market.timeframe().ok_or_else(|| {
        Report::new(AppError::Config).attach(format!("unknown timeframe: {}", market.timeframe))
    })
}

async fn fetch_and_store(
    exchange: &dyn Exchange,
    storage: &dyn Storage,
    market: &MarketConfig,
) -> Result<(), Report<AppError>> {
    let timeframe = market_timeframe(market)?;
    let symbol = market.symbol.as_str();

    info!(
        exchange = exchange.name(),
        symbol,
        timeframe = %timeframe,
        "fetching candles"
    );

    let candles = match market.start_time {
        Some(start) => {
            let end = market.end_time.unwrap_or_else(Utc::now);
            let start = range_refresh_start(storage, symbol, timeframe, start).await?;
            exchange
                .fetch_candles_in_range(symbol, timeframe, start, end)
                .await
        }
        None => exchange.fetch_candles(symbol, timeframe, market.limit).await,
    }
    .change_context(AppError::Exchange)?;

    storage
        .upsert_candles(&candles)
        .await
        .change_context(AppError::Storage)?;

    info!(
        exchange = exchange.name(),
        symbol,
        timeframe = %timeframe,
        stored = candles.len(),
        "candles stored"
    );

    Ok(())
}

async fn range_refresh_start(
    storage: &dyn Storage,
    symbol: &str,
    timeframe: TimeFrame,
    start: DateTime<Utc>,
) -> Result<DateTime<Utc>, Report<AppError>> {
    let first = storage
        .get_candles_in_range(symbol, timeframe, start, start + timeframe.duration())
        .await
        .change_context(AppError::Storage)?;
    let newest = storage
        .get_recent_candles(symbol, timeframe, 1)
        .await
        .change_context(AppError::Storage)?;

    let resumed = resume_from(start, !first.is_empty(), newest.last().map(|c| c.open_time));
    if resumed != start {
        tracing::debug!(symbol, from = %resumed, "resuming range refresh from stored data");
    }
    Ok(resumed)
}

/// Start of a range refresh.
///
/// Once the first candle of the range is stored, refreshes continue from the
/// newest stored candle, which is fetched again since it may still be open.
fn resume_from(
    start: DateTime<Utc>,
    range_start_stored: bool,
    newest_stored: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    match newest_stored {
        Some(newest) if range_start_stored && newest > start => newest,
        _ => start,
    }
}

async fn analyze_stored(
    config: &AppConfig,
    storage: &dyn Storage,
    strategy: &dyn WaveStrategy,
    notifier: &dyn Notifier,
) -> Result<(), Report<AppError>> {
    let market = &config.market;
    let timeframe = market_timeframe(market)?;

    let candles = storage
        .get_recent_candles(&market.symbol, timeframe, config.wave.window)
        .await
        .change_context(AppError::Storage)?;

    if candles.len() < config.wave.window {
        tracing::debug!(
            symbol = %market.symbol,
            available = candles.len(),
            window = config.wave.window,
            "fewer stored candles than the analysis window"
        );
    }

    let report = analysis::analyze(&market.symbol, timeframe, &candles, strategy)
        .change_context(AppError::Analysis)?;

    notifier.notify(&report);

    storage
        .log_analysis(&report.to_record(Utc::now()))
        .await
        .change_context(AppError::Storage)?;

    Ok(())
}

async fn watch(
    config: &AppConfig,
    exchange: Arc<dyn Exchange>,
    storage: Arc<dyn Storage>,
    strategy: Box<dyn WaveStrategy>,
    notifier: Arc<dyn Notifier>,
) -> Result<(), Report<AppError>> {
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl+c received, shutting down");
        }
        shutdown.cancel();
    });

    let mut interval = tokio::time::interval(Duration::from_secs(config.watch.interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        symbol = %config.market.symbol,
        interval_secs = config.watch.interval_secs,
        strategy = strategy.name(),
        "watch started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        // Each cycle stands alone: a failed refresh is logged and retried on the next tick.
        if let Err(e) = fetch_and_store(exchange.as_ref(), storage.as_ref(), &config.market).await {
            tracing::warn!(error = ?e, "refresh failed (continuing)");
            continue;
        }
        if let Err(e) =
            analyze_stored(config, storage.as_ref(), strategy.as_ref(), notifier.as_ref()).await
        {
            tracing::warn!(error = ?e, "analysis failed (continuing)");
        }
    }

    info!("shutdown complete");
    Ok(())
}

async fn export_stored(
    config: &AppConfig,
    storage: &dyn Storage,
    output: &Path,
) -> Result<(), Report<AppError>> {
    let market = &config.market;
    let timeframe = market_timeframe(market)?;

    let candles = match market.start_time {
        Some(start) => {
            let end = market.end_time.unwrap_or_else(Utc::now);
            storage
                .get_candles_in_range(&market.symbol, timeframe, start, end)
                .await
        }
        None => {
            storage
                .get_recent_candles(&market.symbol, timeframe, market.limit)
                .await
        }
    }
    .change_context(AppError::Storage)?;

    let written = export::export_candles(output, &candles).change_context(AppError::Export)?;

    info!(
        symbol = %market.symbol,
        timeframe = %timeframe,
        rows = written,
        path = %output.display(),
        "csv export complete"
    );

    Ok(())
}

async fn print_history(
    config: &AppConfig,
    storage: &dyn Storage,
    limit: usize,
) -> Result<(), Report<AppError>> {
    let records = storage
        .recent_analyses(&config.market.symbol, limit)
        .await
        .change_context(AppError::Storage)?;

    if records.is_empty() {
        info!(symbol = %config.market.symbol, "no analyses recorded");
        return Ok(());
    }

    for record in &records {
        let target = record
            .target_price
            .map(|t| format!("{t:.4}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{} {} {} [{}] {} target={}",
            record.analyzed_at.to_rfc3339(),
            record.symbol,
            record.timeframe,
            record.strategy,
            record.label,
            target
        );
    }

    Ok(())
}
