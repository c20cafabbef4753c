use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use common::Config;
use engine::{
    Backtest, BacktestReport, BacktestRequest, DataSourceRegistry, ExchangeRegistry,
    ShutdownPolicy,
};
use strategy::StrategyRegistry;

mod run_file;

use run_file::RunFile;

#[derive(Parser, Debug)]
#[command(name = "backtester")]
#[command(about = "Replay historical crypto prices through a trading strategy against a simulated exchange", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one backtest
    Backtest {
        /// Strategy name (moving_average, dca)
        #[arg(long)]
        strategy: String,

        /// Comma-separated positional parameters, e.g. "2,5" or "3,100"
        #[arg(long = "strategy_params", default_value = "")]
        strategy_params: String,

        /// Exchange name (fake_exchange)
        #[arg(long)]
        exchange: String,

        /// Data source name (binance_csv, binance_api)
        #[arg(long)]
        datasource: String,

        /// CSV file path, or klines query such as "symbol=BTCUSDT&interval=1h"
        #[arg(long = "datasource_path", default_value = "")]
        datasource_path: String,

        /// Let the strategy and exchange finish queued work instead of
        /// cancelling them when the data runs out
        #[arg(long)]
        drain: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run every backtest listed in a TOML file
    Batch {
        /// Path to the run file
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Console plus a per-run log file, truncated at startup.
fn setup_logging(verbose: bool, log_file: &str) -> Result<WorkerGuard> {
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file = std::fs::File::create(log_file)
        .with_context(|| format!("Failed to create log file {log_file}"))?;
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!(log_file, "Logging initialized");
    Ok(guard)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Config ────────────────────────────────────────────────────────────────
    let config = Config::from_env().context("Invalid environment configuration")?;

    // ── Logging ──────────────────────────────────────────────────────────────
    let _guard = setup_logging(cli.verbose, &config.log_file)?;

    let ok = match cli.command {
        Commands::Backtest {
            strategy,
            strategy_params,
            exchange,
            datasource,
            datasource_path,
            drain,
            json,
        } => {
            let request = BacktestRequest {
                strategy,
                strategy_params,
                exchange,
                datasource,
                datasource_path,
            };
            let shutdown = if drain {
                ShutdownPolicy::Drain
            } else {
                ShutdownPolicy::Cancel
            };
            run_one(&config, &request, shutdown, json).await?
        }
        Commands::Batch { file } => run_batch(&config, &file).await?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Reject unknown component names before anything is built.
fn check_names(request: &BacktestRequest) -> Result<()> {
    StrategyRegistry::default().create(&request.strategy)?;
    ExchangeRegistry::default().resolve(&request.exchange)?;
    DataSourceRegistry::default().resolve(&request.datasource)?;
    Ok(())
}

async fn run_one(
    config: &Config,
    request: &BacktestRequest,
    shutdown: ShutdownPolicy,
    json: bool,
) -> Result<bool> {
    check_names(request)?;

    let report = Backtest::new(config.clone())
        .with_shutdown(shutdown)
        .run(request)
        .await
        .context("Backtest setup failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.is_success())
}

async fn run_batch(config: &Config, path: &Path) -> Result<bool> {
    let runs = RunFile::load(path)?;
    info!(runs = runs.backtest.len(), file = %path.display(), "Running batch");

    let mut all_ok = true;
    for entry in &runs.backtest {
        let result = match check_names(&entry.request) {
            Ok(()) => Backtest::new(config.clone())
                .with_shutdown(entry.shutdown())
                .run(&entry.request)
                .await
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(report) => {
                all_ok &= report.is_success();
                println!("{}", summary_line(&entry.name, &report));
            }
            Err(e) => {
                all_ok = false;
                error!(run = %entry.name, error = %e, "Run did not start");
                println!("{:<20} setup failed: {e}", entry.name);
            }
        }
    }
    Ok(all_ok)
}

fn summary_line(name: &str, report: &BacktestReport) -> String {
    let s = &report.exchange;
    format!(
        "{:<20} {:<6} ticks={} buys={} sells={} position={} cash={:.2} pnl={}",
        name,
        if report.is_success() { "ok" } else { "FAILED" },
        report.ticks_published,
        s.num_purchases,
        s.num_sales,
        s.current_balance,
        s.currency_held,
        s.profit_loss
            .map(|p| format!("{p:.2}"))
            .unwrap_or_else(|| "-".to_string()),
    )
}

fn print_report(report: &BacktestReport) {
    let s = &report.exchange;
    println!("Backtest {}", report.run_id);
    println!("  ticks published : {}", report.ticks_published);
    for outcome in &report.outcomes {
        println!("  {:<16}: {}", outcome.component.to_string(), outcome.state);
    }
    println!("  purchases       : {}", s.num_purchases);
    println!("  sales           : {}", s.num_sales);
    println!("  position (BTC)  : {}", s.current_balance);
    println!("  cash (USD)      : {:.2}", s.currency_held);
    match (s.last_price, s.profit_loss) {
        (Some(price), Some(pnl)) => println!("  P/L             : {pnl:.2} at {price}"),
        _ => println!("  P/L             : no fills"),
    }
}
