use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use ceitrack::config::{self, ResolvedConfig};
use ceitrack::credentials::Credentials;
use ceitrack::fees::FeeSchedule;
use ceitrack::portal::PortalClient;
use ceitrack::quotes::{self, BrowserQuoteSource, PriceCache};
use ceitrack::records::{PositionStatus, TradeRecord};
use ceitrack::retry::RetryPolicy;

#[derive(Parser)]
#[command(name = "ceitrack")]
#[command(about = "CEI trade-history scraper with price-delta reports")]
struct Cli {
    /// Path to config file. Defaults to ./ceitrack.toml, falling back to
    /// the user config directory.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, fetch the trading history, and print a report (default)
    Fetch {
        /// Also fetch current prices and report deltas for held positions
        #[arg(long)]
        quotes: bool,
    },
    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;

    let _guard = init_logging(&config)?;

    match cli.command {
        Some(Command::Config) => {
            println!("Config file: {}", config_path.display());
            println!("Data directory: {}", config.data_dir.display());
            println!("Portal: {}", config.portal.base_url);
            println!("Retry attempts: {}", config.retry.max_attempts);
            println!("Quotes enabled: {}", config.quotes.enabled);
            match &config.fee_schedule {
                Some(path) => println!("Fee schedule: {}", path.display()),
                None => println!("Fee schedule: (none)"),
            }
        }
        Some(Command::Fetch { quotes }) => run_fetch(&config, quotes).await?,
        None => run_fetch(&config, false).await?,
    }

    Ok(())
}

/// Log to a daily-rotating file under the data directory; stdout stays
/// reserved for the report itself.
fn init_logging(config: &ResolvedConfig) -> Result<WorkerGuard> {
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "ceitrack.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

async fn run_fetch(config: &ResolvedConfig, with_quotes: bool) -> Result<()> {
    let credentials = Credentials::resolve()?;
    let fee_schedule = FeeSchedule::load_optional(config.fee_schedule.as_deref())?;

    let client = PortalClient::new(&config.portal)?;
    let policy = RetryPolicy::new(config.retry.max_attempts);

    println!("Connecting to CEI...");
    let client_ref = &client;
    let credentials_ref = &credentials;
    let records = policy
        .run(move || async move {
            let session = client_ref
                .authenticate(credentials_ref.user(), credentials_ref.expose_password())
                .await?;
            client_ref.fetch_trade_history(&session).await
        })
        .await
        .context("Unable to fetch trading history")?;

    print_report(&records, &fee_schedule);

    if with_quotes || config.quotes.enabled {
        report_price_deltas(config, &records).await?;
    }

    Ok(())
}

fn print_report(records: &[TradeRecord], fee_schedule: &FeeSchedule) {
    println!("\nTrading history ({} records):", records.len());
    for record in records {
        println!("  {record}");

        if record.position == PositionStatus::Closed {
            if let Some(entry) = fee_schedule.get(&record.agent) {
                let costs =
                    entry.order_cost(record.buy_volume()) + entry.order_cost(record.sell_volume());
                println!(
                    "    est. fees via {}: R${}, net R${}",
                    entry.name,
                    costs.round_dp(2),
                    (record.profit() - costs).round_dp(2)
                );
            }
        }
    }
}

async fn report_price_deltas(config: &ResolvedConfig, records: &[TradeRecord]) -> Result<()> {
    let mut cache = PriceCache::load(config.price_cache_path());

    let source = match BrowserQuoteSource::launch(&config.quotes).await {
        Ok(source) => source,
        Err(err) => {
            warn!(error = %err, "Quote source unavailable, skipping price deltas");
            println!("\nQuote source unavailable, skipping price deltas.");
            return Ok(());
        }
    };

    let deltas = quotes::compute_deltas(records, &source, &mut cache).await;
    source.close();

    if deltas.is_empty() {
        println!("\nNo current prices available.");
    } else {
        println!("\nCurrent prices for held positions:");
        for delta in &deltas {
            match delta.delta {
                Some(change) if change.is_sign_negative() => {
                    println!("  {}: R${} ({} since last run)", delta.ticker, delta.current, change)
                }
                Some(change) => {
                    println!("  {}: R${} (+{} since last run)", delta.ticker, delta.current, change)
                }
                None => println!("  {}: R${} (first observation)", delta.ticker, delta.current),
            }
        }
    }

    cache.save()?;
    Ok(())
}
