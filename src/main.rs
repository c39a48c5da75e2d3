//! Funding Rate Aggregator - Main Entry Point
//!
//! `serve` runs the backend polling caches behind their HTTP routes.
//! `watch` runs the venue adapters and logs the ranked cross-venue view.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use funding_rate_aggregator::aggregator::{AggregatedView, Aggregator};
use funding_rate_aggregator::backend::{server, Backend};
use funding_rate_aggregator::config::Config;
use funding_rate_aggregator::exchange::{self, Venue};
use funding_rate_aggregator::utils::format_price;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Funding Rate Aggregator CLI
#[derive(Parser)]
#[command(name = "funding-rate-aggregator")]
#[command(version, about = "Cross-exchange perpetual funding rate aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the backend polling caches and their HTTP routes
    Serve {
        /// Listen address (overrides backend.bind_addr)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Run the venue adapters and log the ranked view
    Watch {
        /// Venues to run (overrides adapters.enabled)
        #[arg(short, long, value_delimiter = ',')]
        venues: Vec<Venue>,

        /// Rows to log per summary
        #[arg(short, long, default_value = "15")]
        top: usize,

        /// Seconds between summaries
        #[arg(long, default_value = "10")]
        every: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;

    let mut config = Config::load()?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.backend.bind_addr = bind;
            }
            config.validate()?;
            log_config(&config);
            run_serve(&config).await
        }
        Commands::Watch { venues, top, every } => {
            if !venues.is_empty() {
                config.adapters.enabled = venues;
            }
            config.validate()?;
            log_config(&config);
            run_watch(&config, top, Duration::from_secs(every.max(1))).await
        }
    }
}

async fn run_serve(config: &Config) -> Result<()> {
    let backend = Arc::new(Backend::new(config).context("Failed to build backend caches")?);
    let timers = backend
        .start()
        .await
        .context("Initial cache refresh failed")?;

    let listener = TcpListener::bind(&config.backend.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.backend.bind_addr))?;

    server::serve(listener, backend, shutdown_signal())
        .await
        .context("HTTP server failed")?;

    for timer in timers {
        timer.abort();
    }
    info!("Backend stopped");
    Ok(())
}

async fn run_watch(config: &Config, top: usize, every: Duration) -> Result<()> {
    let adapters = exchange::build_enabled(config).context("Failed to build adapters")?;
    let aggregator = Aggregator::start(adapters, config.aggregator.tick()).await;
    if aggregator.active_venues().is_empty() {
        warn!("No adapter initialized, nothing to watch");
        aggregator.shutdown().await;
        return Ok(());
    }

    let mut summary = tokio::time::interval(every);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = summary.tick() => log_view(&aggregator.current(), top),
        }
    }

    aggregator.shutdown().await;
    Ok(())
}

/// Initialize logging with console and file output.
fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all("logs")?;

    let file_appender = tracing_appender::rolling::hourly("logs", "funding-rate-aggregator.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the guard alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("funding_rate_aggregator=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(())
}

/// Log configuration on startup.
fn log_config(config: &Config) {
    info!("Configuration:");
    info!(
        "   Venues: {}",
        config
            .adapters
            .enabled
            .iter()
            .map(Venue::name)
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!("   Backend URL: {}", config.adapters.backend_url);
    info!("   Backend bind: {}", config.backend.bind_addr);
    info!(
        "   Cache refresh: {}s, metadata refresh: {}s",
        config.backend.refresh_interval_secs, config.adapters.metadata_refresh_secs
    );
    info!("   Aggregator tick: {}ms", config.aggregator.tick_ms);
}

fn log_view(view: &AggregatedView, top: usize) {
    info!(
        "Ranked {} rows across {} symbols",
        view.rows.len(),
        view.rows
            .iter()
            .map(|r| r.symbol.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len()
    );
    for (i, row) in view.rows.iter().take(top).enumerate() {
        let spot = view
            .spot_venues(&row.symbol)
            .map(|v| v.iter().map(Venue::short_code).collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        let margin = view
            .margin_venues(&row.symbol)
            .map(|v| v.iter().map(Venue::short_code).collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        info!(
            "   #{:<2} {:<3} {:<10} APR {:>8.2}% | 8h {:>7.4}% | mark {:>12} | premium {:>6.3}% | OI ${:>14} | spot [{}] margin [{}]",
            i + 1,
            row.exchange.short_code(),
            row.symbol,
            row.funding_rate_apr,
            row.rate_8h(),
            format_price(row.mark_price, 5),
            row.premium_pct(),
            if row.has_open_interest() {
                format_price(row.open_interest_usd, 4)
            } else {
                "-".to_string()
            },
            spot,
            margin
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
