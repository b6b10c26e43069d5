use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use channel_archiver::archiver::{ArchiveSettings, ChannelArchiver, YtDlpDownloader};
use channel_archiver::config::Config;
use channel_archiver::ia::InternetArchiveClient;
use channel_archiver::store;

/// Archive a channel's videos to the Internet Archive.
#[derive(Debug, Parser)]
#[command(name = "channel-archiver", version, about)]
struct Cli {
    /// Suppress all logging output.
    #[arg(long)]
    no_logs: bool,

    /// Item id to bypass for this run. Repeatable; merged with SKIP_IDS.
    #[arg(long = "skip", value_name = "ID")]
    skip: Vec<String>,

    /// Wall-clock budget in seconds, overriding TIME_LIMIT_SECS.
    #[arg(long, value_name = "SECS")]
    time_limit_secs: Option<u64>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let no_logs = cli.no_logs;

    if let Err(e) = run(cli).await {
        if no_logs {
            eprintln!("error: {e:#}");
        } else {
            error!("Fatal error: {e:#}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    if !cli.no_logs {
        init_tracing()?;
    }

    info!("Starting channel-archiver");

    // Load and validate configuration
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(secs) = cli.time_limit_secs {
        config.time_limit = Duration::from_secs(secs);
    }
    config.skip_ids.extend(cli.skip);
    config.validate().context("Invalid configuration")?;

    info!(
        store = ?config.store,
        work_dir = %config.work_dir.display(),
        time_limit_secs = config.time_limit.as_secs(),
        "Configuration loaded"
    );

    let record_store = store::open(&config.store)
        .await
        .context("Failed to open record store")?;
    let downloader = YtDlpDownloader::new(&config.yt_dlp_path);
    let uploader =
        InternetArchiveClient::new(&config).context("Failed to initialize archive client")?;

    let archiver = ChannelArchiver::new(
        record_store,
        Arc::new(downloader),
        Arc::new(uploader),
        ArchiveSettings::from_config(&config),
    );

    // Stop cleanly at the deadline or on Ctrl+C / SIGTERM
    let shutdown = CancellationToken::new();
    let deadline = config.time_limit;
    let token = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(deadline) => {
                warn!(limit_secs = deadline.as_secs(), "Time limit reached, stopping");
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, stopping");
            }
        }
        token.cancel();
    });

    let summary = archiver.run(&config.skip_ids, &shutdown).await?;

    if summary.cancelled {
        info!("Stopped before the pass finished; remaining items stay pending for the next run");
    }
    info!("Done");

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,channel_archiver=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
