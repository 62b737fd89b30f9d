use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

mod api;
mod config;
mod discord;
mod engine;
mod models;
mod notifier;
mod prober;
mod tracker;

use crate::config::MonitorConfig;
use crate::discord::DiscordClient;
use crate::engine::{Monitor, SystemClock};
use crate::prober::HttpProber;

#[derive(Parser)]
#[command(
    name = "api-uptime-monitor",
    about = "Watches the Bugtracker and Octadesk APIs and reports outages to Discord",
    version
)]
struct Cli {
    /// JSON config file; environment variables override its values.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll both APIs and serve /status (default)
    Run,
    /// Delete the recent messages in the notification channel and exit
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::INFO.into()))
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let config = MonitorConfig::load(&cli.config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Clear => clear(config).await,
    }
}

async fn run(config: MonitorConfig) -> Result<()> {
    config.validate()?;

    let notifier = notifier::from_config(&config.discord)?;
    let (tx, rx) = notifier::notification_channel();
    tokio::spawn(notifier::run_dispatcher(rx, notifier));

    let monitor = Arc::new(Monitor::new(
        config.targets(),
        config.check_interval(),
        Arc::new(HttpProber::new()?),
        Arc::new(SystemClock),
        tx,
    ));

    let tracker_for_api = monitor.tracker.clone();
    let api_port = config.api_port;
    tokio::spawn(async move {
        if let Err(e) = api::start_server(api_port, tracker_for_api).await {
            error!("Status server failed: {:#}", e);
        }
    });

    let monitor_task = tokio::spawn(Arc::clone(&monitor).run());
    supervise(signal::ctrl_c(), monitor_task).await
}

/// Waits for the shutdown signal. The monitor loop never returns on its own,
/// so its task ending first (a panic included) is an error.
async fn supervise<F>(shutdown: F, monitor_task: JoinHandle<()>) -> Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        res = shutdown => {
            res?;
            info!("Shutdown signal received. Stopping API monitor...");
            Ok(())
        }
        res = monitor_task => {
            error!("Monitor loop stopped unexpectedly");
            match res {
                Err(e) => Err(anyhow::Error::from(e).context("Monitor task failed")),
                Ok(()) => Err(anyhow!("Monitor loop exited")),
            }
        }
    }
}

async fn clear(config: MonitorConfig) -> Result<()> {
    let client = DiscordClient::from_config(&config.discord)?
        .context("clear needs BOT_TOKEN and CHANNEL_ID")?;
    let deleted = client
        .clear_channel(Utc::now())
        .await
        .context("Failed to clear channel")?;
    info!(
        "Deleted {} messages from channel {}",
        deleted,
        config.discord.channel_id.as_deref().unwrap_or_default()
    );
    Ok(())
}
