use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use pulse_client::stream::{AnomalyStream, AnomalyStreamConfig};
use pulse_client::PulseClient;
use pulse_core::filter::AnomalyFilter;
use pulse_core::{AppConfig, ConfigLoader};
use pulse_session::{SessionActor, SessionConfig};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "pulse")]
#[command(about = "Near-real-time trend and anomaly dashboard client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a live dashboard session, logging snapshot updates
    Run {
        /// Config profile (loads config/Config.<profile>.toml)
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Fetch one page of the trend catalog
    Trends {
        #[arg(long, default_value_t = 0)]
        offset: u64,
        #[arg(long, default_value_t = 60)]
        limit: u64,
    },
    /// Fetch one page of anomaly history
    Anomalies {
        #[arg(long, default_value_t = 0)]
        page: u64,
        #[arg(long, default_value_t = 40)]
        limit: u64,
        /// Keyword substring filter
        #[arg(long)]
        keyword: Option<String>,
        /// Minimum z-score filter
        #[arg(long)]
        min_z: Option<f64>,
        /// Only anomalies at or after this ISO-8601 instant
        #[arg(long)]
        since: Option<String>,
    },
    /// Fetch drill-down detail for one keyword
    Keyword {
        keyword: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { profile } => {
            let config = match profile {
                Some(profile) => ConfigLoader::load_with_profile(&profile)?,
                None => ConfigLoader::load()?,
            };
            run_session(config).await
        }
        Commands::Trends { offset, limit } => {
            let client = client_from_config()?;
            let page = client.fetch_trends(offset, limit).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
        Commands::Anomalies {
            page,
            limit,
            keyword,
            min_z,
            since,
        } => {
            let since = since
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .with_context(|| format!("Invalid --since timestamp: {s}"))
                })
                .transpose()?;
            let filter = AnomalyFilter {
                keyword,
                min_z,
                since,
            };
            let client = client_from_config()?;
            let result = client.fetch_anomalies(page, limit, &filter).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Commands::Keyword { keyword } => {
            let client = client_from_config()?;
            let detail = client.fetch_keyword_detail(&keyword).await?;
            println!("{}", serde_json::to_string_pretty(&detail)?);
            Ok(())
        }
    }
}

fn client_from_config() -> Result<PulseClient> {
    let config = ConfigLoader::load()?;
    PulseClient::with_timeout(
        config.api.base_url,
        Duration::from_secs(config.api.request_timeout_secs),
    )
}

async fn run_session(config: AppConfig) -> Result<()> {
    let client = Arc::new(PulseClient::with_timeout(
        config.api.base_url.clone(),
        Duration::from_secs(config.api.request_timeout_secs),
    )?);

    let stream_url = format!(
        "{}/api/anomalies/stream",
        config.api.base_url.trim_end_matches('/')
    );
    let (stream_handle, stream_rx) =
        match AnomalyStream::connect(AnomalyStreamConfig::new(stream_url)).await {
            Ok((handle, rx)) => (Some(handle), rx),
            Err(err) => {
                // degrade to poll-only; the session surfaces the gap
                tracing::warn!(%err, "live channel unavailable, continuing without push");
                let (_tx, rx) = mpsc::channel(1);
                (None, rx)
            }
        };

    let handle = SessionActor::spawn(
        Arc::clone(&client) as Arc<dyn pulse_core::TrendsSource>,
        client as Arc<dyn pulse_core::AnomalySource>,
        stream_rx,
        stream_handle,
        SessionConfig::from_feed(&config.feed),
    );

    let mut snapshots = handle.subscribe();
    tracing::info!("session started, ctrl-c to stop");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow_and_update().clone();
                tracing::info!(
                    total_posts = snap.kpi.total_posts,
                    active_keywords = snap.kpi.active_keywords,
                    anomalies_today = snap.kpi.anomalies_today,
                    feed_len = snap.anomalies.events.len(),
                    live = snap.stream_connected,
                    error = snap.last_error.as_deref().unwrap_or(""),
                    "dashboard updated"
                );
            }
        }
    }

    handle.shutdown().await?;
    Ok(())
}
