//! DripFlow — scheduled drip-campaign delivery service.
//!
//! Main entry point that initializes all subsystems and starts the server.

use clap::Parser;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use dripflow_api::rest::AppState;
use dripflow_api::ApiServer;
use dripflow_channel::{SessionSupervisor, WhatsAppChannel};
use dripflow_core::config::AppConfig;
use dripflow_engine::{DailyTrigger, ProgressionEngine};
use dripflow_store::{InMemoryContentStore, InMemoryRecipientRegistry};

#[derive(Parser, Debug)]
#[command(name = "dripflow")]
#[command(about = "Scheduled drip-campaign delivery service")]
#[command(version)]
struct Cli {
    /// HTTP port (overrides config)
    #[arg(long, env = "DRIPFLOW__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Campaign length in days (overrides config)
    #[arg(long, env = "DRIPFLOW__CAMPAIGN__LENGTH")]
    campaign_length: Option<u32>,

    /// UTC hour of the daily send window (overrides config)
    #[arg(long, env = "DRIPFLOW__CAMPAIGN__SEND_HOUR")]
    send_hour: Option<u32>,

    /// Disable the daily scheduler (API-only mode)
    #[arg(long, default_value_t = false)]
    api_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dripflow=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("DripFlow starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(length) = cli.campaign_length {
        config.campaign.length = length;
    }
    if let Some(hour) = cli.send_hour {
        config.campaign.send_hour = hour;
    }

    info!(
        node_id = %config.node_id,
        campaign_length = config.campaign.length,
        send_hour = config.campaign.send_hour,
        send_minute = config.campaign.send_minute,
        http_port = config.api.http_port,
        "Configuration loaded"
    );

    // Initialize stores
    let registry = Arc::new(InMemoryRecipientRegistry::new());
    let content = Arc::new(InMemoryContentStore::new());

    // Start the supervised delivery session
    let session = Arc::new(SessionSupervisor::new(&config.channel));
    tokio::spawn(session.clone().run());
    let channel = Arc::new(WhatsAppChannel::new(&config.channel, session.clone()));

    // Initialize the progression engine
    let engine = Arc::new(ProgressionEngine::new(
        registry.clone(),
        content.clone(),
        channel,
        config.campaign.length,
    ));

    // Start the daily trigger (unless API-only mode)
    if !cli.api_only {
        let trigger = DailyTrigger::new(engine.clone(), &config.campaign)?;
        tokio::spawn(trigger.run());
    } else {
        info!("Running in API-only mode (no daily scheduler)");
    }

    // Start API server
    let state = AppState {
        registry,
        content,
        engine,
        session,
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config, state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        warn!(error = %e, "Failed to start metrics exporter");
    }

    info!("DripFlow is ready");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
