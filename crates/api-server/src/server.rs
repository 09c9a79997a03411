//! API server — mounts the campaign control surface and the metrics
//! exporter.

use crate::rest::{self, AppState};
use axum::routing::{get, post};
use axum::Router;
use dripflow_core::config::AppConfig;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Main API server for the campaign control surface.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Start the HTTP REST server. Blocks until shutdown.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = Router::new()
            // Enrollment
            .route(
                "/api/v1/recipients",
                get(rest::list_recipients).post(rest::enroll_recipient),
            )
            // Content authoring
            .route(
                "/api/v1/content",
                get(rest::list_content).post(rest::upsert_content),
            )
            .route("/api/v1/content/:day", get(rest::get_content))
            // Session and ticks
            .route("/api/v1/session", get(rest::session_status))
            .route("/api/v1/ticks/run", post(rest::run_tick_now))
            // Operational endpoints
            .route("/health", get(rest::health_check))
            .route("/ready", get(rest::readiness))
            .route("/live", get(rest::liveness))
            // Middleware
            .layer(CompressionLayer::new())
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the metrics server on a separate port.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
        let handle = builder
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install_recorder()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");

        // Keep the handle alive
        std::mem::forget(handle);
        Ok(())
    }
}
