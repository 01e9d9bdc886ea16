use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use conflux_core::config::GatewayConfig;
use conflux_engine::WorkflowEngine;

use crate::routes;
use crate::state::AppState;

/// HTTP + WebSocket gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    engine: WorkflowEngine,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, engine: WorkflowEngine) -> Self {
        Self { config, engine }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            engine: self.engine.clone(),
        });

        let app = Router::new()
            .route("/api/health", get(routes::health))
            // Graphs
            .route(
                "/api/graphs",
                get(routes::list_graphs).post(routes::publish_graph),
            )
            // Runs
            .route("/api/runs", get(routes::list_runs).post(routes::submit_run))
            .route(
                "/api/runs/{id}",
                get(routes::get_run).delete(routes::purge_run),
            )
            .route("/api/runs/{id}/resume", post(routes::resume_run))
            .route("/api/runs/{id}/cancel", post(routes::cancel_run))
            // Event streaming
            .route("/api/runs/{id}/events", get(routes::run_events))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}
