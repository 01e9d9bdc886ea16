use conflux_core::config::GatewayConfig;
use conflux_engine::WorkflowEngine;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub engine: WorkflowEngine,
}
