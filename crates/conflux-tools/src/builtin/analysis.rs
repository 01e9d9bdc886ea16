use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use conflux_core::config::RemoteSystemConfig;
use conflux_core::error::Result;
use conflux_core::traits::Tool;

use super::SystemClient;

#[derive(Deserialize)]
struct SummaryInput {
    summary: String,
}

/// Assess project feasibility from a summary.
///
/// The analysis system streams its report line by line; the collected
/// lines become a single `report` string.
pub struct FeasibilityTool {
    client: SystemClient,
}

impl FeasibilityTool {
    pub fn new(config: &RemoteSystemConfig) -> Self {
        Self {
            client: SystemClient::from_config(config),
        }
    }
}

impl Tool for FeasibilityTool {
    fn name(&self) -> &str {
        "assess_feasibility"
    }

    fn description(&self) -> &str {
        "Generate a feasibility report from a project summary."
    }

    fn timeout_secs(&self) -> u64 {
        self.client.timeout_secs()
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "description": "The project summary text"}
            },
            "required": ["summary"]
        })
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "report": {"type": "string"}
            },
            "required": ["report"]
        })
    }

    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: SummaryInput = serde_json::from_value(args)?;

            debug!(chars = params.summary.len(), "Assessing feasibility");
            let report = self
                .client
                .post_collect_lines(
                    self.name(),
                    "/feasibility/assess-from-summary-stream",
                    &serde_json::json!({ "summary": params.summary }),
                )
                .await?;

            Ok(serde_json::json!({ "report": report }))
        })
    }
}

/// Generate a project roadmap from a summary, collected from the same
/// streaming transport as the feasibility endpoint.
pub struct RoadmapTool {
    client: SystemClient,
}

impl RoadmapTool {
    pub fn new(config: &RemoteSystemConfig) -> Self {
        Self {
            client: SystemClient::from_config(config),
        }
    }
}

impl Tool for RoadmapTool {
    fn name(&self) -> &str {
        "generate_roadmap"
    }

    fn description(&self) -> &str {
        "Generate a development roadmap from a project summary."
    }

    fn timeout_secs(&self) -> u64 {
        self.client.timeout_secs()
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "description": "The project summary text"}
            },
            "required": ["summary"]
        })
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "roadmap": {"type": "string"}
            },
            "required": ["roadmap"]
        })
    }

    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: SummaryInput = serde_json::from_value(args)?;

            debug!(chars = params.summary.len(), "Generating roadmap");
            let roadmap = self
                .client
                .post_collect_lines(
                    self.name(),
                    "/roadmap/generate-from-summary-stream",
                    &serde_json::json!({ "summary": params.summary }),
                )
                .await?;

            Ok(serde_json::json!({ "roadmap": roadmap }))
        })
    }
}
