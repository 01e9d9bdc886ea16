use base64::Engine as _;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use conflux_core::config::RemoteSystemConfig;
use conflux_core::error::Result;
use conflux_core::traits::Tool;

use super::SystemClient;

/// Generate a funding proposal PDF from a feasibility report.
///
/// The remote returns raw PDF bytes; they are base64-encoded into the
/// tool output so the result stays JSON all the way through the context.
pub struct ProposalTool {
    client: SystemClient,
}

#[derive(Deserialize)]
struct ProposalInput {
    report_text: String,
}

impl ProposalTool {
    pub fn new(config: &RemoteSystemConfig) -> Self {
        Self {
            client: SystemClient::from_config(config),
        }
    }
}

impl Tool for ProposalTool {
    fn name(&self) -> &str {
        "generate_proposal"
    }

    fn description(&self) -> &str {
        "Generate a funding proposal PDF from a feasibility report text."
    }

    fn timeout_secs(&self) -> u64 {
        self.client.timeout_secs()
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "report_text": {"type": "string", "description": "The feasibility report content"}
            },
            "required": ["report_text"]
        })
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pdf_base64": {"type": "string"},
                "size_bytes": {"type": "integer"}
            },
            "required": ["pdf_base64"]
        })
    }

    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: ProposalInput = serde_json::from_value(args)?;

            let bytes = self
                .client
                .post_bytes(
                    self.name(),
                    "/proposal/generate",
                    &serde_json::json!({ "report_text": params.report_text }),
                )
                .await?;

            debug!(size_bytes = bytes.len(), "Proposal PDF generated");
            let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
            Ok(serde_json::json!({
                "pdf_base64": encoded,
                "size_bytes": bytes.len(),
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor() {
        let config = RemoteSystemConfig {
            base_url: "http://localhost:1/".into(),
            api_key: Some("pk-test".into()),
            timeout_secs: 300,
        };
        let tool = ProposalTool::new(&config);
        assert_eq!(tool.name(), "generate_proposal");
        assert!(crate::schema::check_schema(&tool.input_schema()).is_empty());
        assert!(crate::schema::check_schema(&tool.output_schema()).is_empty());
    }
}
