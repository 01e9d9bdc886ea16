use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use conflux_core::config::RemoteSystemConfig;
use conflux_core::error::Result;
use conflux_core::traits::Tool;

use super::SystemClient;

/// Search the web and paper indexes through the smart search system.
pub struct SmartSearchTool {
    client: SystemClient,
}

#[derive(Deserialize)]
struct SmartSearchInput {
    query: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    10
}

impl SmartSearchTool {
    pub fn new(config: &RemoteSystemConfig) -> Self {
        Self {
            client: SystemClient::from_config(config),
        }
    }
}

impl Tool for SmartSearchTool {
    fn name(&self) -> &str {
        "smart_search"
    }

    fn description(&self) -> &str {
        "Search the research index for papers and web sources matching a query."
    }

    fn timeout_secs(&self) -> u64 {
        self.client.timeout_secs()
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "limit": {"type": "integer", "description": "Maximum results (default: 10)"}
            },
            "required": ["query"]
        })
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: SmartSearchInput = serde_json::from_value(args)?;

            debug!(query = %params.query, "Running smart search");
            self.client
                .post_json(
                    self.name(),
                    "/search",
                    &serde_json::json!({ "query": params.query, "limit": params.limit }),
                )
                .await
        })
    }
}

/// Ask the search system a research question and get a grounded answer.
pub struct ResearchAnswerTool {
    client: SystemClient,
}

#[derive(Deserialize)]
struct ResearchAnswerInput {
    question: String,
    #[serde(default)]
    context: Option<String>,
}

impl ResearchAnswerTool {
    pub fn new(config: &RemoteSystemConfig) -> Self {
        Self {
            client: SystemClient::from_config(config),
        }
    }
}

impl Tool for ResearchAnswerTool {
    fn name(&self) -> &str {
        "research_answer"
    }

    fn description(&self) -> &str {
        "Answer a research question, optionally grounded in supplied context text."
    }

    fn timeout_secs(&self) -> u64 {
        self.client.timeout_secs()
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "The question to answer"},
                "context": {"type": "string", "description": "Optional grounding text"}
            },
            "required": ["question"]
        })
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: ResearchAnswerInput = serde_json::from_value(args)?;

            let mut body = serde_json::json!({ "question": params.question });
            if let Some(context) = params.context {
                body["context"] = serde_json::Value::String(context);
            }

            debug!(question = %params.question, "Asking research answer");
            self.client.post_json(self.name(), "/answer", &body).await
        })
    }
}
