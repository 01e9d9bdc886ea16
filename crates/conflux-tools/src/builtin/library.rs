use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use conflux_core::config::RemoteSystemConfig;
use conflux_core::error::Result;
use conflux_core::traits::Tool;

use super::SystemClient;

/// List and search the user's research document library.
pub struct DocumentListTool {
    client: SystemClient,
}

#[derive(Deserialize)]
struct DocumentListInput {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
}

fn default_limit() -> u32 {
    20
}

impl DocumentListTool {
    pub fn new(config: &RemoteSystemConfig) -> Self {
        Self {
            client: SystemClient::from_config(config),
        }
    }
}

impl Tool for DocumentListTool {
    fn name(&self) -> &str {
        "library_search_documents"
    }

    fn description(&self) -> &str {
        "List and search research documents in the user's library, optionally filtered by text and date range."
    }

    fn timeout_secs(&self) -> u64 {
        self.client.timeout_secs()
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "limit": {"type": "integer", "description": "Maximum documents to return (default: 20)"},
                "offset": {"type": "integer", "description": "Pagination offset"},
                "search": {"type": "string", "description": "Free-text filter"},
                "start_date": {"type": "string", "description": "ISO date lower bound"},
                "end_date": {"type": "string", "description": "ISO date upper bound"}
            }
        })
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: DocumentListInput = serde_json::from_value(args)?;

            let mut query: Vec<(&str, String)> = vec![
                ("limit", params.limit.to_string()),
                ("offset", params.offset.to_string()),
            ];
            if let Some(search) = params.search {
                query.push(("search", search));
            }
            if let Some(start) = params.start_date {
                query.push(("start_date", start));
            }
            if let Some(end) = params.end_date {
                query.push(("end_date", end));
            }

            debug!(limit = params.limit, "Listing library documents");
            self.client
                .get_json(self.name(), "/research/list", &query)
                .await
        })
    }
}

/// Summarize multiple research documents in one pass.
pub struct DocumentSummarizeTool {
    client: SystemClient,
}

#[derive(Deserialize)]
struct DocumentSummarizeInput {
    document_ids: Vec<String>,
}

impl DocumentSummarizeTool {
    pub fn new(config: &RemoteSystemConfig) -> Self {
        Self {
            client: SystemClient::from_config(config),
        }
    }
}

impl Tool for DocumentSummarizeTool {
    fn name(&self) -> &str {
        "library_summarize_documents"
    }

    fn description(&self) -> &str {
        "Produce a combined summary of the given research documents."
    }

    fn timeout_secs(&self) -> u64 {
        self.client.timeout_secs()
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "document_ids": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Ids of the documents to summarize"
                }
            },
            "required": ["document_ids"]
        })
    }

    fn output_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        Box::pin(async move {
            let params: DocumentSummarizeInput = serde_json::from_value(args)?;

            debug!(count = params.document_ids.len(), "Summarizing documents");
            self.client
                .post_json(
                    self.name(),
                    "/research/summarize",
                    &serde_json::json!({ "document_ids": params.document_ids }),
                )
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::config::RemoteSystemConfig;

    fn config() -> RemoteSystemConfig {
        RemoteSystemConfig {
            base_url: "http://localhost:1".into(),
            api_key: None,
            timeout_secs: 300,
        }
    }

    #[test]
    fn test_descriptors() {
        let list = DocumentListTool::new(&config());
        assert_eq!(list.name(), "library_search_documents");
        assert_eq!(list.timeout_secs(), 300);
        assert!(crate::schema::check_schema(&list.input_schema()).is_empty());

        let summarize = DocumentSummarizeTool::new(&config());
        let schema = summarize.input_schema();
        assert_eq!(schema["required"][0], "document_ids");
        assert!(crate::schema::check_schema(&schema).is_empty());
    }
}
