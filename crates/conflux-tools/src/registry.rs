use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use conflux_core::config::SystemsConfig;
use conflux_core::error::{ConfluxError, Result, SchemaSide};
use conflux_core::traits::Tool;
use conflux_core::types::ToolDescriptor;

use crate::schema;

/// Registry of available tools.
///
/// A pure routing layer: it validates calls against the registered
/// contracts and forwards them to the handlers. Descriptors are immutable
/// once registered; re-registration under the same name is last-write-wins
/// as long as the replacement keeps the same required input fields.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, validating its schemas.
    pub fn register(&mut self, tool: impl Tool) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register an already-shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();

        let mut violations = schema::check_schema(&tool.input_schema());
        violations.extend(
            schema::check_schema(&tool.output_schema())
                .into_iter()
                .map(|v| format!("output {}", v)),
        );
        if !violations.is_empty() {
            return Err(ConfluxError::SchemaInvalid {
                tool: name,
                violations,
            });
        }

        if let Some(existing) = self.tools.get(&name) {
            let old = schema::required_fields(&existing.input_schema());
            let new = schema::required_fields(&tool.input_schema());
            if old != new {
                return Err(ConfluxError::SchemaInvalid {
                    tool: name,
                    violations: vec![format!(
                        "re-registration changes required input fields from {:?} to {:?}",
                        old, new
                    )],
                });
            }
            debug!(tool = %name, "Superseding registered tool");
        }

        self.tools.insert(name, tool);
        Ok(())
    }

    /// Unregister a tool by name.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.tools.remove(name).is_some()
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Descriptors for all registered tools.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    /// Invoke a tool by name with the descriptor's own timeout.
    pub async fn invoke(&self, name: &str, args: serde_json::Value) -> Result<serde_json::Value> {
        self.invoke_with_timeout(name, args, None).await
    }

    /// Invoke a tool by name, optionally overriding its timeout.
    ///
    /// Arguments are validated against the input schema before the call,
    /// the handler's result against the output schema after it. An output
    /// mismatch is `SchemaMismatch` even though the handler itself
    /// succeeded.
    pub async fn invoke_with_timeout(
        &self,
        name: &str,
        args: serde_json::Value,
        timeout_override: Option<std::time::Duration>,
    ) -> Result<serde_json::Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| ConfluxError::UnknownTool(name.to_string()))?;

        let violations = schema::check_value(&tool.input_schema(), &args);
        if !violations.is_empty() {
            return Err(ConfluxError::SchemaMismatch {
                tool: name.to_string(),
                side: SchemaSide::Input,
                violations,
            });
        }

        let timeout =
            timeout_override.unwrap_or(std::time::Duration::from_secs(tool.timeout_secs()));

        let output = match tokio::time::timeout(timeout, tool.call(args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                // Propagate handler failures as tool execution errors,
                // wrapping anything the handler did not classify itself.
                return Err(match e {
                    e @ ConfluxError::ToolExecution { .. } => e,
                    e @ ConfluxError::ToolTimeout { .. } => e,
                    other => ConfluxError::ToolExecution {
                        tool: name.to_string(),
                        message: other.to_string(),
                    },
                });
            }
            Err(_) => {
                warn!(tool = %name, timeout_secs = timeout.as_secs(), "Tool call timed out");
                return Err(ConfluxError::ToolTimeout {
                    tool: name.to_string(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        let violations = schema::check_value(&tool.output_schema(), &output);
        if !violations.is_empty() {
            return Err(ConfluxError::SchemaMismatch {
                tool: name.to_string(),
                side: SchemaSide::Output,
                violations,
            });
        }

        Ok(output)
    }

    /// Create a registry with tools for every configured system.
    pub fn with_systems(config: &SystemsConfig) -> Result<Self> {
        let mut registry = Self::new();

        if let Some(ref library) = config.library {
            registry.register(crate::builtin::library::DocumentListTool::new(library))?;
            registry.register(crate::builtin::library::DocumentSummarizeTool::new(library))?;
        }
        if let Some(ref search) = config.search {
            registry.register(crate::builtin::search::SmartSearchTool::new(search))?;
            registry.register(crate::builtin::search::ResearchAnswerTool::new(search))?;
        }
        if let Some(ref analysis) = config.analysis {
            registry.register(crate::builtin::analysis::FeasibilityTool::new(analysis))?;
            registry.register(crate::builtin::analysis::RoadmapTool::new(analysis))?;
        }
        if let Some(ref proposal) = config.proposal {
            registry.register(crate::builtin::proposal::ProposalTool::new(proposal))?;
        }

        Ok(registry)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FnTool;
    use serde_json::json;

    fn echo_tool(name: &str) -> FnTool {
        FnTool::new(name, "Echo the input back")
            .with_input_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }))
            .with_output_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }))
            .with_handler(|args| Box::pin(async move { Ok(args) }))
    }

    #[tokio::test]
    async fn test_register_and_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("echo")).unwrap();

        let output = registry.invoke("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(output["text"], "hi");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, ConfluxError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_input_schema_mismatch() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("echo")).unwrap();

        let err = registry.invoke("echo", json!({})).await.unwrap_err();
        match err {
            ConfluxError::SchemaMismatch { side, .. } => assert_eq!(side, SchemaSide::Input),
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_output_schema_mismatch_flags_buggy_tool() {
        let mut registry = ToolRegistry::new();
        let tool = FnTool::new("bad", "Returns the wrong shape")
            .with_input_schema(json!({"type": "object"}))
            .with_output_schema(json!({
                "type": "object",
                "properties": {"score": {"type": "number"}},
                "required": ["score"]
            }))
            .with_handler(|_| Box::pin(async { Ok(json!({"wrong": true})) }));
        registry.register(tool).unwrap();

        let err = registry.invoke("bad", json!({})).await.unwrap_err();
        match err {
            ConfluxError::SchemaMismatch { side, .. } => assert_eq!(side, SchemaSide::Output),
            other => panic!("expected SchemaMismatch, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_handler_error_wrapped_as_execution() {
        let mut registry = ToolRegistry::new();
        let tool = FnTool::new("flaky", "Always fails")
            .with_input_schema(json!({"type": "object"}))
            .with_output_schema(json!({"type": "object"}))
            .with_handler(|_| {
                Box::pin(async { Err(ConfluxError::MissingKey("internal".into())) })
            });
        registry.register(tool).unwrap();

        let err = registry.invoke("flaky", json!({})).await.unwrap_err();
        assert!(matches!(err, ConfluxError::ToolExecution { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_tool_failure() {
        let mut registry = ToolRegistry::new();
        let tool = FnTool::new("slow", "Never returns")
            .with_input_schema(json!({"type": "object"}))
            .with_output_schema(json!({"type": "object"}))
            .with_handler(|_| {
                Box::pin(async {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    Ok(json!({}))
                })
            });
        registry.register(tool).unwrap();

        let err = registry
            .invoke_with_timeout("slow", json!({}), Some(std::time::Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfluxError::ToolTimeout { .. }));
        assert!(err.is_tool_failure());
    }

    #[test]
    fn test_register_rejects_malformed_schema() {
        let mut registry = ToolRegistry::new();
        let tool = FnTool::new("broken", "Bad schema")
            .with_input_schema(json!({"type": "tuple"}))
            .with_output_schema(json!({"type": "object"}))
            .with_handler(|_| Box::pin(async { Ok(json!({})) }));
        let err = registry.register(tool).unwrap_err();
        assert!(matches!(err, ConfluxError::SchemaInvalid { .. }));
    }

    #[test]
    fn test_reregistration_last_write_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("echo")).unwrap();

        let replacement = echo_tool("echo");
        registry.register(replacement).unwrap();
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn test_reregistration_incompatible_arity() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("echo")).unwrap();

        let incompatible = FnTool::new("echo", "Different required fields")
            .with_input_schema(json!({
                "type": "object",
                "properties": {"text": {"type": "string"}, "lang": {"type": "string"}},
                "required": ["text", "lang"]
            }))
            .with_output_schema(json!({"type": "object"}))
            .with_handler(|args| Box::pin(async move { Ok(args) }));

        let err = registry.register(incompatible).unwrap_err();
        assert!(matches!(err, ConfluxError::SchemaInvalid { .. }));
    }
}
