use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::policy::FailurePolicy;

/// A node in a workflow graph.
///
/// A node either invokes a registered tool or is a pure routing step
/// (`tool: None`). Input mappings feed context values into the tool call;
/// output mappings write results back. Immutable once the graph is
/// published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique identifier within the graph.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Tool to invoke, or None for a pure routing node.
    #[serde(default)]
    pub tool: Option<String>,
    /// Tool argument field ← context key.
    #[serde(default)]
    pub input: HashMap<String, String>,
    /// Context key ← tool output field. `"."` maps the whole output.
    #[serde(default)]
    pub output: HashMap<String, String>,
    /// Per-node override of the tool's timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// What to do when the tool call fails.
    #[serde(default)]
    pub on_failure: FailurePolicy,
    /// Suspend the run on arrival and wait for resume input before
    /// executing this node.
    #[serde(default)]
    pub await_input: bool,
}

impl NodeSpec {
    /// Create a pure routing node.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tool: None,
            input: HashMap::new(),
            output: HashMap::new(),
            timeout_secs: None,
            on_failure: FailurePolicy::default(),
            await_input: false,
        }
    }

    /// Set the tool this node invokes.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Map a tool argument field to a context key.
    pub fn with_input(mut self, field: impl Into<String>, context_key: impl Into<String>) -> Self {
        self.input.insert(field.into(), context_key.into());
        self
    }

    /// Map a context key to a tool output field (`"."` = whole output).
    pub fn with_output(mut self, context_key: impl Into<String>, field: impl Into<String>) -> Self {
        self.output.insert(context_key.into(), field.into());
        self
    }

    /// Override the tool's timeout for this node.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = policy;
        self
    }

    /// Declare this node as a suspension point.
    pub fn awaiting_input(mut self) -> Self {
        self.await_input = true;
        self
    }

    /// Whether this is a routing-only node.
    pub fn is_pure(&self) -> bool {
        self.tool.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let node = NodeSpec::new("summarize", "Summarize documents")
            .with_tool("library_summarize_documents")
            .with_input("document_ids", "selected_ids")
            .with_output("summary", ".")
            .with_timeout(120);

        assert_eq!(node.id, "summarize");
        assert!(!node.is_pure());
        assert_eq!(node.input["document_ids"], "selected_ids");
        assert_eq!(node.output["summary"], ".");
        assert_eq!(node.timeout_secs, Some(120));
        assert!(!node.await_input);
    }

    #[test]
    fn test_pure_node() {
        let node = NodeSpec::new("done", "Done");
        assert!(node.is_pure());
        assert!(node.input.is_empty());
    }

    #[test]
    fn test_serde_defaults() {
        let node: NodeSpec =
            serde_json::from_str(r#"{"id": "a", "name": "A"}"#).unwrap();
        assert!(node.is_pure());
        assert!(!node.await_input);
        assert!(matches!(node.on_failure, FailurePolicy::FailRun));
    }
}
