use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::ToolDescriptor;

/// Tool — an external capability invoked through the registry.
///
/// Each of the integrated systems (document library, smart search,
/// roadmap/feasibility analysis, proposal generation) is reached only
/// through this trait. The handler receives input already validated
/// against `input_schema` and must return output matching `output_schema`
/// within `timeout_secs`. Handlers may perform network I/O and must be
/// assumed to have side effects and non-deterministic latency.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (unique within a registry).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// JSON Schema for tool output.
    fn output_schema(&self) -> serde_json::Value;

    /// Invoke the tool with validated arguments.
    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>>;

    /// Default timeout in seconds for this tool. Overridable per node.
    fn timeout_secs(&self) -> u64 {
        60
    }

    /// Immutable descriptor for listing and arity checks.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            output_schema: self.output_schema(),
            timeout_secs: self.timeout_secs(),
        }
    }
}
