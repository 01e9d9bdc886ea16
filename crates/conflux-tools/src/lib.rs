pub mod builtin;
pub mod registry;
pub mod schema;

pub use registry::ToolRegistry;

use futures::future::BoxFuture;

use conflux_core::error::{ConfluxError, Result};
use conflux_core::traits::Tool;

type Handler =
    Box<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value>> + Send + Sync>;

/// A tool built from a closure, for embedding custom capabilities without
/// a dedicated struct. Used heavily by the engine test suites.
pub struct FnTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
    output_schema: serde_json::Value,
    timeout_secs: u64,
    handler: Option<Handler>,
}

impl FnTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: serde_json::json!({"type": "object"}),
            timeout_secs: 60,
            handler: None,
        }
    }

    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = schema;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_handler<F>(mut self, f: F) -> Self
    where
        F: Fn(serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value>>
            + Send
            + Sync
            + 'static,
    {
        self.handler = Some(Box::new(f));
        self
    }
}

impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.input_schema.clone()
    }

    fn output_schema(&self) -> serde_json::Value {
        self.output_schema.clone()
    }

    fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    fn call(&self, args: serde_json::Value) -> BoxFuture<'_, Result<serde_json::Value>> {
        match &self.handler {
            Some(handler) => handler(args),
            None => {
                let name = self.name.clone();
                Box::pin(async move {
                    Err(ConfluxError::ToolExecution {
                        tool: name,
                        message: "no handler attached".to_string(),
                    })
                })
            }
        }
    }
}
