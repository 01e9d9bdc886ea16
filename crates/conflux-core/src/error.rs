use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfluxError {
    // Graph errors
    #[error("Graph '{graph}' is invalid: {}", .violations.join("; "))]
    GraphInvalid {
        graph: String,
        violations: Vec<String>,
    },

    #[error("Graph not found: {0}")]
    GraphNotFound(String),

    #[error("No matching route out of node '{node}'")]
    NoMatchingRoute { node: String },

    #[error("Run exceeded step limit ({limit})")]
    StepLimitExceeded { limit: usize },

    // Registry errors
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Tool schema invalid: {tool}: {}", .violations.join("; "))]
    SchemaInvalid {
        tool: String,
        violations: Vec<String>,
    },

    #[error("Tool {side} does not match schema: {tool}: {}", .violations.join("; "))]
    SchemaMismatch {
        tool: String,
        side: SchemaSide,
        violations: Vec<String>,
    },

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    // Run errors
    #[error("Node '{node}' requires context key '{key}' which is missing")]
    Mapping { node: String, key: String },

    #[error("Context key not found: {0}")]
    MissingKey(String),

    #[error("Context for run {0} is read-only (run reached a terminal status)")]
    ContextFrozen(String),

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Run {run_id} is {status}, cannot {action}")]
    InvalidRunState {
        run_id: String,
        status: String,
        action: String,
    },

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Store error: {0}")]
    Store(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Which half of a tool's contract failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSide {
    Input,
    Output,
}

impl std::fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaSide::Input => write!(f, "input"),
            SchemaSide::Output => write!(f, "output"),
        }
    }
}

impl ConfluxError {
    /// Stable identifier for the error kind, surfaced in failed-run
    /// snapshots and RUN_FAILED event payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            ConfluxError::GraphInvalid { .. } => "graph_invalid",
            ConfluxError::GraphNotFound(_) => "graph_not_found",
            ConfluxError::NoMatchingRoute { .. } => "no_matching_route",
            ConfluxError::StepLimitExceeded { .. } => "step_limit_exceeded",
            ConfluxError::UnknownTool(_) => "unknown_tool",
            ConfluxError::SchemaInvalid { .. } => "schema_invalid",
            ConfluxError::SchemaMismatch { .. } => "schema_mismatch",
            ConfluxError::ToolExecution { .. } => "tool_execution",
            ConfluxError::ToolTimeout { .. } => "tool_timeout",
            ConfluxError::Mapping { .. } => "mapping",
            ConfluxError::MissingKey(_) => "missing_key",
            ConfluxError::ContextFrozen(_) => "context_frozen",
            ConfluxError::RunNotFound(_) => "run_not_found",
            ConfluxError::InvalidRunState { .. } => "invalid_run_state",
            ConfluxError::Cancelled => "cancelled",
            ConfluxError::Config(_) => "config",
            ConfluxError::ConfigNotFound(_) => "config_not_found",
            ConfluxError::Store(_) => "store",
            ConfluxError::Gateway(_) => "gateway",
            ConfluxError::Io(_) => "io",
            ConfluxError::Json(_) => "json",
        }
    }

    /// Whether a node's failure policy (retry / skip) applies to this error.
    ///
    /// Only handler-reported failures and timeouts are recoverable; schema
    /// mismatches, mapping errors, and routing errors always fail the run.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            ConfluxError::ToolExecution { .. } | ConfluxError::ToolTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ConfluxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_failure_classification() {
        let exec = ConfluxError::ToolExecution {
            tool: "search".into(),
            message: "503".into(),
        };
        let timeout = ConfluxError::ToolTimeout {
            tool: "search".into(),
            timeout_secs: 30,
        };
        let mismatch = ConfluxError::SchemaMismatch {
            tool: "search".into(),
            side: SchemaSide::Output,
            violations: vec!["missing field".into()],
        };

        assert!(exec.is_tool_failure());
        assert!(timeout.is_tool_failure());
        assert!(!mismatch.is_tool_failure());
        assert!(!ConfluxError::NoMatchingRoute { node: "n".into() }.is_tool_failure());
    }

    #[test]
    fn test_error_kinds_are_stable() {
        assert_eq!(
            ConfluxError::UnknownTool("x".into()).kind(),
            "unknown_tool"
        );
        assert_eq!(
            ConfluxError::Mapping {
                node: "n".into(),
                key: "k".into()
            }
            .kind(),
            "mapping"
        );
    }
}
