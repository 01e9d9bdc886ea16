use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Suspended,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// A terminal run never changes status again and its context is frozen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Suspended => "SUSPENDED",
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

/// Kind of an execution event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    NodeStarted,
    NodeSucceeded,
    NodeFailed,
    Routed,
    RunSuspended,
    RunResumed,
    RunSucceeded,
    RunFailed,
    RunCancelled,
}

impl EventKind {
    /// Terminal kinds end every subscriber's event sequence for the run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::RunSucceeded | EventKind::RunFailed | EventKind::RunCancelled
        )
    }
}

/// One entry in a run's append-only, per-run-ordered event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub run_id: RunId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl ExecutionEvent {
    pub fn new(run_id: RunId, kind: EventKind) -> Self {
        Self {
            run_id,
            node_id: None,
            kind,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Outcome of a single node visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

/// One node visit in a run's step history. A retried node is a single
/// visit; `attempts` counts the invocations it took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub node_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: StepOutcome,
    pub attempts: u32,
}

/// Metadata half of a registered tool, shared read-only across runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub timeout_secs: u64,
}

/// Truncate a JSON value to a short display string for event payloads.
pub fn summarize_value(value: &serde_json::Value, max_len: usize) -> String {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.len() > max_len {
        let cut = text
            .char_indices()
            .take_while(|(i, _)| *i < max_len)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}… [truncated]", &text[..cut])
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Suspended.is_terminal());
        assert!(RunStatus::Succeeded.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_terminal_event_kinds() {
        assert!(EventKind::RunSucceeded.is_terminal());
        assert!(EventKind::RunCancelled.is_terminal());
        assert!(!EventKind::NodeFailed.is_terminal());
        assert!(!EventKind::RunSuspended.is_terminal());
    }

    #[test]
    fn test_event_kind_wire_format() {
        let json = serde_json::to_string(&EventKind::NodeStarted).unwrap();
        assert_eq!(json, "\"NODE_STARTED\"");
        let json = serde_json::to_string(&EventKind::RunCancelled).unwrap();
        assert_eq!(json, "\"RUN_CANCELLED\"");
    }

    #[test]
    fn test_event_builder() {
        let event = ExecutionEvent::new(RunId::from_string("r1"), EventKind::NodeStarted)
            .with_node("fetch")
            .with_payload(serde_json::json!({"attempt": 1}));
        assert_eq!(event.node_id.as_deref(), Some("fetch"));
        assert_eq!(event.payload["attempt"], 1);
    }

    #[test]
    fn test_summarize_value_truncates() {
        let long = serde_json::Value::String("x".repeat(100));
        let summary = summarize_value(&long, 10);
        assert!(summary.starts_with("xxxxxxxxxx"));
        assert!(summary.ends_with("[truncated]"));

        let short = serde_json::json!({"ok": true});
        assert_eq!(summarize_value(&short, 100), "{\"ok\":true}");
    }
}
