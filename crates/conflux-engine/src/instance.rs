use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use conflux_core::error::ConfluxError;
use conflux_core::types::{RunId, RunStatus, StepRecord};

use crate::context::ContextStore;

/// Error detail attached to a FAILED run: the stable error kind, the
/// message, and the last node reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
}

impl ErrorDetail {
    pub fn from_error(error: &ConfluxError, node: Option<&str>) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            node: node.map(|n| n.to_string()),
        }
    }
}

/// One execution of a workflow graph, from submission to a terminal
/// status. Mutated only by the execution engine; retained until
/// explicitly purged by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub run_id: RunId,
    pub graph: String,
    pub graph_version: u32,
    pub current_node: String,
    pub status: RunStatus,
    pub context: ContextStore,
    /// Node visits in order. A retried node is one visit.
    pub history: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set by resume; consumed when the awaited node executes.
    #[serde(skip)]
    pub resume_pending: bool,
}

impl WorkflowInstance {
    pub fn new(
        run_id: RunId,
        graph: impl Into<String>,
        graph_version: u32,
        start_node: impl Into<String>,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            context: ContextStore::for_run(run_id.to_string(), input),
            run_id,
            graph: graph.into(),
            graph_version,
            current_node: start_node.into(),
            status: RunStatus::Pending,
            history: Vec::new(),
            error: None,
            created_at: now,
            updated_at: now,
            resume_pending: false,
        }
    }

    /// Move to a new status, freezing the context on terminal ones.
    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        self.updated_at = Utc::now();
        if status.is_terminal() {
            self.context.freeze();
        }
    }

    pub fn record_step(&mut self, record: StepRecord) {
        self.history.push(record);
        self.updated_at = Utc::now();
    }

    /// Consume the resume flag, true exactly once after a resume.
    pub fn take_resume(&mut self) -> bool {
        std::mem::take(&mut self.resume_pending)
    }

    /// Move the cursor to the next node.
    pub fn advance_to(&mut self, node: impl Into<String>) {
        self.current_node = node.into();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::types::StepOutcome;

    fn instance() -> WorkflowInstance {
        WorkflowInstance::new(RunId::new(), "demo", 1, "start", serde_json::Map::new())
    }

    #[test]
    fn test_new_instance_is_pending() {
        let inst = instance();
        assert_eq!(inst.status, RunStatus::Pending);
        assert_eq!(inst.current_node, "start");
        assert!(inst.history.is_empty());
        assert!(inst.error.is_none());
    }

    #[test]
    fn test_terminal_status_freezes_context() {
        let mut inst = instance();
        inst.set_status(RunStatus::Running);
        assert!(!inst.context.is_frozen());

        inst.set_status(RunStatus::Succeeded);
        assert!(inst.context.is_frozen());
    }

    #[test]
    fn test_record_step() {
        let mut inst = instance();
        inst.record_step(StepRecord {
            node_id: "start".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcome: StepOutcome::Succeeded,
            attempts: 1,
        });
        assert_eq!(inst.history.len(), 1);
        assert_eq!(inst.history[0].node_id, "start");
    }

    #[test]
    fn test_take_resume_consumes_flag() {
        let mut inst = instance();
        assert!(!inst.take_resume());
        inst.resume_pending = true;
        assert!(inst.take_resume());
        assert!(!inst.take_resume());
    }

    #[test]
    fn test_error_detail() {
        let err = ConfluxError::NoMatchingRoute {
            node: "route".into(),
        };
        let detail = ErrorDetail::from_error(&err, Some("route"));
        assert_eq!(detail.kind, "no_matching_route");
        assert_eq!(detail.node.as_deref(), Some("route"));
    }
}
