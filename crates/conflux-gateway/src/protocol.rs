use serde::Serialize;

use conflux_core::types::ExecutionEvent;

/// An event frame pushed over the events WebSocket.
#[derive(Debug, Serialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    /// True when this event was replayed from the persisted log rather
    /// than delivered live.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
    #[serde(flatten)]
    pub event: ExecutionEvent,
}

impl EventFrame {
    pub fn live(event: ExecutionEvent) -> Self {
        Self {
            frame_type: "event".to_string(),
            replayed: false,
            event,
        }
    }

    pub fn replayed(event: ExecutionEvent) -> Self {
        Self {
            frame_type: "event".to_string(),
            replayed: true,
            event,
        }
    }
}

/// The closing frame: the run reached a terminal state and the sequence
/// is complete.
#[derive(Debug, Serialize)]
pub struct EndFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub run_id: String,
}

impl EndFrame {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            frame_type: "end".to_string(),
            run_id: run_id.into(),
        }
    }
}
