use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use crate::types::{ExecutionEvent, RunId};

/// Per-run event bus using tokio broadcast channels.
///
/// `publish` never blocks: a slow subscriber lags and drops messages, the
/// publisher never waits on it. Channels are independent per run, so
/// unrelated runs are never serialized against each other. When a terminal
/// event is published the run's channel is dropped and every subscriber's
/// sequence ends.
pub struct EventBus {
    capacity: usize,
    channels: RwLock<HashMap<String, broadcast::Sender<ExecutionEvent>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Publish an event for its run. Fire-and-forget: errors from absent
    /// receivers are ignored.
    pub fn publish(&self, event: ExecutionEvent) {
        let terminal = event.kind.is_terminal();
        let run_key = event.run_id.to_string();

        let tx = {
            let channels = self.channels.read().unwrap();
            channels.get(&run_key).cloned()
        };
        let tx = match tx {
            Some(tx) => tx,
            None => self.open(&event.run_id),
        };

        let _ = tx.send(event);

        if terminal {
            self.channels.write().unwrap().remove(&run_key);
        }
    }

    /// Subscribe to a run's live events from this point onward. History is
    /// not replayed. The bus does not track finished runs: callers that may
    /// subscribe after the terminal event must check the run's status first
    /// (the engine does).
    pub fn subscribe(&self, run_id: &RunId) -> broadcast::Receiver<ExecutionEvent> {
        let existing = {
            let channels = self.channels.read().unwrap();
            channels.get(&run_id.to_string()).cloned()
        };
        match existing {
            Some(tx) => tx.subscribe(),
            None => self.open(run_id).subscribe(),
        }
    }

    /// Whether the run's channel is still open (no terminal event yet).
    pub fn is_open(&self, run_id: &RunId) -> bool {
        self.channels
            .read()
            .unwrap()
            .contains_key(&run_id.to_string())
    }

    fn open(&self, run_id: &RunId) -> broadcast::Sender<ExecutionEvent> {
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(run_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = EventBus::new(16);
        let run_id = RunId::new();
        let mut rx = bus.subscribe(&run_id);

        bus.publish(ExecutionEvent::new(run_id.clone(), EventKind::NodeStarted).with_node("a"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::NodeStarted);
        assert_eq!(event.node_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_terminal_event_closes_channel() {
        let bus = EventBus::new(16);
        let run_id = RunId::new();
        let mut rx = bus.subscribe(&run_id);

        bus.publish(ExecutionEvent::new(run_id.clone(), EventKind::RunSucceeded));
        assert!(!bus.is_open(&run_id));

        // The terminal event is still delivered, then the stream ends.
        let event = rx.recv().await.unwrap();
        assert!(event.kind.is_terminal());
        assert!(rx.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_block() {
        let bus = EventBus::new(2);
        let run_id = RunId::new();
        for _ in 0..10 {
            bus.publish(ExecutionEvent::new(run_id.clone(), EventKind::NodeStarted));
        }
        // No subscriber ever attached; nothing blocked or panicked.
        assert!(bus.is_open(&run_id));
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let bus = EventBus::new(16);
        let run_a = RunId::new();
        let run_b = RunId::new();
        let mut rx_a = bus.subscribe(&run_a);

        bus.publish(ExecutionEvent::new(run_b.clone(), EventKind::NodeStarted));
        bus.publish(ExecutionEvent::new(run_a.clone(), EventKind::RunSucceeded));

        // run_a's subscriber only ever sees run_a events.
        let event = rx_a.recv().await.unwrap();
        assert_eq!(event.run_id, run_a);
    }
}
