use axum::extract::ws::{Message, WebSocket};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use conflux_core::types::RunId;
use conflux_engine::WorkflowEngine;

use crate::protocol::{EndFrame, EventFrame};

/// Stream a run's events over one WebSocket until the terminal event.
///
/// With `replay`, the persisted log is delivered first; otherwise the
/// subscriber only sees events from its subscription point onward. A slow
/// socket lags and drops events rather than ever stalling the run.
pub async fn handle_events_socket(
    mut socket: WebSocket,
    engine: WorkflowEngine,
    run_id: RunId,
    replay: bool,
) {
    if replay {
        match engine.recorded_events(&run_id).await {
            Ok(events) => {
                for event in events {
                    if send_json(&mut socket, &EventFrame::replayed(event)).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Event replay failed");
            }
        }
    }

    // Already terminal: the sequence is complete, close immediately.
    match engine.snapshot(&run_id).await {
        Ok(snapshot) if snapshot.status.is_terminal() => {
            let _ = send_json(&mut socket, &EndFrame::new(run_id.to_string())).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        Err(_) => {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        Ok(_) => {}
    }

    let mut rx = match engine.subscribe(&run_id) {
        Ok(rx) => rx,
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Event subscription failed");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) => {
                    let terminal = event.kind.is_terminal();
                    if send_json(&mut socket, &EventFrame::live(event)).await.is_err() {
                        return;
                    }
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(run_id = %run_id, skipped, "Subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!(run_id = %run_id, "Subscriber disconnected");
                    return;
                }
                Some(Err(e)) => {
                    debug!(run_id = %run_id, error = %e, "WebSocket read error");
                    return;
                }
                _ => {}
            },
        }
    }

    let _ = send_json(&mut socket, &EndFrame::new(run_id.to_string())).await;
    let _ = socket.send(Message::Close(None)).await;
    debug!(run_id = %run_id, "Event stream complete");
}

async fn send_json<T: serde::Serialize>(
    socket: &mut WebSocket,
    frame: &T,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            warn!(error = %e, "Failed to serialize frame");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await
}
