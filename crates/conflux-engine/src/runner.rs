use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use conflux_core::config::EngineConfig;
use conflux_core::error::{ConfluxError, Result};
use conflux_core::event::EventBus;
use conflux_core::types::{
    summarize_value, EventKind, ExecutionEvent, RunId, RunStatus, StepOutcome, StepRecord,
};
use conflux_tools::{schema, ToolRegistry};

use crate::graph::{NodeSpec, WorkflowGraph};
use crate::instance::{ErrorDetail, WorkflowInstance};
use crate::policy::{backoff_delay, FailurePolicy};
use crate::store::{MemoryRunStore, RunStore};

const PAYLOAD_SUMMARY_LEN: usize = 500;

/// Executes workflow runs.
///
/// Holds the published graphs, the live run handles, the shared tool
/// registry, and the per-run event bus. Each run is driven by one spawned
/// task; node execution within a run is strictly sequential. The engine is
/// the only mutator of `WorkflowInstance`s.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    registry: Arc<ToolRegistry>,
    bus: Arc<EventBus>,
    store: Arc<dyn RunStore>,
    graphs: RwLock<HashMap<String, Arc<WorkflowGraph>>>,
    runs: Mutex<HashMap<String, RunHandle>>,
}

#[derive(Clone)]
struct RunHandle {
    instance: Arc<Mutex<WorkflowInstance>>,
    graph: Arc<WorkflowGraph>,
    cancel: CancellationToken,
}

/// How a node visit ended after the failure policy was applied.
enum StepFailure {
    /// Route to the skip target instead of failing the run.
    Skip(String, ConfluxError),
    /// Fail the run.
    Fatal(ConfluxError),
}

impl WorkflowEngine {
    /// Create an engine with an in-memory run store.
    pub fn new(config: EngineConfig, registry: Arc<ToolRegistry>) -> Self {
        Self::with_store(config, registry, Arc::new(MemoryRunStore::new()))
    }

    /// Create an engine backed by an external run store.
    pub fn with_store(
        config: EngineConfig,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        let bus = Arc::new(EventBus::new(config.event_capacity));
        Self {
            inner: Arc::new(EngineInner {
                config,
                registry,
                bus,
                store,
                graphs: RwLock::new(HashMap::new()),
                runs: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn registry(&self) -> Arc<ToolRegistry> {
        self.inner.registry.clone()
    }

    pub fn bus(&self) -> Arc<EventBus> {
        self.inner.bus.clone()
    }

    /// Validate and publish a graph. An invalid graph is rejected here and
    /// never accepted for execution.
    pub async fn publish(&self, graph: WorkflowGraph) -> Result<()> {
        graph.validate()?;
        self.inner.store.save_graph(&graph).await?;
        let reference = graph.reference();
        self.inner
            .graphs
            .write()
            .unwrap()
            .insert(reference.clone(), Arc::new(graph));
        info!(graph = %reference, "Graph published");
        Ok(())
    }

    /// Published graphs as (name, version, node count).
    pub fn list_graphs(&self) -> Vec<(String, u32, usize)> {
        let graphs = self.inner.graphs.read().unwrap();
        let mut listing: Vec<(String, u32, usize)> = graphs
            .values()
            .map(|g| (g.name.clone(), g.version, g.nodes.len()))
            .collect();
        listing.sort();
        listing
    }

    /// Look up a published graph, latest version when none is given.
    pub fn graph(&self, name: &str, version: Option<u32>) -> Result<Arc<WorkflowGraph>> {
        let graphs = self.inner.graphs.read().unwrap();
        let found = match version {
            Some(version) => graphs.get(&format!("{}@{}", name, version)).cloned(),
            None => graphs
                .values()
                .filter(|g| g.name == name)
                .max_by_key(|g| g.version)
                .cloned(),
        };
        found.ok_or_else(|| match version {
            Some(version) => ConfluxError::GraphNotFound(format!("{}@{}", name, version)),
            None => ConfluxError::GraphNotFound(name.to_string()),
        })
    }

    /// Create a run in PENDING without starting it. Lets a caller attach
    /// an event subscription before the first event fires.
    pub async fn submit(
        &self,
        graph_name: &str,
        version: Option<u32>,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Result<RunId> {
        let graph = self.graph(graph_name, version)?;
        let run_id = RunId::new();
        let instance = WorkflowInstance::new(
            run_id.clone(),
            graph.name.clone(),
            graph.version,
            graph.start.clone(),
            input,
        );

        self.inner.store.save_instance(&instance).await?;
        self.inner.runs.lock().unwrap().insert(
            run_id.to_string(),
            RunHandle {
                instance: Arc::new(Mutex::new(instance)),
                graph: graph.clone(),
                cancel: CancellationToken::new(),
            },
        );

        info!(run_id = %run_id, graph = %graph.reference(), "Run submitted");
        Ok(run_id)
    }

    /// Start a PENDING run.
    pub fn start(&self, run_id: &RunId) -> Result<()> {
        let handle = self.inner.handle(run_id)?;
        {
            let inst = handle.instance.lock().unwrap();
            if inst.status != RunStatus::Pending {
                return Err(ConfluxError::InvalidRunState {
                    run_id: run_id.to_string(),
                    status: inst.status.to_string(),
                    action: "start".to_string(),
                });
            }
        }
        tokio::spawn(drive(self.inner.clone(), run_id.clone()));
        Ok(())
    }

    /// Submit and start in one call.
    pub async fn run(
        &self,
        graph_name: &str,
        version: Option<u32>,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Result<RunId> {
        let run_id = self.submit(graph_name, version, input).await?;
        self.start(&run_id)?;
        Ok(run_id)
    }

    /// Resume a SUSPENDED run, merging the supplied input into context.
    pub async fn resume(
        &self,
        run_id: &RunId,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        let handle = self.inner.handle(run_id)?;
        let node_id = {
            let mut inst = handle.instance.lock().unwrap();
            if inst.status != RunStatus::Suspended {
                return Err(ConfluxError::InvalidRunState {
                    run_id: run_id.to_string(),
                    status: inst.status.to_string(),
                    action: "resume".to_string(),
                });
            }
            inst.context.merge(input)?;
            inst.resume_pending = true;
            inst.set_status(RunStatus::Running);
            inst.current_node.clone()
        };

        self.inner.persist(&handle.instance).await;
        self.inner
            .emit(ExecutionEvent::new(run_id.clone(), EventKind::RunResumed).with_node(&node_id))
            .await;
        info!(run_id = %run_id, node_id = %node_id, "Run resumed");

        tokio::spawn(drive(self.inner.clone(), run_id.clone()));
        Ok(())
    }

    /// Request cooperative cancellation. A running step is never
    /// interrupted; the flag is observed at the next step boundary.
    pub async fn cancel(&self, run_id: &RunId) -> Result<()> {
        let handle = self.inner.handle(run_id)?;
        let status = handle.instance.lock().unwrap().status;
        if status.is_terminal() {
            return Err(ConfluxError::InvalidRunState {
                run_id: run_id.to_string(),
                status: status.to_string(),
                action: "cancel".to_string(),
            });
        }

        handle.cancel.cancel();
        info!(run_id = %run_id, status = %status, "Cancellation requested");

        // No task is driving a PENDING or SUSPENDED run; finalize here.
        if matches!(status, RunStatus::Pending | RunStatus::Suspended) {
            self.inner.finish_cancelled(run_id, &handle.instance, None).await;
        }
        Ok(())
    }

    /// Current snapshot of a run (live if present, else from the store).
    pub async fn snapshot(&self, run_id: &RunId) -> Result<WorkflowInstance> {
        if let Ok(handle) = self.inner.handle(run_id) {
            return Ok(handle.instance.lock().unwrap().clone());
        }
        self.inner
            .store
            .load_instance(run_id)
            .await?
            .ok_or_else(|| ConfluxError::RunNotFound(run_id.to_string()))
    }

    /// Snapshots of all live runs, oldest first.
    pub fn list_runs(&self) -> Vec<WorkflowInstance> {
        let runs = self.inner.runs.lock().unwrap();
        let mut listing: Vec<WorkflowInstance> = runs
            .values()
            .map(|h| h.instance.lock().unwrap().clone())
            .collect();
        listing.sort_by_key(|i| i.created_at);
        listing
    }

    /// Drop a terminal run and its persisted state.
    pub async fn purge(&self, run_id: &RunId) -> Result<()> {
        let status = self.snapshot(run_id).await?.status;
        if !status.is_terminal() {
            return Err(ConfluxError::InvalidRunState {
                run_id: run_id.to_string(),
                status: status.to_string(),
                action: "purge".to_string(),
            });
        }
        self.inner.runs.lock().unwrap().remove(&run_id.to_string());
        self.inner.store.delete_instance(run_id).await?;
        info!(run_id = %run_id, "Run purged");
        Ok(())
    }

    /// Subscribe to a run's live events from this point onward. For a run
    /// that already reached a terminal status the sequence ends
    /// immediately; use `recorded_events` for explicit replay.
    pub fn subscribe(
        &self,
        run_id: &RunId,
    ) -> Result<tokio::sync::broadcast::Receiver<ExecutionEvent>> {
        let handle = self.inner.handle(run_id)?;
        if handle.instance.lock().unwrap().status.is_terminal() {
            let (tx, rx) = tokio::sync::broadcast::channel(1);
            drop(tx);
            return Ok(rx);
        }
        Ok(self.inner.bus.subscribe(run_id))
    }

    /// The persisted event log, for explicit replay.
    pub async fn recorded_events(&self, run_id: &RunId) -> Result<Vec<ExecutionEvent>> {
        self.inner.store.load_events(run_id).await
    }
}

impl EngineInner {
    fn handle(&self, run_id: &RunId) -> Result<RunHandle> {
        self.runs
            .lock()
            .unwrap()
            .get(&run_id.to_string())
            .cloned()
            .ok_or_else(|| ConfluxError::RunNotFound(run_id.to_string()))
    }

    /// Append to the event log, then broadcast. Neither path may block or
    /// fail the run: store errors are logged, bus delivery is lossy for
    /// lagging subscribers.
    async fn emit(&self, event: ExecutionEvent) {
        if let Err(e) = self.store.append_event(&event).await {
            warn!(run_id = %event.run_id, error = %e, "Failed to persist event");
        }
        self.bus.publish(event);
    }

    async fn persist(&self, instance: &Arc<Mutex<WorkflowInstance>>) {
        let snapshot = instance.lock().unwrap().clone();
        if let Err(e) = self.store.save_instance(&snapshot).await {
            warn!(run_id = %snapshot.run_id, error = %e, "Failed to persist instance");
        }
    }

    async fn fail_run(
        &self,
        run_id: &RunId,
        instance: &Arc<Mutex<WorkflowInstance>>,
        cause: ConfluxError,
        node_id: Option<&str>,
    ) {
        {
            let mut inst = instance.lock().unwrap();
            inst.error = Some(ErrorDetail::from_error(&cause, node_id));
            inst.set_status(RunStatus::Failed);
        }
        self.persist(instance).await;

        let mut event = ExecutionEvent::new(run_id.clone(), EventKind::RunFailed).with_payload(
            serde_json::json!({
                "kind": cause.kind(),
                "error": cause.to_string(),
            }),
        );
        if let Some(node_id) = node_id {
            event = event.with_node(node_id);
        }
        self.emit(event).await;
        error!(run_id = %run_id, error = %cause, "Run failed");
    }

    async fn finish_cancelled(
        &self,
        run_id: &RunId,
        instance: &Arc<Mutex<WorkflowInstance>>,
        node_id: Option<&str>,
    ) {
        {
            let mut inst = instance.lock().unwrap();
            if inst.status.is_terminal() {
                return;
            }
            inst.set_status(RunStatus::Cancelled);
        }
        self.persist(instance).await;

        let mut event = ExecutionEvent::new(run_id.clone(), EventKind::RunCancelled);
        if let Some(node_id) = node_id {
            event = event.with_node(node_id);
        }
        self.emit(event).await;
        info!(run_id = %run_id, "Run cancelled");
    }

    /// Map context into the tool call and invoke it through the registry.
    async fn invoke_node(
        &self,
        node: &NodeSpec,
        instance: &Arc<Mutex<WorkflowInstance>>,
    ) -> Result<serde_json::Value> {
        let tool_name = node
            .tool
            .as_deref()
            .expect("invoke_node called on a pure node");
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ConfluxError::UnknownTool(tool_name.to_string()))?;
        let required = schema::required_fields(&tool.input_schema());

        let args = {
            let inst = instance.lock().unwrap();
            let mut map = serde_json::Map::new();
            for (field, key) in &node.input {
                match inst.context.get_opt(key) {
                    Some(value) => {
                        map.insert(field.clone(), value.clone());
                    }
                    None if required.contains(field) => {
                        return Err(ConfluxError::Mapping {
                            node: node.id.clone(),
                            key: key.clone(),
                        });
                    }
                    None => {
                        debug!(
                            node_id = %node.id,
                            key = %key,
                            "Optional input key absent, skipping"
                        );
                    }
                }
            }
            serde_json::Value::Object(map)
        };

        let timeout = node.timeout_secs.map(Duration::from_secs);
        self.registry
            .invoke_with_timeout(tool_name, args, timeout)
            .await
    }
}

/// Writes produced by a node's output mapping.
fn map_outputs(
    node: &NodeSpec,
    output: &serde_json::Value,
) -> serde_json::Map<String, serde_json::Value> {
    let mut writes = serde_json::Map::new();
    for (context_key, field) in &node.output {
        if field == "." {
            writes.insert(context_key.clone(), output.clone());
        } else if let Some(value) = output.get(field) {
            writes.insert(context_key.clone(), value.clone());
        } else {
            debug!(
                node_id = %node.id,
                field = %field,
                "Output field absent, skipping"
            );
        }
    }
    writes
}

/// Drive a run until it suspends, completes, or fails. One task per run;
/// respawned on resume.
async fn drive(inner: Arc<EngineInner>, run_id: RunId) {
    let handle = match inner.handle(&run_id) {
        Ok(handle) => handle,
        Err(_) => return,
    };
    let instance = handle.instance;
    let graph = handle.graph;
    let cancel = handle.cancel;

    {
        let mut inst = instance.lock().unwrap();
        if inst.status.is_terminal() {
            return;
        }
        if inst.status == RunStatus::Pending {
            inst.set_status(RunStatus::Running);
        }
    }
    inner.persist(&instance).await;

    loop {
        // Step boundary: the cancellation flag is observed here, never
        // mid-tool-call.
        if cancel.is_cancelled() {
            inner.finish_cancelled(&run_id, &instance, None).await;
            return;
        }

        let current_id = instance.lock().unwrap().current_node.clone();
        let node = match graph.node(&current_id) {
            Some(node) => node.clone(),
            None => {
                let cause = ConfluxError::GraphInvalid {
                    graph: graph.reference(),
                    violations: vec![format!("node '{}' vanished from graph", current_id)],
                };
                inner.fail_run(&run_id, &instance, cause, Some(&current_id)).await;
                return;
            }
        };

        // Declared suspension point: park until resume supplies input.
        if node.await_input && !instance.lock().unwrap().take_resume() {
            {
                let mut inst = instance.lock().unwrap();
                inst.set_status(RunStatus::Suspended);
            }
            inner.persist(&instance).await;
            inner
                .emit(
                    ExecutionEvent::new(run_id.clone(), EventKind::RunSuspended)
                        .with_node(&current_id),
                )
                .await;
            info!(run_id = %run_id, node_id = %current_id, "Run suspended awaiting input");
            return;
        }

        let visits = instance.lock().unwrap().history.len();
        if visits >= inner.config.max_steps {
            let cause = ConfluxError::StepLimitExceeded {
                limit: inner.config.max_steps,
            };
            inner.fail_run(&run_id, &instance, cause, Some(&current_id)).await;
            return;
        }

        info!(run_id = %run_id, node_id = %current_id, "Executing node");
        let started_at = Utc::now();
        inner
            .emit(ExecutionEvent::new(run_id.clone(), EventKind::NodeStarted).with_node(&current_id))
            .await;

        // Invoke with the node's failure policy. Every failed attempt
        // emits NODE_FAILED, whichever policy fires afterwards.
        let mut attempts: u32 = 0;
        let step = loop {
            attempts += 1;
            let result = if node.is_pure() {
                Ok(None)
            } else {
                inner.invoke_node(&node, &instance).await.map(Some)
            };

            match result {
                Ok(output) => break Ok(output),
                Err(cause) => {
                    warn!(
                        run_id = %run_id,
                        node_id = %current_id,
                        attempt = attempts,
                        error = %cause,
                        "Node attempt failed"
                    );
                    inner
                        .emit(
                            ExecutionEvent::new(run_id.clone(), EventKind::NodeFailed)
                                .with_node(&current_id)
                                .with_payload(serde_json::json!({
                                    "kind": cause.kind(),
                                    "error": cause.to_string(),
                                    "attempt": attempts,
                                })),
                        )
                        .await;

                    if !cause.is_tool_failure() {
                        break Err(StepFailure::Fatal(cause));
                    }
                    match &node.on_failure {
                        FailurePolicy::Retry {
                            max_attempts,
                            backoff,
                        } if attempts < *max_attempts => {
                            let delay = backoff_delay(attempts - 1, backoff);
                            debug!(
                                run_id = %run_id,
                                node_id = %current_id,
                                backoff_ms = delay.as_millis() as u64,
                                "Retrying node"
                            );
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        FailurePolicy::SkipTo { node: target } => {
                            break Err(StepFailure::Skip(target.clone(), cause));
                        }
                        // FailRun, or retries exhausted.
                        _ => break Err(StepFailure::Fatal(cause)),
                    }
                }
            }
        };

        match step {
            Ok(output) => {
                if let Some(ref output) = output {
                    let writes = map_outputs(&node, output);
                    let merged = instance.lock().unwrap().context.merge(writes);
                    if let Err(cause) = merged {
                        inner.fail_run(&run_id, &instance, cause, Some(&current_id)).await;
                        return;
                    }
                }
                {
                    let mut inst = instance.lock().unwrap();
                    inst.record_step(StepRecord {
                        node_id: current_id.clone(),
                        started_at,
                        finished_at: Utc::now(),
                        outcome: StepOutcome::Succeeded,
                        attempts,
                    });
                }
                inner.persist(&instance).await;

                let payload = match output {
                    Some(ref output) => serde_json::json!({
                        "output": summarize_value(output, PAYLOAD_SUMMARY_LEN),
                        "attempts": attempts,
                    }),
                    None => serde_json::json!({ "attempts": attempts }),
                };
                inner
                    .emit(
                        ExecutionEvent::new(run_id.clone(), EventKind::NodeSucceeded)
                            .with_node(&current_id)
                            .with_payload(payload),
                    )
                    .await;

                // A cancellation that arrived mid-step lets the step
                // finish, then stops the run instead of routing.
                if cancel.is_cancelled() {
                    inner.finish_cancelled(&run_id, &instance, Some(&current_id)).await;
                    return;
                }

                if graph.is_terminal(&current_id) {
                    let steps = {
                        let mut inst = instance.lock().unwrap();
                        inst.set_status(RunStatus::Succeeded);
                        inst.history.len()
                    };
                    inner.persist(&instance).await;
                    inner
                        .emit(
                            ExecutionEvent::new(run_id.clone(), EventKind::RunSucceeded)
                                .with_node(&current_id)
                                .with_payload(serde_json::json!({ "steps": steps })),
                        )
                        .await;
                    info!(run_id = %run_id, steps, "Run succeeded");
                    return;
                }

                // Route. A guard over a missing key is a mapping bug,
                // reported as such before resolve_next ever runs.
                let routed = {
                    let inst = instance.lock().unwrap();
                    let missing = graph
                        .guard_keys(&current_id)
                        .into_iter()
                        .find(|key| !inst.context.contains(key));
                    match missing {
                        Some(key) => Err(ConfluxError::Mapping {
                            node: current_id.clone(),
                            key,
                        }),
                        None => graph
                            .resolve_next(&current_id, inst.context.data())
                            .map(|next| next.to_string()),
                    }
                };
                match routed {
                    Ok(next) => {
                        inner
                            .emit(
                                ExecutionEvent::new(run_id.clone(), EventKind::Routed)
                                    .with_node(&current_id)
                                    .with_payload(serde_json::json!({
                                        "from": &current_id,
                                        "to": &next,
                                    })),
                            )
                            .await;
                        debug!(run_id = %run_id, from = %current_id, to = %next, "Routed");
                        instance.lock().unwrap().advance_to(next);
                        inner.persist(&instance).await;
                    }
                    Err(cause) => {
                        inner.fail_run(&run_id, &instance, cause, Some(&current_id)).await;
                        return;
                    }
                }
            }
            Err(StepFailure::Skip(target, cause)) => {
                {
                    let mut inst = instance.lock().unwrap();
                    inst.record_step(StepRecord {
                        node_id: current_id.clone(),
                        started_at,
                        finished_at: Utc::now(),
                        outcome: StepOutcome::Failed,
                        attempts,
                    });
                }
                inner.persist(&instance).await;

                if cancel.is_cancelled() {
                    inner.finish_cancelled(&run_id, &instance, Some(&current_id)).await;
                    return;
                }

                warn!(
                    run_id = %run_id,
                    node_id = %current_id,
                    target = %target,
                    error = %cause,
                    "Node failed, skipping ahead"
                );
                inner
                    .emit(
                        ExecutionEvent::new(run_id.clone(), EventKind::Routed)
                            .with_node(&current_id)
                            .with_payload(serde_json::json!({
                                "from": &current_id,
                                "to": &target,
                                "via": "skip_to",
                            })),
                    )
                    .await;
                instance.lock().unwrap().advance_to(target);
                inner.persist(&instance).await;
            }
            Err(StepFailure::Fatal(cause)) => {
                {
                    let mut inst = instance.lock().unwrap();
                    inst.record_step(StepRecord {
                        node_id: current_id.clone(),
                        started_at,
                        finished_at: Utc::now(),
                        outcome: StepOutcome::Failed,
                        attempts,
                    });
                }
                inner.fail_run(&run_id, &instance, cause, Some(&current_id)).await;
                return;
            }
        }
    }
}
