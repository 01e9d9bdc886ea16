use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::BoxFuture;

use conflux_core::error::Result;
use conflux_core::types::{ExecutionEvent, RunId};

use crate::graph::WorkflowGraph;
use crate::instance::WorkflowInstance;

/// Persistence boundary for graphs, run snapshots, and the append-only
/// event log. The engine treats the store as an external collaborator;
/// durability guarantees are the implementation's business.
pub trait RunStore: Send + Sync + 'static {
    /// Save a graph definition, keyed by name + version.
    fn save_graph(&self, graph: &WorkflowGraph) -> BoxFuture<'_, Result<()>>;

    /// Load a graph by name and version.
    fn load_graph(&self, name: &str, version: u32)
        -> BoxFuture<'_, Result<Option<WorkflowGraph>>>;

    /// List saved graphs as (name, version) pairs.
    fn list_graphs(&self) -> BoxFuture<'_, Result<Vec<(String, u32)>>>;

    /// Save (upsert) an instance snapshot.
    fn save_instance(&self, instance: &WorkflowInstance) -> BoxFuture<'_, Result<()>>;

    /// Load an instance snapshot by run id.
    fn load_instance(&self, run_id: &RunId) -> BoxFuture<'_, Result<Option<WorkflowInstance>>>;

    /// Delete an instance and its event log.
    fn delete_instance(&self, run_id: &RunId) -> BoxFuture<'_, Result<()>>;

    /// Append one event to the run's log.
    fn append_event(&self, event: &ExecutionEvent) -> BoxFuture<'_, Result<()>>;

    /// Load a run's event log in append order.
    fn load_events(&self, run_id: &RunId) -> BoxFuture<'_, Result<Vec<ExecutionEvent>>>;
}

/// In-memory store, the default when no SQLite path is configured.
#[derive(Default)]
pub struct MemoryRunStore {
    graphs: Mutex<HashMap<String, WorkflowGraph>>,
    instances: Mutex<HashMap<String, WorkflowInstance>>,
    events: Mutex<HashMap<String, Vec<ExecutionEvent>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for MemoryRunStore {
    fn save_graph(&self, graph: &WorkflowGraph) -> BoxFuture<'_, Result<()>> {
        let graph = graph.clone();
        Box::pin(async move {
            self.graphs
                .lock()
                .unwrap()
                .insert(graph.reference(), graph);
            Ok(())
        })
    }

    fn load_graph(
        &self,
        name: &str,
        version: u32,
    ) -> BoxFuture<'_, Result<Option<WorkflowGraph>>> {
        let key = format!("{}@{}", name, version);
        Box::pin(async move { Ok(self.graphs.lock().unwrap().get(&key).cloned()) })
    }

    fn list_graphs(&self) -> BoxFuture<'_, Result<Vec<(String, u32)>>> {
        Box::pin(async move {
            Ok(self
                .graphs
                .lock()
                .unwrap()
                .values()
                .map(|g| (g.name.clone(), g.version))
                .collect())
        })
    }

    fn save_instance(&self, instance: &WorkflowInstance) -> BoxFuture<'_, Result<()>> {
        let instance = instance.clone();
        Box::pin(async move {
            self.instances
                .lock()
                .unwrap()
                .insert(instance.run_id.to_string(), instance);
            Ok(())
        })
    }

    fn load_instance(&self, run_id: &RunId) -> BoxFuture<'_, Result<Option<WorkflowInstance>>> {
        let key = run_id.to_string();
        Box::pin(async move { Ok(self.instances.lock().unwrap().get(&key).cloned()) })
    }

    fn delete_instance(&self, run_id: &RunId) -> BoxFuture<'_, Result<()>> {
        let key = run_id.to_string();
        Box::pin(async move {
            self.instances.lock().unwrap().remove(&key);
            self.events.lock().unwrap().remove(&key);
            Ok(())
        })
    }

    fn append_event(&self, event: &ExecutionEvent) -> BoxFuture<'_, Result<()>> {
        let event = event.clone();
        Box::pin(async move {
            self.events
                .lock()
                .unwrap()
                .entry(event.run_id.to_string())
                .or_default()
                .push(event);
            Ok(())
        })
    }

    fn load_events(&self, run_id: &RunId) -> BoxFuture<'_, Result<Vec<ExecutionEvent>>> {
        let key = run_id.to_string();
        Box::pin(async move {
            Ok(self
                .events
                .lock()
                .unwrap()
                .get(&key)
                .cloned()
                .unwrap_or_default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeSpec, NodeSpec};
    use conflux_core::types::EventKind;

    fn sample_graph() -> WorkflowGraph {
        WorkflowGraph::new("demo", 1)
            .with_node(NodeSpec::new("start", "Start").with_tool("x"))
            .with_node(NodeSpec::new("end", "End"))
            .with_edge(EdgeSpec::always("start", "end"))
            .with_start("start")
            .with_terminal("end")
    }

    #[tokio::test]
    async fn test_graph_roundtrip() {
        let store = MemoryRunStore::new();
        store.save_graph(&sample_graph()).await.unwrap();

        let loaded = store.load_graph("demo", 1).await.unwrap().unwrap();
        assert_eq!(loaded.name, "demo");
        assert!(store.load_graph("demo", 2).await.unwrap().is_none());
        assert_eq!(store.list_graphs().await.unwrap(), vec![("demo".into(), 1)]);
    }

    #[tokio::test]
    async fn test_instance_and_events() {
        let store = MemoryRunStore::new();
        let run_id = RunId::new();
        let instance = WorkflowInstance::new(
            run_id.clone(),
            "demo",
            1,
            "start",
            serde_json::Map::new(),
        );

        store.save_instance(&instance).await.unwrap();
        store
            .append_event(&ExecutionEvent::new(run_id.clone(), EventKind::NodeStarted))
            .await
            .unwrap();

        assert!(store.load_instance(&run_id).await.unwrap().is_some());
        assert_eq!(store.load_events(&run_id).await.unwrap().len(), 1);

        store.delete_instance(&run_id).await.unwrap();
        assert!(store.load_instance(&run_id).await.unwrap().is_none());
        assert!(store.load_events(&run_id).await.unwrap().is_empty());
    }
}
