use std::path::Path;
use std::sync::Mutex;

use futures::future::BoxFuture;
use rusqlite::{params, Connection};
use tracing::debug;

use conflux_core::error::{ConfluxError, Result};
use conflux_core::types::{ExecutionEvent, RunId};
use conflux_engine::graph::WorkflowGraph;
use conflux_engine::instance::WorkflowInstance;
use conflux_engine::store::RunStore;

/// SQLite-backed run store.
///
/// Graphs and instance snapshots are stored as JSON documents; the event
/// log is append-only, ordered per run by rowid.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS graphs (
        name TEXT NOT NULL,
        version INTEGER NOT NULL,
        definition TEXT NOT NULL,
        PRIMARY KEY (name, version)
    );

    CREATE TABLE IF NOT EXISTS runs (
        run_id TEXT PRIMARY KEY,
        status TEXT NOT NULL,
        snapshot TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL,
        kind TEXT NOT NULL,
        event TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id, id);
";

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfluxError::Store(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn =
            Connection::open(path).map_err(|e| ConfluxError::Store(e.to_string()))?;

        // WAL for concurrent readers while the engine writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| ConfluxError::Store(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| ConfluxError::Store(e.to_string()))?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| ConfluxError::Store(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| ConfluxError::Store(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl RunStore for SqliteStore {
    fn save_graph(&self, graph: &WorkflowGraph) -> BoxFuture<'_, Result<()>> {
        let name = graph.name.clone();
        let version = graph.version;
        let definition = serde_json::to_string(graph);
        Box::pin(async move {
            let definition = definition?;
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO graphs (name, version, definition) VALUES (?1, ?2, ?3)",
                params![name, version, definition],
            )
            .map_err(|e| ConfluxError::Store(e.to_string()))?;
            Ok(())
        })
    }

    fn load_graph(
        &self,
        name: &str,
        version: u32,
    ) -> BoxFuture<'_, Result<Option<WorkflowGraph>>> {
        let name = name.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT definition FROM graphs WHERE name = ?1 AND version = ?2")
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            let mut rows = stmt
                .query(params![name, version])
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            match rows.next().map_err(|e| ConfluxError::Store(e.to_string()))? {
                Some(row) => {
                    let definition: String =
                        row.get(0).map_err(|e| ConfluxError::Store(e.to_string()))?;
                    Ok(Some(serde_json::from_str(&definition)?))
                }
                None => Ok(None),
            }
        })
    }

    fn list_graphs(&self) -> BoxFuture<'_, Result<Vec<(String, u32)>>> {
        Box::pin(async move {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT name, version FROM graphs ORDER BY name, version")
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            let mut listing = Vec::new();
            for row in rows {
                listing.push(row.map_err(|e| ConfluxError::Store(e.to_string()))?);
            }
            Ok(listing)
        })
    }

    fn save_instance(&self, instance: &WorkflowInstance) -> BoxFuture<'_, Result<()>> {
        let run_id = instance.run_id.to_string();
        let status = instance.status.to_string();
        let updated_at = instance.updated_at.to_rfc3339();
        let snapshot = serde_json::to_string(instance);
        Box::pin(async move {
            let snapshot = snapshot?;
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT OR REPLACE INTO runs (run_id, status, snapshot, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![run_id, status, snapshot, updated_at],
            )
            .map_err(|e| ConfluxError::Store(e.to_string()))?;
            Ok(())
        })
    }

    fn load_instance(&self, run_id: &RunId) -> BoxFuture<'_, Result<Option<WorkflowInstance>>> {
        let run_id = run_id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT snapshot FROM runs WHERE run_id = ?1")
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            let mut rows = stmt
                .query(params![run_id])
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            match rows.next().map_err(|e| ConfluxError::Store(e.to_string()))? {
                Some(row) => {
                    let snapshot: String =
                        row.get(0).map_err(|e| ConfluxError::Store(e.to_string()))?;
                    Ok(Some(serde_json::from_str(&snapshot)?))
                }
                None => Ok(None),
            }
        })
    }

    fn delete_instance(&self, run_id: &RunId) -> BoxFuture<'_, Result<()>> {
        let run_id = run_id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM runs WHERE run_id = ?1", params![run_id])
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            conn.execute("DELETE FROM events WHERE run_id = ?1", params![run_id])
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            Ok(())
        })
    }

    fn append_event(&self, event: &ExecutionEvent) -> BoxFuture<'_, Result<()>> {
        let run_id = event.run_id.to_string();
        let kind = serde_json::to_value(event.kind)
            .map(|v| v.as_str().unwrap_or_default().to_string());
        let body = serde_json::to_string(event);
        Box::pin(async move {
            let kind = kind?;
            let body = body?;
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO events (run_id, kind, event) VALUES (?1, ?2, ?3)",
                params![run_id, kind, body],
            )
            .map_err(|e| ConfluxError::Store(e.to_string()))?;
            Ok(())
        })
    }

    fn load_events(&self, run_id: &RunId) -> BoxFuture<'_, Result<Vec<ExecutionEvent>>> {
        let run_id = run_id.to_string();
        Box::pin(async move {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT event FROM events WHERE run_id = ?1 ORDER BY id")
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            let rows = stmt
                .query_map(params![run_id], |row| row.get::<_, String>(0))
                .map_err(|e| ConfluxError::Store(e.to_string()))?;
            let mut events = Vec::new();
            for row in rows {
                let body = row.map_err(|e| ConfluxError::Store(e.to_string()))?;
                events.push(serde_json::from_str(&body)?);
            }
            Ok(events)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conflux_core::types::{EventKind, RunStatus};
    use conflux_engine::graph::{EdgeSpec, NodeSpec};

    fn sample_graph() -> WorkflowGraph {
        WorkflowGraph::new("demo", 1)
            .with_node(NodeSpec::new("start", "Start").with_tool("score"))
            .with_node(NodeSpec::new("end", "End"))
            .with_edge(EdgeSpec::always("start", "end"))
            .with_start("start")
            .with_terminal("end")
    }

    #[tokio::test]
    async fn test_graph_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        store.save_graph(&sample_graph()).await.unwrap();

        let loaded = store.load_graph("demo", 1).await.unwrap().unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.nodes.len(), 2);
        assert!(store.load_graph("demo", 9).await.unwrap().is_none());
        assert_eq!(
            store.list_graphs().await.unwrap(),
            vec![("demo".to_string(), 1)]
        );
    }

    #[tokio::test]
    async fn test_graph_version_upsert() {
        let store = SqliteStore::in_memory().unwrap();
        store.save_graph(&sample_graph()).await.unwrap();
        let mut v2 = sample_graph();
        v2.version = 2;
        store.save_graph(&v2).await.unwrap();

        assert_eq!(store.list_graphs().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_instance_roundtrip() {
        let store = SqliteStore::in_memory().unwrap();
        let run_id = RunId::new();
        let mut instance = WorkflowInstance::new(
            run_id.clone(),
            "demo",
            1,
            "start",
            serde_json::Map::new(),
        );
        instance.set_status(RunStatus::Running);
        store.save_instance(&instance).await.unwrap();

        let loaded = store.load_instance(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Running);
        assert_eq!(loaded.graph, "demo");

        instance.set_status(RunStatus::Succeeded);
        store.save_instance(&instance).await.unwrap();
        let loaded = store.load_instance(&run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Succeeded);
        assert!(loaded.context.is_frozen());
    }

    #[tokio::test]
    async fn test_event_log_is_ordered_and_purgeable() {
        let store = SqliteStore::in_memory().unwrap();
        let run_id = RunId::new();

        for kind in [
            EventKind::NodeStarted,
            EventKind::NodeSucceeded,
            EventKind::RunSucceeded,
        ] {
            store
                .append_event(&ExecutionEvent::new(run_id.clone(), kind))
                .await
                .unwrap();
        }

        let events = store.load_events(&run_id).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::NodeStarted);
        assert_eq!(events[2].kind, EventKind::RunSucceeded);

        store.delete_instance(&run_id).await.unwrap();
        assert!(store.load_events(&run_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conflux.db");
        let store = SqliteStore::open(&path).unwrap();
        store.save_graph(&sample_graph()).await.unwrap();
        drop(store);

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.load_graph("demo", 1).await.unwrap().is_some());
    }
}
