use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use conflux_core::error::{ConfluxError, Result};

use super::edge::{parse_expr, EdgeSpec, Guard};
use super::node::NodeSpec;
use crate::policy::FailurePolicy;

/// A named, versioned workflow definition.
///
/// Node and edge declaration order is preserved: edge order is the routing
/// tie-break. A graph that fails `validate` must never be accepted for
/// execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
    /// The designated entry node.
    pub start: String,
    /// Nodes at which the run completes.
    pub terminals: Vec<String>,
}

fn default_version() -> u32 {
    1
}

impl WorkflowGraph {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            nodes: Vec::new(),
            edges: Vec::new(),
            start: String::new(),
            terminals: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = start.into();
        self
    }

    pub fn with_terminal(mut self, terminal: impl Into<String>) -> Self {
        self.terminals.push(terminal.into());
        self
    }

    /// `name@version`, the key published graphs are stored under.
    pub fn reference(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_terminal(&self, id: &str) -> bool {
        self.terminals.iter().any(|t| t == id)
    }

    /// Outgoing edges of a node, in declaration order.
    pub fn outgoing(&self, id: &str) -> Vec<&EdgeSpec> {
        self.edges.iter().filter(|e| e.from == id).collect()
    }

    /// Structural validation. Collects every violation rather than failing
    /// fast, so authors can fix a graph in one pass.
    pub fn validate(&self) -> Result<()> {
        let mut violations = Vec::new();

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                violations.push(format!("duplicate node id '{}'", node.id));
            }
            if node.is_pure() && (!node.input.is_empty() || !node.output.is_empty()) {
                violations.push(format!(
                    "pure node '{}' declares tool input/output mappings",
                    node.id
                ));
            }
            if let FailurePolicy::SkipTo { node: target } = &node.on_failure {
                if !self.nodes.iter().any(|n| &n.id == target) {
                    violations.push(format!(
                        "node '{}' skips to unknown node '{}'",
                        node.id, target
                    ));
                }
            }
        }

        if self.node(&self.start).is_none() {
            violations.push(format!("start node '{}' does not exist", self.start));
        }
        if self.terminals.is_empty() {
            violations.push("graph has no terminal nodes".to_string());
        }
        for terminal in &self.terminals {
            if self.node(terminal).is_none() {
                violations.push(format!("terminal node '{}' does not exist", terminal));
            }
        }

        for edge in &self.edges {
            if self.node(&edge.from).is_none() {
                violations.push(format!("edge from unknown node '{}'", edge.from));
            }
            if self.node(&edge.to).is_none() {
                violations.push(format!("edge to unknown node '{}'", edge.to));
            }
            if let Guard::Expr { expr } = &edge.guard {
                if let Err(problem) = parse_expr(expr) {
                    violations.push(format!(
                        "edge {} -> {}: {}",
                        edge.from, edge.to, problem
                    ));
                }
            }
        }

        for node in &self.nodes {
            let outgoing = self.outgoing(&node.id);
            if self.is_terminal(&node.id) {
                if !outgoing.is_empty() {
                    violations.push(format!(
                        "terminal node '{}' has outgoing edges",
                        node.id
                    ));
                }
            } else if outgoing.is_empty() {
                violations.push(format!(
                    "non-terminal node '{}' has no outgoing edges",
                    node.id
                ));
            }
        }

        for unreachable in self.unreachable_nodes() {
            violations.push(format!("node '{}' is unreachable from start", unreachable));
        }

        if self.has_unconditional_cycle() {
            violations.push(
                "cycle with no guarded edge (every cycle must carry at least one guard)"
                    .to_string(),
            );
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfluxError::GraphInvalid {
                graph: self.reference(),
                violations,
            })
        }
    }

    /// Evaluate a node's outgoing guards in declaration order against the
    /// context and return the first matching target. No match is a
    /// terminal run failure — an unrouted state is a workflow authoring
    /// bug, never a silent skip.
    pub fn resolve_next(
        &self,
        node_id: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<&str> {
        for edge in self.outgoing(node_id) {
            let matches = match &edge.guard {
                Guard::Always => true,
                Guard::Expr { .. } => edge
                    .guard
                    .predicate()
                    .is_some_and(|p| p.matches_context(context)),
            };
            if matches {
                return Ok(&edge.to);
            }
        }
        Err(ConfluxError::NoMatchingRoute {
            node: node_id.to_string(),
        })
    }

    /// Context keys referenced by a node's outgoing guards. The engine
    /// requires these to be present before routing (`MappingError`
    /// otherwise, per the error taxonomy).
    pub fn guard_keys(&self, node_id: &str) -> Vec<String> {
        self.outgoing(node_id)
            .iter()
            .filter_map(|e| e.guard.predicate())
            .map(|p| p.key)
            .collect()
    }

    fn unreachable_nodes(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        if self.node(&self.start).is_some() {
            seen.insert(self.start.as_str());
            queue.push_back(self.start.as_str());
        }
        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing(current) {
                if self.node(&edge.to).is_some() && seen.insert(edge.to.as_str()) {
                    queue.push_back(edge.to.as_str());
                }
            }
        }
        self.nodes
            .iter()
            .filter(|n| !seen.contains(n.id.as_str()))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Cycle detection restricted to unconditional edges. Guarded cycles
    /// are allowed (the guard's key is expected to change); a cycle of
    /// `Always` edges can never exit.
    fn has_unconditional_cycle(&self) -> bool {
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for edge in &self.edges {
            if matches!(edge.guard, Guard::Always) {
                adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
            }
        }

        // 0 = unvisited, 1 = on stack, 2 = done
        let mut state: HashMap<&str, u8> = HashMap::new();
        for node in &self.nodes {
            if self.dfs_cycle(node.id.as_str(), &adjacency, &mut state) {
                return true;
            }
        }
        false
    }

    fn dfs_cycle<'a>(
        &self,
        node: &'a str,
        adjacency: &HashMap<&str, Vec<&'a str>>,
        state: &mut HashMap<&'a str, u8>,
    ) -> bool {
        match state.get(node) {
            Some(1) => return true,
            Some(2) => return false,
            _ => {}
        }
        state.insert(node, 1);
        if let Some(targets) = adjacency.get(node) {
            for target in targets {
                if self.dfs_cycle(target, adjacency, state) {
                    return true;
                }
            }
        }
        state.insert(node, 2);
        false
    }
}
