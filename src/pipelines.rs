//! Built-in pipeline presets.
//!
//! Graph definitions mirroring the platform's shipped research workflows,
//! published at startup when the tools they need are registered.

use conflux_engine::policy::{FailurePolicy, RetryBackoff};
use conflux_engine::{EdgeSpec, NodeSpec, WorkflowEngine, WorkflowGraph};
use tracing::debug;

/// Summarize a set of library documents.
///
/// Input: `document_ids` (array of strings).
pub fn research_summary() -> WorkflowGraph {
    WorkflowGraph::new("research-summary", 1)
        .with_node(
            NodeSpec::new("summarize", "Summarize documents")
                .with_tool("library_summarize_documents")
                .with_input("document_ids", "document_ids")
                .with_output("summary", "summary"),
        )
        .with_node(NodeSpec::new("done", "Done"))
        .with_edge(EdgeSpec::always("summarize", "done"))
        .with_start("summarize")
        .with_terminal("done")
}

/// Summarize documents, produce a roadmap from the summary.
///
/// Input: `document_ids` (array of strings).
pub fn research_roadmap() -> WorkflowGraph {
    WorkflowGraph::new("research-roadmap", 1)
        .with_node(
            NodeSpec::new("summarize", "Summarize documents")
                .with_tool("library_summarize_documents")
                .with_input("document_ids", "document_ids")
                .with_output("summary", "summary"),
        )
        .with_node(
            NodeSpec::new("roadmap", "Generate roadmap")
                .with_tool("generate_roadmap")
                .with_input("summary", "summary")
                .with_output("roadmap", "roadmap"),
        )
        .with_node(NodeSpec::new("done", "Done"))
        .with_edge(EdgeSpec::always("summarize", "roadmap"))
        .with_edge(EdgeSpec::always("roadmap", "done"))
        .with_start("summarize")
        .with_terminal("done")
}

/// The full proposal pipeline: summarize, assess feasibility, branch on
/// the verdict, draft the funding proposal PDF.
///
/// Input: `document_ids` (array of strings).
pub fn research_proposal() -> WorkflowGraph {
    WorkflowGraph::new("research-proposal", 1)
        .with_node(
            NodeSpec::new("summarize", "Summarize documents")
                .with_tool("library_summarize_documents")
                .with_input("document_ids", "document_ids")
                .with_output("summary", "summary"),
        )
        .with_node(
            NodeSpec::new("assess", "Assess feasibility")
                .with_tool("assess_feasibility")
                .with_input("summary", "summary")
                .with_output("report", "report"),
        )
        .with_node(
            NodeSpec::new("draft", "Draft proposal")
                .with_tool("generate_proposal")
                .with_input("report_text", "report")
                .with_output("proposal_pdf", "pdf_base64")
                .with_policy(FailurePolicy::Retry {
                    max_attempts: 2,
                    backoff: RetryBackoff::default(),
                }),
        )
        .with_node(NodeSpec::new("done", "Done"))
        .with_node(NodeSpec::new("rejected", "Not feasible"))
        .with_edge(EdgeSpec::always("summarize", "assess"))
        .with_edge(EdgeSpec::guarded(
            "assess",
            "rejected",
            r#"report contains "not feasible""#,
        ))
        .with_edge(EdgeSpec::always("assess", "draft"))
        .with_edge(EdgeSpec::always("draft", "done"))
        .with_start("summarize")
        .with_terminal("done")
        .with_terminal("rejected")
}

/// Publish every preset whose tools are all registered. Returns how many
/// were published.
pub async fn publish_presets(engine: &WorkflowEngine) -> conflux_core::error::Result<usize> {
    let registry = engine.registry();
    let mut published = 0;

    for graph in [research_summary(), research_roadmap(), research_proposal()] {
        let missing: Vec<String> = graph
            .nodes
            .iter()
            .filter_map(|n| n.tool.clone())
            .filter(|tool| registry.get(tool).is_none())
            .collect();
        if missing.is_empty() {
            engine.publish(graph).await?;
            published += 1;
        } else {
            debug!(
                graph = %graph.reference(),
                missing = ?missing,
                "Preset skipped, tools not configured"
            );
        }
    }

    Ok(published)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        research_summary().validate().unwrap();
        research_roadmap().validate().unwrap();
        research_proposal().validate().unwrap();
    }

    #[test]
    fn test_proposal_branches_on_verdict() {
        let graph = research_proposal();
        let outgoing = graph.outgoing("assess");
        assert_eq!(outgoing.len(), 2);
        // The rejection branch is declared first, so it wins when the
        // report flags infeasibility.
        assert_eq!(outgoing[0].to, "rejected");
        assert_eq!(outgoing[1].to, "draft");
    }
}
