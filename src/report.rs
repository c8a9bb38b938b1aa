//! Artifact serialization for a completed (or partial) run.
//!
//! Writes three JSON artifacts into the output directory for downstream
//! rendering and documentation collaborators:
//! - `results.json`: run envelope with one record per file, failures included
//! - `call_graph.json`: node-link form of the call graph snapshot
//! - `relationship_graph.json`: node-link form of the relationship graph

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::analyze::RunResult;
use crate::graph::{CallGraph, RelationshipGraph};
use crate::models::FileOutcome;

#[derive(Serialize, Deserialize)]
pub struct RunEnvelope {
    pub run_id: String,
    pub root: String,
    pub generated_at: String,
    pub totals: RunTotals,
    pub files: Vec<FileOutcome>,
}

#[derive(Serialize, Deserialize, Clone, Copy)]
pub struct RunTotals {
    pub scanned: u64,
    pub cached: u64,
    pub dispatched: u64,
    pub failed: u64,
    pub skipped: u64,
}

#[derive(Serialize)]
struct CallGraphJson {
    directed: bool,
    nodes: Vec<CallNodeJson>,
    links: Vec<CallLinkJson>,
}

#[derive(Serialize)]
struct CallNodeJson {
    id: String,
    name: String,
    file: Option<String>,
    external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
}

#[derive(Serialize)]
struct CallLinkJson {
    source: String,
    target: String,
}

#[derive(Serialize)]
struct RelGraphJson {
    directed: bool,
    nodes: Vec<RelNodeJson>,
    links: Vec<RelLinkJson>,
}

#[derive(Serialize)]
struct RelNodeJson {
    id: String,
    kind: &'static str,
    label: String,
    file: Option<String>,
    external: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
}

#[derive(Serialize)]
struct RelLinkJson {
    source: String,
    target: String,
    relation: &'static str,
}

/// Write all run artifacts into `output_dir`, creating it if needed.
pub fn write_artifacts(output_dir: &Path, root: &Path, result: &RunResult) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output dir: {}", output_dir.display()))?;

    let envelope = RunEnvelope {
        run_id: uuid::Uuid::new_v4().to_string(),
        root: root.display().to_string(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        totals: RunTotals {
            scanned: result.total,
            cached: result.cached,
            dispatched: result.dispatched,
            failed: result.failed,
            skipped: result.skipped,
        },
        files: result.outcomes.clone(),
    };
    write_json(&output_dir.join("results.json"), &envelope)?;
    write_json(
        &output_dir.join("call_graph.json"),
        &call_graph_json(&result.call_graph),
    )?;
    write_json(
        &output_dir.join("relationship_graph.json"),
        &relationship_graph_json(&result.relationship_graph),
    )?;

    Ok(())
}

/// Read a previously written `results.json`.
pub fn load_results(path: &Path) -> Result<RunEnvelope> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| "Failed to parse results file")
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
    Ok(())
}

fn call_graph_json(graph: &CallGraph) -> CallGraphJson {
    CallGraphJson {
        directed: true,
        nodes: graph
            .nodes
            .values()
            .map(|node| CallNodeJson {
                id: node.key.qualified(),
                name: node.key.name.clone(),
                file: if node.key.is_external() {
                    None
                } else {
                    Some(node.key.file.clone())
                },
                external: node.external,
                summary: node.summary.clone(),
            })
            .collect(),
        links: graph
            .edges
            .iter()
            .map(|(source, target)| CallLinkJson {
                source: source.qualified(),
                target: target.qualified(),
            })
            .collect(),
    }
}

fn relationship_graph_json(graph: &RelationshipGraph) -> RelGraphJson {
    // Kind-prefixed ids keep nodes unique across entity types in the flat
    // node-link namespace.
    let node_id = |key: &crate::graph::NodeKey| format!("{}:{}", key.kind.as_str(), key.id);

    RelGraphJson {
        directed: true,
        nodes: graph
            .nodes
            .values()
            .map(|node| RelNodeJson {
                id: node_id(&node.key),
                kind: node.key.kind.as_str(),
                label: node.label.clone(),
                file: node.file.clone(),
                external: node.external,
                summary: node.summary.clone(),
            })
            .collect(),
        links: graph
            .edges
            .iter()
            .map(|(source, target, relation)| RelLinkJson {
                source: node_id(source),
                target: node_id(target),
                relation: relation.as_str(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::fingerprint;
    use crate::graph::GraphBuilder;
    use crate::models::{CallFact, FileAnalysis, FunctionFact, Outcome};

    fn sample_result() -> RunResult {
        let outcome = FileOutcome {
            relative: "a.py".to_string(),
            language: "Python".to_string(),
            fingerprint: fingerprint(b"x", "a.py", "Python"),
            outcome: Outcome::Analyzed {
                analysis: FileAnalysis {
                    summary: "module".to_string(),
                    functions: vec![FunctionFact {
                        name: "foo".to_string(),
                        ..FunctionFact::default()
                    }],
                    imports: vec!["os".to_string()],
                    calls: vec![CallFact {
                        caller: "foo".to_string(),
                        callee: "bar".to_string(),
                    }],
                    ..FileAnalysis::default()
                },
                from_cache: false,
            },
        };
        let mut builder = GraphBuilder::new();
        builder.ingest(&outcome);
        let (call_graph, relationship_graph) = builder.snapshot();
        RunResult {
            outcomes: vec![outcome],
            call_graph,
            relationship_graph,
            total: 1,
            cached: 0,
            dispatched: 1,
            failed: 0,
            skipped: 0,
        }
    }

    #[test]
    fn test_artifacts_written_and_loadable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let out = tmp.path().join("out");
        write_artifacts(&out, Path::new("."), &sample_result()).unwrap();

        for name in ["results.json", "call_graph.json", "relationship_graph.json"] {
            assert!(out.join(name).exists(), "missing artifact {}", name);
        }

        let envelope = load_results(&out.join("results.json")).unwrap();
        assert_eq!(envelope.totals.scanned, 1);
        assert_eq!(envelope.files.len(), 1);
        assert_eq!(envelope.files[0].relative, "a.py");
    }

    #[test]
    fn test_graph_links_reference_existing_nodes() {
        let result = sample_result();
        let call = call_graph_json(&result.call_graph);
        let ids: std::collections::BTreeSet<&str> =
            call.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.len(), call.nodes.len(), "node ids must be unique");
        for link in &call.links {
            assert!(ids.contains(link.source.as_str()));
            assert!(ids.contains(link.target.as_str()));
        }

        let rel = relationship_graph_json(&result.relationship_graph);
        let ids: std::collections::BTreeSet<&str> =
            rel.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids.len(), rel.nodes.len(), "node ids must be unique");
        for link in &rel.links {
            assert!(ids.contains(link.source.as_str()));
            assert!(ids.contains(link.target.as_str()));
        }
    }
}
