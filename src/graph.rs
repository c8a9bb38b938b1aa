//! Incremental construction of the call graph and the relationship graph.
//!
//! [`GraphBuilder::ingest`] folds one file's analysis facts into ordered fact
//! sets; repeated ingestion of the same outcome is a no-op, and the merged
//! state does not depend on arrival order. [`GraphBuilder::snapshot`]
//! materializes both graphs from the current state, callable at any point of
//! a run, so partial graphs are always valid.
//!
//! Both graphs are arena-style: nodes live in ordered maps keyed by stable
//! identity, edges are ordered sets of key tuples. Call targets with no known
//! declaration become placeholder nodes tagged external; once the declaring
//! file's facts arrive, the same callee name resolves to the declared node.
//! When several files declare the same name, calls resolve to the
//! lexicographically smallest declaring file so the final topology is
//! independent of completion order.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::{FailureRecord, FileOutcome, Outcome};

/// Identity of a function node: declaring file plus name. An empty file
/// component marks an unresolved (external) callee.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FnKey {
    pub file: String,
    pub name: String,
}

impl FnKey {
    pub fn declared(file: &str, name: &str) -> Self {
        Self {
            file: file.to_string(),
            name: name.to_string(),
        }
    }

    pub fn external(name: &str) -> Self {
        Self {
            file: String::new(),
            name: name.to_string(),
        }
    }

    pub fn is_external(&self) -> bool {
        self.file.is_empty()
    }

    /// Stable string form, `file::name` (or `::name` for external nodes).
    pub fn qualified(&self) -> String {
        format!("{}::{}", self.file, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    File,
    Function,
    Class,
    Import,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Function => "function",
            NodeKind::Class => "class",
            NodeKind::Import => "import",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relation {
    Contains,
    Imports,
    Calls,
    Defines,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::Contains => "contains",
            Relation::Imports => "imports",
            Relation::Calls => "calls",
            Relation::Defines => "defines",
        }
    }
}

/// A node in the call graph.
#[derive(Debug, Clone)]
pub struct CallNode {
    pub key: FnKey,
    pub external: bool,
    pub summary: Option<String>,
}

/// Function-level call graph: nodes keyed by (file, name), edges as ordered
/// key pairs. Append-only within a run; no dangling endpoints.
#[derive(Debug, Clone, Default)]
pub struct CallGraph {
    pub nodes: BTreeMap<FnKey, CallNode>,
    pub edges: BTreeSet<(FnKey, FnKey)>,
}

impl CallGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn has_edge(&self, caller: &FnKey, callee: &FnKey) -> bool {
        self.edges.contains(&(caller.clone(), callee.clone()))
    }
}

/// Identity of a relationship-graph node: kind plus a stable id
/// (file path, `file::name`, or bare import name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub kind: NodeKind,
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct RelNode {
    pub key: NodeKey,
    /// Short display name (last path / identifier segment).
    pub label: String,
    /// Owning file, when the entity belongs to one.
    pub file: Option<String>,
    pub summary: Option<String>,
    pub external: bool,
}

/// Typed multi-entity graph over files, functions, classes, and imports.
#[derive(Debug, Clone, Default)]
pub struct RelationshipGraph {
    pub nodes: BTreeMap<NodeKey, RelNode>,
    pub edges: BTreeSet<(NodeKey, NodeKey, Relation)>,
}

impl RelationshipGraph {
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &RelNode> {
        self.nodes.values().filter(move |n| n.key.kind == kind)
    }

    pub fn edges_of(&self, relation: Relation) -> impl Iterator<Item = &(NodeKey, NodeKey, Relation)> {
        self.edges.iter().filter(move |(_, _, r)| *r == relation)
    }

    /// Number of edges touching a node, in either direction.
    pub fn degree(&self, key: &NodeKey) -> usize {
        self.edges
            .iter()
            .filter(|(source, target, _)| source == key || target == key)
            .count()
    }
}

#[derive(Debug, Clone)]
struct FileRec {
    language: String,
    summary: Option<String>,
}

#[derive(Debug, Clone)]
struct FunctionRec {
    class: Option<String>,
    summary: Option<String>,
}

/// Accumulates per-file facts and materializes graph snapshots.
///
/// Must be driven by a single logical writer (the orchestrator's consumer
/// loop); node merging is last-write-wins per file and idempotent.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    files: BTreeMap<String, FileRec>,
    functions: BTreeMap<(String, String), FunctionRec>,
    classes: BTreeMap<(String, String), Option<String>>,
    imports: BTreeMap<String, BTreeSet<String>>,
    calls: BTreeSet<(String, String, String)>,
    incomplete: BTreeMap<String, FailureRecord>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one file's outcome into the accumulated state.
    ///
    /// A failure is recorded as analysis-incomplete and contributes nothing
    /// to either graph, so consumers can tell "no relationships found" from
    /// "not analyzed".
    pub fn ingest(&mut self, outcome: &FileOutcome) {
        let analysis = match &outcome.outcome {
            Outcome::Failed { failure } => {
                self.incomplete
                    .insert(outcome.relative.clone(), failure.clone());
                return;
            }
            Outcome::Analyzed { analysis, .. } => analysis,
        };
        let file = &outcome.relative;
        self.incomplete.remove(file);

        let summary = if analysis.summary.is_empty() {
            None
        } else {
            Some(analysis.summary.clone())
        };
        if let Some(previous) = self.files.get(file) {
            if previous.summary != summary {
                eprintln!(
                    "Warning: conflicting summary for {}; keeping the latest",
                    file
                );
            }
        }
        self.files.insert(
            file.clone(),
            FileRec {
                language: outcome.language.clone(),
                summary,
            },
        );

        for function in &analysis.functions {
            self.functions.insert(
                (file.clone(), function.name.clone()),
                FunctionRec {
                    class: function.class.clone(),
                    summary: function.summary.clone(),
                },
            );
        }
        for class in &analysis.classes {
            self.classes
                .insert((file.clone(), class.name.clone()), class.summary.clone());
        }
        for import in &analysis.imports {
            self.imports
                .entry(import.clone())
                .or_default()
                .insert(file.clone());
        }
        for call in &analysis.calls {
            self.calls
                .insert((file.clone(), call.caller.clone(), call.callee.clone()));
        }
    }

    /// Files whose analysis terminally failed this run.
    pub fn unanalyzed(&self) -> &BTreeMap<String, FailureRecord> {
        &self.incomplete
    }

    /// Materialize immutable views of both graphs from the current state.
    pub fn snapshot(&self) -> (CallGraph, RelationshipGraph) {
        (self.build_call_graph(), self.build_relationship_graph())
    }

    /// Resolve a callee name to its declaring file, if any declares it.
    fn resolve(&self, callee: &str) -> FnKey {
        let declared = self
            .functions
            .keys()
            .filter(|(_, name)| name == callee)
            .map(|(file, _)| file)
            .min();
        match declared {
            Some(file) => FnKey::declared(file, callee),
            None => FnKey::external(callee),
        }
    }

    fn build_call_graph(&self) -> CallGraph {
        let mut graph = CallGraph::default();

        for ((file, name), rec) in &self.functions {
            let key = FnKey::declared(file, name);
            graph.nodes.insert(
                key.clone(),
                CallNode {
                    key,
                    external: false,
                    summary: rec.summary.clone(),
                },
            );
        }

        for (file, caller, callee) in &self.calls {
            let caller_key = FnKey::declared(file, caller);
            graph
                .nodes
                .entry(caller_key.clone())
                .or_insert_with(|| CallNode {
                    key: caller_key.clone(),
                    external: false,
                    summary: None,
                });

            let callee_key = self.resolve(callee);
            graph
                .nodes
                .entry(callee_key.clone())
                .or_insert_with(|| CallNode {
                    key: callee_key.clone(),
                    external: callee_key.is_external(),
                    summary: None,
                });

            graph.edges.insert((caller_key, callee_key));
        }

        graph
    }

    fn build_relationship_graph(&self) -> RelationshipGraph {
        let mut graph = RelationshipGraph::default();

        for (file, rec) in &self.files {
            insert_node(
                &mut graph,
                NodeKind::File,
                file.clone(),
                last_segment(file),
                None,
                rec.summary.clone(),
                false,
            );
        }

        for ((file, name), summary) in &self.classes {
            let class_id = format!("{}::{}", file, name);
            insert_node(
                &mut graph,
                NodeKind::Class,
                class_id.clone(),
                name.clone(),
                Some(file.clone()),
                summary.clone(),
                false,
            );
            graph.edges.insert((
                NodeKey {
                    kind: NodeKind::File,
                    id: file.clone(),
                },
                NodeKey {
                    kind: NodeKind::Class,
                    id: class_id,
                },
                Relation::Defines,
            ));
        }

        for ((file, name), rec) in &self.functions {
            let function_id = format!("{}::{}", file, name);
            insert_node(
                &mut graph,
                NodeKind::Function,
                function_id.clone(),
                name.clone(),
                Some(file.clone()),
                rec.summary.clone(),
                false,
            );
            graph.edges.insert((
                NodeKey {
                    kind: NodeKind::File,
                    id: file.clone(),
                },
                NodeKey {
                    kind: NodeKind::Function,
                    id: function_id.clone(),
                },
                Relation::Defines,
            ));

            // Methods hang off their class as well.
            if let Some(class) = &rec.class {
                let class_id = format!("{}::{}", file, class);
                insert_node(
                    &mut graph,
                    NodeKind::Class,
                    class_id.clone(),
                    class.clone(),
                    Some(file.clone()),
                    None,
                    false,
                );
                graph.edges.insert((
                    NodeKey {
                        kind: NodeKind::Class,
                        id: class_id,
                    },
                    NodeKey {
                        kind: NodeKind::Function,
                        id: function_id,
                    },
                    Relation::Contains,
                ));
            }
        }

        for (import, files) in &self.imports {
            insert_node(
                &mut graph,
                NodeKind::Import,
                import.clone(),
                import.clone(),
                None,
                None,
                true,
            );
            for file in files {
                graph.edges.insert((
                    NodeKey {
                        kind: NodeKind::File,
                        id: file.clone(),
                    },
                    NodeKey {
                        kind: NodeKind::Import,
                        id: import.clone(),
                    },
                    Relation::Imports,
                ));
            }
        }

        for (file, caller, callee) in &self.calls {
            let caller_key = FnKey::declared(file, caller);
            let callee_key = self.resolve(callee);
            for key in [&caller_key, &callee_key] {
                insert_node(
                    &mut graph,
                    NodeKind::Function,
                    key.qualified(),
                    key.name.clone(),
                    if key.is_external() {
                        None
                    } else {
                        Some(key.file.clone())
                    },
                    None,
                    key.is_external(),
                );
            }
            graph.edges.insert((
                NodeKey {
                    kind: NodeKind::Function,
                    id: caller_key.qualified(),
                },
                NodeKey {
                    kind: NodeKind::Function,
                    id: callee_key.qualified(),
                },
                Relation::Calls,
            ));
        }

        graph
    }
}

/// Insert a node if absent; an existing node keeps its attributes unless the
/// new fact fills a gap (placeholders get enriched, never downgraded).
#[allow(clippy::too_many_arguments)]
fn insert_node(
    graph: &mut RelationshipGraph,
    kind: NodeKind,
    id: String,
    label: String,
    file: Option<String>,
    summary: Option<String>,
    external: bool,
) {
    let key = NodeKey { kind, id };
    match graph.nodes.get_mut(&key) {
        Some(existing) => {
            if existing.summary.is_none() {
                existing.summary = summary;
            }
            if existing.file.is_none() {
                existing.file = file;
            }
            existing.external = existing.external && external;
        }
        None => {
            graph.nodes.insert(
                key.clone(),
                RelNode {
                    key,
                    label,
                    file,
                    summary,
                    external,
                },
            );
        }
    }
}

fn last_segment(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}
