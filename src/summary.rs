//! Codebase text summary.
//!
//! Renders `summary.md` from a run's outcomes and relationship graph:
//! language breakdown, code-element counts, the most connected files, the
//! most common imports, and any files that failed analysis.

use std::collections::BTreeMap;

use crate::analyze::RunResult;
use crate::graph::{NodeKind, Relation, RelationshipGraph};
use crate::models::FileOutcome;

pub fn render(result: &RunResult) -> String {
    render_parts(&result.outcomes, &result.relationship_graph)
}

pub fn render_parts(outcomes: &[FileOutcome], graph: &RelationshipGraph) -> String {
    let mut out = String::from("# Codebase Summary\n\n");

    // Language breakdown over analyzed files.
    let mut languages: BTreeMap<&str, usize> = BTreeMap::new();
    let mut analyzed = 0usize;
    for outcome in outcomes {
        if outcome.analysis().is_some() {
            analyzed += 1;
            *languages.entry(outcome.language.as_str()).or_default() += 1;
        }
    }
    out.push_str("## File Types\n");
    out.push_str(&format!("Total Files Analyzed: {}\n", analyzed));
    for (language, count) in &languages {
        out.push_str(&format!("- {}: {} files\n", language, count));
    }
    out.push('\n');

    out.push_str("## Code Elements\n");
    for kind in [
        NodeKind::File,
        NodeKind::Function,
        NodeKind::Class,
        NodeKind::Import,
    ] {
        let count = graph.nodes_of_kind(kind).count();
        out.push_str(&format!("- {}s: {}\n", capitalize(kind.as_str()), count));
    }
    out.push('\n');

    out.push_str("## Most Connected Files\n");
    for (file, degree) in top_by_degree(graph, NodeKind::File, 10) {
        out.push_str(&format!("- {}: {} connections\n", file, degree));
    }
    out.push('\n');

    out.push_str("## Most Common Imports\n");
    let mut import_use: Vec<(String, usize)> = graph
        .nodes_of_kind(NodeKind::Import)
        .map(|node| {
            let used_by = graph
                .edges_of(Relation::Imports)
                .filter(|(_, target, _)| target == &node.key)
                .count();
            (node.label.clone(), used_by)
        })
        .collect();
    import_use.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (import, count) in import_use.into_iter().take(10) {
        out.push_str(&format!("- {}: used in {} files\n", import, count));
    }
    out.push('\n');

    let failures: Vec<&FileOutcome> = outcomes.iter().filter(|o| o.failure().is_some()).collect();
    if !failures.is_empty() {
        out.push_str("## Files Not Analyzed\n");
        for outcome in failures {
            let failure = outcome.failure().expect("filtered on failures");
            out.push_str(&format!(
                "- {}: {} ({})\n",
                failure.path,
                failure.kind.as_str(),
                failure.message
            ));
        }
        out.push('\n');
    }

    out
}

fn top_by_degree(
    graph: &RelationshipGraph,
    kind: NodeKind,
    limit: usize,
) -> Vec<(String, usize)> {
    let mut degrees: Vec<(String, usize)> = graph
        .nodes_of_kind(kind)
        .map(|node| (node.key.id.clone(), graph.degree(&node.key)))
        .collect();
    degrees.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    degrees.truncate(limit);
    degrees
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
