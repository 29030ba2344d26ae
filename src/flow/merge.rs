//! Graph merger
//!
//! Concatenates normalized per-file graphs and adds one `file` node per file.
//! A file node `belongsTo`-links the nodes its file contributes at the top:
//! those with no incoming edge inside that file's graph (the `root`, or the
//! lone `error` node of a file that failed to parse). Cross-file edges come
//! from [`link_imports`].

use std::collections::HashSet;

use crate::impact::ImpactMap;
use crate::schema::{EdgeLabel, FlowEdge, FlowGraph, FlowNode, NodeKind};

/// Id of the synthetic node standing for a file
pub fn file_node_id(path: &str) -> String {
    format!("file::{}", path)
}

/// Merge `(path, graph)` pairs into one project graph. Inputs are expected to
/// be normalized already; nothing is deduplicated across files.
pub fn merge_file_graphs<P: AsRef<str>>(files: &[(P, FlowGraph)]) -> FlowGraph {
    let mut merged = FlowGraph::new();

    for (path, graph) in files {
        let path = path.as_ref();
        let file_id = file_node_id(path);
        let mut file_node = FlowNode::new(file_id.clone(), NodeKind::File).with_name(path);
        file_node.file = Some(path.to_string());
        merged.nodes.push(file_node);

        let targets: HashSet<&str> = graph.edges.iter().map(|e| e.to.as_str()).collect();
        for node in &graph.nodes {
            if !targets.contains(node.id.as_str()) && node.id != file_id {
                merged
                    .edges
                    .push(FlowEdge::new(file_id.clone(), node.id.clone(), EdgeLabel::BelongsTo));
            }
        }

        merged.nodes.extend(graph.nodes.iter().cloned());
        merged.edges.extend(graph.edges.iter().cloned());
    }

    merged
}

/// Add `imports` edges between the file nodes of a merged graph, one per
/// resolved import. Files without a file node in the graph are skipped.
pub fn link_imports(graph: &FlowGraph, impact: &ImpactMap) -> FlowGraph {
    let mut out = graph.clone();
    let file_nodes: HashSet<&str> = graph
        .nodes_of_kind(NodeKind::File)
        .map(|n| n.id.as_str())
        .collect();
    let existing: HashSet<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();

    for (importer, imported) in impact.edges() {
        let from = file_node_id(importer);
        let to = file_node_id(imported);
        if !file_nodes.contains(from.as_str()) || !file_nodes.contains(to.as_str()) {
            continue;
        }
        let edge = FlowEdge::new(from, to, EdgeLabel::Imports);
        if !existing.contains(edge.id.as_str()) {
            out.edges.push(edge);
        }
    }
    out
}
