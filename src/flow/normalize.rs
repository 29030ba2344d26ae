//! Project-unique node ids

use std::collections::HashMap;

use crate::schema::{FlowEdge, FlowGraph};

/// Reassign every node id to `<file>::<type>::<seq>` (sequence in document
/// order), stamp `file` on each node, and rewrite edge endpoints. Edges with
/// an endpoint that is not a node of this graph are dropped.
pub fn normalize_graph(graph: &FlowGraph, file: &str) -> FlowGraph {
    let mut remap: HashMap<&str, String> = HashMap::with_capacity(graph.nodes.len());
    let mut nodes = Vec::with_capacity(graph.nodes.len());

    for (seq, node) in graph.nodes.iter().enumerate() {
        let id = format!("{}::{}::{}", file, node.kind, seq);
        remap.insert(node.id.as_str(), id.clone());
        let mut node = node.clone();
        node.id = id;
        node.file = Some(file.to_string());
        nodes.push(node);
    }

    let edges = graph
        .edges
        .iter()
        .filter_map(|edge| {
            let from = remap.get(edge.from.as_str())?;
            let to = remap.get(edge.to.as_str())?;
            Some(FlowEdge::new(from.clone(), to.clone(), edge.label))
        })
        .collect();

    FlowGraph { nodes, edges }
}
