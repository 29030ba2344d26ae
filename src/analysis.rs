//! Semantic enrichment of a merged project graph
//!
//! Annotates every node with `semantic {complexity, importance, dead}`:
//! - reachability: BFS forward from the entry points (every `file` node and
//!   every named `function` node); unvisited nodes are dead
//! - importance: `(in + out degree) / max degree`, 0 for an edgeless graph
//! - complexity: [`lexical_complexity_heuristic`] over the node's snippet
//!
//! Named functions are entry points, so a named top-level function is always
//! reachable even when nothing calls it; only nested or anonymous code that
//! no edge reaches ends up dead.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::ComplexityWeights;
use crate::schema::{FlowGraph, NodeKind, Semantic};

/// Forward and reverse adjacency over node ids
#[derive(Debug, Default)]
pub struct Adjacency<'g> {
    pub forward: HashMap<&'g str, Vec<&'g str>>,
    pub reverse: HashMap<&'g str, Vec<&'g str>>,
}

impl<'g> Adjacency<'g> {
    pub fn build(graph: &'g FlowGraph) -> Self {
        let mut adj = Self::default();
        for edge in &graph.edges {
            adj.forward.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
            adj.reverse.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
        }
        adj
    }

    pub fn degree(&self, id: &str) -> usize {
        self.forward.get(id).map_or(0, Vec::len) + self.reverse.get(id).map_or(0, Vec::len)
    }
}

/// Ids of the analysis roots: file nodes and named function nodes
pub fn entry_points(graph: &FlowGraph) -> Vec<&str> {
    graph
        .nodes
        .iter()
        .filter(|n| match n.kind {
            NodeKind::File => true,
            NodeKind::Function => n.name.as_deref().is_some_and(|name| !name.is_empty()),
            _ => false,
        })
        .map(|n| n.id.as_str())
        .collect()
}

/// Every node reachable from `roots` along forward edges
pub fn reachable<'g>(adj: &Adjacency<'g>, roots: &[&'g str]) -> HashSet<&'g str> {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for &root in roots {
        if visited.insert(root) {
            queue.push_back(root);
        }
    }
    while let Some(id) = queue.pop_front() {
        if let Some(next) = adj.forward.get(id) {
            for &to in next {
                if visited.insert(to) {
                    queue.push_back(to);
                }
            }
        }
    }
    visited
}

/// **Heuristic**, not a control-flow count: substring occurrences of control
/// keywords in the snippet, weighted, plus a nesting term from unbalanced
/// braces. Keywords inside strings, comments or longer identifiers (`format`,
/// `tryParse`) are counted too.
///
/// `1 + Σ keyword·weight + min(returns, cap)·w + clamp({ − }, 0, cap)·w`,
/// rounded and floored at 1. A node without code scores 1.
pub fn lexical_complexity_heuristic(code: Option<&str>, weights: &ComplexityWeights) -> u32 {
    let Some(code) = code else {
        return 1;
    };
    let count = |needle: &str| code.matches(needle).count() as f64;

    let mut score = 1.0;
    score += count("if") * weights.if_weight;
    score += count("for") * weights.for_weight;
    score += count("while") * weights.while_weight;
    score += count("switch") * weights.switch_weight;
    score += count("try") * weights.try_weight;
    score += (count("return").min(weights.return_cap as f64)) * weights.return_weight;

    let open = code.matches('{').count() as i64;
    let close = code.matches('}').count() as i64;
    let nesting = (open - close).clamp(0, weights.nesting_cap as i64) as f64;
    score += nesting * weights.nesting_weight;

    (score.round() as u32).max(1)
}

/// Produce an annotated copy of `graph`; the input is left untouched
pub fn enrich_graph(graph: &FlowGraph, weights: &ComplexityWeights) -> FlowGraph {
    let adj = Adjacency::build(graph);
    let roots = entry_points(graph);
    let alive = reachable(&adj, &roots);

    let max_degree = graph
        .nodes
        .iter()
        .map(|n| adj.degree(&n.id))
        .max()
        .unwrap_or(0);

    let nodes = graph
        .nodes
        .iter()
        .map(|node| {
            let importance = if graph.edges.is_empty() || max_degree == 0 {
                0.0
            } else {
                adj.degree(&node.id) as f64 / max_degree as f64
            };
            let mut node = node.clone();
            node.semantic = Some(Semantic {
                complexity: lexical_complexity_heuristic(node.code.as_deref(), weights),
                importance,
                dead: !alive.contains(node.id.as_str()),
            });
            node
        })
        .collect();

    FlowGraph {
        nodes,
        edges: graph.edges.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EdgeLabel, FlowEdge, FlowNode};

    fn weights() -> ComplexityWeights {
        ComplexityWeights::default()
    }

    fn semantic<'g>(graph: &'g FlowGraph, id: &str) -> &'g Semantic {
        graph.node(id).and_then(|n| n.semantic.as_ref()).unwrap()
    }

    #[test]
    fn test_complexity_monotonic_in_if_count() {
        let one = lexical_complexity_heuristic(Some("if (a) x(); y();"), &weights());
        let two = lexical_complexity_heuristic(Some("if (a) x(); if (b) y();"), &weights());
        assert!(two > one);
    }

    #[test]
    fn test_complexity_floor_and_missing_code() {
        assert_eq!(lexical_complexity_heuristic(None, &weights()), 1);
        assert_eq!(lexical_complexity_heuristic(Some("x = 1"), &weights()), 1);
        // unbalanced closing braces never go negative
        assert_eq!(lexical_complexity_heuristic(Some("}}}}"), &weights()), 1);
    }

    #[test]
    fn test_complexity_caps_returns_and_nesting() {
        let w = weights();
        let many_returns = lexical_complexity_heuristic(Some(&"return;".repeat(10)), &w);
        // 1 + 3 * 0.5 = 2.5 → 3 (round half away from zero)
        assert_eq!(many_returns, 3);
        let deep = lexical_complexity_heuristic(Some(&"{".repeat(20)), &w);
        // 1 + 5 * 0.6 = 4
        assert_eq!(deep, 4);
    }

    #[test]
    fn test_importance_zero_without_edges() {
        let graph = FlowGraph {
            nodes: vec![FlowNode::new("a", NodeKind::Statement)],
            edges: Vec::new(),
        };
        let out = enrich_graph(&graph, &weights());
        assert_eq!(semantic(&out, "a").importance, 0.0);
    }

    #[test]
    fn test_dead_nodes_and_importance() {
        let graph = FlowGraph {
            nodes: vec![
                FlowNode::new("file::a.js", NodeKind::File),
                FlowNode::new("root", NodeKind::Root),
                FlowNode::new("s1", NodeKind::Statement),
                FlowNode::new("anon", NodeKind::Function),
                FlowNode::new("inner", NodeKind::Statement),
                FlowNode::new("named", NodeKind::Function).with_name("helper"),
            ],
            edges: vec![
                FlowEdge::new("file::a.js", "root", EdgeLabel::BelongsTo),
                FlowEdge::new("root", "s1", EdgeLabel::Child),
                FlowEdge::new("anon", "inner", EdgeLabel::Entry),
            ],
        };
        let out = enrich_graph(&graph, &weights());
        assert!(!semantic(&out, "s1").dead);
        assert!(!semantic(&out, "named").dead);
        assert!(semantic(&out, "anon").dead);
        assert!(semantic(&out, "inner").dead);

        assert_eq!(semantic(&out, "root").importance, 1.0);
        assert_eq!(semantic(&out, "named").importance, 0.0);
        assert!(graph.nodes.iter().all(|n| n.semantic.is_none()));
    }
}
