//! Execution-flow instrumenter
//!
//! Depth-first over statement sequences. Each statement becomes a node with a
//! `next` edge from its previous sibling and a structural edge from its
//! container. `if` statements fan out into `if-true`/`if-false` markers, loops
//! into a `loop-body` marker whose last statement points `back` at the loop,
//! and functions into a `fn-entry` marker. Function bodies found inside plain
//! statements hang off a separate `function` node via `declares` and never
//! join the enclosing `next` chain.

use tree_sitter::Node;

use crate::config::AnalysisConfig;
use crate::detectors::common::{
    declared_name, get_node_text, is_function_like, named_children, node_text, property_key,
    start_line, visit_until,
};
use crate::parser::{parse_source, ParsedSource};
use crate::schema::{EdgeLabel, FlowEdge, FlowGraph, FlowNode, NodeKind};
use crate::utils::truncate_chars;

/// Id of the synthetic node every file graph starts from
pub const ROOT_ID: &str = "root";

const LOOP_KINDS: &[&str] = &["for_statement", "for_in_statement", "while_statement", "do_statement"];

struct Builder<'s> {
    source: &'s str,
    snippet_max: usize,
    marker_max: usize,
    counter: usize,
    graph: FlowGraph,
}

impl<'s> Builder<'s> {
    fn new(source: &'s str, options: &AnalysisConfig) -> Self {
        Self {
            source,
            snippet_max: options.snippet_max_chars,
            marker_max: options.marker_snippet_chars,
            counter: 0,
            graph: FlowGraph::new(),
        }
    }

    fn snippet(&self, node: &Node, max: usize) -> String {
        truncate_chars(node_text(node, self.source), max)
    }

    /// Append a node with a fresh local id; returns the id
    fn add(&mut self, kind: NodeKind, line: usize, code: String, name: Option<String>) -> String {
        self.counter += 1;
        let id = format!("{}#{}", kind.as_str(), self.counter);
        let mut node = FlowNode::new(id.clone(), kind).with_line(line).with_code(code);
        node.name = name;
        self.graph.nodes.push(node);
        id
    }

    fn link(&mut self, from: &str, to: &str, label: EdgeLabel) {
        self.graph.edges.push(FlowEdge::new(from, to, label));
    }

    /// Marker node describing the first statement of a branch/loop/function body
    fn marker(&mut self, kind: NodeKind, first: Option<&Node>, fallback_line: usize) -> String {
        let (line, code) = match first {
            Some(stmt) => (start_line(stmt), self.snippet(stmt, self.marker_max)),
            None => (fallback_line, String::new()),
        };
        self.add(kind, line, code, None)
    }

    /// Instrument a statement sequence under `container`; returns the last
    /// node added to the sequence
    fn sequence(&mut self, stmts: &[Node], container: &str, container_kind: NodeKind) -> Option<String> {
        let relation = container_relation(container_kind);
        let mut prev: Option<String> = None;

        for stmt in stmts {
            let Some(id) = self.statement(stmt) else {
                continue;
            };
            self.link(container, &id, relation);
            if let Some(prev) = &prev {
                self.link(prev, &id, EdgeLabel::Next);
            }
            prev = Some(id);
        }
        prev
    }

    /// Instrument one statement; `None` for statements that produce no node
    fn statement(&mut self, stmt: &Node) -> Option<String> {
        if matches!(stmt.kind(), "comment" | "empty_statement") {
            return None;
        }
        let line = start_line(stmt);
        let code = self.snippet(stmt, self.snippet_max);

        // `outer: for (...)` is classified by the labelled statement
        let inner = unlabeled(stmt);
        let kind = inner.kind();
        if kind == "if_statement" {
            let name = inner
                .child_by_field_name("condition")
                .map(|c| condition_text(&c, self.source));
            let id = self.add(NodeKind::If, line, code, name);
            self.if_branches(&inner, &id);
            return Some(id);
        }
        if LOOP_KINDS.contains(&kind) {
            let name = loop_header(&inner, self.source);
            let id = self.add(NodeKind::Loop, line, code, name);
            self.loop_body(&inner, &id);
            return Some(id);
        }
        if let Some(function) = declared_function(&inner) {
            let name = declared_name(&function, self.source);
            let id = self.add(NodeKind::Function, line, code, name);
            self.function_body(&function, &id);
            return Some(id);
        }

        let id = self.add(NodeKind::Statement, line, code, None);
        self.nested_functions(stmt, &id);
        Some(id)
    }

    fn if_branches(&mut self, stmt: &Node, if_id: &str) {
        if let Some(consequence) = stmt.child_by_field_name("consequence") {
            self.branch(&consequence, if_id, NodeKind::IfTrue, EdgeLabel::True);
        }
        let alternative = stmt
            .child_by_field_name("alternative")
            .and_then(|clause| named_children(&clause).into_iter().next());
        if let Some(alternative) = alternative {
            self.branch(&alternative, if_id, NodeKind::IfFalse, EdgeLabel::False);
        }
    }

    fn branch(&mut self, body: &Node, if_id: &str, marker: NodeKind, label: EdgeLabel) {
        let stmts = statements_of(body);
        // an empty block contributes no marker
        let Some(first) = stmts.first() else {
            return;
        };
        let entry = self.marker(marker, Some(first), start_line(body));
        self.link(if_id, &entry, label);
        self.sequence(&stmts, &entry, marker);
    }

    fn loop_body(&mut self, stmt: &Node, loop_id: &str) {
        let stmts = stmt
            .child_by_field_name("body")
            .map(|body| statements_of(&body))
            .unwrap_or_default();
        let entry = self.marker(NodeKind::LoopBody, stmts.first(), start_line(stmt));
        self.link(loop_id, &entry, EdgeLabel::Body);

        let last = self
            .sequence(&stmts, &entry, NodeKind::LoopBody)
            .unwrap_or_else(|| entry.clone());
        self.link(&last, loop_id, EdgeLabel::Back);

        let after = self.add(NodeKind::AfterLoop, start_line(stmt), "after loop".to_string(), None);
        self.link(loop_id, &after, EdgeLabel::Exit);
    }

    fn function_body(&mut self, function: &Node, fn_id: &str) {
        let Some(body) = function
            .child_by_field_name("body")
            .filter(|b| b.kind() == "statement_block")
        else {
            return;
        };
        let stmts = named_children(&body);
        let Some(first) = stmts.iter().find(|s| !matches!(s.kind(), "comment" | "empty_statement")) else {
            return;
        };
        let entry = self.marker(NodeKind::FnEntry, Some(first), start_line(&body));
        self.link(fn_id, &entry, EdgeLabel::Entry);
        self.sequence(&stmts, &entry, NodeKind::FnEntry);
    }

    /// Functions defined inside a plain statement, without crossing into
    /// another function's body
    fn nested_functions(&mut self, stmt: &Node, stmt_id: &str) {
        let mut found = Vec::new();
        if is_function_like(stmt.kind()) {
            found.push(*stmt);
        } else {
            visit_until(
                *stmt,
                |node| {
                    if is_function_like(node.kind()) {
                        found.push(node);
                    }
                },
                |n| is_function_like(n.kind()),
            );
        }

        for function in found {
            let name = function_name(&function, self.source);
            let code = self.snippet(&function, self.snippet_max);
            let fn_id = self.add(NodeKind::Function, start_line(&function), code, name);
            self.link(stmt_id, &fn_id, EdgeLabel::Declares);
            self.function_body(&function, &fn_id);
        }
    }
}

fn container_relation(kind: NodeKind) -> EdgeLabel {
    match kind {
        NodeKind::Function | NodeKind::FnEntry => EdgeLabel::Executes,
        NodeKind::If | NodeKind::IfTrue | NodeKind::IfFalse => EdgeLabel::Branch,
        NodeKind::Loop | NodeKind::LoopBody => EdgeLabel::Body,
        _ => EdgeLabel::Child,
    }
}

/// Statements of a block, or the single statement of a bare body
fn statements_of<'t>(body: &Node<'t>) -> Vec<Node<'t>> {
    if body.kind() == "statement_block" {
        named_children(body)
    } else {
        vec![*body]
    }
}

/// The statement under any number of `label:` prefixes
fn unlabeled<'t>(stmt: &Node<'t>) -> Node<'t> {
    let mut current = *stmt;
    while current.kind() == "labeled_statement" {
        match current.child_by_field_name("body") {
            Some(body) => current = body,
            None => break,
        }
    }
    current
}

/// Function declaration carried by a statement, including `export function`
fn declared_function<'t>(stmt: &Node<'t>) -> Option<Node<'t>> {
    match stmt.kind() {
        "function_declaration" | "generator_function_declaration" => Some(*stmt),
        "export_statement" => stmt
            .child_by_field_name("declaration")
            .filter(|d| matches!(d.kind(), "function_declaration" | "generator_function_declaration")),
        _ => None,
    }
}

/// Name a nested function by its own name, its binding or its object key;
/// anonymous callbacks stay unnamed
fn function_name(function: &Node, source: &str) -> Option<String> {
    if function.kind() == "method_definition" {
        return property_key(function, source);
    }
    if let Some(name) = declared_name(function, source) {
        return Some(name);
    }
    let parent = function.parent()?;
    match parent.kind() {
        "variable_declarator" => parent
            .child_by_field_name("name")
            .filter(|n| n.kind() == "identifier")
            .map(|n| get_node_text(&n, source)),
        "pair" => property_key(&parent, source),
        "public_field_definition" | "field_definition" => parent
            .child_by_field_name("name")
            .or_else(|| parent.child_by_field_name("property"))
            .map(|n| get_node_text(&n, source)),
        _ => None,
    }
}

fn condition_text(condition: &Node, source: &str) -> String {
    let text = node_text(condition, source).trim();
    text.strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .unwrap_or(text)
        .trim()
        .to_string()
}

/// `for (...)` / `while (...)` header text; the condition for `do ... while`
fn loop_header(stmt: &Node, source: &str) -> Option<String> {
    if stmt.kind() == "do_statement" {
        return stmt
            .child_by_field_name("condition")
            .map(|c| condition_text(&c, source));
    }
    let body = stmt.child_by_field_name("body")?;
    let header = source.get(stmt.start_byte()..body.start_byte())?;
    let header: String = header.split_whitespace().collect::<Vec<_>>().join(" ");
    (!header.is_empty()).then_some(header)
}

/// Skip the leading `"use strict"`-style directive prologue of a program
fn without_directives<'t>(stmts: Vec<Node<'t>>, source: &str) -> Vec<Node<'t>> {
    let prologue = stmts
        .iter()
        .take_while(|s| {
            s.kind() == "expression_statement"
                && named_children(s)
                    .first()
                    .is_some_and(|e| e.kind() == "string" && !node_text(e, source).is_empty())
        })
        .count();
    stmts.into_iter().skip(prologue).collect()
}

/// Instrument an already-parsed file. The graph starts at a `root` node whose
/// `child` edges reach every top-level statement.
pub fn instrument_parsed(parsed: &ParsedSource, source: &str, options: &AnalysisConfig) -> FlowGraph {
    let mut builder = Builder::new(source, options);
    builder
        .graph
        .nodes
        .push(FlowNode::new(ROOT_ID, NodeKind::Root).with_line(0).with_code("root"));

    let stmts = without_directives(named_children(&parsed.root()), source);
    builder.sequence(&stmts, ROOT_ID, NodeKind::Root);
    builder.graph
}

/// Parse and instrument one file. A hard parse failure yields a graph
/// holding one `error` node with the failure message.
pub fn instrument_source(path: &str, source: &str, options: &AnalysisConfig) -> FlowGraph {
    match parse_source(path, source, options.max_file_bytes) {
        Ok(parsed) => instrument_parsed(&parsed, source, options),
        Err(err) => FlowGraph::error("error#1", err.to_string()),
    }
}
