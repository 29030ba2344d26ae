//! Output schema types
//!
//! Everything the engine hands to callers: flow graphs, per-file structural
//! inventories, routes and schema shapes. Field names serialize in the
//! camelCase JSON shape the presentation layer consumes.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::SyntaxDiagnostic;

// ============================================================================
// Flow graph
// ============================================================================

/// Flow node variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Root,
    Statement,
    If,
    IfTrue,
    IfFalse,
    Loop,
    LoopBody,
    AfterLoop,
    Function,
    FnEntry,
    File,
    Error,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Statement => "statement",
            Self::If => "if",
            Self::IfTrue => "if-true",
            Self::IfFalse => "if-false",
            Self::Loop => "loop",
            Self::LoopBody => "loop-body",
            Self::AfterLoop => "after-loop",
            Self::Function => "function",
            Self::FnEntry => "fn-entry",
            Self::File => "file",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation carried by a flow edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeLabel {
    Next,
    Branch,
    Body,
    Child,
    Executes,
    True,
    False,
    Back,
    Exit,
    Declares,
    Entry,
    BelongsTo,
    Imports,
}

impl EdgeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Branch => "branch",
            Self::Body => "body",
            Self::Child => "child",
            Self::Executes => "executes",
            Self::True => "true",
            Self::False => "false",
            Self::Back => "back",
            Self::Exit => "exit",
            Self::Declares => "declares",
            Self::Entry => "entry",
            Self::BelongsTo => "belongsTo",
            Self::Imports => "imports",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores attached by the semantic enricher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Semantic {
    pub complexity: u32,
    pub importance: f64,
    pub dead: bool,
}

/// One point in execution flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<Semantic>,
}

impl FlowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            line: None,
            code: None,
            file: None,
            semantic: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Directed relation between two flow nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: EdgeLabel,
}

impl FlowEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, label: EdgeLabel) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            id: format!("{}->{}", from, to),
            from,
            to,
            label,
        }
    }
}

/// Nodes in document order plus edges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub nodes: Vec<FlowNode>,
    pub edges: Vec<FlowEdge>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph holding a single `error` node
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            nodes: vec![FlowNode::new(id, NodeKind::Error).with_code(message)],
            edges: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&FlowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_ids(&self) -> HashSet<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    pub fn edges_labelled(&self, label: EdgeLabel) -> impl Iterator<Item = &FlowEdge> {
        self.edges.iter().filter(move |e| e.label == label)
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &FlowNode> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Edges whose endpoints are not both present
    pub fn dangling_edges(&self) -> Vec<&FlowEdge> {
        let ids = self.node_ids();
        self.edges
            .iter()
            .filter(|e| !ids.contains(e.from.as_str()) || !ids.contains(e.to.as_str()))
            .collect()
    }
}

// ============================================================================
// Structural inventories
// ============================================================================

/// A named declaration's 1-based line span
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub name: String,
    pub start: usize,
    pub end: Option<usize>,
}

impl SymbolInfo {
    pub fn new(name: impl Into<String>, start: usize, end: Option<usize>) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }
}

/// One recognized HTTP route registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub method: String,
    pub path: String,
    pub start: usize,
    pub end: usize,
    pub framework: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,
}

/// One field of a recognized object shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default)]
    pub auto: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<SchemaField>>,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            raw: None,
            auto: false,
            children: None,
        }
    }
}

/// A recognized schema/shape declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    pub name: String,
    pub framework: String,
    pub start: usize,
    pub end: usize,
    pub fields: Vec<SchemaField>,
}

impl SchemaInfo {
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// How a name was bound by an import declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecifierKind {
    Default,
    Named,
    Namespace,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSpecifier {
    pub kind: SpecifierKind,
    pub local: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported: Option<String>,
}

/// Import declaration with its bound names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub source: String,
    pub line: usize,
    pub specifiers: Vec<ImportSpecifier>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightInfo {
    pub line: usize,
    pub text: String,
}

/// TODO/FIXME/NOTE comments
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlights {
    pub todos: Vec<HighlightInfo>,
    pub fixmes: Vec<HighlightInfo>,
    pub notes: Vec<HighlightInfo>,
}

impl Highlights {
    pub fn is_empty(&self) -> bool {
        self.todos.is_empty() && self.fixmes.is_empty() && self.notes.is_empty()
    }
}

/// Everything the structural extractor recovers from one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStructure {
    pub imports: Vec<SymbolInfo>,
    pub functions: Vec<SymbolInfo>,
    pub classes: Vec<SymbolInfo>,
    pub components: Vec<SymbolInfo>,
    pub interfaces: Vec<SymbolInfo>,
    pub exports: Vec<SymbolInfo>,
    pub blocks: Vec<SymbolInfo>,
    pub apis: Vec<ApiInfo>,
    pub schemas: Vec<SchemaInfo>,
    #[serde(default)]
    pub import_details: Vec<ImportRecord>,
    #[serde(default, skip_serializing_if = "Highlights::is_empty")]
    pub highlights: Highlights,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<SyntaxDiagnostic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileStructure {
    /// Empty inventories carrying a parse failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_serializes_kebab() {
        let json = serde_json::to_string(&NodeKind::AfterLoop).unwrap();
        assert_eq!(json, "\"after-loop\"");
        let kind: NodeKind = serde_json::from_str("\"fn-entry\"").unwrap();
        assert_eq!(kind, NodeKind::FnEntry);
        assert_eq!(NodeKind::IfTrue.to_string(), "if-true");
    }

    #[test]
    fn test_edge_label_wire_names() {
        assert_eq!(serde_json::to_string(&EdgeLabel::BelongsTo).unwrap(), "\"belongsTo\"");
        assert_eq!(serde_json::to_string(&EdgeLabel::True).unwrap(), "\"true\"");
        assert_eq!(EdgeLabel::Back.as_str(), "back");
    }

    #[test]
    fn test_flow_node_json_shape() {
        let node = FlowNode::new("a.ts::if::3", NodeKind::If).with_line(4);
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "if");
        assert_eq!(value["line"], 4);
        assert!(value.get("semantic").is_none());
    }

    #[test]
    fn test_dangling_edges() {
        let mut graph = FlowGraph::new();
        graph.nodes.push(FlowNode::new("a", NodeKind::Root));
        graph.nodes.push(FlowNode::new("b", NodeKind::Statement));
        graph.edges.push(FlowEdge::new("a", "b", EdgeLabel::Child));
        graph.edges.push(FlowEdge::new("b", "zzz", EdgeLabel::Next));

        let dangling = graph.dangling_edges();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].id, "b->zzz");
    }

    #[test]
    fn test_failed_structure_has_empty_inventories() {
        let structure = FileStructure::failed("boom");
        assert!(structure.is_failed());
        assert!(structure.functions.is_empty());
        assert!(structure.apis.is_empty());
    }
}
