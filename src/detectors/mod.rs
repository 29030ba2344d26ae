//! Structural extractor
//!
//! One pre-order walk over a parsed file. Each node kind maps to an ordered
//! list of independent rules; every rule reports into a shared [`Collector`]
//! and a rule that trips over an unexpected node shape is logged and skipped
//! without aborting the walk.
//!
//! Rule families live in their own modules:
//! - [`symbols`]: declarations, exports, imports, components
//! - [`blocks`]: foldable lexical ranges
//! - [`routes`]: HTTP route idioms (router calls, decorated controllers, file conventions)
//! - [`schemas`]: shape idioms (ODM schemas, validation builders, typed interfaces)
//! - [`highlights`]: TODO/FIXME/NOTE comments

pub mod blocks;
pub mod common;
pub mod highlights;
pub mod routes;
pub mod schemas;
pub mod symbols;

use std::collections::HashSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};
use tree_sitter::Node;

use crate::parser::{parse_source, ParsedSource};
use crate::schema::{ApiInfo, FileStructure, ImportRecord, SchemaInfo, SymbolInfo};
use crate::utils::file_stem;

use self::common::visit_all;
use self::routes::{Mount, RawRoute};

/// Minimum `end - start` for a range to count as a foldable block
pub const MIN_BLOCK_SPAN: usize = 1;

/// Markup-return heuristic: the file text returns a JSX-looking expression.
/// Purely lexical; false positives and negatives are accepted.
static MARKUP_RETURN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"return\s*\(?\s*<[A-Za-z>]").ok());

/// Raised by a rule that met a node shape it does not understand
#[derive(Debug, Clone)]
pub struct RuleError(pub String);

impl RuleError {
    pub fn shape(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type RuleResult = std::result::Result<(), RuleError>;

/// A detection rule bound to one node kind
pub type Rule = fn(&mut Collector<'_>, Node<'_>) -> RuleResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Inventory {
    Function,
    Class,
    Component,
    Interface,
    Export,
    Block,
}

/// Accumulates inventories during the walk, deduplicating as it goes
pub struct Collector<'s> {
    pub path: &'s str,
    pub source: &'s str,
    /// File text contains the markup-return idiom
    pub has_markup_return: bool,
    /// File sits under an API-route directory convention
    pub api_route_file: bool,
    out: FileStructure,
    seen_symbols: HashSet<(Inventory, String, usize, Option<usize>)>,
    seen_imports: HashSet<String>,
    seen_apis: HashSet<(String, String, String, usize, usize)>,
    seen_schemas: HashSet<(String, usize, usize)>,
    raw_routes: Vec<RawRoute>,
    mounts: Vec<Mount>,
}

impl<'s> Collector<'s> {
    pub fn new(path: &'s str, source: &'s str) -> Self {
        Self {
            path,
            source,
            has_markup_return: MARKUP_RETURN
                .as_ref()
                .is_some_and(|re| re.is_match(source)),
            api_route_file: is_api_route_path(path),
            out: FileStructure::default(),
            seen_symbols: HashSet::new(),
            seen_imports: HashSet::new(),
            seen_apis: HashSet::new(),
            seen_schemas: HashSet::new(),
            raw_routes: Vec::new(),
            mounts: Vec::new(),
        }
    }

    fn push_symbol(&mut self, inventory: Inventory, name: &str, start: usize, end: Option<usize>) {
        if name.is_empty() {
            return;
        }
        let key = (inventory, name.to_string(), start, end);
        if !self.seen_symbols.insert(key) {
            return;
        }
        let symbol = SymbolInfo::new(name, start, end);
        match inventory {
            Inventory::Function => self.out.functions.push(symbol),
            Inventory::Class => self.out.classes.push(symbol),
            Inventory::Component => self.out.components.push(symbol),
            Inventory::Interface => self.out.interfaces.push(symbol),
            Inventory::Export => self.out.exports.push(symbol),
            Inventory::Block => self.out.blocks.push(symbol),
        }
    }

    /// Component heuristic: uppercase name plus a markup return somewhere in the file
    fn maybe_component(&mut self, name: &str, start: usize, end: usize) {
        let uppercase = name.chars().next().is_some_and(|c| c.is_ascii_uppercase());
        if uppercase && self.has_markup_return {
            self.push_symbol(Inventory::Component, name, start, Some(end));
        }
    }

    pub fn add_function(&mut self, name: &str, start: usize, end: usize) {
        self.push_symbol(Inventory::Function, name, start, Some(end));
        self.maybe_component(name, start, end);
    }

    pub fn add_class(&mut self, name: &str, start: usize, end: usize) {
        self.push_symbol(Inventory::Class, name, start, Some(end));
        self.maybe_component(name, start, end);
    }

    pub fn add_interface(&mut self, name: &str, start: usize, end: usize) {
        self.push_symbol(Inventory::Interface, name, start, Some(end));
    }

    pub fn add_export(&mut self, name: &str, start: usize, end: usize) {
        self.push_symbol(Inventory::Export, name, start, Some(end));
    }

    /// Record a foldable block when it spans at least two lines
    pub fn add_block(&mut self, label: &str, start: usize, end: usize) {
        if end < start || end - start < MIN_BLOCK_SPAN {
            return;
        }
        self.push_symbol(Inventory::Block, label, start, Some(end));
    }

    /// Record an import source; the first occurrence of a path wins
    pub fn add_import(&mut self, record: ImportRecord, end: usize) {
        if record.source.is_empty() || !self.seen_imports.insert(record.source.clone()) {
            return;
        }
        self.out
            .imports
            .push(SymbolInfo::new(record.source.clone(), record.line, Some(end)));
        self.out.import_details.push(record);
    }

    pub fn add_api(&mut self, api: ApiInfo) {
        let method = api.method.to_uppercase();
        if !routes::HTTP_METHODS.contains(&method.as_str()) {
            return;
        }
        let key = (
            api.framework.clone(),
            method.clone(),
            api.path.clone(),
            api.start,
            api.end,
        );
        if !self.seen_apis.insert(key) {
            return;
        }
        self.add_block(&format!("{} {}", method, api.path), api.start, api.end);
        self.out.apis.push(ApiInfo { method, ..api });
    }

    pub fn add_schema(&mut self, schema: SchemaInfo) {
        let key = (schema.name.clone(), schema.start, schema.end);
        if self.seen_schemas.insert(key) {
            self.out.schemas.push(schema);
        }
    }

    pub fn add_raw_route(&mut self, route: RawRoute) {
        self.raw_routes.push(route);
    }

    pub fn add_mount(&mut self, mount: Mount) {
        self.mounts.push(mount);
    }

    pub fn highlights_mut(&mut self) -> &mut crate::schema::Highlights {
        &mut self.out.highlights
    }

    /// Compose deferred router routes and order every inventory by start line
    pub fn finish(mut self) -> FileStructure {
        let raw_routes = std::mem::take(&mut self.raw_routes);
        for api in routes::compose_routes(&raw_routes, &self.mounts) {
            self.add_api(api);
        }

        let out = &mut self.out;
        for list in [
            &mut out.functions,
            &mut out.classes,
            &mut out.components,
            &mut out.interfaces,
            &mut out.exports,
            &mut out.blocks,
        ] {
            list.sort_by_key(|s| s.start);
        }
        out.apis.sort_by_key(|a| a.start);
        out.schemas.sort_by_key(|s| s.start);
        self.out
    }
}

/// Rules that fire on a given node kind, in order
fn rules_for(kind: &str) -> &'static [Rule] {
    match kind {
        "import_statement" => &[symbols::import_declaration],
        "call_expression" => &[
            symbols::require_or_dynamic_import,
            routes::router_call,
            routes::router_mount,
            schemas::odm_model_call,
        ],
        "variable_declarator" => &[
            symbols::variable_declarator,
            schemas::odm_schema_declarator,
            schemas::builder_schema_declarator,
        ],
        "function_declaration" | "generator_function_declaration" => {
            &[symbols::function_declaration, blocks::function_block]
        }
        "function_expression" | "arrow_function" => &[blocks::function_block],
        "method_definition" => &[symbols::object_method, blocks::function_block],
        "class_declaration" | "abstract_class_declaration" => &[
            symbols::class_declaration,
            blocks::class_block,
            routes::controller_routes,
        ],
        "interface_declaration" => &[symbols::interface_declaration, schemas::interface_schema],
        "type_alias_declaration" => &[symbols::type_alias_declaration, schemas::type_alias_schema],
        "export_statement" => &[symbols::export_statement, routes::convention_routes],
        "assignment_expression" => &[symbols::module_exports],
        "if_statement" | "for_statement" | "for_in_statement" | "while_statement"
        | "do_statement" | "switch_statement" | "try_statement" | "catch_clause"
        | "statement_block" | "object" | "jsx_element" | "object_type"
        | "ambient_declaration" | "return_statement" => &[blocks::lexical_block],
        "comment" => &[highlights::comment],
        _ => &[],
    }
}

/// Run every rule over the tree of an already-parsed file
pub fn extract_from_parsed(path: &str, source: &str, parsed: &ParsedSource) -> FileStructure {
    let mut collector = Collector::new(path, source);

    visit_all(parsed.root(), |node| {
        for rule in rules_for(node.kind()) {
            if let Err(err) = rule(&mut collector, node) {
                trace!(
                    path,
                    line = node.start_position().row + 1,
                    kind = node.kind(),
                    "skipping rule: {}",
                    err
                );
            }
        }
    });

    let mut structure = collector.finish();
    structure.diagnostics = parsed.diagnostics.clone();
    structure
}

/// Parse and extract one file. A parse failure yields empty inventories
/// carrying the error message instead of an `Err`.
pub fn extract_structure(path: &str, source: &str, max_bytes: usize) -> FileStructure {
    match parse_source(path, source, max_bytes) {
        Ok(parsed) => extract_from_parsed(path, source, &parsed),
        Err(err) => {
            debug!(path, "structural extraction skipped: {}", err);
            FileStructure::failed(err.to_string())
        }
    }
}

/// Convention directories for file-per-route handlers
pub fn is_api_route_path(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    let segments: Vec<&str> = normalized.split('/').filter(|s| !s.is_empty()).collect();
    let under_api = segments
        .windows(2)
        .any(|w| matches!(w[0], "app" | "pages") && w[1] == "api");
    under_api || file_stem(&normalized) == "route"
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1024 * 1024;

    #[test]
    fn test_api_route_path_convention() {
        assert!(is_api_route_path("app/api/users/route.ts"));
        assert!(is_api_route_path("src/pages/api/login.js"));
        assert!(is_api_route_path("app/auth/route.ts"));
        assert!(!is_api_route_path("src/api/client.ts"));
        assert!(!is_api_route_path("pages/index.tsx"));
    }

    #[test]
    fn test_parse_failure_gives_error_marker() {
        let structure = extract_structure("styles.css", "body {}", LIMIT);
        assert!(structure.is_failed());
        assert!(structure.functions.is_empty());
    }

    #[test]
    fn test_syntax_errors_do_not_abort_walk() {
        let source = "function good() {\n  return 1;\n}\nconst = ;\nclass Later {}\n";
        let structure = extract_structure("mixed.js", source, LIMIT);
        assert!(!structure.is_failed());
        assert!(!structure.diagnostics.is_empty());
        assert!(structure.functions.iter().any(|f| f.name == "good"));
        assert!(structure.classes.iter().any(|c| c.name == "Later"));
    }

    #[test]
    fn test_inventories_sorted_by_start() {
        let source = "function b() {}\nclass A {}\nfunction a() {}\n";
        let structure = extract_structure("x.js", source, LIMIT);
        let starts: Vec<usize> = structure.functions.iter().map(|f| f.start).collect();
        assert_eq!(starts, vec![1, 3]);
    }

    #[test]
    fn test_blocks_require_two_lines() {
        let source = "if (a) { one(); }\nif (b) {\n  two();\n}\n";
        let structure = extract_structure("x.js", source, LIMIT);
        let ifs: Vec<&SymbolInfo> = structure.blocks.iter().filter(|b| b.name == "if").collect();
        assert_eq!(ifs.len(), 1);
        assert_eq!(ifs[0].start, 2);
        assert_eq!(ifs[0].end, Some(4));
    }
}
