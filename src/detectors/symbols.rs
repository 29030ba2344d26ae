//! Declaration, export and import rules

use tree_sitter::Node;

use super::common::{
    call_arguments, callee, declared_name, end_line, get_node_text, has_token, is_class_like,
    is_function_like, named_children, node_text, property_key, start_line, string_literal_value,
    unwrap_expression,
};
use super::{Collector, RuleError, RuleResult};
use crate::schema::{ImportRecord, ImportSpecifier, SpecifierKind};

// ============================================================================
// Declarations
// ============================================================================

pub fn function_declaration(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let name = declared_name(&node, c.source)
        .ok_or_else(|| RuleError::shape("function declaration without a name"))?;
    c.add_function(&name, start_line(&node), end_line(&node));
    Ok(())
}

pub fn class_declaration(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let name = declared_name(&node, c.source)
        .ok_or_else(|| RuleError::shape("class declaration without a name"))?;
    c.add_class(&name, start_line(&node), end_line(&node));
    Ok(())
}

pub fn interface_declaration(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let name = declared_name(&node, c.source)
        .ok_or_else(|| RuleError::shape("interface without a name"))?;
    c.add_interface(&name, start_line(&node), end_line(&node));
    Ok(())
}

pub fn type_alias_declaration(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let name = declared_name(&node, c.source)
        .ok_or_else(|| RuleError::shape("type alias without a name"))?;
    c.add_interface(&name, start_line(&node), end_line(&node));
    Ok(())
}

/// `const f = () => {}`, `const f = function () {}`, `const C = class {}`
pub fn variable_declarator(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(name_node) = node.child_by_field_name("name") else {
        return Ok(());
    };
    if name_node.kind() != "identifier" {
        return Ok(());
    }
    let Some(value) = node.child_by_field_name("value") else {
        return Ok(());
    };
    let value = unwrap_expression(value);
    let name = get_node_text(&name_node, c.source);
    let (start, end) = (start_line(&node), end_line(&node));

    if is_function_like(value.kind()) {
        c.add_function(&name, start, end);
    } else if is_class_like(value.kind()) {
        c.add_class(&name, start, end);
    }
    Ok(())
}

/// Shorthand methods on object literals: `{ load() { ... } }`
pub fn object_method(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let in_object = node.parent().is_some_and(|p| p.kind() == "object");
    if !in_object {
        return Ok(());
    }
    let name = property_key(&node, c.source)
        .ok_or_else(|| RuleError::shape("object method without a key"))?;
    c.add_function(&name, start_line(&node), end_line(&node));
    Ok(())
}

// ============================================================================
// Exports
// ============================================================================

pub fn export_statement(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let (start, end) = (start_line(&node), end_line(&node));
    let is_default = has_token(&node, "default");

    if let Some(decl) = node.child_by_field_name("declaration") {
        let names = declaration_names(&decl, c.source);
        if names.is_empty() && is_default {
            c.add_export("default", start, end);
        }
        for name in names {
            c.add_export(&name, start, end);
        }
    } else if let Some(value) = node.child_by_field_name("value") {
        let value = unwrap_expression(value);
        let name = match value.kind() {
            "identifier" => Some(get_node_text(&value, c.source)),
            kind if is_function_like(kind) || is_class_like(kind) => {
                declared_name(&value, c.source)
            }
            _ => None,
        };
        if let Some(name) = &name {
            if is_function_like(value.kind()) {
                c.add_function(name, start_line(&value), end_line(&value));
            } else if is_class_like(value.kind()) {
                c.add_class(name, start_line(&value), end_line(&value));
            }
        }
        c.add_export(name.as_deref().unwrap_or("default"), start, end);
    }

    for child in named_children(&node) {
        if child.kind() != "export_clause" {
            continue;
        }
        for spec in named_children(&child) {
            if spec.kind() != "export_specifier" {
                continue;
            }
            let exported = spec
                .child_by_field_name("alias")
                .or_else(|| spec.child_by_field_name("name"))
                .map(|n| export_name_text(&n, c.source));
            if let Some(name) = exported {
                c.add_export(&name, start, end);
            }
        }
    }

    // `export { a } from './b'` and `export * from './b'` depend on their source
    if let Some(source) = node.child_by_field_name("source") {
        if let Some(path) = string_literal_value(&source, c.source) {
            let record = ImportRecord {
                source: path,
                line: start,
                specifiers: Vec::new(),
            };
            c.add_import(record, end);
        }
    }
    Ok(())
}

fn export_name_text(node: &Node, source: &str) -> String {
    string_literal_value(node, source).unwrap_or_else(|| get_node_text(node, source))
}

/// Names bound by a declaration appearing after `export`
fn declaration_names(decl: &Node, source: &str) -> Vec<String> {
    match decl.kind() {
        "lexical_declaration" | "variable_declaration" => named_children(decl)
            .into_iter()
            .filter(|d| d.kind() == "variable_declarator")
            .filter_map(|d| d.child_by_field_name("name"))
            .filter(|n| n.kind() == "identifier")
            .map(|n| get_node_text(&n, source))
            .collect(),
        "enum_declaration" | "module" | "internal_module" => decl
            .child_by_field_name("name")
            .map(|n| vec![get_node_text(&n, source)])
            .unwrap_or_default(),
        _ => declared_name(decl, source).into_iter().collect(),
    }
}

/// CommonJS export idioms: `module.exports = ...`, `exports.x = ...`,
/// `module.exports.x = ...`
pub fn module_exports(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(left) = node.child_by_field_name("left") else {
        return Ok(());
    };
    let Some(right) = node.child_by_field_name("right") else {
        return Ok(());
    };
    if left.kind() != "member_expression" {
        return Ok(());
    }
    let target = node_text(&left, c.source).replace(char::is_whitespace, "");
    let right = unwrap_expression(right);
    let (start, end) = (start_line(&node), end_line(&node));

    if target == "module.exports" {
        match right.kind() {
            "object" => {
                for prop in named_children(&right) {
                    export_object_member(c, prop);
                }
            }
            "identifier" => c.add_export(&get_node_text(&right, c.source), start, end),
            kind if is_function_like(kind) || is_class_like(kind) => {
                let name = declared_name(&right, c.source);
                if let Some(name) = &name {
                    if is_function_like(kind) {
                        c.add_function(name, start_line(&right), end_line(&right));
                    } else {
                        c.add_class(name, start_line(&right), end_line(&right));
                    }
                }
                c.add_export(name.as_deref().unwrap_or("default"), start, end);
            }
            _ => c.add_export("default", start, end),
        }
        return Ok(());
    }

    let key = target
        .strip_prefix("module.exports.")
        .or_else(|| target.strip_prefix("exports."));
    if let Some(key) = key.filter(|k| !k.is_empty() && !k.contains('.')) {
        c.add_export(key, start, end);
        if is_function_like(right.kind()) {
            c.add_function(key, start, end);
        } else if is_class_like(right.kind()) {
            c.add_class(key, start, end);
        }
    }
    Ok(())
}

fn export_object_member(c: &mut Collector<'_>, prop: Node<'_>) {
    let (start, end) = (start_line(&prop), end_line(&prop));
    match prop.kind() {
        "shorthand_property_identifier" => {
            c.add_export(&get_node_text(&prop, c.source), start, end);
        }
        "method_definition" => {
            if let Some(name) = property_key(&prop, c.source) {
                c.add_export(&name, start, end);
                c.add_function(&name, start, end);
            }
        }
        "pair" => {
            let Some(name) = property_key(&prop, c.source) else {
                return;
            };
            c.add_export(&name, start, end);
            if let Some(value) = prop.child_by_field_name("value") {
                let value = unwrap_expression(value);
                if is_function_like(value.kind()) {
                    c.add_function(&name, start, end);
                } else if is_class_like(value.kind()) {
                    c.add_class(&name, start, end);
                }
            }
        }
        _ => {}
    }
}

// ============================================================================
// Imports
// ============================================================================

/// `import x, { a as b } from "mod"` / `import * as ns from "mod"` / `import "mod"`
pub fn import_declaration(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let source_node = node
        .child_by_field_name("source")
        .ok_or_else(|| RuleError::shape("import without a source"))?;
    let path = string_literal_value(&source_node, c.source)
        .ok_or_else(|| RuleError::shape("import source is not a string"))?;

    let mut specifiers = Vec::new();
    for clause in named_children(&node) {
        if clause.kind() != "import_clause" {
            continue;
        }
        for part in named_children(&clause) {
            match part.kind() {
                "identifier" => specifiers.push(ImportSpecifier {
                    kind: SpecifierKind::Default,
                    local: get_node_text(&part, c.source),
                    imported: None,
                }),
                "namespace_import" => {
                    if let Some(ident) = named_children(&part).into_iter().next() {
                        specifiers.push(ImportSpecifier {
                            kind: SpecifierKind::Namespace,
                            local: get_node_text(&ident, c.source),
                            imported: None,
                        });
                    }
                }
                "named_imports" => {
                    for spec in named_children(&part) {
                        if spec.kind() != "import_specifier" {
                            continue;
                        }
                        let Some(name) = spec.child_by_field_name("name") else {
                            continue;
                        };
                        let imported = export_name_text(&name, c.source);
                        let local = spec
                            .child_by_field_name("alias")
                            .map(|a| get_node_text(&a, c.source))
                            .unwrap_or_else(|| imported.clone());
                        specifiers.push(ImportSpecifier {
                            kind: SpecifierKind::Named,
                            local,
                            imported: Some(imported),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    c.add_import(
        ImportRecord {
            source: path,
            line: start_line(&node),
            specifiers,
        },
        end_line(&node),
    );
    Ok(())
}

/// `require("mod")` with exactly one string argument, and `import("mod")`
pub fn require_or_dynamic_import(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(function) = callee(&node) else {
        return Ok(());
    };
    let is_require = function.kind() == "identifier" && node_text(&function, c.source) == "require";
    let is_dynamic_import = function.kind() == "import";
    if !is_require && !is_dynamic_import {
        return Ok(());
    }

    let args = call_arguments(&node);
    if args.len() != 1 {
        return Ok(());
    }
    let Some(path) = string_literal_value(&args[0], c.source) else {
        return Ok(());
    };

    let specifiers = if is_require {
        binding_specifiers(&node, c.source)
    } else {
        Vec::new()
    };
    c.add_import(
        ImportRecord {
            source: path,
            line: start_line(&node),
            specifiers,
        },
        end_line(&node),
    );
    Ok(())
}

/// Names bound by `const x = require(...)` / `const { a, b: c } = require(...)`
fn binding_specifiers(call: &Node, source: &str) -> Vec<ImportSpecifier> {
    let Some(declarator) = call.parent().filter(|p| p.kind() == "variable_declarator") else {
        return Vec::new();
    };
    let Some(pattern) = declarator.child_by_field_name("name") else {
        return Vec::new();
    };
    match pattern.kind() {
        "identifier" => vec![ImportSpecifier {
            kind: SpecifierKind::Default,
            local: get_node_text(&pattern, source),
            imported: None,
        }],
        "object_pattern" => named_children(&pattern)
            .into_iter()
            .filter_map(|p| match p.kind() {
                "shorthand_property_identifier_pattern" => {
                    let name = get_node_text(&p, source);
                    Some(ImportSpecifier {
                        kind: SpecifierKind::Named,
                        local: name.clone(),
                        imported: Some(name),
                    })
                }
                "pair_pattern" => {
                    let imported = property_key(&p, source)?;
                    let local = p
                        .child_by_field_name("value")
                        .map(|v| get_node_text(&v, source))
                        .unwrap_or_else(|| imported.clone());
                    Some(ImportSpecifier {
                        kind: SpecifierKind::Named,
                        local,
                        imported: Some(imported),
                    })
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use crate::detectors::extract_structure;
    use crate::schema::{FileStructure, SpecifierKind};

    fn extract(path: &str, source: &str) -> FileStructure {
        extract_structure(path, source, 1 << 20)
    }

    fn names(list: &[crate::schema::SymbolInfo]) -> Vec<&str> {
        list.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_declarations_via_initializers_and_shorthand() {
        let source = r#"
function plain() {}
const arrow = () => 1;
const expr = function () {};
const api = {
  load() { return 1; },
};
class Store {}
"#;
        let s = extract("mod.js", source);
        assert_eq!(names(&s.functions), vec!["plain", "arrow", "expr", "load"]);
        assert_eq!(names(&s.classes), vec!["Store"]);
    }

    #[test]
    fn test_component_heuristic() {
        let source = r#"
export function Button() {
  return <button>ok</button>;
}
function helper() {}
"#;
        let s = extract("Button.jsx", source);
        assert_eq!(names(&s.components), vec!["Button"]);

        let no_markup = extract("Button.js", "export function Button() { return 1; }");
        assert!(no_markup.components.is_empty());
    }

    #[test]
    fn test_esm_exports() {
        let source = r#"
export function foo() { return 1 }
export const a = 1, b = 2;
export default class Widget {}
export { local as renamed };
export interface Shape { x: number }
"#;
        let s = extract("a.ts", source);
        let exports = names(&s.exports);
        for expected in ["foo", "a", "b", "Widget", "renamed", "Shape"] {
            assert!(exports.contains(&expected), "missing export {}", expected);
        }
    }

    #[test]
    fn test_commonjs_exports() {
        let source = r#"
module.exports = {
  handler: function () {},
  create() {},
  VERSION,
};
exports.extra = () => {};
"#;
        let s = extract("legacy.js", source);
        let exports = names(&s.exports);
        assert!(exports.contains(&"handler"));
        assert!(exports.contains(&"create"));
        assert!(exports.contains(&"VERSION"));
        assert!(exports.contains(&"extra"));
        let functions = names(&s.functions);
        assert!(functions.contains(&"handler"));
        assert!(functions.contains(&"extra"));
    }

    #[test]
    fn test_import_inventory_dedup_and_order() {
        let source = r#"
import React, { useState as useS } from "react";
import * as path from "path";
const fs = require("fs");
const again = require("react");
const lazy = import("./lazy");
require(dynamicName);
"#;
        let s = extract("app.js", source);
        assert_eq!(names(&s.imports), vec!["react", "path", "fs", "./lazy"]);

        let react = &s.import_details[0];
        assert_eq!(react.specifiers.len(), 2);
        assert_eq!(react.specifiers[0].kind, SpecifierKind::Default);
        assert_eq!(react.specifiers[1].local, "useS");
        assert_eq!(react.specifiers[1].imported.as_deref(), Some("useState"));
        assert_eq!(s.import_details[1].specifiers[0].kind, SpecifierKind::Namespace);
    }

    #[test]
    fn test_reexport_counts_as_import() {
        let s = extract("index.ts", "export { foo } from './a';\nexport * from './b';\n");
        assert_eq!(names(&s.imports), vec!["./a", "./b"]);
        assert!(names(&s.exports).contains(&"foo"));
    }
}
