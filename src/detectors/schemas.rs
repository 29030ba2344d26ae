//! Schema and shape idioms
//!
//! - ODM constructors: `new Schema({...}, {timestamps: true})`, `mongoose.model("N", new Schema(...))`
//! - validation builders: chains rooted at `z`/`zod`/`yup`/`Yup`/`y` reaching `object({...})`
//! - typed shapes: interfaces and object-literal type aliases

use tree_sitter::Node;

use super::common::{
    call_arguments, callee, declared_name, end_line, get_node_text, has_token, named_children,
    node_text, object_property, property_key, start_line, string_literal_value, unwrap_expression,
};
use super::{Collector, RuleResult};
use crate::schema::{SchemaField, SchemaInfo};

pub const FRAMEWORK_MONGOOSE: &str = "mongoose";
pub const FRAMEWORK_ZOD: &str = "zod";
pub const FRAMEWORK_YUP: &str = "yup";
pub const FRAMEWORK_TS: &str = "ts";

/// Identifiers that root a validation-builder chain
const BUILDER_ALIASES: &[&str] = &["z", "zod", "yup", "Yup", "y"];

const TIMESTAMP_FIELDS: [&str; 2] = ["createdAt", "updatedAt"];

// ============================================================================
// ODM schemas
// ============================================================================

/// `Schema` or `mongoose.Schema` as a constructor/callee
fn is_schema_ctor(node: &Node, source: &str) -> bool {
    if !matches!(node.kind(), "new_expression" | "call_expression") {
        return false;
    }
    let Some(function) = callee(node) else {
        return false;
    };
    match function.kind() {
        "identifier" => node_text(&function, source) == "Schema",
        "member_expression" => {
            let object = function.child_by_field_name("object");
            let property = function.child_by_field_name("property");
            matches!(
                (object, property),
                (Some(o), Some(p)) if node_text(&o, source) == "mongoose" && node_text(&p, source) == "Schema"
            )
        }
        _ => false,
    }
}

/// `{timestamps: true}` or `{timestamps: {...}}`
fn options_have_timestamps(options: Option<&Node>, source: &str) -> bool {
    let Some(options) = options.filter(|o| o.kind() == "object") else {
        return false;
    };
    match object_property(options, "timestamps", source) {
        Some(value) => match value.kind() {
            "true" => true,
            "object" => true,
            _ => false,
        },
        None => false,
    }
}

/// Fields of a schema constructor call, with timestamp fields synthesized
/// when the options ask for them
fn odm_fields(ctor: &Node, source: &str) -> Option<Vec<SchemaField>> {
    let args = call_arguments(ctor);
    let definition = args.first().filter(|a| a.kind() == "object")?;
    let mut fields = extract_object_fields(definition, source);
    if options_have_timestamps(args.get(1), source) {
        for name in TIMESTAMP_FIELDS {
            if !fields.iter().any(|f| f.name == name) {
                fields.push(SchemaField {
                    raw: Some("timestamps".to_string()),
                    auto: true,
                    ..SchemaField::new(name, "Date")
                });
            }
        }
    }
    Some(fields)
}

/// `const UserSchema = new Schema({...})`
pub fn odm_schema_declarator(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(value) = node.child_by_field_name("value").map(unwrap_expression) else {
        return Ok(());
    };
    if !is_schema_ctor(&value, c.source) {
        return Ok(());
    }
    let Some(fields) = odm_fields(&value, c.source) else {
        return Ok(());
    };
    let name = declared_name(&node, c.source).unwrap_or_else(|| "AnonymousSchema".to_string());
    c.add_schema(SchemaInfo {
        name,
        framework: FRAMEWORK_MONGOOSE.to_string(),
        start: start_line(&node),
        end: end_line(&node),
        fields,
    });
    Ok(())
}

/// `mongoose.model("User", new Schema({...}))`
pub fn odm_model_call(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(function) = callee(&node) else {
        return Ok(());
    };
    if function.kind() != "member_expression" {
        return Ok(());
    }
    let is_model = function
        .child_by_field_name("property")
        .is_some_and(|p| node_text(&p, c.source) == "model");
    if !is_model {
        return Ok(());
    }
    let args = call_arguments(&node);
    let Some(schema) = args.get(1).map(|a| unwrap_expression(*a)) else {
        return Ok(());
    };
    if schema.kind() != "new_expression" || !is_schema_ctor(&schema, c.source) {
        return Ok(());
    }
    let Some(fields) = odm_fields(&schema, c.source) else {
        return Ok(());
    };
    let start = start_line(&node);
    let name = args
        .first()
        .and_then(|a| string_literal_value(a, c.source))
        .unwrap_or_else(|| format!("model@{}", start));
    c.add_schema(SchemaInfo {
        name,
        framework: FRAMEWORK_MONGOOSE.to_string(),
        start,
        end: end_line(&node),
        fields,
    });
    Ok(())
}

// ============================================================================
// Validation builders
// ============================================================================

/// A method chain rooted at a builder alias, innermost call first:
/// `z.string().min(2)` → alias `z`, calls `[string, min]`
struct BuilderChain<'t> {
    alias: String,
    calls: Vec<(String, Node<'t>)>,
}

impl<'t> BuilderChain<'t> {
    fn parse(node: Node<'t>, source: &str) -> Option<Self> {
        let mut calls = Vec::new();
        let mut current = unwrap_expression(node);
        loop {
            if current.kind() != "call_expression" {
                return None;
            }
            let function = callee(&current)?;
            if function.kind() != "member_expression" {
                return None;
            }
            let object = function.child_by_field_name("object")?;
            let property = function.child_by_field_name("property")?;
            calls.push((get_node_text(&property, source), current));
            if object.kind() == "identifier" {
                let alias = node_text(&object, source);
                if !BUILDER_ALIASES.contains(&alias) {
                    return None;
                }
                calls.reverse();
                return Some(Self {
                    alias: alias.to_string(),
                    calls,
                });
            }
            current = object;
        }
    }

    /// The builder method called on the alias (`string` in `z.string().min(2)`)
    fn method(&self) -> &str {
        self.calls.first().map(|(m, _)| m.as_str()).unwrap_or("")
    }

    fn first_arg_of(&self, method: &str) -> Option<Node<'t>> {
        self.calls
            .iter()
            .find(|(m, _)| m == method)
            .and_then(|(_, call)| call_arguments(call).into_iter().next())
    }

    fn framework(&self) -> &'static str {
        if matches!(self.alias.as_str(), "z" | "zod") {
            FRAMEWORK_ZOD
        } else {
            FRAMEWORK_YUP
        }
    }

    /// Object literal describing an `object` chain: `object({...})` or `object().shape({...})`
    fn object_literal(&self) -> Option<Node<'t>> {
        if self.method() != "object" {
            return None;
        }
        self.first_arg_of("shape")
            .filter(|a| a.kind() == "object")
            .or_else(|| self.first_arg_of("object").filter(|a| a.kind() == "object"))
    }
}

/// Type (and nested fields) described by a builder chain
fn builder_shape(chain: &BuilderChain<'_>, source: &str) -> (String, Option<Vec<SchemaField>>) {
    match chain.method() {
        "array" => {
            let element = chain
                .first_arg_of("of")
                .or_else(|| chain.first_arg_of("array"));
            match element {
                None => ("array<any>".to_string(), None),
                Some(el) if el.kind() == "object" => {
                    ("array<object>".to_string(), Some(extract_object_fields(&el, source)))
                }
                Some(el) => {
                    let nested = BuilderChain::parse(el, source)
                        .and_then(|inner| inner.object_literal());
                    match nested {
                        Some(obj) => (
                            "array<object>".to_string(),
                            Some(extract_object_fields(&obj, source)),
                        ),
                        None => (format!("array<{}>", simplify_type_name(&type_of(&el, source))), None),
                    }
                }
            }
        }
        "object" => match chain.object_literal() {
            Some(obj) => ("object".to_string(), Some(extract_object_fields(&obj, source))),
            None => ("object".to_string(), None),
        },
        "date" => ("Date".to_string(), None),
        "" => ("any".to_string(), None),
        other => (other.to_string(), None),
    }
}

/// `const UserSchema = z.object({...})`, also through trailing modifiers
/// and `yup.object().shape({...})`
pub fn builder_schema_declarator(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(value) = node.child_by_field_name("value") else {
        return Ok(());
    };
    let Some(chain) = BuilderChain::parse(value, c.source) else {
        return Ok(());
    };
    let Some(object) = chain.object_literal() else {
        return Ok(());
    };
    let framework = chain.framework();
    let start = start_line(&value);
    let name = declared_name(&node, c.source).unwrap_or_else(|| format!("{}.object@{}", framework, start));
    c.add_schema(SchemaInfo {
        name,
        framework: framework.to_string(),
        start,
        end: end_line(&value),
        fields: extract_object_fields(&object, c.source),
    });
    Ok(())
}

// ============================================================================
// Object-literal field shapes
// ============================================================================

/// Simplify a builder or dotted type name:
/// `z.string` → `string`, `Schema.Types.ObjectId()` → `ObjectId`,
/// `array<z.number>` → `array<number>`
pub fn simplify_type_name(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return "any".to_string();
    }
    let s = s.strip_suffix("()").unwrap_or(s);

    if let Some(inner) = s.strip_prefix("array<").and_then(|r| r.strip_suffix('>')) {
        return format!("array<{}>", simplify_type_name(inner));
    }

    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() >= 2 {
        let root = parts[0].to_lowercase();
        if matches!(root.as_str(), "z" | "zod" | "yup" | "y") {
            return parts[1].to_string();
        }
        return parts[parts.len() - 1].to_string();
    }
    s.to_string()
}

/// Best-effort type name of a value expression
pub fn type_of(node: &Node, source: &str) -> String {
    let node = unwrap_expression(*node);
    match node.kind() {
        "identifier" => get_node_text(&node, source),
        "string" | "template_string" => "string".to_string(),
        "number" => "number".to_string(),
        "true" | "false" => "boolean".to_string(),
        "array" => "array".to_string(),
        "object" => "object".to_string(),
        "member_expression" => node_text(&node, source)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect(),
        "call_expression" | "new_expression" => {
            if let Some(chain) = BuilderChain::parse(node, source) {
                return builder_shape(&chain, source).0;
            }
            match callee(&node) {
                Some(f) if matches!(f.kind(), "identifier" | "member_expression") => {
                    simplify_type_name(&format!("{}()", node_text(&f, source)))
                }
                _ => "call".to_string(),
            }
        }
        other => other.to_string(),
    }
}

/// `{ key: value, ... }` summary of an options object
fn object_to_text(object: &Node, source: &str) -> String {
    let parts: Vec<String> = named_children(object)
        .iter()
        .filter(|p| p.kind() == "pair")
        .map(|pair| {
            let key = property_key(pair, source).unwrap_or_else(|| "k".to_string());
            let value = match pair.child_by_field_name("value") {
                Some(v) => match v.kind() {
                    "identifier" => get_node_text(&v, source),
                    "string" => string_literal_value(&v, source).unwrap_or_default(),
                    "array" => "[]".to_string(),
                    "object" => "{...}".to_string(),
                    other => other.to_string(),
                },
                None => String::new(),
            };
            format!("{}: {}", key, value)
        })
        .collect();
    format!("{{ {} }}", parts.join(", "))
}

/// Array-literal field: `[String]`, `[{ ... }]`, `[]`
fn array_field(field: &mut SchemaField, array: &Node, source: &str) {
    match named_children(array).into_iter().next() {
        None => field.field_type = "array<any>".to_string(),
        Some(el) if el.kind() == "object" => {
            field.field_type = "array<object>".to_string();
            field.children = Some(extract_object_fields(&el, source));
            field.raw = Some(object_to_text(&el, source));
        }
        Some(el) => {
            field.field_type = format!("array<{}>", type_of(&el, source));
            field.raw = Some(el.kind().to_string());
        }
    }
}

/// One SchemaField per property of an object literal; methods and spreads are skipped
pub fn extract_object_fields(object: &Node, source: &str) -> Vec<SchemaField> {
    let mut fields = Vec::new();
    for prop in named_children(object) {
        let (name, value) = match prop.kind() {
            "pair" => (
                property_key(&prop, source).unwrap_or_else(|| "<computed>".to_string()),
                prop.child_by_field_name("value"),
            ),
            "shorthand_property_identifier" => {
                let name = get_node_text(&prop, source);
                fields.push(SchemaField::new(name.clone(), name));
                continue;
            }
            _ => continue,
        };
        let mut field = SchemaField::new(name, "any");
        let Some(value) = value.map(unwrap_expression) else {
            fields.push(field);
            continue;
        };

        match value.kind() {
            "object" => match object_property(&value, "type", source) {
                Some(declared) if declared.kind() == "array" => {
                    array_field(&mut field, &declared, source);
                    if field.children.is_none() {
                        field.raw = Some(object_to_text(&value, source));
                    }
                }
                Some(declared) if declared.kind() == "object" => {
                    field.field_type = "object".to_string();
                    field.children = Some(extract_object_fields(&declared, source));
                    field.raw = Some(object_to_text(&declared, source));
                }
                Some(declared) => {
                    field.field_type = type_of(&declared, source);
                    field.raw = Some(object_to_text(&value, source));
                }
                None => {
                    field.field_type = "object".to_string();
                    field.children = Some(extract_object_fields(&value, source));
                    field.raw = Some(object_to_text(&value, source));
                }
            },
            "array" => array_field(&mut field, &value, source),
            "call_expression" | "new_expression" => {
                match BuilderChain::parse(value, source) {
                    Some(chain) => {
                        let (field_type, children) = builder_shape(&chain, source);
                        field.field_type = field_type;
                        field.children = children;
                    }
                    None => field.field_type = type_of(&value, source),
                }
                field.raw = Some("call".to_string());
            }
            "identifier" | "member_expression" => field.field_type = type_of(&value, source),
            _ => {}
        }
        fields.push(field);
    }
    fields
}

// ============================================================================
// Typed shapes
// ============================================================================

/// Type name and nested fields of a type annotation
pub fn ts_type_of(node: &Node, source: &str) -> (String, Option<Vec<SchemaField>>) {
    match node.kind() {
        "type_identifier" | "predefined_type" | "nested_type_identifier" => {
            (get_node_text(node, source), None)
        }
        "generic_type" => {
            let name = node
                .child_by_field_name("name")
                .map(|n| get_node_text(&n, source))
                .unwrap_or_else(|| "type".to_string());
            let argument = node
                .child_by_field_name("type_arguments")
                .and_then(|args| named_children(&args).into_iter().next());
            match argument {
                Some(arg) if name == "Array" => array_of(&arg, source),
                _ => (name, None),
            }
        }
        "object_type" => ("object".to_string(), Some(ts_members(node, source))),
        "array_type" => match named_children(node).into_iter().next() {
            Some(el) => array_of(&el, source),
            None => ("array<any>".to_string(), None),
        },
        "union_type" => {
            let mut parts = Vec::new();
            collect_union(node, source, &mut parts);
            (parts.join("|"), None)
        }
        "literal_type" => match named_children(node).into_iter().next() {
            Some(lit) if lit.kind() == "string" => (
                format!("\"{}\"", string_literal_value(&lit, source).unwrap_or_default()),
                None,
            ),
            Some(lit) => (get_node_text(&lit, source), None),
            None => ("literal".to_string(), None),
        },
        "parenthesized_type" => match named_children(node).into_iter().next() {
            Some(inner) => ts_type_of(&inner, source),
            None => ("any".to_string(), None),
        },
        "function_type" => ("function".to_string(), None),
        _ => (get_node_text(node, source), None),
    }
}

fn array_of(element: &Node, source: &str) -> (String, Option<Vec<SchemaField>>) {
    match ts_type_of(element, source) {
        (t, Some(children)) if t == "object" => ("array<object>".to_string(), Some(children)),
        (t, _) => (format!("array<{}>", t), None),
    }
}

fn collect_union(node: &Node, source: &str, out: &mut Vec<String>) {
    for member in named_children(node) {
        if member.kind() == "union_type" {
            collect_union(&member, source, out);
        } else {
            out.push(ts_type_of(&member, source).0);
        }
    }
}

/// Property signatures of an interface body or object type; optional names get a `?`
pub fn ts_members(body: &Node, source: &str) -> Vec<SchemaField> {
    let mut fields = Vec::new();
    for member in named_children(body) {
        match member.kind() {
            "property_signature" => {
                let key = property_key(&member, source).unwrap_or_else(|| "unknown".to_string());
                let name = if has_token(&member, "?") {
                    format!("{}?", key)
                } else {
                    key
                };
                let annotation = member
                    .child_by_field_name("type")
                    .and_then(|ann| named_children(&ann).into_iter().next());
                let (field_type, children) = match annotation {
                    Some(t) => ts_type_of(&t, source),
                    None => ("any".to_string(), None),
                };
                fields.push(SchemaField {
                    children,
                    ..SchemaField::new(name, field_type)
                });
            }
            "method_signature" => {
                if let Some(key) = property_key(&member, source) {
                    fields.push(SchemaField::new(key, "function"));
                }
            }
            _ => {}
        }
    }
    fields
}

/// `interface User { ... }`
pub fn interface_schema(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(name) = declared_name(&node, c.source) else {
        return Ok(());
    };
    let fields = node
        .child_by_field_name("body")
        .map(|body| ts_members(&body, c.source))
        .unwrap_or_default();
    c.add_schema(SchemaInfo {
        name,
        framework: FRAMEWORK_TS.to_string(),
        start: start_line(&node),
        end: end_line(&node),
        fields,
    });
    Ok(())
}

/// `type User = { ... }`; aliases of other types are not shapes
pub fn type_alias_schema(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(name) = declared_name(&node, c.source) else {
        return Ok(());
    };
    let Some(value) = node.child_by_field_name("value").filter(|v| v.kind() == "object_type") else {
        return Ok(());
    };
    c.add_schema(SchemaInfo {
        name,
        framework: FRAMEWORK_TS.to_string(),
        start: start_line(&node),
        end: end_line(&node),
        fields: ts_members(&value, c.source),
    });
    Ok(())
}
