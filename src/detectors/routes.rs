//! HTTP route idioms
//!
//! Three independent matchers:
//! - router calls: `app.get("/p", h)`, `router.route("/p").post(h)`, with
//!   `parent.use("/base", child)` mounts composed after the walk so mount
//!   order in the file does not matter
//! - decorated controllers: `@Controller("base")` classes with `@Get("sub")` methods
//! - file conventions: verb-named exports, or a default handler that branches
//!   on `req.method`

use std::collections::BTreeSet;

use tree_sitter::Node;

use super::common::{
    call_arguments, callee, declared_name, end_line, get_node_text, is_function_like,
    named_children, node_text, start_line, string_literal_value, unwrap_expression, visit_all,
};
use super::{Collector, RuleResult};
use crate::schema::ApiInfo;

pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS", "HEAD", "ALL"];

pub const FRAMEWORK_EXPRESS: &str = "express";
pub const FRAMEWORK_NEST: &str = "nest";
pub const FRAMEWORK_NEXT: &str = "next";

/// Path used when a router call's path argument is not a literal
const DYNAMIC_PATH: &str = "<dynamic>";

/// Mount chains deeper than this are treated as cycles
const MAX_MOUNT_DEPTH: usize = 8;

/// A router registration awaiting mount composition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRoute {
    pub method: String,
    pub path: String,
    pub start: usize,
    pub end: usize,
    /// Receiver the route was registered on (`router` in `router.get(...)`)
    pub mount_for: Option<String>,
}

/// `parent.use(base, child)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub parent: String,
    pub base: String,
    pub child: String,
}

fn http_verb(name: &str) -> Option<&'static str> {
    let upper = name.to_uppercase();
    HTTP_METHODS.iter().copied().find(|m| *m == upper)
}

/// Join a mount path and a route path.
///
/// `"/"` as a base contributes nothing, runs of slashes collapse, the result
/// always starts with `/` and only the root keeps a trailing slash.
pub fn join_paths(base: &str, part: &str) -> String {
    let joined = format!("/{}/{}", base, part);
    let mut out = String::with_capacity(joined.len());
    for ch in joined.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

// ============================================================================
// Router calls
// ============================================================================

/// `obj.get("/path", handler)` and `obj.route("/path").get(handler)`
pub fn router_call(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(function) = callee(&node) else {
        return Ok(());
    };
    if function.kind() != "member_expression" {
        return Ok(());
    }
    let (Some(object), Some(property)) = (
        function.child_by_field_name("object"),
        function.child_by_field_name("property"),
    ) else {
        return Ok(());
    };
    let Some(method) = http_verb(node_text(&property, c.source)) else {
        return Ok(());
    };
    let (start, end) = (start_line(&node), end_line(&node));

    if let Some((path, mount_for)) = route_chain(&object, c.source) {
        c.add_raw_route(RawRoute {
            method: method.to_string(),
            path,
            start,
            end,
            mount_for,
        });
        return Ok(());
    }

    if !matches!(object.kind(), "identifier" | "member_expression") {
        return Ok(());
    }
    let args = call_arguments(&node);
    // a registration needs a path and at least one handler; `map.get(key)` is not one
    if args.len() < 2 {
        return Ok(());
    }
    let path = match string_literal_value(&args[0], c.source) {
        Some(path) => path,
        None if args[1..].iter().any(|a| is_handler(a)) => DYNAMIC_PATH.to_string(),
        None => return Ok(()),
    };
    c.add_raw_route(RawRoute {
        method: method.to_string(),
        path,
        start,
        end,
        mount_for: Some(get_node_text(&object, c.source)),
    });
    Ok(())
}

fn is_handler(node: &Node) -> bool {
    is_function_like(node.kind()) || matches!(node.kind(), "identifier" | "member_expression")
}

/// Walk `x.route("/p").get(h).post(h)` back to the `.route(...)` call
fn route_chain(object: &Node, source: &str) -> Option<(String, Option<String>)> {
    let mut current = *object;
    loop {
        if current.kind() != "call_expression" {
            return None;
        }
        let function = callee(&current)?;
        if function.kind() != "member_expression" {
            return None;
        }
        let receiver = function.child_by_field_name("object")?;
        let property = function.child_by_field_name("property")?;
        if node_text(&property, source) == "route" {
            let path = call_arguments(&current)
                .first()
                .and_then(|a| string_literal_value(a, source))
                .unwrap_or_else(|| DYNAMIC_PATH.to_string());
            let mount_for = matches!(receiver.kind(), "identifier" | "member_expression")
                .then(|| get_node_text(&receiver, source));
            return Some((path, mount_for));
        }
        current = receiver;
    }
}

/// `parent.use("/base", child)`
pub fn router_mount(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(function) = callee(&node) else {
        return Ok(());
    };
    if function.kind() != "member_expression" {
        return Ok(());
    }
    let (Some(object), Some(property)) = (
        function.child_by_field_name("object"),
        function.child_by_field_name("property"),
    ) else {
        return Ok(());
    };
    if node_text(&property, c.source) != "use" {
        return Ok(());
    }
    let args = call_arguments(&node);
    let Some(base) = args.first().and_then(|a| string_literal_value(a, c.source)) else {
        return Ok(());
    };
    let parent = get_node_text(&object, c.source);
    for arg in &args[1..] {
        if matches!(arg.kind(), "identifier" | "member_expression") {
            c.add_mount(Mount {
                parent: parent.clone(),
                base: base.clone(),
                child: get_node_text(arg, c.source),
            });
        }
    }
    Ok(())
}

/// Every full prefix a receiver is reachable under; empty when it is not mounted
fn mount_prefixes(name: &str, mounts: &[Mount], depth: usize) -> Vec<String> {
    if depth >= MAX_MOUNT_DEPTH {
        return Vec::new();
    }
    let mut prefixes = Vec::new();
    for mount in mounts.iter().filter(|m| m.child == name) {
        let parents = mount_prefixes(&mount.parent, mounts, depth + 1);
        if parents.is_empty() {
            prefixes.push(join_paths("/", &mount.base));
        } else {
            prefixes.extend(parents.iter().map(|p| join_paths(p, &mount.base)));
        }
    }
    prefixes
}

/// Resolve raw router routes against the file's mount table
pub fn compose_routes(raw: &[RawRoute], mounts: &[Mount]) -> Vec<ApiInfo> {
    let mut out = Vec::new();
    for route in raw {
        let prefixes = route
            .mount_for
            .as_deref()
            .map(|name| mount_prefixes(name, mounts, 0))
            .unwrap_or_default();
        let paths: BTreeSet<String> = if prefixes.is_empty() {
            [route.path.clone()].into_iter().collect()
        } else {
            prefixes.iter().map(|p| join_paths(p, &route.path)).collect()
        };
        for path in paths {
            out.push(ApiInfo {
                method: route.method.clone(),
                path,
                start: route.start,
                end: route.end,
                framework: FRAMEWORK_EXPRESS.to_string(),
                controller: None,
            });
        }
    }
    out
}

// ============================================================================
// Decorated controllers
// ============================================================================

/// Decorator name (last dotted segment) and its call arguments
fn decorator_name_and_args<'t>(decorator: &Node<'t>, source: &str) -> Option<(String, Vec<Node<'t>>)> {
    let inner = named_children(decorator).into_iter().next()?;
    match inner.kind() {
        "call_expression" => {
            let function = callee(&inner)?;
            let text = node_text(&function, source);
            let name = text.rsplit('.').next().unwrap_or(text).to_string();
            Some((name, call_arguments(&inner)))
        }
        "identifier" => Some((get_node_text(&inner, source), Vec::new())),
        "member_expression" => inner
            .child_by_field_name("property")
            .map(|p| (get_node_text(&p, source), Vec::new())),
        _ => None,
    }
}

fn decorators_of<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "decorator")
        .collect()
}

/// `@Controller("users") class C { @Get(":id") find() {} }`
pub fn controller_routes(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(class_name) = declared_name(&node, c.source) else {
        return Ok(());
    };
    let Some(body) = node.child_by_field_name("body") else {
        return Ok(());
    };

    // decorators sit on the class, or on the wrapping `export` statement
    let mut class_decorators = decorators_of(&node);
    if let Some(parent) = node.parent().filter(|p| p.kind() == "export_statement") {
        class_decorators.extend(decorators_of(&parent));
    }
    let base = class_decorators
        .iter()
        .filter_map(|d| decorator_name_and_args(d, c.source))
        .find(|(name, _)| name == "Controller")
        .and_then(|(_, args)| args.first().and_then(|a| string_literal_value(a, c.source)))
        .unwrap_or_else(|| "/".to_string());

    // method decorators precede the method inside the class body in the TS
    // grammar, and are children of the method in the JS grammar
    let mut pending: Vec<Node> = Vec::new();
    for member in named_children(&body) {
        match member.kind() {
            "decorator" => pending.push(member),
            "method_definition" => {
                let mut decorators = std::mem::take(&mut pending);
                decorators.extend(decorators_of(&member));
                for decorator in &decorators {
                    let Some((name, args)) = decorator_name_and_args(decorator, c.source) else {
                        continue;
                    };
                    let Some(method) = http_verb(&name) else {
                        continue;
                    };
                    let sub = args
                        .first()
                        .and_then(|a| string_literal_value(a, c.source))
                        .unwrap_or_default();
                    c.add_api(ApiInfo {
                        method: method.to_string(),
                        path: join_paths(&base, &sub),
                        start: start_line(&member),
                        end: end_line(&member),
                        framework: FRAMEWORK_NEST.to_string(),
                        controller: Some(class_name.clone()),
                    });
                }
            }
            _ => pending.clear(),
        }
    }
    Ok(())
}

// ============================================================================
// File-convention handlers
// ============================================================================

/// Verb-named exports and request-method dispatching default handlers in
/// API-route files
pub fn convention_routes(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    if !c.api_route_file {
        return Ok(());
    }
    let is_default = super::common::has_token(&node, "default");

    if let Some(decl) = node.child_by_field_name("declaration") {
        if is_default && is_function_like(decl.kind()) {
            default_handler(c, decl);
            return Ok(());
        }
        match decl.kind() {
            "function_declaration" | "generator_function_declaration" => {
                if let Some(name) = declared_name(&decl, c.source) {
                    add_verb_route(c, &name, &decl);
                }
            }
            "lexical_declaration" | "variable_declaration" => {
                for declarator in named_children(&decl) {
                    let name = declarator
                        .child_by_field_name("name")
                        .filter(|n| n.kind() == "identifier")
                        .map(|n| get_node_text(&n, c.source));
                    let value = declarator.child_by_field_name("value").map(unwrap_expression);
                    if let (Some(name), Some(value)) = (name, value) {
                        if is_function_like(value.kind()) {
                            add_verb_route(c, &name, &declarator);
                        }
                    }
                }
            }
            _ => {}
        }
        return Ok(());
    }

    if let Some(value) = node.child_by_field_name("value") {
        let value = unwrap_expression(value);
        if is_function_like(value.kind()) {
            default_handler(c, value);
        } else if value.kind() == "identifier" {
            let name = get_node_text(&value, c.source);
            match find_top_level_function(&node, &name, c.source) {
                Some(handler) => default_handler(c, handler),
                None => add_route(c, "ALL", &node),
            }
        }
        return Ok(());
    }

    // export { handler as GET }
    for clause in named_children(&node) {
        if clause.kind() != "export_clause" {
            continue;
        }
        for spec in named_children(&clause) {
            if let Some(alias) = spec
                .child_by_field_name("alias")
                .or_else(|| spec.child_by_field_name("name"))
            {
                add_verb_route(c, node_text(&alias, c.source), &node);
            }
        }
    }
    Ok(())
}

fn add_verb_route(c: &mut Collector<'_>, name: &str, span: &Node) {
    if let Some(method) = http_verb(name).filter(|_| name.chars().all(|ch| ch.is_ascii_uppercase())) {
        add_route(c, method, span);
    }
}

fn add_route(c: &mut Collector<'_>, method: &str, span: &Node) {
    c.add_api(ApiInfo {
        method: method.to_string(),
        path: "/".to_string(),
        start: start_line(span),
        end: end_line(span),
        framework: FRAMEWORK_NEXT.to_string(),
        controller: None,
    });
}

fn default_handler(c: &mut Collector<'_>, handler: Node<'_>) {
    let methods = request_methods(&handler, c.source);
    if methods.is_empty() {
        add_route(c, "ALL", &handler);
        return;
    }
    for method in methods {
        add_route(c, &method, &handler);
    }
}

/// Locate `function name` or `const name = () => ...` at the top of the file
fn find_top_level_function<'t>(from: &Node<'t>, name: &str, source: &str) -> Option<Node<'t>> {
    let mut program = *from;
    while let Some(parent) = program.parent() {
        program = parent;
    }
    for stmt in named_children(&program) {
        match stmt.kind() {
            "function_declaration" if declared_name(&stmt, source).as_deref() == Some(name) => {
                return Some(stmt);
            }
            "lexical_declaration" | "variable_declaration" => {
                for declarator in named_children(&stmt) {
                    let matches_name = declarator
                        .child_by_field_name("name")
                        .is_some_and(|n| node_text(&n, source) == name);
                    let value = declarator.child_by_field_name("value").map(unwrap_expression);
                    if let Some(value) = value.filter(|v| matches_name && is_function_like(v.kind())) {
                        return Some(value);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// `req.method` exactly; other spellings are not recognized
fn is_request_method(node: &Node, source: &str) -> bool {
    let node = unwrap_expression(*node);
    if node.kind() != "member_expression" {
        return false;
    }
    let object = node.child_by_field_name("object");
    let property = node.child_by_field_name("property");
    matches!(
        (object, property),
        (Some(o), Some(p)) if node_text(&o, source) == "req" && node_text(&p, source) == "method"
    )
}

/// Methods a handler compares `req.method` against, via `===`/`==` or a
/// `switch (req.method)`, in first-seen order
fn request_methods(handler: &Node, source: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |value: Option<String>| {
        if let Some(method) = value.as_deref().and_then(http_verb) {
            if !found.iter().any(|m| m == method) {
                found.push(method.to_string());
            }
        }
    };

    visit_all(*handler, |node| match node.kind() {
        "binary_expression" => {
            let operator = node
                .child_by_field_name("operator")
                .map(|o| node_text(&o, source).to_string())
                .unwrap_or_default();
            if operator != "===" && operator != "==" {
                return;
            }
            let (Some(left), Some(right)) = (
                node.child_by_field_name("left"),
                node.child_by_field_name("right"),
            ) else {
                return;
            };
            if is_request_method(&left, source) {
                push(string_literal_value(&right, source));
            } else if is_request_method(&right, source) {
                push(string_literal_value(&left, source));
            }
        }
        "switch_statement" => {
            let on_method = node
                .child_by_field_name("value")
                .is_some_and(|v| is_request_method(&v, source));
            if !on_method {
                return;
            }
            if let Some(body) = node.child_by_field_name("body") {
                for case in named_children(&body) {
                    if case.kind() == "switch_case" {
                        push(
                            case.child_by_field_name("value")
                                .and_then(|v| string_literal_value(&v, source)),
                        );
                    }
                }
            }
        }
        _ => {}
    });
    found
}
