//! Tree-sitter helpers shared by the detection rules

use tree_sitter::Node;

/// Get the text of a node (empty on invalid UTF-8)
pub fn get_node_text(node: &Node, source: &str) -> String {
    node_text(node, source).to_string()
}

/// Borrowed variant of [`get_node_text`]
pub fn node_text<'s>(node: &Node, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// 1-based first line of a node
pub fn start_line(node: &Node) -> usize {
    node.start_position().row + 1
}

/// 1-based last line of a node
pub fn end_line(node: &Node) -> usize {
    node.end_position().row + 1
}

/// Named children, comments excluded
pub fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

/// All children, including anonymous tokens
pub fn all_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

/// Whether the node has an anonymous child token with the given text
pub fn has_token(node: &Node, token: &str) -> bool {
    all_children(node).iter().any(|c| !c.is_named() && c.kind() == token)
}

/// Pre-order traversal without recursion (deeply nested sources stay off the stack)
pub fn visit_all<'t, F>(node: Node<'t>, mut visitor: F)
where
    F: FnMut(Node<'t>),
{
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        visitor(current);
        let mut children = all_children(&current);
        children.reverse();
        stack.extend(children);
    }
}

/// Pre-order traversal that does not descend below nodes for which `stop` is true
/// (the stopping node itself is still visited)
pub fn visit_until<'t, F, S>(node: Node<'t>, mut visitor: F, stop: S)
where
    F: FnMut(Node<'t>),
    S: Fn(&Node<'t>) -> bool,
{
    let mut stack: Vec<Node<'t>> = all_children(&node);
    stack.reverse();
    while let Some(current) = stack.pop() {
        visitor(current);
        if stop(&current) {
            continue;
        }
        let mut children = all_children(&current);
        children.reverse();
        stack.extend(children);
    }
}

pub fn is_function_like(kind: &str) -> bool {
    matches!(
        kind,
        "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "function"
            | "generator_function"
            | "arrow_function"
            | "method_definition"
    )
}

pub fn is_class_like(kind: &str) -> bool {
    matches!(kind, "class_declaration" | "abstract_class_declaration" | "class")
}

/// Value of a string literal (quotes stripped), or of a template string
/// with no substitutions
pub fn string_literal_value(node: &Node, source: &str) -> Option<String> {
    match node.kind() {
        "string" => {
            let text = node_text(node, source);
            Some(strip_quotes(text).to_string())
        }
        "template_string" => {
            if all_children(node)
                .iter()
                .any(|c| c.kind() == "template_substitution")
            {
                return None;
            }
            let text = node_text(node, source);
            Some(text.trim_matches('`').to_string())
        }
        _ => None,
    }
}

fn strip_quotes(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// Arguments of a call/new expression
pub fn call_arguments<'t>(call: &Node<'t>) -> Vec<Node<'t>> {
    call.child_by_field_name("arguments")
        .map(|args| named_children(&args))
        .unwrap_or_default()
}

/// Callee of a call (`function` field) or constructor of a `new` expression
pub fn callee<'t>(call: &Node<'t>) -> Option<Node<'t>> {
    call.child_by_field_name("function")
        .or_else(|| call.child_by_field_name("constructor"))
}

/// Dotted segments of a callee, looking through intermediate calls:
/// `z.string().min(2)` → `["z", "string", "min"]`
pub fn callee_parts(node: &Node, source: &str) -> Vec<String> {
    match node.kind() {
        "identifier" | "this" | "super" | "property_identifier" => {
            vec![get_node_text(node, source)]
        }
        "member_expression" => {
            let mut parts = node
                .child_by_field_name("object")
                .map(|o| callee_parts(&o, source))
                .unwrap_or_default();
            if let Some(prop) = node.child_by_field_name("property") {
                parts.push(get_node_text(&prop, source));
            }
            parts
        }
        "call_expression" | "new_expression" => callee(node)
            .map(|f| callee_parts(&f, source))
            .unwrap_or_default(),
        "await_expression" | "parenthesized_expression" => named_children(node)
            .first()
            .map(|inner| callee_parts(inner, source))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Property key name of a `pair`/`property_signature`/`method_definition`
pub fn property_key(node: &Node, source: &str) -> Option<String> {
    let key = node
        .child_by_field_name("key")
        .or_else(|| node.child_by_field_name("name"))?;
    Some(match key.kind() {
        "string" => string_literal_value(&key, source)?,
        "computed_property_name" => "<computed>".to_string(),
        _ => get_node_text(&key, source),
    })
}

/// Name of a declaration via its `name` field
pub fn declared_name(node: &Node, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .filter(|n| matches!(n.kind(), "identifier" | "type_identifier" | "property_identifier"))
        .map(|n| get_node_text(&n, source))
}

/// The `pair` value for `key` inside an object literal
pub fn object_property<'t>(object: &Node<'t>, key: &str, source: &str) -> Option<Node<'t>> {
    named_children(object)
        .into_iter()
        .filter(|c| c.kind() == "pair")
        .find(|pair| property_key(pair, source).as_deref() == Some(key))
        .and_then(|pair| pair.child_by_field_name("value"))
}

/// Strip wrapping `await`/parentheses/`as` casts around an expression
pub fn unwrap_expression<'t>(mut node: Node<'t>) -> Node<'t> {
    loop {
        match node.kind() {
            "parenthesized_expression" | "await_expression" | "as_expression"
            | "satisfies_expression" | "non_null_expression" => {
                match named_children(&node).into_iter().next() {
                    Some(inner) => node = inner,
                    None => return node,
                }
            }
            _ => return node,
        }
    }
}
