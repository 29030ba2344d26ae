//! Foldable block ranges for editors

use tree_sitter::Node;

use super::common::{
    callee_parts, declared_name, end_line, get_node_text, named_children, property_key,
    start_line,
};
use super::{Collector, RuleResult};

fn add_span(c: &mut Collector<'_>, label: &str, node: &Node) {
    c.add_block(label, start_line(node), end_line(node));
}

/// Control structures, bare blocks, object/type literals, JSX and returns
pub fn lexical_block(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    match node.kind() {
        "if_statement" => {
            if let Some(consequence) = node.child_by_field_name("consequence") {
                add_span(c, "if", &consequence);
            }
            if let Some(alternative) = node.child_by_field_name("alternative") {
                // `else if` gets its own `if` block when visited
                let chained_if = named_children(&alternative)
                    .first()
                    .is_some_and(|s| s.kind() == "if_statement");
                if !chained_if {
                    add_span(c, "else", &alternative);
                }
            }
        }
        "for_statement" | "for_in_statement" => {
            add_span(c, "for", &node.child_by_field_name("body").unwrap_or(node));
        }
        "while_statement" | "do_statement" => {
            add_span(c, "while", &node.child_by_field_name("body").unwrap_or(node));
        }
        "switch_statement" => {
            add_span(c, "switch", &node.child_by_field_name("body").unwrap_or(node));
        }
        "try_statement" => {
            if let Some(body) = node.child_by_field_name("body") {
                add_span(c, "try", &body);
            }
            if let Some(finalizer) = node.child_by_field_name("finalizer") {
                add_span(c, "finally", &finalizer);
            }
        }
        "catch_clause" => {
            add_span(c, "catch", &node.child_by_field_name("body").unwrap_or(node));
        }
        "statement_block" => {
            let bare = node
                .parent()
                .is_some_and(|p| matches!(p.kind(), "program" | "statement_block" | "switch_case" | "switch_default"));
            if bare {
                add_span(c, "{block}", &node);
            }
        }
        "object" => add_span(c, "{object}", &node),
        "object_type" => {
            let owned = node
                .parent()
                .is_some_and(|p| p.kind() == "interface_declaration");
            if !owned {
                add_span(c, "type", &node);
            }
        }
        "jsx_element" => {
            let tag = node
                .child_by_field_name("open_tag")
                .and_then(|open| open.child_by_field_name("name"))
                .map(|name| format!("<{}>", get_node_text(&name, c.source)))
                .unwrap_or_else(|| "<JSX>".to_string());
            add_span(c, &tag, &node);
        }
        "ambient_declaration" => add_span(c, "declare", &node),
        "return_statement" => add_span(c, "return", &node),
        _ => {}
    }
    Ok(())
}

/// Function and method bodies, labelled by the best available name
pub fn function_block(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(body) = node.child_by_field_name("body") else {
        return Ok(());
    };
    if body.kind() != "statement_block" {
        return Ok(());
    }
    let label = function_label(&node, c.source);
    add_span(c, &label, &body);
    Ok(())
}

fn function_label(node: &Node, source: &str) -> String {
    if node.kind() == "method_definition" {
        if let Some(name) = property_key(node, source) {
            return name;
        }
    }
    if let Some(name) = declared_name(node, source) {
        return name;
    }

    let Some(parent) = node.parent() else {
        return "arrow-fn".to_string();
    };
    match parent.kind() {
        "variable_declarator" => parent
            .child_by_field_name("name")
            .map(|n| get_node_text(&n, source))
            .unwrap_or_else(|| "arrow-fn".to_string()),
        "pair" => property_key(&parent, source).unwrap_or_else(|| "arrow-fn".to_string()),
        // callback passed to a call: label with the callee, e.g. `app.get`, `useEffect`
        "arguments" => parent
            .parent()
            .map(|call| callee_parts(&call, source))
            .filter(|parts| !parts.is_empty())
            .map(|parts| parts.join("."))
            .unwrap_or_else(|| "arrow-fn".to_string()),
        _ if node.kind() == "arrow_function" => "arrow-fn".to_string(),
        _ => "function".to_string(),
    }
}

/// Class bodies labelled with the class name
pub fn class_block(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    if let (Some(name), Some(body)) = (declared_name(&node, c.source), node.child_by_field_name("body")) {
        add_span(c, &name, &body);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::detectors::extract_structure;

    fn blocks(path: &str, source: &str) -> Vec<(String, usize, Option<usize>)> {
        extract_structure(path, source, 1 << 20)
            .blocks
            .into_iter()
            .map(|b| (b.name, b.start, b.end))
            .collect()
    }

    #[test]
    fn test_control_structure_labels() {
        let source = r#"function run(items) {
  for (const item of items) {
    process(item);
  }
  while (busy) {
    wait();
  }
  try {
    risky();
  } catch (err) {
    report(err);
  } finally {
    done();
  }
  switch (mode) {
    case 1:
      break;
  }
}
"#;
        let labels: Vec<String> = blocks("run.js", source).into_iter().map(|b| b.0).collect();
        for expected in ["run", "for", "while", "try", "catch", "finally", "switch"] {
            assert!(labels.iter().any(|l| l == expected), "missing {} in {:?}", expected, labels);
        }
    }

    #[test]
    fn test_callback_label_uses_callee() {
        let source = "useEffect(() => {\n  subscribe();\n}, []);\n";
        let labels: Vec<String> = blocks("hook.js", source).into_iter().map(|b| b.0).collect();
        assert_eq!(labels, vec!["useEffect"]);
    }

    #[test]
    fn test_jsx_tag_label() {
        let source = "const view = (\n  <Layout>\n    <Header />\n  </Layout>\n);\n";
        let labels: Vec<String> = blocks("view.jsx", source).into_iter().map(|b| b.0).collect();
        assert!(labels.contains(&"<Layout>".to_string()));
    }

    #[test]
    fn test_duplicate_spans_suppressed() {
        let source = "if (a) {\n  x();\n}\n";
        let found = blocks("x.js", source);
        assert_eq!(found.iter().filter(|b| b.0 == "if").count(), 1);
        assert!(!found.iter().any(|b| b.0 == "{block}"));
    }
}
