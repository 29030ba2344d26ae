//! Source parser adapter
//!
//! Wraps tree-sitter so the rest of the engine sees one of two outcomes: a
//! hard failure as an `EngineError`, or a tree plus a list of recoverable
//! syntax diagnostics. tree-sitter keeps going past syntax errors, so a file
//! with a stray brace still yields a usable partial tree.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tree_sitter::{Node, Parser, Tree};

use crate::error::{EngineError, Result};
use crate::lang::Lang;

const MAX_DIAGNOSTICS: usize = 20;

/// One ERROR or MISSING node in a parsed tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxDiagnostic {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// A successfully parsed file
#[derive(Debug)]
pub struct ParsedSource {
    pub lang: Lang,
    pub tree: Tree,
    pub diagnostics: Vec<SyntaxDiagnostic>,
}

impl ParsedSource {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn has_syntax_errors(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Parse `source` using the grammar selected by `path`'s extension.
pub fn parse_source(path: &str, source: &str, max_bytes: usize) -> Result<ParsedSource> {
    let lang = Lang::from_path(Path::new(path))?;

    if source.len() > max_bytes {
        return Err(EngineError::ParseFailure {
            message: format!(
                "{} is {} bytes, over the {} byte limit",
                path,
                source.len(),
                max_bytes
            ),
        });
    }
    if source.contains('\0') {
        return Err(EngineError::ParseFailure {
            message: format!("{} looks like a binary file", path),
        });
    }

    let mut parser = Parser::new();
    parser
        .set_language(&lang.tree_sitter_language())
        .map_err(|e| EngineError::ParseFailure {
            message: format!("Failed to set language: {:?}", e),
        })?;

    let tree = parser
        .parse(source, None)
        .ok_or_else(|| EngineError::ParseFailure {
            message: format!("Failed to parse {}", path),
        })?;

    let diagnostics = collect_diagnostics(&tree, source);

    Ok(ParsedSource {
        lang,
        tree,
        diagnostics,
    })
}

fn collect_diagnostics(tree: &Tree, source: &str) -> Vec<SyntaxDiagnostic> {
    let root = tree.root_node();
    let mut out = Vec::new();
    if !root.has_error() {
        return out;
    }

    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if out.len() >= MAX_DIAGNOSTICS {
            break;
        }
        if node.is_missing() {
            out.push(SyntaxDiagnostic {
                line: node.start_position().row + 1,
                column: node.start_position().column + 1,
                message: format!("missing {}", node.kind()),
            });
            continue;
        }
        if node.is_error() {
            let text = node.utf8_text(source.as_bytes()).unwrap_or("");
            let preview: String = text.chars().take(40).collect();
            out.push(SyntaxDiagnostic {
                line: node.start_position().row + 1,
                column: node.start_position().column + 1,
                message: format!("unexpected `{}`", preview.replace('\n', " ")),
            });
            continue;
        }
        if !node.has_error() {
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }

    out.sort_by_key(|d| (d.line, d.column));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 1024 * 1024;

    #[test]
    fn test_parse_clean_typescript() {
        let parsed = parse_source("a.ts", "export function foo(): number { return 1 }", LIMIT).unwrap();
        assert_eq!(parsed.lang, Lang::TypeScript);
        assert_eq!(parsed.root().kind(), "program");
        assert!(!parsed.has_syntax_errors());
    }

    #[test]
    fn test_parse_jsx_in_js() {
        let parsed = parse_source("App.jsx", "const App = () => <div>hi</div>;", LIMIT).unwrap();
        assert!(!parsed.has_syntax_errors());
    }

    #[test]
    fn test_syntax_error_is_recoverable() {
        let parsed = parse_source("broken.js", "function ok() {}\nconst = ;\n", LIMIT).unwrap();
        assert!(parsed.has_syntax_errors());
        assert_eq!(parsed.diagnostics[0].line, 2);
    }

    #[test]
    fn test_unsupported_extension_fails() {
        let err = parse_source("notes.txt", "hello", LIMIT).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedLanguage { .. }));
    }

    #[test]
    fn test_oversized_input_fails() {
        let err = parse_source("big.js", "let a = 1;", 4).unwrap_err();
        assert!(matches!(err, EngineError::ParseFailure { .. }));
    }
}
