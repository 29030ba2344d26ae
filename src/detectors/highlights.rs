//! TODO/FIXME/NOTE comments

use once_cell::sync::Lazy;
use regex::Regex;
use tree_sitter::Node;

use super::common::{node_text, start_line};
use super::{Collector, RuleResult};
use crate::schema::HighlightInfo;

static MARKER: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\b(TODO|FIXME|NOTE)\b[:\s]*(.*)").ok());

/// Strip comment punctuation from one line of a line or block comment
fn comment_body(line: &str) -> &str {
    let line = line.trim();
    let line = line
        .strip_prefix("//")
        .or_else(|| line.strip_prefix("/*"))
        .unwrap_or(line);
    let line = line.strip_suffix("*/").unwrap_or(line);
    line.trim_start_matches('*').trim()
}

pub fn comment(c: &mut Collector<'_>, node: Node<'_>) -> RuleResult {
    let Some(re) = MARKER.as_ref() else {
        return Ok(());
    };
    let first_line = start_line(&node);
    for (offset, line) in node_text(&node, c.source).lines().enumerate() {
        let body = comment_body(line);
        let Some(caps) = re.captures(body) else {
            continue;
        };
        let info = HighlightInfo {
            line: first_line + offset,
            text: caps.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
        };
        let highlights = c.highlights_mut();
        match caps.get(1).map(|m| m.as_str()) {
            Some("TODO") => highlights.todos.push(info),
            Some("FIXME") => highlights.fixmes.push(info),
            Some("NOTE") => highlights.notes.push(info),
            _ => {}
        }
    }
    Ok(())
}
