//! Case-insensitive search over analyzed files
//!
//! Matches symbol names from each file's inventories (components, functions,
//! classes, exports, highlight comments, import sources) and, when the
//! file text is available, raw source lines. Results keep file order; within
//! a file inventories come first, then text. Only the first match per
//! `(path, line)` is kept.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::extract::FileAnalysis;
use crate::indexing::FileMap;
use crate::schema::{FileStructure, SymbolInfo};
use crate::utils::{normalize_rel_path, truncate_chars};

/// Longest snippet returned for a text match
const TEXT_SNIPPET_MAX: usize = 200;

/// What a search hit refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Function,
    Class,
    Component,
    Export,
    Highlight,
    Import,
    Text,
}

/// One hit: `{path, line, snippet, type, match}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    pub path: String,
    pub line: usize,
    pub snippet: String,
    #[serde(rename = "type")]
    pub kind: MatchKind,
    #[serde(rename = "match")]
    pub matched: String,
}

struct Collector<'q> {
    needle: &'q str,
    seen: HashSet<(String, usize)>,
    out: Vec<SearchMatch>,
}

impl<'q> Collector<'q> {
    fn push(&mut self, path: &str, line: usize, kind: MatchKind, snippet: String, matched: String) {
        if self.seen.insert((path.to_lowercase(), line)) {
            self.out.push(SearchMatch {
                path: path.to_string(),
                line,
                snippet,
                kind,
                matched,
            });
        }
    }

    fn symbols(&mut self, path: &str, kind: MatchKind, symbols: &[SymbolInfo]) {
        for symbol in symbols {
            if symbol.name.to_lowercase().contains(self.needle) {
                self.push(path, symbol.start, kind, symbol.name.clone(), symbol.name.clone());
            }
        }
    }

    fn structure(&mut self, path: &str, structure: &FileStructure) {
        // components are also listed as functions or classes; report the narrower kind
        self.symbols(path, MatchKind::Component, &structure.components);
        self.symbols(path, MatchKind::Function, &structure.functions);
        self.symbols(path, MatchKind::Class, &structure.classes);
        self.symbols(path, MatchKind::Export, &structure.exports);

        let highlights = &structure.highlights;
        for item in highlights.todos.iter().chain(&highlights.fixmes).chain(&highlights.notes) {
            if item.text.to_lowercase().contains(self.needle) {
                self.push(path, item.line, MatchKind::Highlight, item.text.clone(), item.text.clone());
            }
        }

        self.symbols(path, MatchKind::Import, &structure.imports);
    }

    fn text(&mut self, path: &str, text: &str, query: &str) {
        for (index, line) in text.lines().enumerate() {
            if line.to_lowercase().contains(self.needle) {
                let snippet = truncate_chars(line.trim(), TEXT_SNIPPET_MAX);
                self.push(path, index + 1, MatchKind::Text, snippet, query.to_string());
            }
        }
    }
}

fn run(analyses: &[FileAnalysis], files: Option<&FileMap>, query: &str) -> Vec<SearchMatch> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    let texts: HashMap<String, &str> = files
        .map(|files| {
            files
                .iter()
                .map(|(path, text)| (normalize_rel_path(path), text.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let mut collector = Collector {
        needle: &needle,
        seen: HashSet::new(),
        out: Vec::new(),
    };
    for analysis in analyses {
        collector.structure(&analysis.path, &analysis.structure);
        if let Some(text) = texts.get(&analysis.path) {
            collector.text(&analysis.path, text, query);
        }
    }
    collector.out
}

/// Search symbol inventories only
pub fn search(analyses: &[FileAnalysis], query: &str) -> Vec<SearchMatch> {
    run(analyses, None, query)
}

/// Search symbol inventories, then the source lines of `files`
pub fn search_project(analyses: &[FileAnalysis], files: &FileMap, query: &str) -> Vec<SearchMatch> {
    run(analyses, Some(files), query)
}
