//! Per-file analysis
//!
//! Parses a file once and runs both the structural extractor and the
//! execution-flow instrumenter over the same tree. This is the "fast" path
//! used for single-file previews, and the per-file step of a full job.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::detectors::extract_from_parsed;
use crate::flow::{instrument_parsed, normalize_graph};
use crate::impact::is_entry_file;
use crate::lang::Lang;
use crate::parser::parse_source;
use crate::schema::{FileStructure, FlowGraph};
use crate::utils::{count_lines, normalize_rel_path};

/// Everything the engine knows about one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysis {
    pub path: String,
    pub language: Option<String>,
    pub loc: usize,
    pub entry: bool,
    pub structure: FileStructure,
    /// Normalized flow graph (ids prefixed with `path`)
    pub graph: FlowGraph,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileAnalysis {
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Analyze one file. Never fails: a hard parse failure produces empty
/// inventories, an `error` flow node and the message in `error`.
pub fn analyze_file(path: &str, source: &str, options: &AnalysisConfig) -> FileAnalysis {
    let path = normalize_rel_path(path);
    let language = Lang::from_path(Path::new(&path)).ok().map(|l| l.name().to_string());
    let loc = count_lines(source);
    let entry = is_entry_file(&path, source);

    match parse_source(&path, source, options.max_file_bytes) {
        Ok(parsed) => {
            let structure = extract_from_parsed(&path, source, &parsed);
            let raw = instrument_parsed(&parsed, source, options);
            debug!(
                path = %path,
                nodes = raw.nodes.len(),
                edges = raw.edges.len(),
                "analyzed file"
            );
            FileAnalysis {
                graph: normalize_graph(&raw, &path),
                path,
                language,
                loc,
                entry,
                structure,
                error: None,
            }
        }
        Err(err) => {
            let message = err.to_string();
            debug!(path = %path, "analysis failed: {}", message);
            FileAnalysis {
                graph: normalize_graph(&FlowGraph::error("error#1", message.clone()), &path),
                path,
                language,
                loc,
                entry,
                structure: FileStructure::failed(message.clone()),
                error: Some(message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NodeKind;

    #[test]
    fn test_analyze_file_runs_both_passes() {
        let source = "import x from './x';\nexport function Main() {\n  return <div />;\n}\n";
        let analysis = analyze_file("./src/main.jsx", source, &AnalysisConfig::default());
        assert_eq!(analysis.path, "src/main.jsx");
        assert_eq!(analysis.language.as_deref(), Some("jsx"));
        assert_eq!(analysis.loc, 4);
        assert!(analysis.entry);
        assert!(!analysis.is_failed());
        assert_eq!(analysis.structure.imports[0].name, "./x");
        assert!(analysis.structure.components.iter().any(|c| c.name == "Main"));
        assert!(analysis
            .graph
            .nodes
            .iter()
            .all(|n| n.id.starts_with("src/main.jsx::")));
    }

    #[test]
    fn test_analyze_file_failure_is_contained() {
        let analysis = analyze_file("bin/tool.py", "print('hi')", &AnalysisConfig::default());
        assert!(analysis.is_failed());
        assert!(analysis.structure.is_failed());
        assert_eq!(analysis.graph.nodes.len(), 1);
        assert_eq!(analysis.graph.nodes[0].kind, NodeKind::Error);
        assert_eq!(analysis.graph.nodes[0].id, "bin/tool.py::error::0");
    }
}
