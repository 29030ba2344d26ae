//! codeflow-engine: static flow-graph analyzer for JavaScript/TypeScript
//!
//! This library parses JS/TS/JSX/TSX sources with tree-sitter and produces,
//! per file, a structural inventory (imports, functions, classes, components,
//! interfaces, exports, blocks, HTTP routes, data schemas) and an
//! execution-flow graph. Per-file graphs are merged into a project graph,
//! linked by resolved imports and enriched with reachability, importance and
//! complexity scores, either synchronously or as a background job with
//! push/poll progress. Analyzed files can be searched by symbol or text.
//!
//! # Example
//!
//! ```ignore
//! use codeflow_engine::{analyze_file, EngineConfig};
//!
//! let config = EngineConfig::default();
//! let analysis = analyze_file("src/index.ts", "export const a = 1;", &config.analysis);
//! println!("{}", serde_json::to_string_pretty(&analysis.graph)?);
//! ```

pub mod access;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod detectors;
pub mod error;
pub mod extract;
pub mod flow;
pub mod impact;
pub mod indexing;
pub mod jobs;
pub mod lang;
pub mod parser;
pub mod schema;
pub mod search;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use access::{AnalysisMode, JobGateway, Role, StartResponse};
pub use analysis::{enrich_graph, lexical_complexity_heuristic};
pub use config::EngineConfig;
pub use detectors::extract_from_parsed;
pub use error::{EngineError, Result};
pub use extract::{analyze_file, FileAnalysis};
pub use flow::{instrument_source, merge_file_graphs, normalize_graph};
pub use impact::{build_impact_map, ImpactMap};
pub use jobs::{Job, JobEvent, JobManager, JobStatus, JobView};
pub use lang::Lang;
pub use parser::{parse_source, ParsedSource};
pub use schema::{EdgeLabel, FileStructure, FlowEdge, FlowGraph, FlowNode, NodeKind};
pub use search::{search, search_project, MatchKind, SearchMatch};
