//! Execution-flow graphs
//!
//! - [`instrument`]: one file's statement list → raw graph with local ids
//! - [`normalize`]: local ids → `<file>::<type>::<seq>` project-unique ids
//! - [`merge`]: per-file graphs → one project graph with `file` nodes

pub mod instrument;
pub mod merge;
pub mod normalize;

pub use instrument::{instrument_parsed, instrument_source};
pub use merge::{link_imports, merge_file_graphs};
pub use normalize::normalize_graph;
