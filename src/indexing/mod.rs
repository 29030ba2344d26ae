//! Project loading and the parallel fast path
//!
//! The engine itself consumes a map of project-relative path → file text.
//! [`load_project`] builds that map from a directory for the CLI, and
//! [`analyze_files_parallel`] runs per-file analysis over it with Rayon.
//!
//! # Example
//!
//! ```ignore
//! use codeflow_engine::indexing::{load_project, analyze_files_parallel};
//!
//! let files = load_project(&repo_dir, &[])?;
//! let analyses = analyze_files_parallel(&files, &config.analysis, None);
//! ```

mod files;
mod generation;

use std::collections::BTreeMap;

pub use files::{load_project, should_skip_path};
pub use generation::{analyze_files_parallel, AnalysisProgressCallback};

/// Project-relative path → file text, ordered by path
pub type FileMap = BTreeMap<String, String>;
