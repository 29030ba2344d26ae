//! Common test utilities and fixtures for codeflow-engine integration tests
//!
//! - `TestRepo` builder for creating throwaway project directories
//! - Graph assertions shared by the pipeline and job tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use codeflow_engine::indexing::{load_project, FileMap};
use codeflow_engine::FlowGraph;

/// Project directory under a temp dir, removed on drop
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `rel_path`, creating parent directories
    pub fn add_file(self, rel_path: &str, content: &str) -> Self {
        let full = self.dir.path().join(rel_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&full, content).expect("write fixture");
        self
    }

    /// Every supported source file as a path → text map
    pub fn files(&self) -> FileMap {
        load_project(self.path(), &[]).expect("load fixture project")
    }
}

pub fn assert_no_dangling_edges(graph: &FlowGraph) {
    let dangling = graph.dangling_edges();
    assert!(dangling.is_empty(), "dangling edges: {:?}", dangling);
}

pub fn assert_unique_ids(graph: &FlowGraph) {
    let ids = graph.node_ids();
    assert_eq!(ids.len(), graph.nodes.len(), "duplicate node ids");
}
