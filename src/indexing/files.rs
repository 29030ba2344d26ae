//! Directory → file map
//!
//! Walks a project with `ignore` so `.gitignore` rules apply, skipping
//! hidden entries and dependency/build output directories.

use std::fs;
use std::path::Path;

use ignore::WalkBuilder;
use tracing::{debug, warn};

use super::FileMap;
use crate::error::{EngineError, Result};
use crate::lang::Lang;
use crate::utils::normalize_rel_path;

/// Check if a path should be skipped during collection.
///
/// Skips:
/// - Hidden files/directories (starting with '.')
/// - Dependency and build output: node_modules, dist, build, .next, coverage
pub fn should_skip_path(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => {
            name.starts_with('.')
                || matches!(name, "node_modules" | "dist" | "build" | "coverage" | "out")
        }
        None => false,
    }
}

/// Read every supported source file under `dir` into a [`FileMap`].
///
/// `extensions` (without dots) narrows the supported set when non-empty.
/// Unreadable files (binary, permissions) are logged and skipped.
pub fn load_project(dir: &Path, extensions: &[String]) -> Result<FileMap> {
    if !dir.is_dir() {
        return Err(EngineError::FileNotFound {
            path: dir.display().to_string(),
        });
    }

    let walker = WalkBuilder::new(dir)
        .hidden(true)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(true)
        .require_git(false)
        .filter_entry(|entry| entry.depth() == 0 || !should_skip_path(entry.path()))
        .build();

    let mut files = FileMap::new();
    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !extensions.is_empty() && !extensions.iter().any(|e| e == ext) {
            continue;
        }
        if Lang::from_extension(ext).is_err() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(dir) else {
            continue;
        };
        match fs::read_to_string(path) {
            Ok(text) => {
                files.insert(normalize_rel_path(&rel.to_string_lossy()), text);
            }
            Err(err) => warn!(path = %path.display(), "skipping unreadable file: {}", err),
        }
    }

    debug!(dir = %dir.display(), files = files.len(), "loaded project");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_skip_hidden() {
        assert!(should_skip_path(Path::new(".git")));
        assert!(should_skip_path(Path::new(".next")));
    }

    #[test]
    fn test_should_skip_node_modules() {
        assert!(should_skip_path(Path::new("node_modules")));
        assert!(should_skip_path(Path::new("dist")));
    }

    #[test]
    fn test_should_not_skip_src() {
        assert!(!should_skip_path(Path::new("src")));
        assert!(!should_skip_path(Path::new("lib")));
    }

    #[test]
    fn test_load_project_filters() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("src/components")).unwrap();
        fs::create_dir_all(root.join("node_modules/react")).unwrap();
        fs::write(root.join("src/index.ts"), "export {};").unwrap();
        fs::write(root.join("src/components/App.tsx"), "export const App = 1;").unwrap();
        fs::write(root.join("src/readme.md"), "# hi").unwrap();
        fs::write(root.join("node_modules/react/index.js"), "module.exports = {};").unwrap();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::write(root.join("generated/api.ts"), "export {};").unwrap();

        let files = load_project(root, &[]).unwrap();
        let paths: Vec<&str> = files.keys().map(String::as_str).collect();
        assert_eq!(paths, vec!["src/components/App.tsx", "src/index.ts"]);

        let only_ts = load_project(root, &["ts".to_string()]).unwrap();
        assert_eq!(only_ts.len(), 1);
    }

    #[test]
    fn test_load_project_missing_dir() {
        assert!(load_project(Path::new("/definitely/not/here"), &[]).is_err());
    }
}
