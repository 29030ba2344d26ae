//! Cross-file impact mapping and the project file tree
//!
//! Relative import specifiers are resolved against a [`SourceTree`] (the
//! disk, or the in-memory file map a job was given). Resolved pairs form a
//! forward `imports` map and its transpose `usedBy`; both are attached to the
//! file entries of the tree built by [`build_file_tree`]. Bare specifiers
//! (packages) and anything that does not resolve are left out silently.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use path_clean::clean;
use serde::{Deserialize, Serialize};

use crate::extract::FileAnalysis;
use crate::schema::FileStructure;
use crate::utils::{file_stem, normalize_rel_path, parent_dir};

/// File names that mark an application entry point
const ENTRY_STEMS: &[&str] = &["index", "main", "app", "cli", "server"];

/// Source text idioms that boot an application
const BOOT_IDIOMS: &[&str] = &[
    "listen(",
    "createRoot(",
    "ReactDOM.render(",
    "process.argv",
    "app.use(",
    "nextApp.prepare(",
];

// ============================================================================
// Source trees
// ============================================================================

/// Existence checks over project-relative, forward-slash paths
pub trait SourceTree {
    fn is_file(&self, rel_path: &str) -> bool;
}

/// A project directory on disk
#[derive(Debug, Clone)]
pub struct DiskTree {
    root: PathBuf,
}

impl DiskTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SourceTree for DiskTree {
    fn is_file(&self, rel_path: &str) -> bool {
        self.root.join(rel_path).is_file()
    }
}

/// The set of paths in an in-memory file map
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    paths: HashSet<String>,
}

impl MemoryTree {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            paths: paths
                .into_iter()
                .map(|p| normalize_rel_path(p.as_ref()))
                .collect(),
        }
    }
}

impl SourceTree for MemoryTree {
    fn is_file(&self, rel_path: &str) -> bool {
        self.paths.contains(rel_path)
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// `./x`, `../x`, `.` and `..`; everything else is an external package
pub fn is_relative_specifier(spec: &str) -> bool {
    spec == "." || spec == ".." || spec.starts_with("./") || spec.starts_with("../")
}

/// Resolve `spec` as written in `importer` to a project-relative file.
///
/// Candidates in order: the literal path when it has an extension, the path
/// with each extension appended, then `<path>/index<ext>`. Paths escaping the
/// project root never resolve.
pub fn resolve_import(tree: &dyn SourceTree, importer: &str, spec: &str, extensions: &[String]) -> Option<String> {
    if !is_relative_specifier(spec) {
        return None;
    }
    let base = parent_dir(importer);
    let joined = if base.is_empty() {
        spec.to_string()
    } else {
        format!("{}/{}", base, spec)
    };
    let cleaned = clean(&joined).to_string_lossy().replace('\\', "/");
    if cleaned == ".." || cleaned.starts_with("../") {
        return None;
    }
    let target = if cleaned == "." { String::new() } else { cleaned };

    let mut candidates = Vec::new();
    if !target.is_empty() && Path::new(&target).extension().is_some() {
        candidates.push(target.clone());
    }
    if !target.is_empty() {
        candidates.extend(extensions.iter().map(|ext| format!("{}{}", target, ext)));
    }
    candidates.extend(extensions.iter().map(|ext| {
        if target.is_empty() {
            format!("index{}", ext)
        } else {
            format!("{}/index{}", target, ext)
        }
    }));

    candidates
        .into_iter()
        .find(|candidate| candidate != importer && tree.is_file(candidate))
}

// ============================================================================
// Impact map
// ============================================================================

/// Both directions of a file's resolved imports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impact {
    pub imports: Vec<String>,
    pub used_by: Vec<String>,
}

/// Forward (`imports`) and reverse (`usedBy`) adjacency between files, plus
/// each file's export names
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactMap {
    imports: BTreeMap<String, BTreeSet<String>>,
    used_by: BTreeMap<String, BTreeSet<String>>,
    exports: BTreeMap<String, Vec<String>>,
}

impl ImpactMap {
    /// Record that `importer` imports `imported`; self-imports are ignored
    pub fn insert(&mut self, importer: &str, imported: &str) {
        if importer == imported {
            return;
        }
        self.imports
            .entry(importer.to_string())
            .or_default()
            .insert(imported.to_string());
        self.used_by
            .entry(imported.to_string())
            .or_default()
            .insert(importer.to_string());
    }

    pub fn set_exports(&mut self, file: &str, names: Vec<String>) {
        self.exports.insert(file.to_string(), names);
    }

    pub fn imports_of(&self, file: &str) -> Vec<&str> {
        self.imports
            .get(file)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn used_by(&self, file: &str) -> Vec<&str> {
        self.used_by
            .get(file)
            .map(|set| set.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn exports_of(&self, file: &str) -> &[String] {
        self.exports.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn impact_of(&self, file: &str) -> Impact {
        Impact {
            imports: self.imports_of(file).into_iter().map(String::from).collect(),
            used_by: self.used_by(file).into_iter().map(String::from).collect(),
        }
    }

    /// Every `(importer, imported)` pair
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.imports
            .iter()
            .flat_map(|(from, to)| to.iter().map(move |t| (from.as_str(), t.as_str())))
    }

    pub fn edge_count(&self) -> usize {
        self.imports.values().map(BTreeSet::len).sum()
    }
}

/// Resolve the imports of every analyzed file against `tree`
pub fn build_impact_map(analyses: &[FileAnalysis], tree: &dyn SourceTree, extensions: &[String]) -> ImpactMap {
    let mut map = ImpactMap::default();
    for analysis in analyses {
        let structure = &analysis.structure;
        map.set_exports(
            &analysis.path,
            structure.exports.iter().map(|e| e.name.clone()).collect(),
        );
        for record in &structure.import_details {
            if let Some(target) = resolve_import(tree, &analysis.path, &record.source, extensions) {
                map.insert(&analysis.path, &target);
            }
        }
    }
    map
}

// ============================================================================
// File tree
// ============================================================================

/// Entry-file heuristic: a conventional file name, or a boot idiom in the text
pub fn is_entry_file(path: &str, text: &str) -> bool {
    let normalized = normalize_rel_path(path);
    let scripted = Path::new(&normalized)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| matches!(e, "js" | "jsx" | "ts" | "tsx" | "mjs" | "cjs" | "mts" | "cts"));
    if scripted && ENTRY_STEMS.contains(&file_stem(&normalized)) {
        return true;
    }
    BOOT_IDIOMS.iter().any(|idiom| text.contains(idiom))
}

/// A file leaf of the project tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub full_path: String,
    pub language: Option<String>,
    pub loc: usize,
    pub entry: bool,
    #[serde(flatten)]
    pub structure: FileStructure,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact>,
}

/// Folder or file node of the project tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TreeNode {
    Folder {
        name: String,
        #[serde(rename = "fullPath")]
        full_path: String,
        children: Vec<TreeNode>,
    },
    File(FileEntry),
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Folder { name, .. } => name,
            Self::File(entry) => &entry.name,
        }
    }

    fn is_folder(&self) -> bool {
        matches!(self, Self::Folder { .. })
    }

    /// Depth-first search for a file entry by full path
    pub fn find_file(&self, path: &str) -> Option<&FileEntry> {
        match self {
            Self::File(entry) => (entry.full_path == path).then_some(entry),
            Self::Folder { children, .. } => children.iter().find_map(|c| c.find_file(path)),
        }
    }
}

#[derive(Default)]
struct FolderBuilder {
    folders: BTreeMap<String, FolderBuilder>,
    files: Vec<FileEntry>,
}

impl FolderBuilder {
    fn insert(&mut self, segments: &[&str], entry: FileEntry) {
        match segments {
            [] | [_] => self.files.push(entry),
            [dir, rest @ ..] => self
                .folders
                .entry((*dir).to_string())
                .or_default()
                .insert(rest, entry),
        }
    }

    fn into_nodes(self, prefix: &str) -> Vec<TreeNode> {
        let mut nodes: Vec<TreeNode> = self
            .folders
            .into_iter()
            .map(|(name, folder)| {
                let full_path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                TreeNode::Folder {
                    children: folder.into_nodes(&full_path),
                    name,
                    full_path,
                }
            })
            .collect();
        nodes.extend(self.files.into_iter().map(TreeNode::File));
        nodes.sort_by(|a, b| {
            b.is_folder()
                .cmp(&a.is_folder())
                .then_with(|| a.name().cmp(b.name()))
        });
        nodes
    }
}

/// Nest analyzed files into folders; folders sort before files, each group
/// alphabetically
pub fn build_file_tree(analyses: &[FileAnalysis]) -> Vec<TreeNode> {
    let mut root = FolderBuilder::default();
    for analysis in analyses {
        let full_path = normalize_rel_path(&analysis.path);
        let segments: Vec<&str> = full_path.split('/').filter(|s| !s.is_empty()).collect();
        let name = segments.last().map(|s| s.to_string()).unwrap_or_default();
        let entry = FileEntry {
            name,
            full_path: full_path.clone(),
            language: analysis.language.clone(),
            loc: analysis.loc,
            entry: analysis.entry,
            structure: analysis.structure.clone(),
            impact: None,
        };
        root.insert(&segments, entry);
    }
    root.into_nodes("")
}

/// Attach `impact {imports, usedBy}` to every file entry
pub fn attach_impact(nodes: &mut [TreeNode], map: &ImpactMap) {
    for node in nodes {
        match node {
            TreeNode::Folder { children, .. } => attach_impact(children, map),
            TreeNode::File(entry) => entry.impact = Some(map.impact_of(&entry.full_path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        crate::config::ResolveConfig::default().extensions
    }

    #[test]
    fn test_relative_specifiers() {
        assert!(is_relative_specifier("./a"));
        assert!(is_relative_specifier("../lib/b"));
        assert!(is_relative_specifier(".."));
        assert!(!is_relative_specifier("react"));
        assert!(!is_relative_specifier("/abs/path"));
        assert!(!is_relative_specifier("@scope/pkg"));
    }

    #[test]
    fn test_resolution_order() {
        let tree = MemoryTree::new([
            "src/a.ts",
            "src/a.js",
            "src/util/index.tsx",
            "src/data.json",
            "lib/b.jsx",
        ]);
        // extensions are tried in configured order: .js before .ts
        assert_eq!(resolve_import(&tree, "src/main.ts", "./a", &exts()).as_deref(), Some("src/a.js"));
        assert_eq!(resolve_import(&tree, "src/main.ts", "./a.ts", &exts()).as_deref(), Some("src/a.ts"));
        assert_eq!(
            resolve_import(&tree, "src/main.ts", "./util", &exts()).as_deref(),
            Some("src/util/index.tsx")
        );
        assert_eq!(
            resolve_import(&tree, "src/main.ts", "./data.json", &exts()).as_deref(),
            Some("src/data.json")
        );
        assert_eq!(resolve_import(&tree, "src/main.ts", "../lib/b", &exts()).as_deref(), Some("lib/b.jsx"));
        assert_eq!(resolve_import(&tree, "src/main.ts", "./missing", &exts()), None);
        assert_eq!(resolve_import(&tree, "src/main.ts", "react", &exts()), None);
        assert_eq!(resolve_import(&tree, "main.ts", "../outside", &exts()), None);
    }

    #[test]
    fn test_self_import_excluded() {
        let tree = MemoryTree::new(["a.ts"]);
        assert_eq!(resolve_import(&tree, "a.ts", "./a", &exts()), None);
        let mut map = ImpactMap::default();
        map.insert("a.ts", "a.ts");
        assert_eq!(map.edge_count(), 0);
    }

    #[test]
    fn test_disk_tree_resolution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pages")).unwrap();
        std::fs::write(dir.path().join("pages/home.tsx"), "export default 1;").unwrap();
        let tree = DiskTree::new(dir.path());
        assert_eq!(
            resolve_import(&tree, "app.ts", "./pages/home", &exts()).as_deref(),
            Some("pages/home.tsx")
        );
        // directories are not files
        assert_eq!(resolve_import(&tree, "app.ts", "./pages.tsx", &exts()), None);
    }

    #[test]
    fn test_impact_map_both_directions() {
        let mut map = ImpactMap::default();
        map.insert("b.ts", "a.ts");
        map.insert("c.ts", "a.ts");
        assert_eq!(map.imports_of("b.ts"), vec!["a.ts"]);
        assert_eq!(map.used_by("a.ts"), vec!["b.ts", "c.ts"]);
        assert!(map.imports_of("a.ts").is_empty());
        assert_eq!(map.edges().count(), 2);
    }

    #[test]
    fn test_entry_file_heuristic() {
        assert!(is_entry_file("src/index.ts", ""));
        assert!(is_entry_file("server.js", ""));
        assert!(is_entry_file("src/boot.ts", "app.listen(3000);"));
        assert!(!is_entry_file("src/index.css", ""));
        assert!(!is_entry_file("src/util.ts", "export const x = 1;"));
    }
}
