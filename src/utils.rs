//! Small string and path helpers shared across modules
//!
//! Snippet truncation counts characters, not bytes, so multi-byte source text
//! never splits inside a code point.

/// Keep at most `max_chars` characters of `s`.
///
/// # Examples
/// ```
/// use codeflow_engine::utils::truncate_chars;
///
/// assert_eq!(truncate_chars("hello world", 5), "hello");
/// assert_eq!(truncate_chars("héllo", 2), "hé");
/// ```
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

/// Number of lines in a text (a trailing newline does not open a new line)
pub fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.lines().count()
}

/// Canonical project-relative path: forward slashes, no leading `./`
pub fn normalize_rel_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut rest = unified.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.trim_start_matches('/').to_string()
}

/// Parent directory of a project-relative path ("" for top-level files)
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Final path segment without its extension
pub fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.find('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}
