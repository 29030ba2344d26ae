//! Language detection and tree-sitter grammar loading

use std::path::Path;
use tree_sitter::Language;

use crate::error::{EngineError, Result};

/// Script dialects the engine can parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lang {
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
}

impl Lang {
    /// Detect language from file path extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| EngineError::UnsupportedLanguage {
                extension: "none".to_string(),
            })?;

        Self::from_extension(ext)
    }

    /// Detect language from file extension string
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.to_lowercase().as_str() {
            "ts" | "mts" | "cts" => Ok(Self::TypeScript),
            "tsx" => Ok(Self::Tsx),
            "js" | "mjs" | "cjs" => Ok(Self::JavaScript),
            "jsx" => Ok(Self::Jsx),
            _ => Err(EngineError::UnsupportedLanguage {
                extension: ext.to_string(),
            }),
        }
    }

    /// Get the canonical name of the language
    pub fn name(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::Tsx => "tsx",
            Self::JavaScript => "javascript",
            Self::Jsx => "jsx",
        }
    }

    /// Get the tree-sitter Language for parsing.
    ///
    /// Plain `.ts` keeps the non-JSX grammar so `<T>expr` casts parse; the
    /// JavaScript grammar accepts JSX natively.
    pub fn tree_sitter_language(&self) -> Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::JavaScript | Self::Jsx => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_detection() {
        assert_eq!(Lang::from_extension("ts").unwrap(), Lang::TypeScript);
        assert_eq!(Lang::from_extension("mts").unwrap(), Lang::TypeScript);
        assert_eq!(Lang::from_extension("tsx").unwrap(), Lang::Tsx);
        assert_eq!(Lang::from_extension("js").unwrap(), Lang::JavaScript);
        assert_eq!(Lang::from_extension("CJS").unwrap(), Lang::JavaScript);
        assert_eq!(Lang::from_extension("jsx").unwrap(), Lang::Jsx);
    }

    #[test]
    fn test_language_from_path() {
        let path = PathBuf::from("src/components/App.tsx");
        assert_eq!(Lang::from_path(&path).unwrap(), Lang::Tsx);

        assert!(Lang::from_path(Path::new("Makefile")).is_err());
        assert!(Lang::from_path(Path::new("README.md")).is_err());
    }

    #[test]
    fn test_unsupported_extension() {
        match Lang::from_extension("py") {
            Err(EngineError::UnsupportedLanguage { extension }) => assert_eq!(extension, "py"),
            other => panic!("expected UnsupportedLanguage, got {:?}", other),
        }
    }

    #[test]
    fn test_grammar_per_dialect() {
        let mut parser = tree_sitter::Parser::new();
        for lang in [Lang::TypeScript, Lang::Tsx, Lang::JavaScript, Lang::Jsx] {
            parser.set_language(&lang.tree_sitter_language()).unwrap();
            assert!(parser.parse("const a = 1;", None).is_some(), "{}", lang.name());
        }
    }
}
