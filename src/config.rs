//! Engine configuration
//!
//! Every field has a default, so an empty (or missing) TOML file yields the
//! stock behavior. Example:
//!
//! ```toml
//! [analysis]
//! snippet_max_chars = 400
//!
//! [complexity]
//! if_weight = 1.5
//!
//! [jobs]
//! heartbeat_secs = 15
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub analysis: AnalysisConfig,
    pub complexity: ComplexityWeights,
    pub resolve: ResolveConfig,
    pub jobs: JobConfig,
    pub store: StoreConfig,
}

impl EngineConfig {
    /// Load from a TOML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Err(EngineError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(EngineError::config)
    }
}

/// Per-file analysis limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Max characters of source kept on a flow node
    pub snippet_max_chars: usize,
    /// Max characters kept on branch/loop marker nodes
    pub marker_snippet_chars: usize,
    /// Files larger than this fail to parse
    pub max_file_bytes: usize,
    /// Run the fast path across files with rayon
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            snippet_max_chars: 400,
            marker_snippet_chars: 300,
            max_file_bytes: 2 * 1024 * 1024,
            parallel: true,
        }
    }
}

/// Weights of the lexical complexity heuristic.
///
/// The defaults are the legacy tuning constants; they have no derivation
/// beyond producing familiar scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityWeights {
    pub if_weight: f64,
    pub for_weight: f64,
    pub while_weight: f64,
    pub switch_weight: f64,
    pub try_weight: f64,
    pub return_weight: f64,
    pub return_cap: usize,
    pub nesting_weight: f64,
    pub nesting_cap: usize,
}

impl Default for ComplexityWeights {
    fn default() -> Self {
        Self {
            if_weight: 1.5,
            for_weight: 1.4,
            while_weight: 1.4,
            switch_weight: 2.0,
            try_weight: 1.8,
            return_weight: 0.5,
            return_cap: 3,
            nesting_weight: 0.6,
            nesting_cap: 5,
        }
    }
}

/// Import resolution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveConfig {
    /// Extensions tried, in order, for extensionless specifiers
    pub extensions: Vec<String>,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            extensions: [".js", ".ts", ".jsx", ".tsx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Job orchestration timing and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub heartbeat_secs: u64,
    pub poll_interval_ms: u64,
    pub retention_days: u32,
    pub list_limit: usize,
}

impl JobConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: 15,
            poll_interval_ms: 2000,
            retention_days: 7,
            list_limit: 50,
        }
    }
}

/// Where the JSON file store keeps jobs and graphs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: Option<PathBuf>,
}

impl StoreConfig {
    /// Configured directory, else the XDG cache location
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(default_store_dir)
    }
}

/// Get the base store directory (XDG-compliant)
pub fn default_store_dir() -> PathBuf {
    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg_cache).join("codeflow");
    }

    if let Some(cache) = dirs::cache_dir() {
        return cache.join("codeflow");
    }

    std::env::temp_dir().join("codeflow")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_legacy_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.analysis.snippet_max_chars, 400);
        assert_eq!(config.complexity.if_weight, 1.5);
        assert_eq!(config.complexity.nesting_cap, 5);
        assert_eq!(config.jobs.heartbeat(), Duration::from_secs(15));
        assert_eq!(config.resolve.extensions, vec![".js", ".ts", ".jsx", ".tsx"]);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            [complexity]
            if_weight = 3.0

            [jobs]
            poll_interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.complexity.if_weight, 3.0);
        assert_eq!(config.complexity.for_weight, 1.4);
        assert_eq!(config.jobs.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.jobs.heartbeat_secs, 15);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = EngineConfig::from_toml("[jobs\nbroken").unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::load(Some(Path::new("/nonexistent/codeflow.toml"))).unwrap_err();
        assert!(matches!(err, EngineError::FileNotFound { .. }));
    }
}
