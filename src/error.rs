//! Error types for codeflow-engine

use std::process::ExitCode;

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors produced by the analysis engine and job orchestrator
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported language for extension: {extension}")]
    UnsupportedLanguage { extension: String },

    #[error("Parse failure: {message}")]
    ParseFailure { message: String },

    #[error("Extraction failure: {message}")]
    ExtractionFailure { message: String },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::ParseFailure {
            message: e.to_string(),
        }
    }

    pub fn store<E: std::fmt::Display>(e: E) -> Self {
        Self::Store(e.to_string())
    }

    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    /// Rejections raised at the job-status/subscription boundary
    pub fn is_access_error(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated(_) | Self::Forbidden(_) | Self::ProjectNotFound(_)
        )
    }

    /// Process exit code for the CLI
    pub fn exit_code(&self) -> ExitCode {
        let code: u8 = match self {
            Self::FileNotFound { .. } | Self::JobNotFound(_) | Self::ProjectNotFound(_) => 2,
            Self::UnsupportedLanguage { .. } => 3,
            Self::ParseFailure { .. } | Self::ExtractionFailure { .. } => 4,
            Self::Unauthenticated(_) | Self::Forbidden(_) => 5,
            Self::Config(_) => 6,
            _ => 1,
        };
        ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_errors_are_distinguishable() {
        assert!(EngineError::Unauthenticated("no token".into()).is_access_error());
        assert!(EngineError::Forbidden("viewer".into()).is_access_error());
        assert!(!EngineError::JobNotFound("x".into()).is_access_error());

        let unauth = EngineError::Unauthenticated("bad".into()).to_string();
        let forbidden = EngineError::Forbidden("bad".into()).to_string();
        assert_ne!(unauth, forbidden);
    }

    #[test]
    fn test_transition_message() {
        let err = EngineError::InvalidStateTransition {
            from: "done".into(),
            to: "running".into(),
        };
        assert_eq!(err.to_string(), "Invalid state transition: done -> running");
    }
}
