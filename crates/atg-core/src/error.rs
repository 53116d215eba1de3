//! Error types for the incremental ATG driver.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the core pipeline.
#[derive(Error, Debug)]
pub enum AtgError {
    /// Invalid or missing required option, or a contradictory flag
    /// combination. Surfaced before any external call.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Project file missing, duplicate build directory without
    /// `clean_up`, or the post-build validity predicate failed.
    #[error("build-tree error: {message}")]
    BuildTree { message: String },

    /// A tool command exited non-zero where the caller requires success.
    #[error("tool invocation failed: {message}")]
    ToolInvocation {
        message: String,
        /// Set when stderr looked like a missing-license complaint.
        missing_license: bool,
    },

    /// A child process exceeded its timeout and was killed.
    #[error("timeout after {seconds}s running: {command}")]
    Timeout { command: String, seconds: u64 },

    /// The SCM adapter reported a rename without `allow_moves`, or was
    /// unavailable entirely.
    #[error("scm error: {message}")]
    Scm { message: String },

    /// An expected artefact is missing after an otherwise successful
    /// command, or a filesystem operation failed outright.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Wraps an underlying I/O error with no specific path context.
    #[error("io error: {0}")]
    PlainIo(#[source] std::io::Error),

    /// A context/source wrapper applied via `.with_context()`.
    #[error("{message}{}", source.as_ref().map(|s| format!(": {s}")).unwrap_or_default())]
    Context {
        message: String,
        #[source]
        source: Option<Box<AtgError>>,
    },
}

impl AtgError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn build_tree(message: impl Into<String>) -> Self {
        Self::BuildTree {
            message: message.into(),
        }
    }

    pub fn tool_invocation(message: impl Into<String>, missing_license: bool) -> Self {
        Self::ToolInvocation {
            message: message.into(),
            missing_license,
        }
    }

    pub fn timeout(command: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            command: command.into(),
            seconds,
        }
    }

    pub fn scm(message: impl Into<String>) -> Self {
        Self::Scm {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap `self` with an additional message, chaining it as the source.
    pub fn with_context(self, message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
            source: Some(Box::new(self)),
        }
    }

    /// True if this error (or something it wraps) looks like a missing
    /// license complaint from the test tool.
    pub fn looks_like_missing_license(&self) -> bool {
        matches!(
            self,
            Self::ToolInvocation {
                missing_license: true,
                ..
            }
        )
    }
}

impl From<std::io::Error> for AtgError {
    fn from(source: std::io::Error) -> Self {
        Self::PlainIo(source)
    }
}

/// Result type alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, AtgError>;

/// Heuristic used by the Project Builder and Tool adapter: stderr
/// containing a case-insensitive substring of "licens" is reported as a
/// possible missing-license condition. Matches "license", "licensing",
/// "unlicensed", etc.
pub fn stderr_suggests_missing_license(stderr: &str) -> bool {
    stderr.to_lowercase().contains("licens")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_license_detection_is_case_insensitive() {
        assert!(stderr_suggests_missing_license("No valid LICENSE found"));
        assert!(stderr_suggests_missing_license("license server unreachable"));
        assert!(stderr_suggests_missing_license("feature is unlicensed on this node"));
        assert!(!stderr_suggests_missing_license("segmentation fault"));
    }

    #[test]
    fn tool_invocation_carries_license_flag() {
        let err = AtgError::tool_invocation("build failed", true);
        assert!(err.looks_like_missing_license());
        let err = AtgError::tool_invocation("build failed", false);
        assert!(!err.looks_like_missing_license());
    }

    #[test]
    fn context_wrapping_preserves_source_chain() {
        use std::error::Error as _;
        let base = AtgError::configuration("bad option");
        let wrapped = base.with_context("while validating CLI flags");
        assert!(wrapped.source().is_some());
    }
}
