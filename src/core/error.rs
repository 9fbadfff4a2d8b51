//! Error types for pageprep.
//!
//! Job-level errors are split by severity:
//! - [`PipelineError`] ends a job. It is delivered to the controller as a
//!   failure and never escapes the worker pool.
//! - [`CacheWarning`] is non-fatal. The job still publishes its result and
//!   the warning travels alongside it.
//!
//! Both are `Clone` so one outcome can be handed to the job handle and the
//! event channel at the same time; underlying I/O and codec errors are
//! therefore captured as messages.

use crate::core::types::ChainVersion;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error type for pageprep setup and CLI operations.
#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{0}")]
    Other(String),
}

/// Errors that terminate a single preprocessing job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Failed to decode source image {}: {error}", .path.display())]
    Decode { path: PathBuf, error: String },

    #[error("Failed to create destination directory {}: {error}", .path.display())]
    Directory { path: PathBuf, error: String },

    #[error("Transform chain {version} failed on {}: {error}", .path.display())]
    Transform {
        path: PathBuf,
        version: ChainVersion,
        error: String,
    },

    /// The artifact path resolves to the source file itself.
    #[error("Artifact for {} would overwrite the source image", .path.display())]
    ArtifactIsSource { path: PathBuf },

    #[error("Worker panicked while processing {}: {message}", .path.display())]
    WorkerPanicked { path: PathBuf, message: String },

    #[error("Job for {} ended without reporting an outcome", .path.display())]
    Disconnected { path: PathBuf },
}

/// Non-fatal problems with the cache artifact.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheWarning {
    /// Persisting the artifact failed; the in-memory result is still valid
    /// but the next cold start will have to recompute it.
    #[error("Failed to write cache artifact {}: {error}", .path.display())]
    ArtifactWrite { path: PathBuf, error: String },

    /// An artifact exists but could not be decoded; it was recomputed.
    #[error("Cache artifact {} is unreadable: {error}", .path.display())]
    ArtifactRead { path: PathBuf, error: String },

    /// An artifact decoded but does not fit the source; it was recomputed.
    #[error("Cache artifact {} does not match its source: {error}", .path.display())]
    ArtifactMismatch { path: PathBuf, error: String },
}

/// Error raised by a transform step or chain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Step '{step}' failed: {error}")]
pub struct TransformError {
    /// Name of the failing step.
    pub step: String,
    /// What went wrong.
    pub error: String,
}

impl TransformError {
    /// Create a new transform error.
    pub fn new(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            error: error.into(),
        }
    }
}

// ============================================================================
// Error Utilities
// ============================================================================

impl PipelineError {
    /// The file or directory the error is about. For a directory error this
    /// is the destination directory, otherwise the source image.
    pub fn path(&self) -> &Path {
        match self {
            PipelineError::Decode { path, .. }
            | PipelineError::Directory { path, .. }
            | PipelineError::Transform { path, .. }
            | PipelineError::ArtifactIsSource { path }
            | PipelineError::WorkerPanicked { path, .. }
            | PipelineError::Disconnected { path } => path,
        }
    }

    /// Whether resubmitting the same request could succeed without the
    /// user changing anything (e.g. a file still being written).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Decode { .. } | PipelineError::Disconnected { .. }
        )
    }

    /// Short machine-readable kind, used in logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Decode { .. } => "decode",
            PipelineError::Directory { .. } => "directory",
            PipelineError::Transform { .. } => "transform",
            PipelineError::ArtifactIsSource { .. } => "artifact_is_source",
            PipelineError::WorkerPanicked { .. } => "panic",
            PipelineError::Disconnected { .. } => "disconnected",
        }
    }
}

impl CacheWarning {
    /// Path of the artifact the warning is about.
    pub fn artifact_path(&self) -> &Path {
        match self {
            CacheWarning::ArtifactWrite { path, .. }
            | CacheWarning::ArtifactRead { path, .. }
            | CacheWarning::ArtifactMismatch { path, .. } => path,
        }
    }
}

/// Result type alias for pageprep operations.
pub type PrepResult<T> = Result<T, PrepError>;

/// Result type alias for a single job.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_message_names_path() {
        let error = PipelineError::Decode {
            path: PathBuf::from("/scans/pageA.tif"),
            error: "unexpected EOF".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("/scans/pageA.tif"));
        assert!(message.contains("unexpected EOF"));
        assert_eq!(error.kind(), "decode");
        assert!(error.is_retryable());
    }

    #[test]
    fn test_transform_error_reports_version() {
        let error = PipelineError::Transform {
            path: PathBuf::from("page.png"),
            version: ChainVersion(4),
            error: TransformError::new("threshold", "empty image").to_string(),
        };
        assert!(error.to_string().contains("v4"));
        assert!(error.to_string().contains("threshold"));
        assert!(!error.is_retryable());
        assert_eq!(error.path(), Path::new("page.png"));
    }

    #[test]
    fn test_pipeline_error_converts_to_prep_error() {
        let error: PrepError = PipelineError::Disconnected {
            path: PathBuf::from("x.png"),
        }
        .into();
        assert!(matches!(error, PrepError::Pipeline(_)));
    }

    #[test]
    fn test_cache_warning_path() {
        let warning = CacheWarning::ArtifactWrite {
            path: PathBuf::from("/out/pageA.png"),
            error: "read-only file system".to_string(),
        };
        assert_eq!(warning.artifact_path(), Path::new("/out/pageA.png"));
    }
}
