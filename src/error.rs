//! Error types for the Dolma runner
//!
//! This module defines all error types used throughout the pipeline,
//! providing detailed error information for debugging and user feedback.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    /// I/O error during file operations
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File or directory not found
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// YAML config file could not be parsed
    #[error("Invalid config file '{path}': {message}")]
    InvalidConfig { path: PathBuf, message: String },

    /// HTTP download error
    #[error("Download error for '{url}': {message}")]
    DownloadError { url: String, message: String },

    /// Compression/decompression error
    #[error("Decompression error at '{path}': {message}")]
    DecompressionError { path: PathBuf, message: String },

    /// JSONL/CSV record error
    #[error("Record error: {0}")]
    RecordError(String),

    /// Stage produced nothing to work on
    #[error("Nothing to do: {0}")]
    EmptyInput(String),

    /// Batch scheduler command failed
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    /// Logging setup failed
    #[error("Logging error: {0}")]
    LoggingError(String),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPoolError(String),

    /// A pipeline stage failed
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a download error
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DownloadError {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a decompression error
    pub fn decompression(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DecompressionError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an error as the failure of a named stage
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error is worth another attempt
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. } | Self::DownloadError { .. })
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::RecordError(err.to_string())
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| PipelineError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = PipelineError::io("/data/shard.json.gz", io_err);
        assert!(matches!(&err, PipelineError::Io { path, .. } if path == &PathBuf::from("/data/shard.json.gz")));
        assert!(err.to_string().contains("/data/shard.json.gz"));
    }

    #[test]
    fn test_error_recoverability() {
        assert!(PipelineError::download("https://x/a.gz", "503").is_recoverable());
        assert!(!PipelineError::config("bad").is_recoverable());
    }

    #[test]
    fn test_stage_context_message() {
        let err = PipelineError::EmptyInput("no URLs".into()).in_stage("download");
        assert_eq!(
            err.to_string(),
            "Stage 'download' failed: Nothing to do: no URLs"
        );
    }

    #[test]
    fn test_with_path_extension() {
        let res: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = res.with_path("/scratch/out").unwrap_err();
        assert!(err.to_string().contains("/scratch/out"));
    }
}
