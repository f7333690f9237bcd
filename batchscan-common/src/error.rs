//! Error types for the batchscan pipeline.

use thiserror::Error;

/// Result type alias using the batchscan error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for batchscan components.
#[derive(Error, Debug)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error (or the error it wraps) came from the filesystem.
    pub fn is_io(&self) -> bool {
        match self {
            Self::Io(_) => true,
            Self::WithContext { source, .. } => source.is_io(),
            _ => false,
        }
    }

    /// Check if the input itself was unusable (missing file, bad JSON, bad value).
    pub fn is_bad_input(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::InvalidInput(_) | Self::Json(_) => true,
            Self::WithContext { source, .. } => source.is_bad_input(),
            _ => false,
        }
    }
}

/// Extension trait for adding context to any error type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_with_context() {
        let err = Error::Internal("rename failed".into());
        let with_ctx = err.with_context("persisting scan");
        assert!(matches!(with_ctx, Error::WithContext { .. }));
        assert_eq!(with_ctx.to_string(), "persisting scan: Internal error: rename failed");
    }

    #[test]
    fn test_io_classification_through_context() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let result: std::result::Result<(), std::io::Error> = Err(io);
        let err = result.context("writing output").unwrap_err();
        assert!(err.is_io());
        assert!(!err.is_bad_input());
    }

    #[test]
    fn test_bad_input_classification() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = Error::from(err).with_context("reading scan");
        assert!(err.is_bad_input());
        assert!(Error::NotFound("scan.json".into()).is_bad_input());
        assert!(!Error::Internal("upstream".into()).is_bad_input());
    }
}
