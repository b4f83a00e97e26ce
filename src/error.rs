//! Error types for compression calls.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, CompressError>;

/// Coarse failure category reported back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The request itself is malformed.
    InvalidRequest,
    /// The source could not be opened or parsed.
    Decode,
    /// Every allowed setting still produced an oversized file.
    UnreachableTarget,
    /// An encoder rejected the pixel buffer or document.
    Encode,
    /// No rasterization backend, or a page failed to render.
    Rasterize,
    /// Reading or writing files failed.
    Io,
    /// A panic was caught at the entry point.
    Internal,
}

/// Errors that can end a compression call.
#[derive(Debug, Error)]
pub enum CompressError {
    /// Request parameters are out of range.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Failed to open or parse the source file.
    #[error("Failed to decode {path}: {reason}")]
    Decode {
        /// Source that failed to decode.
        path: PathBuf,
        /// Reason for the failure.
        reason: String,
    },

    /// The target cannot be met within the search floors.
    #[error("Target of {target_kb} KB is unreachable: {reason}")]
    UnreachableTarget {
        /// Requested target in kilobytes.
        target_kb: u64,
        /// Which floor stopped the search.
        reason: String,
    },

    /// An encoder refused the pixel buffer or document.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Page rasterization failed or no backend is available.
    #[error("Rasterization failed: {0}")]
    Rasterize(String),

    /// File system failure on a source, scratch or output path.
    #[error("I/O failure at {path}: {source}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A panic escaped the pipeline and was caught.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompressError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CompressError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        CompressError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            CompressError::InvalidRequest(_) => FailureKind::InvalidRequest,
            CompressError::Decode { .. } => FailureKind::Decode,
            CompressError::UnreachableTarget { .. } => FailureKind::UnreachableTarget,
            CompressError::Encode(_) => FailureKind::Encode,
            CompressError::Rasterize(_) => FailureKind::Rasterize,
            CompressError::Io { .. } => FailureKind::Io,
            CompressError::Internal(_) => FailureKind::Internal,
        }
    }
}

impl From<image::ImageError> for CompressError {
    fn from(e: image::ImageError) -> Self {
        CompressError::Encode(e.to_string())
    }
}

impl From<lopdf::Error> for CompressError {
    fn from(e: lopdf::Error) -> Self {
        CompressError::Encode(format!("{:?}", e))
    }
}
