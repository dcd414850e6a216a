//! Error types for the tacha redaction library.

use thiserror::Error;

/// Primary error type for cleanup operations.
///
/// Fatal variants abort the whole `clean_up` call and leave the document in
/// a discardable state. Recoverable conditions (a noninvertible transform
/// while mapping a single region, a structure-tree item with no parent) are
/// caught at the smallest scope, downgraded to a `tracing` event, and never
/// reach the caller.
#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("overlap ratio must lie in (0, 1], got {0}")]
    InvalidOverlapRatio(f64),

    #[error("document is not opened with both read and write access")]
    ReadOnlyDocument,

    #[error("noninvertible transformation matrix")]
    NoninvertibleTransform,

    #[error("unsupported image format: {0}")]
    UnsupportedImageFormat(String),

    #[error("image is missing required attribute {key}")]
    MissingRequiredAttribute { key: &'static str },

    #[error("marked content item has no structure parent")]
    StructureInconsistency,

    #[error("type error: expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: &'static str,
    },

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("page index out of bounds: {0}")]
    PageNotFound(usize),
}

/// Convenience Result type alias for CleanupError.
pub type Result<T> = std::result::Result<T, CleanupError>;
