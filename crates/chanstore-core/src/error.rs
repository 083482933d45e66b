//! Error types for the core data model.

use thiserror::Error;

/// Input validation failures. These are always surfaced verbatim to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("tags must not be empty strings")]
    EmptyTag,

    #[error("unrecognized content format: {0:?}")]
    UnknownFormat(String),

    #[error("no content supplied")]
    MissingContent,

    #[error("supply either content or an upload, not both")]
    AmbiguousContent,

    #[error("content must not be empty")]
    EmptyContent,

    #[error("content exceeds the maximum of {limit} bytes")]
    ContentTooLarge { limit: usize },

    #[error("channel already holds the maximum of {limit} versions")]
    QuotaExceeded { limit: usize },

    #[error("a version named {0:?} already exists in this channel")]
    DuplicateVersionName(String),

    #[error("a channel named {0:?} already exists")]
    DuplicateChannelName(String),

    #[error("invalid manifest: {0}")]
    Manifest(String),
}

/// Diagnostic from a manifest syntax check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{diagnostic}")]
pub struct SyntaxError {
    pub diagnostic: String,
}

impl SyntaxError {
    pub fn new(diagnostic: impl Into<String>) -> Self {
        Self {
            diagnostic: diagnostic.into(),
        }
    }
}

impl From<SyntaxError> for ValidationError {
    fn from(e: SyntaxError) -> Self {
        ValidationError::Manifest(e.diagnostic)
    }
}
