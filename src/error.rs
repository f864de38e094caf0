//! Error taxonomy for the ingestion and retrieval core.
//!
//! Component-internal partial failures (one unreadable file, one failed
//! embedding batch) never surface here; they are collected as warnings by the
//! loader and the pipeline. Everything in [`RagError`] crosses a component
//! boundary and is left for the caller (CLI, HTTP layer) to present.

use thiserror::Error;

/// Result alias used by every core component.
pub type Result<T> = std::result::Result<T, RagError>;

/// Typed failures of the core.
#[derive(Debug, Error)]
pub enum RagError {
    /// A root directory or file handed to the loader does not exist or is unreadable.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Caller-supplied argument is out of range (empty question, `k <= 0`, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding backend failed or returned vectors of the wrong shape.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Writing to (or clearing) the vector store failed.
    #[error("vector store write failed: {0}")]
    StoreWrite(String),

    /// Reading from the vector store failed during retrieval.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The language model endpoint could not be reached or answered with an error.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A provider requiring a credential was requested without one.
    #[error("credential missing: {0}")]
    CredentialMissing(String),

    /// Configuration is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RagError {
    /// Stable machine-readable code, used in JSON error bodies and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::PathNotFound(_) => "path_not_found",
            RagError::InvalidArgument(_) => "invalid_argument",
            RagError::Embedding(_) => "embedding_error",
            RagError::StoreWrite(_) => "store_write_error",
            RagError::Retrieval(_) => "retrieval_error",
            RagError::ProviderUnavailable(_) => "provider_unavailable",
            RagError::CredentialMissing(_) => "credential_missing",
            RagError::Config(_) => "config_error",
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        RagError::InvalidArgument(message.into())
    }

    pub fn embedding(message: impl Into<String>) -> Self {
        RagError::Embedding(message.into())
    }

    pub fn store_write(message: impl Into<String>) -> Self {
        RagError::StoreWrite(message.into())
    }

    pub fn retrieval(message: impl Into<String>) -> Self {
        RagError::Retrieval(message.into())
    }

    pub fn provider_unavailable(message: impl Into<String>) -> Self {
        RagError::ProviderUnavailable(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            RagError::PathNotFound("a".into()),
            RagError::invalid_argument("b"),
            RagError::embedding("c"),
            RagError::store_write("d"),
            RagError::retrieval("e"),
            RagError::provider_unavailable("f"),
            RagError::CredentialMissing("g".into()),
            RagError::Config("h".into()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = RagError::CredentialMissing("ANTHROPIC_API_KEY not set".into());
        assert_eq!(
            err.to_string(),
            "credential missing: ANTHROPIC_API_KEY not set"
        );
    }
}
