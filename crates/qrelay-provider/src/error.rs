//! Error types for provider operations.

use thiserror::Error;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur talking to the execution provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// The credential exchange was rejected.
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// The provider rejected a job submission. Carries the provider's
    /// own message when one could be recovered from the response body.
    #[error("provider rejected the job submission: {0}")]
    Submission(String),

    /// A status/result/device query failed.
    #[error("provider query failed: {0}")]
    Query(String),

    /// HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Client-side configuration problem (missing key, bad header value).
    #[error("provider configuration error: {0}")]
    Config(String),
}
