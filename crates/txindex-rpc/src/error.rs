//! Transport-level error types.

use thiserror::Error;

use txindex_core::IndexError;

/// Errors that can occur during an RPC transport operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP-level failure: connection refused/reset, 429, 5xx.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Request exceeded the per-attempt timeout.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response body could not be decoded.
    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The node answered, but with a payload the caller cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }
}

impl From<TransportError> for IndexError {
    fn from(e: TransportError) -> Self {
        IndexError::Rpc(e.to_string())
    }
}
