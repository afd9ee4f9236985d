//! Error kinds for the indexing pipeline.
//!
//! Each kind maps to a distinct propagation policy:
//! - `Rpc`            — retried inside the transport; surfaces only after exhaustion
//! - `Storage`        — transaction already rolled back; caller logs and backs off
//! - `RollbackFailed` — fatal; the daemon must halt rather than run on a
//!                      partially rolled-back store
//! - `Precondition`   — refused up front; maintenance commands exit non-zero
//! - `Config`         — bad environment; startup aborts

use thiserror::Error;

/// Errors that can occur during indexing.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("rollback failed: {0}")]
    RollbackFailed(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("config error: {0}")]
    Config(String),
}

impl IndexError {
    /// Returns `true` if the daemon must halt instead of backing off and retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RollbackFailed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_rollback_failures_are_fatal() {
        assert!(IndexError::RollbackFailed("partial delete".into()).is_fatal());
        assert!(!IndexError::Rpc("connection reset".into()).is_fatal());
        assert!(!IndexError::Storage("constraint violation".into()).is_fatal());
        assert!(!IndexError::Precondition("target ahead of head".into()).is_fatal());
    }
}
