//! Error taxonomy shared by the registry, datasources and the local table bus.
//!
//! Errors are `Clone` because a single failed in-flight fetch is handed to
//! every caller attached to it.

use dashkit_types::CardId;
use std::time::Duration;
use thiserror::Error;

/// Failure reported by the remote API collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("fetch was abandoned before producing a result")]
    Abandoned,
}

/// Card type registry failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("card type '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("unknown card type '{0}'")]
    NotFound(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashError {
    /// Malformed or incomplete descriptor; retrying won't help
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("local table {0} is not registered")]
    SourceNotRegistered(CardId),

    #[error("local table {0} has no schema")]
    SchemaMissing(CardId),

    #[error("local table {card_id} is in error: {reason}")]
    TableFailed { card_id: CardId, reason: String },

    #[error("local table {card_id} not ready after {waited:?}")]
    ReadyTimeout { card_id: CardId, waited: Duration },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl DashError {
    pub fn config(message: impl Into<String>) -> Self {
        DashError::Config(message.into())
    }

    /// Whether waiting or retrying may succeed without editing the card
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DashError::SourceNotRegistered(_)
                | DashError::SchemaMissing(_)
                | DashError::TableFailed { .. }
                | DashError::ReadyTimeout { .. }
                | DashError::Fetch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DashError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(!DashError::config("route missing").is_recoverable());
        assert!(!DashError::Unsupported("entity".into()).is_recoverable());
        assert!(DashError::SourceNotRegistered(4).is_recoverable());
        assert!(DashError::from(FetchError::Network("reset".into())).is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = DashError::from(FetchError::Backend {
            status: 502,
            message: "bad gateway".into(),
        });
        assert_eq!(err.to_string(), "backend returned 502: bad gateway");
    }
}
