//! Errors raised by environments and the agent loop.

use gamekit_core::error::{ProviderError, ResolutionError, TransactionError};
use thiserror::Error;

/// Failures an environment reports instead of a failure-shaped outcome.
///
/// Tool errors never surface here: they become `tool_executed: false`
/// outcomes. What remains is infrastructure the environment itself needs.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Review of '{action}' failed: {source}")]
    Review {
        action: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Capability '{capability}' failed to initialize: {reason}")]
    CapabilityInit { capability: String, reason: String },

    #[error("Agent '{0}' has no actions registered")]
    NoActions(String),
}

impl From<AgentError> for gamekit_core::Error {
    fn from(err: AgentError) -> Self {
        gamekit_core::Error::Internal(err.to_string())
    }
}

impl From<EnvironmentError> for gamekit_core::Error {
    fn from(err: EnvironmentError) -> Self {
        match err {
            EnvironmentError::Review { source, .. } => gamekit_core::Error::Provider(source),
            EnvironmentError::Transaction(e) => gamekit_core::Error::Transaction(e),
            EnvironmentError::Resolution(e) => gamekit_core::Error::Resolution(e),
        }
    }
}
