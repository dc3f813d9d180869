//! Error types for the GameKit domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all GameKit operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model backend errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Lookup errors (actions, agents, registries) ---
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    // --- Staged execution ---
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool requires an action context but none was injected: {0}")]
    MissingContext(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Model call failed: {0}")]
    Model(#[from] ProviderError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Lookup failures: unknown action, unknown agent, missing registry.
///
/// These are raised at the point of lookup and converted into a
/// failure-shaped result one level up.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("Action '{name}' not found in registry. Available: {}", available.join(", "))]
    ActionNotFound { name: String, available: Vec<String> },

    #[error("Agent '{name}' not found in registry. Available: {}", available.join(", "))]
    AgentNotFound { name: String, available: Vec<String> },

    #[error("No agent registry found in action context")]
    MissingAgentRegistry,

    #[error("Terminate tool not found in tool catalog")]
    TerminateUnavailable,

    #[error("Delegation to '{agent}' refused: depth {depth} exceeds limit {limit}")]
    DelegationDepthExceeded {
        agent: String,
        depth: usize,
        limit: usize,
    },
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Transaction {0} already committed")]
    AlreadyCommitted(String),

    #[error("No transaction found for task {0}")]
    NotFound(String),

    #[error("Staged action #{index} failed: {source}")]
    StepFailed {
        index: usize,
        #[source]
        source: ToolError,
    },

    #[error(
        "Rollback incomplete, {} inverse action(s) failed: {}",
        failures.len(),
        failures.join("; ")
    )]
    RollbackFailed { failures: Vec<String> },
}

/// Render an error and its `source()` chain, one cause per line.
///
/// Used as the `traceback` field of failed action results.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![err.to_string()];
    let mut current = err.source();
    while let Some(cause) = current {
        lines.push(format!("caused by: {cause}"));
        current = cause.source();
    }
    lines.join("\n")
}
