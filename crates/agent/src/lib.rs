//! The agent loop: the heart of GameKit.
//!
//! An agent repeats one cycle until it is told to stop:
//!
//! 1. **Prompt**: the [`AgentLanguage`] renders goals, memory and actions
//! 2. **Generate**: the model answers with a tool call (or plain text)
//! 3. **Act**: the response is parsed, resolved against the action
//!    registry and executed by an [`Environment`]
//! 4. **Observe**: the response and the result are appended to memory
//!
//! The loop ends when a terminal action runs or the iteration limit is hit.
//! Agents can delegate to one another through the tools in [`delegation`].

pub mod agent;
pub mod capability;
pub mod delegation;
pub mod environment;
pub mod error;
pub mod language;
pub mod transaction;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::{Agent, DEFAULT_MAX_ITERATIONS, RunOptions, RunReport, Termination};
pub use capability::{Capability, ProgressTracking, TimeAware};
pub use delegation::delegation_actions;
pub use environment::{
    ActionOutcome, AiReviewEnvironment, ApprovalGate, BaseEnvironment, Environment,
    InjectingEnvironment, ReviewVerdict, StagedEnvironment, StagedOutcome,
};
pub use error::{AgentError, EnvironmentError};
pub use language::{AgentLanguage, FunctionCallingLanguage};
pub use transaction::{ExecutionRecord, ReversibleAction, Transaction};
