//! # GameKit Core
//!
//! Domain types, traits, and error definitions for the GameKit agent
//! framework. This crate defines the GAME model (Goals, Actions, Memory,
//! Environment boundary) that every other crate builds against.
//!
//! ## Design Philosophy
//!
//! The model backend and runnable agents are traits here. Implementations
//! live in their respective crates. This enables:
//! - Swapping model backends via configuration
//! - Easy testing with scripted models
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod memory;
pub mod prompt;
pub mod model;
pub mod action;
pub mod registry;
pub mod context;
pub mod agent;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result, ProviderError, ToolError, ResolutionError, TransactionError};
pub use memory::{Memory, MemoryEntry, Role};
pub use prompt::{Goal, Prompt, PromptMessage, PromptRole, ToolSchema};
pub use model::LanguageModel;
pub use action::{
    Action, ActionCall, ActionHandler, ActionInvocation, Dependencies, ParamType, ParameterSchema,
    handler_fn,
};
pub use registry::{ActionRegistry, ToolCatalog, ToolFilter, TERMINATE};
pub use context::{ActionContext, DEFAULT_MAX_DELEGATION_DEPTH};
pub use agent::{AgentRegistry, AgentRunner, DelegationScope};
pub use event::{DomainEvent, EventBus};
