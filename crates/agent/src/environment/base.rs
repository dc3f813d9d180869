//! The plain environment: exact args, no context.

use async_trait::async_trait;
use gamekit_core::action::{Action, ActionCall};
use gamekit_core::context::ActionContext;
use serde_json::{Map, Value};
use tracing::debug;

use super::{ActionOutcome, Environment, invoke_guarded};
use crate::error::EnvironmentError;

#[derive(Debug, Clone, Copy, Default)]
pub struct BaseEnvironment;

impl BaseEnvironment {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Environment for BaseEnvironment {
    fn name(&self) -> &str {
        "base"
    }

    async fn execute(
        &self,
        _context: &ActionContext,
        action: &Action,
        args: Map<String, Value>,
    ) -> Result<ActionOutcome, EnvironmentError> {
        debug!(action = action.name(), "Executing without context");
        Ok(invoke_guarded(action, ActionCall::new(args)).await)
    }
}
