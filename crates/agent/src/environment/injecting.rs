//! Declared-dependency injection.
//!
//! An action states what it needs through [`Dependencies`]. The environment
//! passes the live context only when `context` is declared and adds a
//! `_key` argument for each declared property the context holds.
//!
//! [`Dependencies`]: gamekit_core::action::Dependencies

use async_trait::async_trait;
use gamekit_core::action::Action;
use gamekit_core::context::ActionContext;
use serde_json::{Map, Value};
use tracing::debug;

use super::{ActionOutcome, Environment, inject, invoke_guarded};
use crate::error::EnvironmentError;

#[derive(Debug, Clone, Copy, Default)]
pub struct InjectingEnvironment;

impl InjectingEnvironment {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Environment for InjectingEnvironment {
    fn name(&self) -> &str {
        "context"
    }

    async fn execute(
        &self,
        context: &ActionContext,
        action: &Action,
        args: Map<String, Value>,
    ) -> Result<ActionOutcome, EnvironmentError> {
        debug!(
            action = action.name(),
            wants_context = action.dependencies().context,
            properties = ?action.dependencies().properties,
            "Executing with injection"
        );
        Ok(invoke_guarded(action, inject(context, action, args)).await)
    }
}
