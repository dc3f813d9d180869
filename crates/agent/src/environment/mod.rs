//! Environments: where a resolved action actually runs.
//!
//! Every environment implements one trait. Differences between them are
//! what they hand the tool (nothing, the live context, injected
//! properties) and whether the call runs now, later, or under review:
//!
//! - [`BaseEnvironment`]: exact args, no context
//! - [`InjectingEnvironment`]: declared-dependency injection
//! - [`StagedEnvironment`]: reversible actions staged into a transaction
//! - [`AiReviewEnvironment`]: model-reviewed retry loop for selected actions

pub mod base;
pub mod injecting;
pub mod review;
pub mod staged;

pub use base::BaseEnvironment;
pub use injecting::InjectingEnvironment;
pub use review::{AiReviewEnvironment, ReviewVerdict};
pub use staged::{ApprovalGate, StagedEnvironment};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use gamekit_core::action::{Action, ActionCall};
use gamekit_core::context::ActionContext;
use gamekit_core::error::error_chain;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tracing::warn;

use crate::error::EnvironmentError;

/// The result of dispatching one action, as recorded into memory.
///
/// Serializes to `{tool_executed, result?, error?, traceback?, timestamp?,
/// ...extra}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub tool_executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ActionOutcome {
    pub fn success(result: Value) -> Self {
        Self {
            tool_executed: true,
            result: Some(result),
            error: None,
            traceback: None,
            timestamp: Some(Utc::now().to_rfc3339()),
            extra: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            tool_executed: false,
            result: None,
            error: Some(error.into()),
            traceback: None,
            timestamp: None,
            extra: Map::new(),
        }
    }

    pub fn with_traceback(mut self, traceback: impl Into<String>) -> Self {
        self.traceback = Some(traceback.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.tool_executed
    }

    /// Compact JSON, the form stored in memory.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"tool_executed":false,"error":"unserializable outcome: {e}"}}"#)
        })
    }
}

/// Result of reviewing and running whatever a task staged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedOutcome {
    pub success: bool,
    pub message: String,
}

#[async_trait]
pub trait Environment: Send + Sync {
    /// Short identifier, recorded as the run's `environment_type`.
    fn name(&self) -> &str;

    async fn execute(
        &self,
        context: &ActionContext,
        action: &Action,
        args: Map<String, Value>,
    ) -> Result<ActionOutcome, EnvironmentError>;

    /// Review and run staged work at the end of an iteration.
    async fn commit_staged(&self, _context: &ActionContext) -> Option<StagedOutcome> {
        None
    }
}

/// Run `action`, turning tool errors and panics into failure outcomes.
pub(crate) async fn invoke_guarded(action: &Action, call: ActionCall) -> ActionOutcome {
    match AssertUnwindSafe(action.execute(call)).catch_unwind().await {
        Ok(Ok(result)) => ActionOutcome::success(result),
        Ok(Err(err)) => {
            warn!(action = action.name(), error = %err, "Action failed");
            ActionOutcome::failure(err.to_string()).with_traceback(error_chain(&err))
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(action = action.name(), panic = %message, "Action panicked");
            ActionOutcome::failure(format!("Action '{}' panicked: {message}", action.name()))
                .with_traceback(message)
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Build the call an injecting environment makes.
///
/// Model-supplied values for injected keys are discarded; only properties
/// the action declares and the context holds are inserted, as `_key`.
pub(crate) fn inject(
    context: &ActionContext,
    action: &Action,
    mut args: Map<String, Value>,
) -> ActionCall {
    let dependencies = action.dependencies();
    for key in &dependencies.properties {
        let slot = format!("_{key}");
        args.remove(&slot);
        if let Some(value) = context.get(key) {
            args.insert(slot, value);
        }
    }

    let call = ActionCall::new(args);
    if dependencies.context {
        call.with_context(context.clone())
    } else {
        call
    }
}
