//! The terminal action that ends an agent run.

use async_trait::async_trait;
use gamekit_core::action::{Action, ActionCall, ActionHandler, ParamType, ParameterSchema};
use gamekit_core::error::ToolError;
use gamekit_core::registry::TERMINATE;
use serde_json::Value;
use std::sync::Arc;

pub const DEFAULT_MESSAGE: &str = "Task completed successfully";

pub struct TerminateTool;

impl TerminateTool {
    pub fn action() -> Action {
        Action::new(
            TERMINATE,
            "Terminate the agent session with a summary message.",
            Arc::new(Self),
        )
        .with_parameters(ParameterSchema::new().optional(
            "message",
            ParamType::String,
            "Final message to report",
        ))
        .with_tags(["general", "system"])
        .terminal()
    }
}

#[async_trait]
impl ActionHandler for TerminateTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let message = call.opt_str("message").unwrap_or(DEFAULT_MESSAGE);
        Ok(Value::String(format!("{message}\n\nAgent session completed.")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, json};

    #[tokio::test]
    async fn message_defaults_when_absent() {
        let action = TerminateTool::action();
        assert!(action.is_terminal());
        assert_eq!(action.parameters()["required"], json!([]));

        let out = action.execute(ActionCall::default()).await.unwrap();
        assert!(out.as_str().unwrap().starts_with(DEFAULT_MESSAGE));
    }

    #[tokio::test]
    async fn message_is_echoed() {
        let mut args = Map::new();
        args.insert("message".into(), json!("done"));
        let out = TerminateTool::action().execute(ActionCall::new(args)).await.unwrap();
        assert_eq!(out, json!("done\n\nAgent session completed."));
    }
}
