//! Actions: named, schema-described, executable capabilities.
//!
//! An [`Action`] pairs metadata sent to the model (name, description,
//! parameter schema) with an [`ActionHandler`] that does the work. Actions
//! also declare which shared resources they need from the
//! [`ActionContext`] via [`Dependencies`]; the environment supplies exactly
//! those and nothing else.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

use crate::context::ActionContext;
use crate::error::ToolError;

/// The arguments (and optionally the context) handed to a handler.
#[derive(Debug, Clone, Default)]
pub struct ActionCall {
    pub args: Map<String, Value>,
    pub context: Option<ActionContext>,
}

impl ActionCall {
    pub fn new(args: Map<String, Value>) -> Self {
        Self { args, context: None }
    }

    pub fn with_context(mut self, context: ActionContext) -> Self {
        self.context = Some(context);
        self
    }

    /// A required string argument.
    pub fn str_arg(&self, key: &str) -> Result<&str, ToolError> {
        self.args
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
    }

    /// An optional string argument.
    pub fn opt_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// A context property injected under `_<key>`.
    pub fn injected(&self, key: &str) -> Option<&Value> {
        self.args.get(&format!("_{key}"))
    }

    /// The injected action context, for tools that declared it.
    pub fn context(&self, tool_name: &str) -> Result<&ActionContext, ToolError> {
        self.context
            .as_ref()
            .ok_or_else(|| ToolError::MissingContext(tool_name.to_string()))
    }
}

/// The executable half of an action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> ActionHandler for FnHandler<F>
where
    F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        (self.0)(call).await
    }
}

/// Wrap an async closure as a handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ActionHandler>
where
    F: Fn(ActionCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Shared resources an action asks the environment to inject.
///
/// `context` hands over the whole [`ActionContext`]; each entry in
/// `properties` is a context property key delivered as the `_<key>` argument.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    pub context: bool,
    pub properties: Vec<String>,
}

impl Dependencies {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn context() -> Self {
        Self {
            context: true,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>) -> Self {
        self.properties.push(key.into());
        self
    }

    pub fn wants_property(&self, key: &str) -> bool {
        self.properties.iter().any(|p| p == key)
    }
}

/// JSON Schema primitive types for action parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

/// Builder for an `object` parameter schema.
///
/// Parameters added with [`required`](Self::required) are listed in the
/// schema's `required` array; [`optional`](Self::optional) ones have a default.
#[derive(Debug, Clone, Default)]
pub struct ParameterSchema {
    properties: Map<String, Value>,
    required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, ty: ParamType, description: &str) -> Self {
        self.required.push(name.to_string());
        self.optional(name, ty, description)
    }

    pub fn optional(mut self, name: &str, ty: ParamType, description: &str) -> Self {
        self.properties.insert(
            name.to_string(),
            serde_json::json!({ "type": ty.as_str(), "description": description }),
        );
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

impl From<ParameterSchema> for Value {
    fn from(schema: ParameterSchema) -> Self {
        schema.to_value()
    }
}

/// A registered capability the model can invoke by name.
#[derive(Clone)]
pub struct Action {
    name: String,
    description: String,
    parameters: Value,
    terminal: bool,
    tags: Vec<String>,
    dependencies: Dependencies,
    handler: Arc<dyn ActionHandler>,
}

impl Action {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: ParameterSchema::new().to_value(),
            terminal: false,
            tags: Vec::new(),
            dependencies: Dependencies::none(),
            handler,
        }
    }

    pub fn with_parameters(mut self, parameters: impl Into<Value>) -> Self {
        self.parameters = parameters.into();
        self
    }

    /// Mark this action as ending the agent loop when selected.
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies(mut self, dependencies: Dependencies) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameters(&self) -> &Value {
        &self.parameters
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Run the handler directly, with no injection or result formatting.
    pub async fn execute(&self, call: ActionCall) -> Result<Value, ToolError> {
        self.handler.invoke(call).await
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("terminal", &self.terminal)
            .field("tags", &self.tags)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// A parsed request from the model: which tool, with which arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActionInvocation {
    pub fn new(tool_name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_uses_declared_types() {
        let schema = ParameterSchema::new()
            .required("file_name", ParamType::String, "File to read")
            .optional("limit", ParamType::Integer, "Max lines")
            .to_value();

        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["file_name"]["type"], "string");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
        assert_eq!(schema["required"], json!(["file_name"]));
    }

    #[tokio::test]
    async fn closure_handler_executes() {
        let action = Action::new(
            "echo",
            "Echo the text back",
            handler_fn(|call: ActionCall| async move {
                Ok(Value::String(call.str_arg("text")?.to_uppercase()))
            }),
        );

        let mut args = Map::new();
        args.insert("text".into(), json!("hello"));
        let out = action.execute(ActionCall::new(args)).await.unwrap();
        assert_eq!(out, json!("HELLO"));
    }

    #[tokio::test]
    async fn missing_argument_is_invalid() {
        let call = ActionCall::default();
        let err = call.str_arg("path").unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(matches!(call.context("read_file"), Err(ToolError::MissingContext(_))));
    }

    #[test]
    fn invocation_deserializes_without_args() {
        let inv: ActionInvocation = serde_json::from_str(r#"{"tool_name":"terminate"}"#).unwrap();
        assert_eq!(inv.tool_name, "terminate");
        assert!(inv.args.is_empty());
    }
}
