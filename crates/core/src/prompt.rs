//! Goals and the model-ready prompt value object.

use serde::{Deserialize, Serialize};

/// A priority-ordered directive shown to the model.
///
/// Lower `priority` values are more important and render first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub priority: i32,
    pub name: String,
    pub description: String,
}

impl Goal {
    pub fn new(priority: i32, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            priority,
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Roles understood by the model-call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: PromptRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: PromptRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: PromptRole::Assistant, content: content.into() }
    }
}

/// A callable-tool descriptor sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema `object` describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The prompt handed to a [`LanguageModel`](crate::model::LanguageModel).
///
/// Built fresh for every model call and read-only afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prompt {
    messages: Vec<PromptMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSchema>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    metadata: serde_json::Map<String, serde_json::Value>,
}

impl Prompt {
    pub fn new(
        messages: Vec<PromptMessage>,
        tools: Vec<ToolSchema>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self { messages, tools, metadata }
    }

    /// A tool-less prompt made of plain messages.
    pub fn from_messages(messages: Vec<PromptMessage>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Convenience: one system instruction followed by one user message.
    pub fn system_and_user(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self::from_messages(vec![PromptMessage::system(system), PromptMessage::user(user)])
    }

    pub fn messages(&self) -> &[PromptMessage] {
        &self.messages
    }

    pub fn tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    pub fn metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_and_user_orders_messages() {
        let prompt = Prompt::system_and_user("be an expert", "review this");
        assert_eq!(prompt.messages().len(), 2);
        assert_eq!(prompt.messages()[0].role, PromptRole::System);
        assert_eq!(prompt.messages()[1].content, "review this");
        assert!(prompt.tools().is_empty());
    }

    #[test]
    fn prompt_roles_serialize_lowercase() {
        let json = serde_json::to_value(PromptMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
    }
}
