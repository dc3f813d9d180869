//! Agent languages: how goals, memory and actions become a prompt, and how
//! a model response becomes an action invocation.

use gamekit_core::action::{Action, ActionInvocation, ParameterSchema};
use gamekit_core::memory::{Memory, MemoryEntry, Role};
use gamekit_core::prompt::{Goal, Prompt, PromptMessage, ToolSchema};
use gamekit_core::registry::TERMINATE;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::environment::Environment;

/// Tool descriptions longer than this are cut in prompts.
pub const DEFAULT_DESCRIPTION_LIMIT: usize = 1024;

pub trait AgentLanguage: Send + Sync {
    fn name(&self) -> &str;

    fn construct_prompt(
        &self,
        actions: &[&Action],
        environment: &dyn Environment,
        goals: &[Goal],
        memory: &Memory,
    ) -> Prompt;

    /// Turn raw model text into an invocation. Never fails: output that is
    /// not a recognised tool call becomes a `terminate` carrying the text.
    fn parse_response(&self, response: &str) -> ActionInvocation;
}

/// Native function calling: actions are sent as tool schemas and the model
/// answers with a tool call.
#[derive(Debug, Clone)]
pub struct FunctionCallingLanguage {
    description_limit: usize,
}

impl Default for FunctionCallingLanguage {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionCallingLanguage {
    pub fn new() -> Self {
        Self {
            description_limit: DEFAULT_DESCRIPTION_LIMIT,
        }
    }

    pub fn with_description_limit(mut self, limit: usize) -> Self {
        self.description_limit = limit;
        self
    }

    fn format_goals(goals: &[Goal]) -> Option<PromptMessage> {
        if goals.is_empty() {
            return None;
        }

        let mut sorted: Vec<&Goal> = goals.iter().collect();
        sorted.sort_by_key(|g| g.priority);

        let sep = format!("\n{}\n", "=".repeat(50));
        let blocks = sorted
            .iter()
            .map(|g| format!("GOAL {}: {}{sep}{}{sep}", g.priority, g.name, g.description))
            .collect::<Vec<_>>()
            .join("\n\n");

        Some(PromptMessage::system(format!(
            "\n\n{blocks}\n\n\
             INSTRUCTIONS:\n\
             - Focus on achieving your goals in priority order\n\
             - Use the available tools to accomplish tasks efficiently\n\
             - Be thorough but concise with your reasoning\n\
             - Handle errors gracefully and adapt your approach as needed\n\
             - Always strive to provide high-quality results\n\n\
             When you need to use a tool, the system will handle the function calling automatically.\n\n\
             Think step by step and choose the most appropriate tool for each task.\n"
        )))
    }

    fn format_memory(memory: &Memory) -> Vec<PromptMessage> {
        memory.entries().iter().map(Self::format_entry).collect()
    }

    fn format_entry(entry: &MemoryEntry) -> PromptMessage {
        let content = if entry.content.is_empty() {
            serde_json::to_string_pretty(entry).unwrap_or_default()
        } else {
            entry.content.clone()
        };
        match entry.role {
            Role::Assistant | Role::Environment => PromptMessage::assistant(content),
            Role::User | Role::System => PromptMessage::user(content),
        }
    }

    fn format_actions(&self, actions: &[&Action]) -> Vec<ToolSchema> {
        actions
            .iter()
            .map(|action| {
                let description = if action.description().is_empty() {
                    format!("Execute {}", action.name())
                } else {
                    truncate_chars(action.description(), self.description_limit)
                };
                let parameters = match action.parameters() {
                    Value::Object(schema) if !schema.is_empty() => action.parameters().clone(),
                    _ => ParameterSchema::new().to_value(),
                };
                ToolSchema {
                    name: action.name().to_string(),
                    description,
                    parameters,
                }
            })
            .collect()
    }
}

impl AgentLanguage for FunctionCallingLanguage {
    fn name(&self) -> &str {
        "function_calling"
    }

    fn construct_prompt(
        &self,
        actions: &[&Action],
        environment: &dyn Environment,
        goals: &[Goal],
        memory: &Memory,
    ) -> Prompt {
        let mut messages: Vec<PromptMessage> = Self::format_goals(goals).into_iter().collect();
        messages.extend(Self::format_memory(memory));

        let mut metadata = Map::new();
        metadata.insert("agent_language".into(), json!(self.name()));
        metadata.insert("environment".into(), json!(environment.name()));
        metadata.insert("num_goals".into(), json!(goals.len()));
        metadata.insert("num_actions".into(), json!(actions.len()));
        metadata.insert("memory_items".into(), json!(memory.len()));

        Prompt::new(messages, self.format_actions(actions), metadata)
    }

    fn parse_response(&self, response: &str) -> ActionInvocation {
        match serde_json::from_str::<Value>(response) {
            Ok(Value::Object(parsed)) => {
                if let Some(invocation) = direct_call(&parsed).or_else(|| nested_call(&parsed)) {
                    return invocation;
                }
                debug!("Response JSON is not a tool call, treating as final answer");
            }
            Ok(_) => debug!("Response JSON is not an object, treating as final answer"),
            Err(_) => debug!("Response is not JSON, treating as final answer"),
        }
        terminate_with(response)
    }
}

/// `{"tool_name": ..., "args": {...}}`
fn direct_call(parsed: &Map<String, Value>) -> Option<ActionInvocation> {
    let name = parsed.get("tool_name")?.as_str()?;
    let args = parsed.get("args")?.as_object()?;
    Some(ActionInvocation::new(name, args.clone()))
}

/// `{"function": {"name": ..., "arguments": {...} | "<json object>"}}`
fn nested_call(parsed: &Map<String, Value>) -> Option<ActionInvocation> {
    let function = parsed.get("function")?.as_object()?;
    let name = function.get("name")?.as_str()?;
    let args = match function.get("arguments") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(args)) => args.clone(),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(text).ok()? {
            Value::Object(args) => args,
            _ => return None,
        },
        Some(_) => return None,
    };
    Some(ActionInvocation::new(name, args))
}

fn terminate_with(response: &str) -> ActionInvocation {
    let mut args = Map::new();
    args.insert("message".into(), Value::String(response.to_string()));
    ActionInvocation::new(TERMINATE, args)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
