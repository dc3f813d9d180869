//! Delegation tools: let one agent run another through the agent registry.
//!
//! Four patterns, differing only in what memory the sub-agent sees and what
//! comes back:
//!
//! - `call_agent`: fresh memory, only the final result returns
//! - `call_agent_with_reflection`: fresh memory, every entry is copied back
//! - `hand_off_to_agent`: the caller's own memory handle is shared
//! - `call_agent_with_selected_context`: the model picks which caller
//!   entries the sub-agent sees; its new entries are merged back
//!
//! Every delegated run is one level deeper than its caller and is refused
//! past the context's delegation limit.

use async_trait::async_trait;
use gamekit_core::action::{
    Action, ActionCall, ActionHandler, Dependencies, ParamType, ParameterSchema,
};
use gamekit_core::agent::{AgentRunner, DelegationScope};
use gamekit_core::context::ActionContext;
use gamekit_core::error::{ResolutionError, ToolError};
use gamekit_core::memory::{Memory, MemoryEntry, Role};
use gamekit_tools::prompt_for_json;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub const CALL_AGENT: &str = "call_agent";
pub const CALL_AGENT_WITH_REFLECTION: &str = "call_agent_with_reflection";
pub const HAND_OFF_TO_AGENT: &str = "hand_off_to_agent";
pub const CALL_AGENT_WITH_SELECTED_CONTEXT: &str = "call_agent_with_selected_context";

/// Summaries shown to the selecting model are cut at this many chars.
const SUMMARY_CHARS: usize = 100;

/// A resolved delegation: who runs, on what, with which inherited scope.
struct Delegation {
    context: ActionContext,
    agent_name: String,
    task: String,
    runner: Arc<dyn AgentRunner>,
    scope: DelegationScope,
}

impl Delegation {
    fn resolve(call: &ActionCall, tool_name: &str) -> Result<Self, ToolError> {
        let context = call.context(tool_name)?.clone();
        let agent_name = call.str_arg("agent_name")?.to_string();
        let task = call.str_arg("task")?.to_string();

        let registry = context
            .agent_registry()
            .cloned()
            .ok_or(ResolutionError::MissingAgentRegistry)?;
        let runner = registry.get(&agent_name)?;

        let depth = context.depth() + 1;
        let limit = context.max_delegation_depth();
        if depth > limit {
            warn!(agent = %agent_name, depth, limit, "Delegation refused");
            return Err(ResolutionError::DelegationDepthExceeded {
                agent: agent_name,
                depth,
                limit,
            }
            .into());
        }

        let scope = DelegationScope {
            registry: Some(registry),
            properties: context.caller_properties().clone(),
            depth,
            max_depth: limit,
        };
        info!(tool = tool_name, agent = %agent_name, depth, "Delegating task");

        Ok(Self {
            context,
            agent_name,
            task,
            runner,
            scope,
        })
    }

    async fn run(&self, memory: Memory) -> Result<Memory, gamekit_core::Error> {
        self.runner.run_task(&self.task, memory, self.scope.clone()).await
    }

    fn failed(&self, error: gamekit_core::Error) -> Value {
        warn!(agent = %self.agent_name, error = %error, "Delegated run failed");
        json!({ "success": false, "agent": self.agent_name, "error": error.to_string() })
    }
}

fn last_content(memory: &Memory, fallback: &str) -> String {
    memory
        .last()
        .map(|entry| entry.content)
        .unwrap_or_else(|| fallback.to_string())
}

fn delegation_parameters() -> ParameterSchema {
    ParameterSchema::new()
        .required("agent_name", ParamType::String, "Name of the agent to delegate to")
        .required("task", ParamType::String, "The task for that agent")
}

// ── call_agent ──────────────────────────────────────────────────────────

pub struct CallAgentTool;

impl CallAgentTool {
    pub fn action() -> Action {
        Action::new(
            CALL_AGENT,
            "Invoke another agent on a task with a fresh memory and return its final result.",
            Arc::new(Self),
        )
        .with_parameters(delegation_parameters())
        .with_tags(["agent", "coordination"])
        .with_dependencies(Dependencies::context())
    }

    async fn isolated(delegation: &Delegation) -> Value {
        match delegation.run(Memory::new()).await {
            Ok(result) => match result.last() {
                Some(last) => json!({
                    "success": true,
                    "agent": delegation.agent_name,
                    "result": last.content,
                    "memory_items": result.len(),
                }),
                None => json!({
                    "success": false,
                    "agent": delegation.agent_name,
                    "result": "Agent completed but produced no output",
                }),
            },
            Err(e) => delegation.failed(e),
        }
    }
}

#[async_trait]
impl ActionHandler for CallAgentTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let delegation = Delegation::resolve(&call, CALL_AGENT)?;
        Ok(Self::isolated(&delegation).await)
    }
}

// ── call_agent_with_reflection ──────────────────────────────────────────

pub struct CallAgentWithReflectionTool;

impl CallAgentWithReflectionTool {
    pub fn action() -> Action {
        Action::new(
            CALL_AGENT_WITH_REFLECTION,
            "Invoke another agent and copy its full reasoning into your own memory.",
            Arc::new(Self),
        )
        .with_parameters(delegation_parameters())
        .with_tags(["agent", "coordination", "reflection"])
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for CallAgentWithReflectionTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let delegation = Delegation::resolve(&call, CALL_AGENT_WITH_REFLECTION)?;
        let result = match delegation.run(Memory::new()).await {
            Ok(memory) => memory,
            Err(e) => return Ok(delegation.failed(e)),
        };

        let caller = delegation.context.memory();
        let thought = format!("{}_thought", delegation.agent_name);
        let entries = result.entries();
        for entry in &entries {
            caller.add(
                entry
                    .clone()
                    .with_field("type", thought.as_str())
                    .with_field("agent_source", delegation.agent_name.as_str()),
            );
        }

        Ok(json!({
            "success": true,
            "agent": delegation.agent_name,
            "result": last_content(&result, "No output"),
            "memories_added": entries.len(),
            "reasoning_shared": true,
        }))
    }
}

// ── hand_off_to_agent ───────────────────────────────────────────────────

pub struct HandOffToAgentTool;

impl HandOffToAgentTool {
    pub fn action() -> Action {
        Action::new(
            HAND_OFF_TO_AGENT,
            "Hand the task to another agent that continues in your shared memory.",
            Arc::new(Self),
        )
        .with_parameters(delegation_parameters())
        .with_tags(["agent", "coordination", "handoff"])
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for HandOffToAgentTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let delegation = Delegation::resolve(&call, HAND_OFF_TO_AGENT)?;
        let shared = delegation.context.memory().clone();

        match delegation.run(shared).await {
            Ok(result) => Ok(json!({
                "success": true,
                "agent": delegation.agent_name,
                "result": last_content(&result, "No output"),
                "shared_memory": true,
                "memory_items": result.len(),
            })),
            Err(e) => Ok(delegation.failed(e)),
        }
    }
}

// ── call_agent_with_selected_context ────────────────────────────────────

pub struct CallAgentWithSelectedContextTool;

impl CallAgentWithSelectedContextTool {
    pub fn action() -> Action {
        Action::new(
            CALL_AGENT_WITH_SELECTED_CONTEXT,
            "Invoke another agent with only the memories relevant to its task, chosen for you.",
            Arc::new(Self),
        )
        .with_parameters(delegation_parameters())
        .with_tags(["agent", "coordination", "selective"])
        .with_dependencies(Dependencies::context())
    }

    fn selection_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "selected_memories": {
                    "type": "array",
                    "items": { "type": "string", "description": "ID of a memory to include" }
                },
                "reasoning": {
                    "type": "string",
                    "description": "Explanation of why these memories were selected"
                }
            },
            "required": ["selected_memories", "reasoning"]
        })
    }

    fn summarize(entries: &[MemoryEntry]) -> String {
        entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let content = if entry.content.chars().count() > SUMMARY_CHARS {
                    let cut: String = entry.content.chars().take(SUMMARY_CHARS).collect();
                    format!("{cut}...")
                } else {
                    entry.content.clone()
                };
                format!("Memory mem_{idx}: {content}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ActionHandler for CallAgentWithSelectedContextTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let delegation = Delegation::resolve(&call, CALL_AGENT_WITH_SELECTED_CONTEXT)?;
        let caller = delegation.context.memory().clone();
        let available = caller.entries();
        if available.is_empty() {
            return Ok(CallAgentTool::isolated(&delegation).await);
        }

        let prompt = format!(
            "Review these memories and select the ones relevant for this task:\n\n\
             Task: {}\nAgent to call: {}\n\n\
             Available Memories:\n{}\n\n\
             Select memories that provide important context, requirements, constraints, \
             or background information for this specific task. Focus on relevance and \
             avoid redundant information.",
            delegation.task,
            delegation.agent_name,
            Self::summarize(&available)
        );
        let selection = prompt_for_json(
            delegation.context.model().as_ref(),
            &Self::selection_schema(),
            &prompt,
        )
        .await?;

        let selected: HashSet<&str> = selection
            .get("selected_memories")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let reasoning = selection
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let filtered = Memory::from_entries(
            available
                .iter()
                .enumerate()
                .filter(|(idx, _)| selected.contains(format!("mem_{idx}").as_str()))
                .map(|(_, entry)| entry.clone()),
        );
        let shared = filtered.len();

        let result = match delegation.run(filtered).await {
            Ok(memory) => memory,
            Err(e) => return Ok(delegation.failed(e)),
        };

        caller.add(
            MemoryEntry::new(
                Role::System,
                format!("Memory selection for {}: {reasoning}", delegation.agent_name),
            )
            .with_field("agent_source", "memory_selector"),
        );
        for entry in result.entries().into_iter().skip(shared) {
            caller.add(entry.with_field("agent_source", delegation.agent_name.as_str()));
        }

        Ok(json!({
            "success": true,
            "agent": delegation.agent_name,
            "result": last_content(&result, "No output"),
            "shared_memories": shared,
            "selection_reasoning": reasoning,
            "total_memories_available": available.len(),
            "optimization": "memory_selective",
        }))
    }
}

/// Every delegation tool.
pub fn delegation_actions() -> Vec<Action> {
    vec![
        CallAgentTool::action(),
        CallAgentWithReflectionTool::action(),
        HandOffToAgentTool::action(),
        CallAgentWithSelectedContextTool::action(),
    ]
}
