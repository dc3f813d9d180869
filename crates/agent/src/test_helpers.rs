//! Shared test helpers for agent tests.

use async_trait::async_trait;
use gamekit_core::action::{Action, ActionCall, ActionHandler, handler_fn};
use gamekit_core::context::ActionContext;
use gamekit_core::error::{ProviderError, ToolError};
use gamekit_core::memory::Memory;
use gamekit_core::model::LanguageModel;
use gamekit_core::prompt::Prompt;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::capability::Capability;
use crate::error::AgentError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A model that replays scripted responses and records every prompt.
///
/// Running past the script panics unless built with [`ScriptedModel::always`].
pub struct ScriptedModel {
    responses: Vec<String>,
    repeat_last: bool,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Arc<Self> {
        Arc::new(Self {
            responses: responses.into_iter().map(Into::into).collect(),
            repeat_last: false,
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Panics on the first call.
    pub fn silent() -> Arc<Self> {
        Self::new(Vec::<String>::new())
    }

    pub fn always(response: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: vec![response.to_string()],
            repeat_last: true,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let index = {
            let mut prompts = lock(&self.prompts);
            prompts.push(prompt.clone());
            prompts.len() - 1
        };

        match self.responses.get(index) {
            Some(text) => Ok(text.clone()),
            None if self.repeat_last => Ok(self.responses.last().cloned().unwrap_or_default()),
            None => panic!(
                "ScriptedModel: no more responses (call #{index}, have {})",
                self.responses.len()
            ),
        }
    }
}

/// A model whose every call fails.
pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// A top-level context over a scripted model.
pub fn context(responses: Vec<&str>) -> ActionContext {
    context_with(ScriptedModel::new(responses), Memory::new())
}

pub fn context_with(model: Arc<dyn LanguageModel>, memory: Memory) -> ActionContext {
    ActionContext::builder(model, memory).build()
}

/// `{"tool_name": name, "args": args}` as the model would send it.
pub fn tool_call(name: &str, args: Value) -> String {
    json!({ "tool_name": name, "args": args }).to_string()
}

/// Reports the args it received and whether a context came with them.
pub fn inspect_action() -> Action {
    Action::new(
        "inspect",
        "",
        handler_fn(|call: ActionCall| async move {
            Ok(json!({
                "args": Value::Object(call.args.clone()),
                "has_context": call.context.is_some(),
            }))
        }),
    )
}

pub fn echo_action() -> Action {
    Action::new(
        "echo",
        "Echo the text back",
        handler_fn(|call: ActionCall| async move {
            Ok(Value::String(call.str_arg("text")?.to_string()))
        }),
    )
}

pub fn failing_action(name: &str) -> Action {
    let tool_name = name.to_string();
    Action::new(
        name,
        "Always fails",
        handler_fn(move |_call: ActionCall| {
            let tool_name = tool_name.clone();
            async move {
                Err(ToolError::ExecutionFailed {
                    tool_name,
                    reason: "simulated failure".into(),
                })
            }
        }),
    )
}

struct PanickingTool;

#[async_trait]
impl ActionHandler for PanickingTool {
    async fn invoke(&self, _call: ActionCall) -> Result<Value, ToolError> {
        panic!("tool exploded")
    }
}

pub fn panicking_action() -> Action {
    Action::new("explode", "Panics", Arc::new(PanickingTool))
}

/// Logs `do:{name}` and returns `"did {name}"`, or fails when `fail` is set.
pub fn recording_action(name: &str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> Action {
    let log = log.clone();
    let label = name.to_string();
    Action::new(
        name,
        format!("Record {name}"),
        handler_fn(move |_call: ActionCall| {
            let log = log.clone();
            let label = label.clone();
            async move {
                lock(&log).push(format!("do:{label}"));
                if fail {
                    Err(ToolError::ExecutionFailed {
                        tool_name: label,
                        reason: "step failed".into(),
                    })
                } else {
                    Ok(Value::String(format!("did {label}")))
                }
            }
        }),
    )
}

/// Inverse that logs `undo:{name}`, or fails when `fail` is set.
pub fn logging_inverse(
    name: &str,
    log: &Arc<Mutex<Vec<String>>>,
    fail: bool,
) -> Arc<dyn ActionHandler> {
    let log = log.clone();
    let label = name.to_string();
    handler_fn(move |_call: ActionCall| {
        let log = log.clone();
        let label = label.clone();
        async move {
            lock(&log).push(format!("undo:{label}"));
            if fail {
                Err(ToolError::ExecutionFailed {
                    tool_name: label,
                    reason: "inverse failed".into(),
                })
            } else {
                Ok(Value::Null)
            }
        }
    })
}

/// Records each call's args and returns `"attempt {n}"`.
pub fn counting_generator(name: &str, calls: &Arc<Mutex<Vec<Map<String, Value>>>>) -> Action {
    let calls = calls.clone();
    Action::new(
        name,
        "Generate something reviewable",
        handler_fn(move |call: ActionCall| {
            let calls = calls.clone();
            async move {
                let mut calls = lock(&calls);
                calls.push(call.args.clone());
                Ok(Value::String(format!("attempt {}", calls.len())))
            }
        }),
    )
}

/// Counts how often each capability hook fires.
#[derive(Default)]
pub struct HookCounter {
    counts: Mutex<HashMap<&'static str, usize>>,
    fail_init: bool,
}

impl HookCounter {
    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }

    pub fn count(&self, hook: &str) -> usize {
        lock(&self.counts).get(hook).copied().unwrap_or(0)
    }

    fn bump(&self, hook: &'static str) {
        *lock(&self.counts).entry(hook).or_default() += 1;
    }
}

impl Capability for HookCounter {
    fn name(&self) -> &str {
        "hook_counter"
    }

    fn init(&self, _context: &ActionContext) -> Result<(), AgentError> {
        self.bump("init");
        if self.fail_init {
            return Err(AgentError::CapabilityInit {
                capability: "hook_counter".into(),
                reason: "refused".into(),
            });
        }
        Ok(())
    }

    fn process_prompt(&self, _context: &ActionContext, _memory: &Memory) {
        self.bump("prompt");
    }

    fn process_response(&self, _context: &ActionContext, _memory: &Memory, _response: &str) {
        self.bump("response");
    }

    fn process_action(
        &self,
        _context: &ActionContext,
        _outcome: &crate::environment::ActionOutcome,
    ) {
        self.bump("action");
    }

    fn terminate(&self, _context: &ActionContext) {
        self.bump("terminate");
    }
}
