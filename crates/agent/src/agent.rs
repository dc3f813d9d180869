//! The agent loop.
//!
//! Each iteration follows the same cycle:
//!
//! 1. **Prompt**: goals, memory and actions rendered by the agent language
//! 2. **Generate**: one model call
//! 3. **Dispatch**: parse the response, resolve the action, execute it in
//!    the environment
//! 4. **Record**: the response and its result are appended to memory
//! 5. **Stop** if the action was terminal
//! 6. **Commit**: the environment runs or discards anything it staged
//!
//! The loop ends on a terminal action, the iteration cap, an interrupt, or
//! a panic inside the loop. Capability `terminate` hooks run once on every
//! one of those paths.

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use gamekit_core::action::ActionInvocation;
use gamekit_core::agent::{AgentRegistry, AgentRunner, DelegationScope};
use gamekit_core::context::{ActionContext, DEFAULT_MAX_DELEGATION_DEPTH};
use gamekit_core::event::{DomainEvent, EventBus};
use gamekit_core::memory::{Memory, MemoryEntry};
use gamekit_core::model::LanguageModel;
use gamekit_core::prompt::Goal;
use gamekit_core::registry::ActionRegistry;
use serde_json::{Map, Value};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::capability::Capability;
use crate::environment::{ActionOutcome, Environment, InjectingEnvironment, panic_message};
use crate::error::AgentError;
use crate::language::{AgentLanguage, FunctionCallingLanguage};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Per-run inputs that are not part of the agent itself.
#[derive(Clone)]
pub struct RunOptions {
    /// Caller-supplied context properties, e.g. `target_language`
    pub properties: Map<String, Value>,
    pub agent_registry: Option<Arc<AgentRegistry>>,
    /// Checked before every iteration; set it to stop the run
    pub interrupt: Option<Arc<AtomicBool>>,
    pub depth: usize,
    pub max_delegation_depth: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            properties: Map::new(),
            agent_registry: None,
            interrupt: None,
            depth: 0,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties(mut self, properties: Map<String, Value>) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_agent_registry(mut self, registry: Arc<AgentRegistry>) -> Self {
        self.agent_registry = Some(registry);
        self
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn with_max_delegation_depth(mut self, limit: usize) -> Self {
        self.max_delegation_depth = limit;
        self
    }
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// A terminal action ran; holds its name
    TerminalAction(String),
    MaxIterations,
    /// The loop panicked; holds the panic message
    Failed(String),
    Interrupted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::TerminalAction(name) => write!(f, "terminal action '{name}'"),
            Termination::MaxIterations => write!(f, "max iterations reached"),
            Termination::Failed(reason) => write!(f, "failed: {reason}"),
            Termination::Interrupted => write!(f, "interrupted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub memory: Memory,
    pub iterations: usize,
    pub termination: Termination,
}

pub struct Agent {
    name: String,
    goals: Vec<Goal>,
    language: Arc<dyn AgentLanguage>,
    actions: ActionRegistry,
    model: Arc<dyn LanguageModel>,
    environment: Arc<dyn Environment>,
    capabilities: Vec<Arc<dyn Capability>>,
    max_iterations: usize,
    event_bus: Option<Arc<EventBus>>,
}

impl Agent {
    /// An agent using function calling and the injecting environment.
    pub fn new(
        name: impl Into<String>,
        goals: Vec<Goal>,
        actions: ActionRegistry,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            name: name.into(),
            goals,
            language: Arc::new(FunctionCallingLanguage::new()),
            actions,
            model,
            environment: Arc::new(InjectingEnvironment),
            capabilities: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            event_bus: None,
        }
    }

    pub fn with_language(mut self, language: Arc<dyn AgentLanguage>) -> Self {
        self.language = language;
        self
    }

    pub fn with_environment(mut self, environment: Arc<dyn Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.environment
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Run `task` to completion.
    ///
    /// A fresh memory is created unless one is passed in; passing a cloned
    /// handle lets the caller observe the run's log.
    pub async fn run(
        &self,
        task: &str,
        memory: Option<Memory>,
        options: RunOptions,
    ) -> Result<RunReport, AgentError> {
        if self.actions.is_empty() {
            return Err(AgentError::NoActions(self.name.clone()));
        }

        let memory = memory.unwrap_or_default();
        memory.add(MemoryEntry::user(task));

        let context = ActionContext::builder(self.model.clone(), memory.clone())
            .agent_registry(options.agent_registry.clone())
            .metadata("agent_name", self.name.clone())
            .metadata("environment_type", self.environment.name())
            .caller_properties(options.properties.clone())
            .depth(options.depth)
            .max_delegation_depth(options.max_delegation_depth)
            .build();

        for capability in &self.capabilities {
            capability.init(&context)?;
        }

        info!(
            agent = %self.name,
            run_id = %context.run_id(),
            depth = options.depth,
            actions = self.actions.len(),
            "Starting agent run"
        );

        let mut iterations = 0;
        let looped = AssertUnwindSafe(self.run_loop(
            &context,
            &memory,
            options.interrupt.as_deref(),
            &mut iterations,
        ))
        .catch_unwind()
        .await;

        let termination = match looped {
            Ok(termination) => termination,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(
                    agent = %self.name,
                    iteration = iterations,
                    panic = %reason,
                    "Agent loop failed"
                );
                self.publish(DomainEvent::ErrorOccurred {
                    context: format!("agent '{}' loop", self.name),
                    error_message: reason.clone(),
                    timestamp: Utc::now(),
                });
                Termination::Failed(reason)
            }
        };

        for capability in &self.capabilities {
            capability.terminate(&context);
        }

        info!(
            agent = %self.name,
            iterations,
            termination = %termination,
            memory_items = memory.len(),
            "Agent run finished"
        );
        self.publish(DomainEvent::RunFinished {
            agent: self.name.clone(),
            iterations,
            termination: termination.to_string(),
            memory_items: memory.len(),
            timestamp: Utc::now(),
        });

        Ok(RunReport {
            memory,
            iterations,
            termination,
        })
    }

    async fn run_loop(
        &self,
        context: &ActionContext,
        memory: &Memory,
        interrupt: Option<&AtomicBool>,
        iterations: &mut usize,
    ) -> Termination {
        let actions = self.actions.get_actions();

        while *iterations < self.max_iterations {
            if interrupt.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
                info!(agent = %self.name, iteration = *iterations, "Run interrupted");
                return Termination::Interrupted;
            }
            *iterations += 1;
            let iteration = *iterations;
            debug!(agent = %self.name, iteration, "Agent loop iteration");

            for capability in &self.capabilities {
                capability.process_prompt(context, memory);
            }

            let prompt = self.language.construct_prompt(
                &actions,
                self.environment.as_ref(),
                &self.goals,
                memory,
            );

            let response = match self.model.generate(&prompt).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(agent = %self.name, iteration, error = %e, "Model call failed");
                    format!("Error generating response: {e}")
                }
            };
            self.publish(DomainEvent::ResponseGenerated {
                agent: self.name.clone(),
                iteration,
                model: self.model.name().to_string(),
                response_chars: response.chars().count(),
                timestamp: Utc::now(),
            });

            for capability in &self.capabilities {
                capability.process_response(context, memory, &response);
            }

            let started = Instant::now();
            let (invocation, outcome) = self.dispatch(context, &response).await;
            self.publish(DomainEvent::ActionExecuted {
                agent: self.name.clone(),
                action: invocation.tool_name.clone(),
                success: outcome.tool_executed,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
            debug!(
                agent = %self.name,
                iteration,
                action = %invocation.tool_name,
                success = outcome.tool_executed,
                "Action dispatched"
            );

            for capability in &self.capabilities {
                capability.process_action(context, &outcome);
            }

            memory.add(MemoryEntry::assistant(response));
            memory.add(MemoryEntry::user(outcome.to_json()));

            if self.should_terminate(&invocation) {
                info!(
                    agent = %self.name,
                    iteration,
                    action = %invocation.tool_name,
                    "Terminal action reached"
                );
                return Termination::TerminalAction(invocation.tool_name);
            }

            if let Some(staged) = self.environment.commit_staged(context).await {
                if staged.success {
                    info!(
                        agent = %self.name,
                        iteration,
                        message = %staged.message,
                        "Staged actions committed"
                    );
                } else {
                    warn!(
                        agent = %self.name,
                        iteration,
                        message = %staged.message,
                        "Staged actions not committed"
                    );
                }
            }
        }

        warn!(agent = %self.name, max_iterations = self.max_iterations, "Max iterations reached");
        Termination::MaxIterations
    }

    /// Parse, resolve and execute. Failures become failure outcomes.
    async fn dispatch(
        &self,
        context: &ActionContext,
        response: &str,
    ) -> (ActionInvocation, ActionOutcome) {
        let invocation = self.language.parse_response(response);

        let action = match self.actions.get_action(&invocation.tool_name) {
            Ok(action) => action,
            Err(e) => {
                warn!(
                    agent = %self.name,
                    action = %invocation.tool_name,
                    error = %e,
                    "Could not resolve action"
                );
                return (invocation, handling_failure(&e, response));
            }
        };

        match self
            .environment
            .execute(context, action, invocation.args.clone())
            .await
        {
            Ok(outcome) => (invocation, outcome),
            Err(e) => {
                warn!(
                    agent = %self.name,
                    action = %invocation.tool_name,
                    error = %e,
                    "Environment error"
                );
                (invocation, handling_failure(&e, response))
            }
        }
    }

    fn should_terminate(&self, invocation: &ActionInvocation) -> bool {
        self.actions
            .get_action(&invocation.tool_name)
            .is_ok_and(|action| action.is_terminal())
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn handling_failure(error: &dyn fmt::Display, response: &str) -> ActionOutcome {
    ActionOutcome::failure(format!("Error handling agent response: {error}"))
        .with_field("response", response)
}

#[async_trait]
impl AgentRunner for Agent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run_task(
        &self,
        task: &str,
        memory: Memory,
        scope: DelegationScope,
    ) -> Result<Memory, gamekit_core::Error> {
        let options = RunOptions {
            properties: scope.properties,
            agent_registry: scope.registry,
            interrupt: None,
            depth: scope.depth,
            max_delegation_depth: scope.max_depth,
        };
        let report = self.run(task, Some(memory), options).await?;
        Ok(report.memory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        FailingModel, HookCounter, ScriptedModel, echo_action, inspect_action, tool_call,
    };
    use crate::environment::StagedEnvironment;
    use gamekit_core::action::{ActionCall, Dependencies, handler_fn};
    use gamekit_core::memory::Role;
    use gamekit_core::registry::TERMINATE;
    use gamekit_tools::TerminateTool;
    use serde_json::json;

    fn registry() -> ActionRegistry {
        let mut registry = ActionRegistry::new();
        registry.register(TerminateTool::action());
        registry.register(echo_action());
        registry
    }

    fn outcome_at(memory: &Memory, index: usize) -> Value {
        serde_json::from_str(&memory.entries()[index].content).unwrap()
    }

    #[tokio::test]
    async fn single_terminate_leaves_three_entries() {
        let model = ScriptedModel::new(vec![tool_call(TERMINATE, json!({"message": "done"}))]);
        let goals = vec![Goal::new(1, "Finish", "Say done")];
        let agent = Agent::new("solo", goals, registry(), model.clone());

        let report = agent.run("wrap it up", None, RunOptions::new()).await.unwrap();

        assert_eq!(report.iterations, 1);
        assert_eq!(report.termination, Termination::TerminalAction(TERMINATE.into()));
        let entries = report.memory.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[0].content, "wrap it up");
        assert_eq!(entries[1].role, Role::Assistant);
        assert_eq!(entries[2].role, Role::User);
        let outcome = outcome_at(&report.memory, 2);
        assert_eq!(outcome["tool_executed"], true);
        assert_eq!(outcome["result"], "done\n\nAgent session completed.");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn iteration_cap_stops_the_loop() {
        let model = ScriptedModel::always(&tool_call("echo", json!({"text": "again"})));
        let agent = Agent::new("looper", vec![], registry(), model.clone()).with_max_iterations(4);

        let report = agent.run("keep going", None, RunOptions::new()).await.unwrap();

        assert_eq!(report.termination, Termination::MaxIterations);
        assert_eq!(report.iterations, 4);
        assert_eq!(model.call_count(), 4);
        assert_eq!(report.memory.len(), 1 + 2 * 4);
    }

    #[tokio::test]
    async fn unknown_action_is_recorded_and_loop_continues() {
        let model = ScriptedModel::new(vec![
            tool_call("launch_rockets", json!({})),
            tool_call(TERMINATE, json!({})),
        ]);
        let agent = Agent::new("careful", vec![], registry(), model);

        let report = agent.run("do something", None, RunOptions::new()).await.unwrap();

        assert_eq!(report.iterations, 2);
        let failure = outcome_at(&report.memory, 2);
        assert_eq!(failure["tool_executed"], false);
        let error = failure["error"].as_str().unwrap();
        assert!(error.starts_with(
            "Error handling agent response: Action 'launch_rockets' not found"
        ));
        assert!(failure["response"].as_str().unwrap().contains("launch_rockets"));
    }

    #[tokio::test]
    async fn plain_text_answer_terminates() {
        let model = ScriptedModel::new(vec!["All done, nothing else to do."]);
        let agent = Agent::new("chatty", vec![], registry(), model);

        let report = agent.run("say hi", None, RunOptions::new()).await.unwrap();

        assert_eq!(report.termination, Termination::TerminalAction(TERMINATE.into()));
        assert_eq!(
            outcome_at(&report.memory, 2)["result"],
            "All done, nothing else to do.\n\nAgent session completed."
        );
    }

    #[tokio::test]
    async fn model_error_becomes_response_text() {
        let agent = Agent::new("offline", vec![], registry(), Arc::new(FailingModel));

        let report = agent.run("anything", None, RunOptions::new()).await.unwrap();

        assert_eq!(report.iterations, 1);
        assert!(report.memory.entries()[1].content.starts_with("Error generating response:"));
        assert_eq!(report.termination, Termination::TerminalAction(TERMINATE.into()));
    }

    #[tokio::test]
    async fn loop_panic_is_caught_and_terminate_hook_runs_once() {
        let hooks = Arc::new(HookCounter::default());
        let agent = Agent::new("fragile", vec![], registry(), ScriptedModel::silent())
            .with_capability(hooks.clone());

        let report = agent.run("boom", None, RunOptions::new()).await.unwrap();

        assert!(matches!(report.termination, Termination::Failed(_)));
        assert_eq!(hooks.count("terminate"), 1);
        assert_eq!(hooks.count("prompt"), 1);
    }

    #[tokio::test]
    async fn hooks_run_per_iteration() {
        let hooks = Arc::new(HookCounter::default());
        let model = ScriptedModel::new(vec![
            tool_call("echo", json!({"text": "a"})),
            tool_call(TERMINATE, json!({})),
        ]);
        let agent = Agent::new("hooked", vec![], registry(), model).with_capability(hooks.clone());

        agent.run("go", None, RunOptions::new()).await.unwrap();

        assert_eq!(hooks.count("init"), 1);
        assert_eq!(hooks.count("prompt"), 2);
        assert_eq!(hooks.count("response"), 2);
        assert_eq!(hooks.count("action"), 2);
        assert_eq!(hooks.count("terminate"), 1);
    }

    #[tokio::test]
    async fn interrupt_stops_before_the_next_iteration() {
        let flag = Arc::new(AtomicBool::new(true));
        let model = ScriptedModel::silent();
        let hooks = Arc::new(HookCounter::default());
        let agent = Agent::new("stoppable", vec![], registry(), model.clone())
            .with_capability(hooks.clone());

        let report = agent
            .run("never mind", None, RunOptions::new().with_interrupt(flag))
            .await
            .unwrap();

        assert_eq!(report.termination, Termination::Interrupted);
        assert_eq!(report.iterations, 0);
        assert_eq!(model.call_count(), 0);
        assert_eq!(hooks.count("terminate"), 1);
    }

    #[tokio::test]
    async fn capability_init_failure_aborts_the_run() {
        let hooks = Arc::new(HookCounter::failing_init());
        let model = ScriptedModel::silent();
        let agent = Agent::new("picky", vec![], registry(), model.clone())
            .with_capability(hooks.clone());

        let err = agent.run("go", None, RunOptions::new()).await.unwrap_err();

        assert!(matches!(err, AgentError::CapabilityInit { .. }));
        assert_eq!(model.call_count(), 0);
        assert_eq!(hooks.count("terminate"), 0);
    }

    #[tokio::test]
    async fn caller_properties_are_injected() {
        let mut actions = registry();
        actions.register(
            inspect_action()
                .with_dependencies(Dependencies::none().with_property("target_language")),
        );
        let model = ScriptedModel::new(vec![
            tool_call("inspect", json!({})),
            tool_call(TERMINATE, json!({})),
        ]);
        let agent = Agent::new("polyglot", vec![], actions, model);

        let report = agent
            .run("check", None, RunOptions::new().with_property("target_language", "Rust"))
            .await
            .unwrap();

        let seen = outcome_at(&report.memory, 2);
        assert_eq!(seen["result"]["args"]["_target_language"], "Rust");
    }

    #[tokio::test]
    async fn events_are_published() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let model = ScriptedModel::new(vec![tool_call(TERMINATE, json!({}))]);
        let agent = Agent::new("observed", vec![], registry(), model).with_event_bus(bus.clone());

        agent.run("go", None, RunOptions::new()).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap().as_ref(),
            DomainEvent::ResponseGenerated { iteration: 1, .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap().as_ref(),
            DomainEvent::ActionExecuted { success: true, .. }
        ));
        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::RunFinished { agent, iterations, memory_items, .. } => {
                assert_eq!(agent, "observed");
                assert_eq!(*iterations, 1);
                assert_eq!(*memory_items, 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminal_action_stops_before_staged_commit() {
        let staged = Arc::new(StagedEnvironment::new().with_reversible(
            TERMINATE,
            handler_fn(|_call: ActionCall| async move { Ok(Value::Null) }),
        ));
        let model = ScriptedModel::new(vec![tool_call(TERMINATE, json!({}))]);
        let agent = Agent::new("closer", vec![], registry(), model.clone())
            .with_environment(staged.clone());

        let report = agent
            .run("finish", None, RunOptions::new().with_property("task_id", "t-1"))
            .await
            .unwrap();

        assert_eq!(report.termination, Termination::TerminalAction(TERMINATE.into()));
        assert_eq!(model.call_count(), 1);
        assert_eq!(staged.staged_count("t-1"), 1);
    }

    #[tokio::test]
    async fn empty_registry_is_rejected() {
        let agent = Agent::new("idle", vec![], ActionRegistry::new(), ScriptedModel::silent());
        assert!(matches!(
            agent.run("go", None, RunOptions::new()).await,
            Err(AgentError::NoActions(_))
        ));
    }
}
