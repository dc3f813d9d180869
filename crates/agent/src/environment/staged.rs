//! Review-before-commit execution.
//!
//! Actions registered as reversible are not run while a task is staging:
//! they are collected into that task's [`Transaction`]. At the end of the
//! iteration the transaction is described to the model (or a human gate)
//! and either executed and committed, or discarded.

use async_trait::async_trait;
use gamekit_core::action::{Action, ActionHandler};
use gamekit_core::context::ActionContext;
use gamekit_core::error::TransactionError;
use gamekit_core::prompt::Prompt;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ActionOutcome, Environment, StagedOutcome, inject, invoke_guarded};
use crate::error::EnvironmentError;
use crate::transaction::{ReversibleAction, Transaction};

/// Context property consulted when no task was set explicitly.
pub const TASK_ID_PROPERTY: &str = "task_id";

/// A human (or any out-of-band) decision on a staged transaction.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn approve(&self, task_id: &str, description: &str) -> bool;
}

pub struct StagedEnvironment {
    reversible: HashMap<String, Arc<dyn ActionHandler>>,
    transactions: Mutex<HashMap<String, Transaction>>,
    current_task: Mutex<Option<String>>,
    approval_gate: Option<Arc<dyn ApprovalGate>>,
    model_review: bool,
}

impl Default for StagedEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl StagedEnvironment {
    pub fn new() -> Self {
        Self {
            reversible: HashMap::new(),
            transactions: Mutex::new(HashMap::new()),
            current_task: Mutex::new(None),
            approval_gate: None,
            model_review: true,
        }
    }

    /// Treat `action_name` as reversible, undone by `inverse`.
    pub fn with_reversible(
        mut self,
        action_name: impl Into<String>,
        inverse: Arc<dyn ActionHandler>,
    ) -> Self {
        self.reversible.insert(action_name.into(), inverse);
        self
    }

    pub fn with_approval_gate(mut self, gate: Arc<dyn ApprovalGate>) -> Self {
        self.approval_gate = Some(gate);
        self
    }

    /// With model review off, every decision goes to the approval gate.
    pub fn with_model_review(mut self, enabled: bool) -> Self {
        self.model_review = enabled;
        self
    }

    pub fn is_reversible(&self, action_name: &str) -> bool {
        self.reversible.contains_key(action_name)
    }

    pub fn set_current_task(&self, task_id: Option<String>) {
        *lock(&self.current_task) = task_id;
    }

    /// The task currently staging, falling back to the context's `task_id`.
    pub fn current_task(&self, context: &ActionContext) -> Option<String> {
        lock(&self.current_task)
            .clone()
            .or_else(|| context.get_str(TASK_ID_PROPERTY))
    }

    /// Start a fresh transaction for `task_id`, replacing any previous one.
    pub fn stage_actions(&self, task_id: &str) -> Uuid {
        let transaction = Transaction::new();
        let id = transaction.id();
        lock(&self.transactions).insert(task_id.to_string(), transaction);
        info!(task_id, transaction = %id, "Staging actions");
        id
    }

    /// Add an action to the task's transaction, opening one if needed.
    pub fn stage(
        &self,
        task_id: &str,
        action: ReversibleAction,
        args: Map<String, Value>,
    ) -> Result<(), TransactionError> {
        lock(&self.transactions)
            .entry(task_id.to_string())
            .or_default()
            .add(action, args)
    }

    pub fn staged_count(&self, task_id: &str) -> usize {
        lock(&self.transactions).get(task_id).map_or(0, Transaction::len)
    }

    /// Decide whether the task's staged actions may run.
    ///
    /// The model approves when its answer contains "approved". If the model
    /// call fails, or model review is off, the approval gate decides; with no
    /// gate the transaction is rejected.
    pub async fn review_transaction(
        &self,
        task_id: &str,
        context: &ActionContext,
    ) -> Result<bool, TransactionError> {
        let description = lock(&self.transactions)
            .get(task_id)
            .map(Transaction::describe)
            .ok_or_else(|| TransactionError::NotFound(task_id.to_string()))?;

        if self.model_review {
            let prompt = Prompt::system_and_user(
                "You review staged agent actions for safety before they are executed. \
                 Answer APPROVED if they may run, otherwise explain why not.",
                review_prompt(task_id, &description),
            );
            match context.model().generate(&prompt).await {
                Ok(response) => {
                    let approved = response.to_lowercase().contains("approved");
                    info!(task_id, approved, "Model reviewed staged actions");
                    return Ok(approved);
                }
                Err(e) => warn!(task_id, error = %e, "Model review failed, asking approval gate"),
            }
        }

        match &self.approval_gate {
            Some(gate) => Ok(gate.approve(task_id, &description).await),
            None => {
                warn!(task_id, "No approval gate configured, rejecting staged actions");
                Ok(false)
            }
        }
    }

    /// Review the current task's transaction, then execute and commit it on
    /// approval or discard it on rejection.
    pub async fn review_and_execute_staged(&self, context: &ActionContext) -> StagedOutcome {
        let Some(task_id) = self.current_task(context) else {
            return StagedOutcome {
                success: false,
                message: "No task is staging actions".into(),
            };
        };

        let approved = match self.review_transaction(&task_id, context).await {
            Ok(approved) => approved,
            Err(e) => {
                return StagedOutcome {
                    success: false,
                    message: e.to_string(),
                };
            }
        };

        let Some(mut transaction) = lock(&self.transactions).remove(&task_id) else {
            return StagedOutcome {
                success: false,
                message: TransactionError::NotFound(task_id).to_string(),
            };
        };
        let steps = transaction.len();

        if !approved {
            info!(task_id = %task_id, steps, "Staged actions rejected");
            return StagedOutcome {
                success: false,
                message: format!(
                    "Transaction for task {task_id} rejected; {steps} staged action(s) discarded"
                ),
            };
        }

        let result = match transaction.execute(context).await {
            Ok(()) => transaction.commit(),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => StagedOutcome {
                success: true,
                message: format!(
                    "Executed and committed {steps} staged action(s) for task {task_id}"
                ),
            },
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Staged execution failed");
                StagedOutcome {
                    success: false,
                    message: format!("Staged execution failed: {e}"),
                }
            }
        }
    }
}

#[async_trait]
impl Environment for StagedEnvironment {
    fn name(&self) -> &str {
        "staged"
    }

    async fn execute(
        &self,
        context: &ActionContext,
        action: &Action,
        args: Map<String, Value>,
    ) -> Result<ActionOutcome, EnvironmentError> {
        let staging = self.current_task(context).and_then(|task| {
            self.reversible
                .get(action.name())
                .map(|inverse| (task, inverse.clone()))
        });

        match staging {
            Some((task_id, inverse)) => {
                self.stage(&task_id, ReversibleAction::new(action.clone(), inverse), args)?;
                debug!(task_id = %task_id, action = action.name(), "Action staged");
                Ok(ActionOutcome::success(Value::String(format!(
                    "Staged '{}' for review in task {task_id}",
                    action.name()
                )))
                .with_field("staged", true)
                .with_field("task_id", task_id))
            }
            None => Ok(invoke_guarded(action, inject(context, action, args)).await),
        }
    }

    async fn commit_staged(&self, context: &ActionContext) -> Option<StagedOutcome> {
        let task_id = self.current_task(context)?;
        if self.staged_count(&task_id) == 0 {
            return None;
        }
        Some(self.review_and_execute_staged(context).await)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn review_prompt(task_id: &str, description: &str) -> String {
    format!(
        "Review these staged actions for safety.\n\n\
         Task ID: {task_id}\n\n\
         Staged actions:\n{description}\n\n\
         Consider:\n\
         1. Are all actions necessary for the task?\n\
         2. Could any action have unintended consequences?\n\
         3. Are the actions in a safe order?\n\
         4. Is there a safer way to achieve the same goal?\n\n\
         Should these actions be approved?"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        FailingModel, context, context_with, logging_inverse, recording_action,
    };
    use gamekit_core::memory::Memory;

    struct FixedGate(bool);

    #[async_trait]
    impl ApprovalGate for FixedGate {
        async fn approve(&self, _task_id: &str, _description: &str) -> bool {
            self.0
        }
    }

    fn staged(log: &Arc<Mutex<Vec<String>>>) -> StagedEnvironment {
        StagedEnvironment::new().with_reversible("write", logging_inverse("write", log, false))
    }

    #[tokio::test]
    async fn reversible_action_is_staged_not_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let env = staged(&log);
        env.set_current_task(Some("t1".into()));
        let ctx = context(vec![]);

        let outcome = env
            .execute(&ctx, &recording_action("write", &log, false), Map::new())
            .await
            .unwrap();

        assert!(outcome.tool_executed);
        assert_eq!(outcome.extra["staged"], true);
        assert_eq!(env.staged_count("t1"), 1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_actions_run_immediately() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let env = staged(&log);
        env.set_current_task(Some("t1".into()));
        let ctx = context(vec![]);

        env.execute(&ctx, &recording_action("read", &log, false), Map::new())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["do:read"]);
        assert_eq!(env.staged_count("t1"), 0);
    }

    #[tokio::test]
    async fn approved_transaction_executes_and_commits() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let env = staged(&log);
        let ctx = context(vec!["Looks safe. APPROVED."]);
        ctx.set(TASK_ID_PROPERTY, "from-context");

        env.execute(&ctx, &recording_action("write", &log, false), Map::new())
            .await
            .unwrap();
        let outcome = env.commit_staged(&ctx).await.unwrap();

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(*log.lock().unwrap(), vec!["do:write"]);
        assert_eq!(env.staged_count("from-context"), 0);
    }

    #[tokio::test]
    async fn rejected_transaction_is_discarded() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let env = staged(&log);
        env.set_current_task(Some("t1".into()));
        let ctx = context(vec!["This deletes production data, rejected."]);

        env.execute(&ctx, &recording_action("write", &log, false), Map::new())
            .await
            .unwrap();
        let outcome = env.review_and_execute_staged(&ctx).await;

        assert!(!outcome.success);
        assert!(outcome.message.contains("rejected"));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(env.staged_count("t1"), 0);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_gate() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let env = staged(&log).with_approval_gate(Arc::new(FixedGate(true)));
        env.stage_actions("t1");
        env.set_current_task(Some("t1".into()));
        let ctx = context_with(Arc::new(FailingModel), Memory::new());

        env.execute(&ctx, &recording_action("write", &log, false), Map::new())
            .await
            .unwrap();

        assert!(env.review_transaction("t1", &ctx).await.unwrap());
    }

    #[tokio::test]
    async fn no_gate_and_no_model_review_rejects() {
        let env = StagedEnvironment::new().with_model_review(false);
        env.stage_actions("t1");
        let ctx = context(vec![]);

        assert!(!env.review_transaction("t1", &ctx).await.unwrap());
        assert!(matches!(
            env.review_transaction("missing", &ctx).await,
            Err(TransactionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn nothing_to_commit_without_a_task() {
        let env = StagedEnvironment::new();
        assert!(env.commit_staged(&context(vec![])).await.is_none());
    }
}
