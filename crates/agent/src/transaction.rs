//! Reversible actions grouped into all-or-nothing transactions.

use gamekit_core::action::{Action, ActionCall, ActionHandler};
use gamekit_core::context::ActionContext;
use gamekit_core::error::{ToolError, TransactionError};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::environment::inject;

/// An action paired with the handler that undoes it.
///
/// The inverse is called with `{"args": <original args>, "result": <what the
/// forward action returned>}` and the live context.
#[derive(Clone)]
pub struct ReversibleAction {
    action: Action,
    inverse: Arc<dyn ActionHandler>,
}

impl ReversibleAction {
    pub fn new(action: Action, inverse: Arc<dyn ActionHandler>) -> Self {
        Self { action, inverse }
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn name(&self) -> &str {
        self.action.name()
    }

    async fn run(
        &self,
        context: &ActionContext,
        args: Map<String, Value>,
    ) -> Result<Value, ToolError> {
        self.action.execute(inject(context, &self.action, args)).await
    }

    async fn undo(
        &self,
        context: &ActionContext,
        args: &Map<String, Value>,
        result: &Value,
    ) -> Result<Value, ToolError> {
        let mut inverse_args = Map::new();
        inverse_args.insert("args".into(), Value::Object(args.clone()));
        inverse_args.insert("result".into(), result.clone());
        self.inverse
            .invoke(ActionCall::new(inverse_args).with_context(context.clone()))
            .await
    }
}

impl std::fmt::Debug for ReversibleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReversibleAction")
            .field("action", &self.action.name())
            .finish_non_exhaustive()
    }
}

/// One forward step that ran, kept for rollback.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub action: ReversibleAction,
    pub args: Map<String, Value>,
    pub result: Value,
}

#[derive(Debug)]
pub struct Transaction {
    id: Uuid,
    actions: Vec<(ReversibleAction, Map<String, Value>)>,
    executed: Vec<ExecutionRecord>,
    committed: bool,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            actions: Vec::new(),
            executed: Vec::new(),
            committed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Stage an action. Refused once the transaction is committed.
    pub fn add(
        &mut self,
        action: ReversibleAction,
        args: Map<String, Value>,
    ) -> Result<(), TransactionError> {
        if self.committed {
            return Err(TransactionError::AlreadyCommitted(self.id.to_string()));
        }
        debug!(transaction = %self.id, action = action.name(), "Staged action");
        self.actions.push((action, args));
        Ok(())
    }

    pub fn actions(&self) -> &[(ReversibleAction, Map<String, Value>)] {
        &self.actions
    }

    pub fn executed(&self) -> &[ExecutionRecord] {
        &self.executed
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Human-readable listing of the staged steps, used for review prompts.
    pub fn describe(&self) -> String {
        self.actions
            .iter()
            .enumerate()
            .map(|(i, (action, args))| {
                format!(
                    "{}. Action: {}\n   Description: {}\n   Args: {}",
                    i + 1,
                    action.name(),
                    action.action().description(),
                    Value::Object(args.clone())
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Run every staged step in order.
    ///
    /// If a step fails, the steps that already ran are rolled back and the
    /// step error is returned. A rollback that itself fails is reported
    /// instead.
    pub async fn execute(&mut self, context: &ActionContext) -> Result<(), TransactionError> {
        if self.committed {
            return Err(TransactionError::AlreadyCommitted(self.id.to_string()));
        }

        let staged = self.actions.clone();
        for (index, (action, args)) in staged.into_iter().enumerate() {
            match action.run(context, args.clone()).await {
                Ok(result) => self.executed.push(ExecutionRecord { action, args, result }),
                Err(source) => {
                    warn!(
                        transaction = %self.id,
                        action = action.name(),
                        index,
                        error = %source,
                        "Staged action failed, rolling back"
                    );
                    self.rollback(context).await?;
                    return Err(TransactionError::StepFailed { index, source });
                }
            }
        }
        Ok(())
    }

    /// Undo executed steps in reverse order.
    ///
    /// Every inverse is attempted even after one fails; the failures are
    /// collected into [`TransactionError::RollbackFailed`].
    pub async fn rollback(&mut self, context: &ActionContext) -> Result<(), TransactionError> {
        let mut failures = Vec::new();
        while let Some(record) = self.executed.pop() {
            debug!(transaction = %self.id, action = record.action.name(), "Undoing");
            if let Err(e) = record.action.undo(context, &record.args, &record.result).await {
                warn!(
                    transaction = %self.id,
                    action = record.action.name(),
                    error = %e,
                    "Inverse failed"
                );
                failures.push(format!("{}: {e}", record.action.name()));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TransactionError::RollbackFailed { failures })
        }
    }

    pub fn commit(&mut self) -> Result<(), TransactionError> {
        if self.committed {
            return Err(TransactionError::AlreadyCommitted(self.id.to_string()));
        }
        self.committed = true;
        info!(transaction = %self.id, steps = self.executed.len(), "Transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{context, logging_inverse, recording_action};
    use gamekit_core::action::handler_fn;
    use std::sync::Mutex;

    fn step(name: &str, log: &Arc<Mutex<Vec<String>>>, fail: bool) -> ReversibleAction {
        ReversibleAction::new(recording_action(name, log, fail), logging_inverse(name, log, false))
    }

    #[tokio::test]
    async fn failed_step_rolls_back_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(vec![]);
        let mut tx = Transaction::new();
        tx.add(step("a", &log, false), Map::new()).unwrap();
        tx.add(step("b", &log, false), Map::new()).unwrap();
        tx.add(step("c", &log, true), Map::new()).unwrap();

        let err = tx.execute(&ctx).await.unwrap_err();

        assert!(matches!(err, TransactionError::StepFailed { index: 2, .. }));
        assert_eq!(*log.lock().unwrap(), vec!["do:a", "do:b", "do:c", "undo:b", "undo:a"]);
        assert!(tx.executed().is_empty());
    }

    #[tokio::test]
    async fn rollback_continues_past_failed_inverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(vec![]);
        let mut tx = Transaction::new();
        tx.add(step("a", &log, false), Map::new()).unwrap();
        tx.add(
            ReversibleAction::new(
                recording_action("b", &log, false),
                logging_inverse("b", &log, true),
            ),
            Map::new(),
        )
        .unwrap();
        tx.execute(&ctx).await.unwrap();

        let err = tx.rollback(&ctx).await.unwrap_err();

        match err {
            TransactionError::RollbackFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert!(failures[0].starts_with("b:"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("undo:a"));
    }

    #[tokio::test]
    async fn committed_transaction_refuses_new_actions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(vec![]);
        let mut tx = Transaction::new();
        tx.add(step("a", &log, false), Map::new()).unwrap();
        tx.execute(&ctx).await.unwrap();
        tx.commit().unwrap();

        assert!(matches!(
            tx.add(step("b", &log, false), Map::new()),
            Err(TransactionError::AlreadyCommitted(_))
        ));
        assert!(tx.execute(&ctx).await.is_err());
        assert!(tx.commit().is_err());
    }

    #[tokio::test]
    async fn inverse_sees_original_args_and_result() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let seen: Arc<Mutex<Option<Map<String, Value>>>> = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let inverse = handler_fn(move |call: ActionCall| {
            let sink = sink.clone();
            async move {
                *sink.lock().unwrap() = Some(call.args.clone());
                Ok(Value::Null)
            }
        });

        let ctx = context(vec![]);
        let mut tx = Transaction::new();
        let mut args = Map::new();
        args.insert("file_name".into(), Value::String("a.txt".into()));
        tx.add(ReversibleAction::new(recording_action("write", &log, false), inverse), args)
            .unwrap();
        tx.execute(&ctx).await.unwrap();
        tx.rollback(&ctx).await.unwrap();

        let seen = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen["args"]["file_name"], "a.txt");
        assert_eq!(seen["result"], "did write");
    }
}
