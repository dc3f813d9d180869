//! Capabilities: hooks that extend the agent loop without changing it.

use chrono::Local;
use gamekit_core::context::ActionContext;
use gamekit_core::memory::Memory;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

use crate::environment::ActionOutcome;
use crate::error::AgentError;

/// Every hook defaults to a no-op.
///
/// `init` runs once before the first iteration and may abort the run;
/// `terminate` runs exactly once after the last, whatever ended the run.
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn init(&self, _context: &ActionContext) -> Result<(), AgentError> {
        Ok(())
    }

    fn process_prompt(&self, _context: &ActionContext, _memory: &Memory) {}

    fn process_response(&self, _context: &ActionContext, _memory: &Memory, _response: &str) {}

    fn process_action(&self, _context: &ActionContext, _outcome: &ActionOutcome) {}

    fn terminate(&self, _context: &ActionContext) {}
}

/// Counts successful and failed actions over a run.
#[derive(Debug, Default)]
pub struct ProgressTracking {
    completed: AtomicUsize,
    errors: AtomicUsize,
}

impl ProgressTracking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Capability for ProgressTracking {
    fn name(&self) -> &str {
        "progress_tracking"
    }

    fn init(&self, _context: &ActionContext) -> Result<(), AgentError> {
        self.completed.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn process_action(&self, _context: &ActionContext, outcome: &ActionOutcome) {
        if outcome.tool_executed {
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn terminate(&self, context: &ActionContext) {
        info!(
            run_id = %context.run_id(),
            completed = self.completed(),
            errors = self.errors(),
            "Run progress"
        );
    }
}

/// Keeps a `current_time` property on the context, refreshed every prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeAware;

impl TimeAware {
    pub const PROPERTY: &'static str = "current_time";

    fn stamp(context: &ActionContext) {
        context.set(Self::PROPERTY, Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
    }
}

impl Capability for TimeAware {
    fn name(&self) -> &str {
        "time_aware"
    }

    fn init(&self, context: &ActionContext) -> Result<(), AgentError> {
        Self::stamp(context);
        Ok(())
    }

    fn process_prompt(&self, context: &ActionContext, _memory: &Memory) {
        Self::stamp(context);
    }
}
