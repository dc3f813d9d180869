//! Domain event system: observation of agent runs without coupling.
//!
//! The agent loop publishes events as it goes. Anything that wants to watch
//! a run (the CLI's progress output, tests) subscribes to the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The model produced a response for an iteration
    ResponseGenerated {
        agent: String,
        iteration: usize,
        model: String,
        response_chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// An action was dispatched through the environment
    ActionExecuted {
        agent: String,
        action: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A run ended, for whatever reason
    RunFinished {
        agent: String,
        iterations: usize,
        termination: String,
        memory_items: usize,
        timestamp: DateTime<Utc>,
    },

    /// An error was caught and handled
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
