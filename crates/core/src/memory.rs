//! Memory: the ordered conversation/event log of an agent run.
//!
//! Insertion order is semantically meaningful: the log is replayed verbatim
//! into the model context on every iteration. Entries are never mutated or
//! reordered once appended.
//!
//! `Memory` is a handle. Cloning it yields another handle onto the *same*
//! log, which is how a sub-agent can run against its caller's conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Who produced a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The caller or a tool result fed back to the model
    User,
    /// The model's own responses
    Assistant,
    /// Framework notes (tool side effects, selection reasoning)
    System,
    /// Observations originating from the environment
    Environment,
}

/// A single entry in the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub role: Role,

    pub content: String,

    pub timestamp: DateTime<Utc>,

    /// Free-form extra fields (`agent_source`, `type`, `operation`, ...)
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MemoryEntry {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn environment(content: impl Into<String>) -> Self {
        Self::new(Role::Environment, content)
    }

    /// Attach an extra field.
    pub fn with_field(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Read an extra field as a string.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }
}

/// Shared, append-only handle onto a memory log.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    items: Arc<Mutex<Vec<MemoryEntry>>>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fresh log pre-populated with the given entries.
    pub fn from_entries(entries: impl IntoIterator<Item = MemoryEntry>) -> Self {
        Self {
            items: Arc::new(Mutex::new(entries.into_iter().collect())),
        }
    }

    // The lock is only held for the duration of a single push or clone,
    // never across an await point.
    fn lock(&self) -> MutexGuard<'_, Vec<MemoryEntry>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry to the end of the log.
    pub fn add(&self, entry: MemoryEntry) {
        self.lock().push(entry);
    }

    /// Snapshot of every entry, oldest first.
    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.lock().clone()
    }

    /// The last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<MemoryEntry> {
        let items = self.lock();
        let start = items.len().saturating_sub(limit);
        items[start..].to_vec()
    }

    pub fn last(&self) -> Option<MemoryEntry> {
        self.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether two handles point at the same underlying log.
    pub fn shares_log_with(&self, other: &Memory) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_keep_insertion_order() {
        let memory = Memory::new();
        memory.add(MemoryEntry::user("first"));
        memory.add(MemoryEntry::assistant("second"));
        memory.add(MemoryEntry::user("third"));

        let contents: Vec<_> = memory.entries().into_iter().map(|e| e.content).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn cloned_handle_shares_the_log() {
        let memory = Memory::new();
        let handle = memory.clone();
        handle.add(MemoryEntry::user("from the clone"));

        assert_eq!(memory.len(), 1);
        assert!(memory.shares_log_with(&handle));
        assert!(!memory.shares_log_with(&Memory::new()));
    }

    #[test]
    fn recent_returns_tail() {
        let memory = Memory::from_entries((0..5).map(|i| MemoryEntry::user(i.to_string())));
        let tail: Vec<_> = memory.recent(2).into_iter().map(|e| e.content).collect();
        assert_eq!(tail, vec!["3", "4"]);
        assert_eq!(memory.recent(10).len(), 5);
    }

    #[test]
    fn extra_fields_flatten_into_json() {
        let entry = MemoryEntry::system("note").with_field("agent_source", "developer");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["agent_source"], "developer");
        assert_eq!(entry.field_str("agent_source"), Some("developer"));
    }
}
