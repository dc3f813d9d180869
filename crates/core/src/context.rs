//! ActionContext: the per-run bag of shared resources.
//!
//! One context exists per agent run (and per delegated sub-run). It is a
//! handle: cloning it gives another view of the same run, so a property set
//! by a capability hook is visible to every tool invoked afterwards.

use serde_json::{Map, Value};
use std::sync::{Arc, PoisonError, RwLock};
use uuid::Uuid;

use crate::agent::AgentRegistry;
use crate::memory::Memory;
use crate::model::LanguageModel;

/// Default limit on nested agent delegation.
pub const DEFAULT_MAX_DELEGATION_DEPTH: usize = 3;

#[derive(Clone)]
pub struct ActionContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    run_id: Uuid,
    model: Arc<dyn LanguageModel>,
    memory: Memory,
    agent_registry: Option<Arc<AgentRegistry>>,
    caller_properties: Map<String, Value>,
    properties: RwLock<Map<String, Value>>,
    depth: usize,
    max_delegation_depth: usize,
}

impl ActionContext {
    pub fn builder(model: Arc<dyn LanguageModel>, memory: Memory) -> ActionContextBuilder {
        ActionContextBuilder {
            model,
            memory,
            agent_registry: None,
            metadata: Map::new(),
            caller_properties: Map::new(),
            depth: 0,
            max_delegation_depth: DEFAULT_MAX_DELEGATION_DEPTH,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.inner.model
    }

    pub fn memory(&self) -> &Memory {
        &self.inner.memory
    }

    pub fn agent_registry(&self) -> Option<&Arc<AgentRegistry>> {
        self.inner.agent_registry.as_ref()
    }

    /// Properties the caller supplied to the run, without run metadata
    /// or anything capabilities set later. Delegated runs inherit these.
    pub fn caller_properties(&self) -> &Map<String, Value> {
        &self.inner.caller_properties
    }

    /// How many delegations deep this run is (0 for a top-level run).
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    pub fn max_delegation_depth(&self) -> usize {
        self.inner.max_delegation_depth
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.read().get(key).and_then(Value::as_str).map(str::to_string)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.write().insert(key.into(), value.into());
    }

    pub fn update(&self, properties: Map<String, Value>) {
        self.write().extend(properties);
    }

    /// Snapshot of every property.
    pub fn properties(&self) -> Map<String, Value> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Map<String, Value>> {
        self.inner.properties.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Map<String, Value>> {
        self.inner.properties.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("run_id", &self.inner.run_id)
            .field("model", &self.inner.model.name())
            .field("memory_items", &self.inner.memory.len())
            .field("has_agent_registry", &self.inner.agent_registry.is_some())
            .field("depth", &self.inner.depth)
            .finish_non_exhaustive()
    }
}

pub struct ActionContextBuilder {
    model: Arc<dyn LanguageModel>,
    memory: Memory,
    agent_registry: Option<Arc<AgentRegistry>>,
    metadata: Map<String, Value>,
    caller_properties: Map<String, Value>,
    depth: usize,
    max_delegation_depth: usize,
}

impl ActionContextBuilder {
    pub fn agent_registry(mut self, registry: Option<Arc<AgentRegistry>>) -> Self {
        self.agent_registry = registry;
        self
    }

    /// Fixed run metadata such as `agent_name`.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Caller-supplied properties. These win over metadata on key collision.
    pub fn caller_properties(mut self, properties: Map<String, Value>) -> Self {
        self.caller_properties = properties;
        self
    }

    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    pub fn max_delegation_depth(mut self, limit: usize) -> Self {
        self.max_delegation_depth = limit;
        self
    }

    pub fn build(self) -> ActionContext {
        let mut properties = self.metadata;
        properties.extend(self.caller_properties.clone());

        ActionContext {
            inner: Arc::new(ContextInner {
                run_id: Uuid::new_v4(),
                model: self.model,
                memory: self.memory,
                agent_registry: self.agent_registry,
                caller_properties: self.caller_properties,
                properties: RwLock::new(properties),
                depth: self.depth,
                max_delegation_depth: self.max_delegation_depth,
            }),
        }
    }
}
