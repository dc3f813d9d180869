//! Agent registry: name → runnable agent, for multi-agent delegation.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, ResolutionError};
use crate::memory::Memory;

/// What a delegated run inherits from its caller.
#[derive(Debug, Clone, Default)]
pub struct DelegationScope {
    pub registry: Option<Arc<AgentRegistry>>,
    pub properties: Map<String, Value>,
    /// Depth of the run being started (caller depth + 1)
    pub depth: usize,
    pub max_depth: usize,
}

/// Something that can run a task to completion against a memory log.
///
/// The returned memory is the log the run wrote into: the same handle that
/// was passed in.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run_task(
        &self,
        task: &str,
        memory: Memory,
        scope: DelegationScope,
    ) -> std::result::Result<Memory, Error>;
}

#[derive(Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn AgentRunner>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn AgentRunner>) {
        self.agents.insert(name.into(), agent);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AgentRunner>, ResolutionError> {
        self.agents
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::AgentNotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEntry;

    struct Echo;

    #[async_trait]
    impl AgentRunner for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn run_task(
            &self,
            task: &str,
            memory: Memory,
            _scope: DelegationScope,
        ) -> std::result::Result<Memory, Error> {
            memory.add(MemoryEntry::assistant(task));
            Ok(memory)
        }
    }

    #[tokio::test]
    async fn registered_agent_runs() {
        let mut registry = AgentRegistry::new();
        registry.register("echo", Arc::new(Echo));

        let agent = registry.get("echo").unwrap();
        let memory = agent
            .run_task("hello", Memory::new(), DelegationScope::default())
            .await
            .unwrap();
        assert_eq!(memory.last().unwrap().content, "hello");
    }

    #[test]
    fn unknown_agent_lists_available() {
        let mut registry = AgentRegistry::new();
        registry.register("developer", Arc::new(Echo));
        registry.register("code_reviewer", Arc::new(Echo));

        match registry.get("tester") {
            Err(ResolutionError::AgentNotFound { name, available }) => {
                assert_eq!(name, "tester");
                assert_eq!(available, vec!["code_reviewer", "developer"]);
            }
            other => panic!("unexpected: {:?}", other.map(|a| a.name().to_string())),
        }
    }
}
