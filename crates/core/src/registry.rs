//! Action registry and the tool catalog it is built from.
//!
//! The [`ToolCatalog`] is assembled explicitly by the composition root and
//! holds every tool the program knows about. Each agent then gets its own
//! [`ActionRegistry`], either registered by hand or filtered out of the
//! catalog by tag and name.

use std::collections::BTreeMap;

use crate::action::Action;
use crate::error::ResolutionError;

/// Name of the built-in terminal action.
pub const TERMINATE: &str = "terminate";

/// The set of actions available to one agent.
///
/// Backed by a `BTreeMap` so that `get_actions` is ordered by name and
/// prompts built from it are deterministic.
#[derive(Debug, Clone, Default)]
pub struct ActionRegistry {
    actions: BTreeMap<String, Action>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an action. Replaces any existing action with the same name.
    pub fn register(&mut self, action: Action) {
        self.actions.insert(action.name().to_string(), action);
    }

    /// Look up an action by name.
    pub fn get_action(&self, name: &str) -> Result<&Action, ResolutionError> {
        self.actions
            .get(name)
            .ok_or_else(|| ResolutionError::ActionNotFound {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Every registered action, ordered by name.
    pub fn get_actions(&self) -> Vec<&Action> {
        self.actions.values().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Build a registry from the catalog entries that pass `filter`.
    ///
    /// `terminate` is never admitted this way; call
    /// [`register_terminate`](Self::register_terminate) to opt in.
    pub fn from_catalog(catalog: &ToolCatalog, filter: &ToolFilter) -> Self {
        let mut registry = Self::new();
        for action in catalog.actions.values() {
            if action.name() != TERMINATE && filter.admits(action) {
                registry.register(action.clone());
            }
        }
        registry
    }

    /// Copy the catalog's `terminate` action into this registry.
    pub fn register_terminate(&mut self, catalog: &ToolCatalog) -> Result<(), ResolutionError> {
        let terminate = catalog
            .get(TERMINATE)
            .ok_or(ResolutionError::TerminateUnavailable)?;
        self.register(terminate.clone());
        Ok(())
    }
}

/// Which catalog entries an agent should receive.
///
/// An action is admitted when it carries any of `tags` (or `tags` is empty)
/// and it is listed in `names` (or `names` is empty). An empty filter admits
/// everything except `terminate`.
#[derive(Debug, Clone, Default)]
pub struct ToolFilter {
    pub tags: Vec<String>,
    pub names: Vec<String>,
}

impl ToolFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            names: Vec::new(),
        }
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    fn admits(&self, action: &Action) -> bool {
        let tagged = self.tags.is_empty() || self.tags.iter().any(|t| action.has_tag(t));
        let named = self.names.is_empty() || self.names.iter().any(|n| n == action.name());
        tagged && named
    }
}

/// Every tool known to the program, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    actions: BTreeMap<String, Action>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, action: Action) -> Self {
        self.insert(action);
        self
    }

    pub fn with_all(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        for action in actions {
            self.insert(action);
        }
        self
    }

    pub fn insert(&mut self, action: Action) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.actions.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
