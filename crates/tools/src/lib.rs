//! Built-in tool implementations for GameKit.
//!
//! Tools give agents the ability to act: read and write files inside a
//! workspace, consult the model as an expert, generate and review code, and
//! end the run.
//!
//! Nothing registers itself. The composition root calls
//! [`default_catalog`] (or assembles its own `ToolCatalog`) and filters it
//! per agent.

pub mod codegen;
pub mod file_ops;
pub mod prompt_tools;
pub mod terminate;
pub mod workspace;

#[cfg(test)]
pub(crate) mod test_helpers;

use gamekit_core::registry::ToolCatalog;
use std::path::PathBuf;

pub use codegen::{codegen_actions, extract_function_body};
pub use file_ops::file_actions;
pub use prompt_tools::{extract_json_block, prompt_actions, prompt_expert, prompt_for_json};
pub use terminate::TerminateTool;
pub use workspace::Workspace;

/// A catalog with every built-in tool, file tools rooted at `workspace`.
pub fn default_catalog(workspace: impl Into<PathBuf>) -> ToolCatalog {
    let workspace = Workspace::new(workspace);
    ToolCatalog::new()
        .with(TerminateTool::action())
        .with_all(file_actions(&workspace))
        .with_all(prompt_actions())
        .with_all(codegen_actions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamekit_core::registry::{ActionRegistry, TERMINATE, ToolFilter};

    #[test]
    fn default_catalog_contains_builtins() {
        let catalog = default_catalog("/tmp/gamekit");
        assert_eq!(catalog.len(), 16);
        assert!(catalog.get(TERMINATE).unwrap().is_terminal());
        assert!(catalog.get("consult_senior_developer").is_some());
    }

    #[test]
    fn coding_filter_selects_developer_tools() {
        let catalog = default_catalog("/tmp/gamekit");
        let registry = ActionRegistry::from_catalog(&catalog, &ToolFilter::tags(["coding"]));
        assert_eq!(
            registry.names(),
            vec!["consult_senior_developer", "generate_complete_function"]
        );
    }

    #[test]
    fn name_allow_list_restricts_a_tag_filter() {
        let catalog = default_catalog("/tmp/gamekit");
        let filter = ToolFilter::tags(["general"]).with_names(["read_file"]);
        let registry = ActionRegistry::from_catalog(&catalog, &filter);
        assert_eq!(registry.names(), vec!["read_file"]);
    }
}
