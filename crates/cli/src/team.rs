//! The default team: a project manager who plans and delegates, a developer
//! who writes the code, and a code reviewer who checks it.

use gamekit_agent::{
    Agent, AiReviewEnvironment, ApprovalGate, Environment, FunctionCallingLanguage,
    InjectingEnvironment, ProgressTracking, StagedEnvironment, delegation_actions,
};
use gamekit_config::{AppConfig, ReviewSettings};
use gamekit_core::action::{ActionCall, ActionHandler, handler_fn};
use gamekit_core::agent::{AgentRegistry, AgentRunner};
use gamekit_core::error::{ResolutionError, ToolError};
use gamekit_core::event::EventBus;
use gamekit_core::model::LanguageModel;
use gamekit_core::prompt::Goal;
use gamekit_core::registry::{ActionRegistry, ToolCatalog, ToolFilter};
use gamekit_tools::{Workspace, default_catalog};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const PROJECT_MANAGER: &str = "project_manager";
pub const DEVELOPER: &str = "developer";
pub const CODE_REVIEWER: &str = "code_reviewer";

/// One member of the team: its goals and which catalog tags it may use.
pub struct RoleSpec {
    pub name: &'static str,
    pub tags: &'static [&'static str],
    goals: &'static [(i32, &'static str, &'static str)],
    /// `None` uses the configured default
    max_iterations: Option<usize>,
}

pub static ROLES: [RoleSpec; 3] = [
    RoleSpec {
        name: PROJECT_MANAGER,
        tags: &["expert", "agent", "coordination", "analysis", "file_operations", "general"],
        goals: &[
            (
                1,
                "Requirements Analysis",
                "Analyze the project requirements, break them into tasks, \
                 and coordinate team workflow",
            ),
            (
                2,
                "Project Planning",
                "Create implementation plans and ensure all requirements are met",
            ),
            (
                3,
                "Quality Coordination",
                "Ensure code quality through proper review and testing workflows",
            ),
        ],
        max_iterations: Some(20),
    },
    RoleSpec {
        name: DEVELOPER,
        tags: &["expert", "file_operations", "coding"],
        goals: &[
            (
                1,
                "Backend Development",
                "Develop clean, functional backend APIs using best practices",
            ),
            (
                2,
                "Code Quality",
                "Write maintainable, well-documented code with proper error handling",
            ),
            (
                3,
                "API Design",
                "Create RESTful APIs with appropriate endpoints and response formats",
            ),
        ],
        max_iterations: None,
    },
    RoleSpec {
        name: CODE_REVIEWER,
        tags: &["expert", "code_review", "file_operations"],
        goals: &[
            (
                1,
                "Code Quality Review",
                "Review code for quality, best practices, and potential issues",
            ),
            (2, "Security Analysis", "Identify security vulnerabilities and suggest improvements"),
            (3, "Performance Review", "Analyze code for performance optimization opportunities"),
        ],
        max_iterations: None,
    },
];

pub fn role(name: &str) -> Option<&'static RoleSpec> {
    ROLES.iter().find(|r| r.name == name)
}

impl RoleSpec {
    pub fn goals(&self) -> Vec<Goal> {
        self.goals
            .iter()
            .map(|(priority, name, description)| Goal::new(*priority, *name, *description))
            .collect()
    }

    /// The tag-filtered tools for this role, plus `terminate`.
    pub fn registry(&self, catalog: &ToolCatalog) -> Result<ActionRegistry, ResolutionError> {
        let mut registry =
            ActionRegistry::from_catalog(catalog, &ToolFilter::tags(self.tags.iter().copied()));
        registry.register_terminate(catalog)?;
        Ok(registry)
    }
}

/// Every built-in tool plus the delegation tools.
pub fn catalog(workspace: &Workspace) -> ToolCatalog {
    default_catalog(workspace.root()).with_all(delegation_actions())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EnvironmentKind {
    /// Run every action immediately, injecting context where declared
    Context,
    /// Hold file writes until the whole batch is reviewed
    Staged,
    /// Have the model review generated output before accepting it
    AiReview,
}

/// Build the environment every agent on the team shares.
pub fn environment(
    kind: EnvironmentKind,
    review: &ReviewSettings,
    workspace: &Workspace,
    gate: Option<Arc<dyn ApprovalGate>>,
    model_review: bool,
) -> Arc<dyn Environment> {
    match kind {
        EnvironmentKind::Context => Arc::new(InjectingEnvironment::new()),
        EnvironmentKind::Staged => {
            let mut staged = StagedEnvironment::new()
                .with_reversible("write_file", remove_written_file(workspace.clone()))
                .with_reversible("create_directory", remove_created_directory(workspace.clone()))
                .with_model_review(model_review);
            if let Some(gate) = gate {
                staged = staged.with_approval_gate(gate);
            }
            Arc::new(staged)
        }
        EnvironmentKind::AiReview => Arc::new(AiReviewEnvironment::from_settings(review)),
    }
}

/// How the team is sized.
#[derive(Debug, Clone)]
pub struct TeamSettings {
    /// Overrides every role's iteration cap when set
    pub max_iterations: Option<usize>,
    pub default_max_iterations: usize,
    pub description_limit: usize,
}

impl TeamSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: None,
            default_max_iterations: config.agent.max_iterations,
            description_limit: config.agent.description_limit,
        }
    }

    fn iterations_for(&self, role: &RoleSpec) -> usize {
        self.max_iterations
            .or(role.max_iterations)
            .unwrap_or(self.default_max_iterations)
    }
}

/// The assembled agents, reachable by name and through a shared registry.
pub struct Team {
    agents: BTreeMap<String, Arc<Agent>>,
    registry: Arc<AgentRegistry>,
}

impl Team {
    pub fn assemble(
        model: Arc<dyn LanguageModel>,
        catalog: &ToolCatalog,
        environment: Arc<dyn Environment>,
        settings: &TeamSettings,
        events: Option<Arc<EventBus>>,
    ) -> Result<Self, ResolutionError> {
        let language = Arc::new(
            FunctionCallingLanguage::new().with_description_limit(settings.description_limit),
        );

        let mut agents = BTreeMap::new();
        let mut registry = AgentRegistry::new();
        for spec in &ROLES {
            let actions = spec.registry(catalog)?;
            let mut agent = Agent::new(spec.name, spec.goals(), actions, model.clone())
                .with_language(language.clone())
                .with_environment(environment.clone())
                .with_capability(Arc::new(ProgressTracking::new()))
                .with_max_iterations(settings.iterations_for(spec));
            if let Some(bus) = &events {
                agent = agent.with_event_bus(bus.clone());
            }

            let agent = Arc::new(agent);
            registry.register(spec.name, agent.clone() as Arc<dyn AgentRunner>);
            agents.insert(spec.name.to_string(), agent);
        }

        Ok(Self {
            agents,
            registry: Arc::new(registry),
        })
    }

    pub fn agent(&self, name: &str) -> Option<&Arc<Agent>> {
        self.agents.get(name)
    }

    pub fn registry(&self) -> Arc<AgentRegistry> {
        self.registry.clone()
    }
}

// ── inverses for staged file actions ────────────────────────────────────

/// A string from the forward action's original arguments.
fn original_arg(call: &ActionCall, key: &str) -> Result<String, ToolError> {
    call.args
        .get("args")
        .and_then(|args| args.get(key))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ToolError::InvalidArguments(format!("undo is missing original '{key}'")))
}

fn remove_written_file(workspace: Workspace) -> Arc<dyn ActionHandler> {
    handler_fn(move |call: ActionCall| {
        let workspace = workspace.clone();
        async move {
            let file_name = original_arg(&call, "file_name")?;
            let path = workspace.resolve("write_file", &file_name)?;
            tokio::fs::remove_file(&path).await?;
            Ok(Value::String(format!("Removed '{file_name}'")))
        }
    })
}

/// Only an empty directory is removed; anything written into it since
/// stays put.
fn remove_created_directory(workspace: Workspace) -> Arc<dyn ActionHandler> {
    handler_fn(move |call: ActionCall| {
        let workspace = workspace.clone();
        async move {
            let directory = original_arg(&call, "directory_name")?;
            let path = workspace.resolve("create_directory", &directory)?;
            tokio::fs::remove_dir(&path).await?;
            Ok(Value::String(format!("Removed directory '{directory}'")))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gamekit_core::error::ProviderError;
    use gamekit_core::prompt::Prompt;
    use gamekit_core::registry::TERMINATE;
    use serde_json::{Map, json};

    struct NoModel;

    #[async_trait]
    impl LanguageModel for NoModel {
        fn name(&self) -> &str {
            "none"
        }

        async fn generate(&self, _prompt: &Prompt) -> Result<String, ProviderError> {
            Err(ProviderError::NotConfigured("no model in tests".into()))
        }
    }

    fn settings() -> TeamSettings {
        TeamSettings {
            max_iterations: None,
            default_max_iterations: 10,
            description_limit: 1024,
        }
    }

    #[test]
    fn every_role_gets_terminate() {
        let catalog = catalog(&Workspace::new("/tmp/gamekit"));
        for spec in &ROLES {
            let registry = spec.registry(&catalog).unwrap();
            assert!(registry.contains(TERMINATE), "{} lacks terminate", spec.name);
        }
    }

    #[test]
    fn only_the_project_manager_can_delegate() {
        let catalog = catalog(&Workspace::new("/tmp/gamekit"));
        let pm = role(PROJECT_MANAGER).unwrap().registry(&catalog).unwrap();
        let dev = role(DEVELOPER).unwrap().registry(&catalog).unwrap();

        assert!(pm.contains("call_agent"));
        assert!(pm.contains("hand_off_to_agent"));
        assert!(!dev.contains("call_agent"));
        assert!(dev.contains("consult_senior_developer"));
        assert!(dev.contains("write_file"));
    }

    #[test]
    fn reviewer_cannot_delegate() {
        let catalog = catalog(&Workspace::new("/tmp/gamekit"));
        let reviewer = role(CODE_REVIEWER).unwrap().registry(&catalog).unwrap();

        assert!(reviewer.contains("consult_code_reviewer"));
        assert!(reviewer.contains("read_file"));
        assert!(!reviewer.contains("call_agent_with_reflection"));
        assert!(!reviewer.contains("prompt_llm_for_json"));
    }

    #[test]
    fn developer_generators_fall_under_ai_review() {
        let catalog = catalog(&Workspace::new("/tmp/gamekit"));
        let dev = role(DEVELOPER).unwrap().registry(&catalog).unwrap();
        let review = ReviewSettings::default();

        assert!(dev.contains("generate_complete_function"));
        assert!(dev.names().iter().any(|name| review.review_actions.contains(name)));
    }

    #[test]
    fn team_registers_every_role() {
        let workspace = Workspace::new("/tmp/gamekit");
        let env = environment(
            EnvironmentKind::Context,
            &ReviewSettings::default(),
            &workspace,
            None,
            true,
        );
        let team = Team::assemble(Arc::new(NoModel), &catalog(&workspace), env, &settings(), None)
            .unwrap();

        assert_eq!(team.registry().names(), vec![CODE_REVIEWER, DEVELOPER, PROJECT_MANAGER]);
        assert_eq!(team.agent(PROJECT_MANAGER).unwrap().max_iterations(), 20);
        assert_eq!(team.agent(DEVELOPER).unwrap().max_iterations(), 10);
        assert_eq!(team.agent(CODE_REVIEWER).unwrap().environment().name(), "context");
    }

    #[test]
    fn iteration_override_applies_to_every_role() {
        let mut settings = settings();
        settings.max_iterations = Some(4);
        for spec in &ROLES {
            assert_eq!(settings.iterations_for(spec), 4);
        }
    }

    #[test]
    fn environment_kinds_map_to_environments() {
        let workspace = Workspace::new("/tmp/gamekit");
        let review = ReviewSettings::default();
        let name = |kind| environment(kind, &review, &workspace, None, true).name().to_string();

        assert_eq!(name(EnvironmentKind::Context), "context");
        assert_eq!(name(EnvironmentKind::Staged), "staged");
        assert_eq!(name(EnvironmentKind::AiReview), "ai_review");
    }

    #[tokio::test]
    async fn undo_removes_the_written_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "draft").unwrap();
        let inverse = remove_written_file(Workspace::new(dir.path()));

        let mut args = Map::new();
        args.insert("args".into(), json!({ "file_name": "notes.txt", "content": "draft" }));
        args.insert("result".into(), json!("ok"));
        inverse.invoke(ActionCall::new(args)).await.unwrap();

        assert!(!dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn undo_without_original_args_is_rejected() {
        let inverse = remove_created_directory(Workspace::new("/tmp/gamekit"));
        let err = inverse.invoke(ActionCall::new(Map::new())).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
