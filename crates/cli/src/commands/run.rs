//! `gamekit run`: hand a task to one agent of the team and print the log.

use gamekit_agent::{ApprovalGate, RunOptions, Termination};
use gamekit_config::AppConfig;
use gamekit_core::event::{DomainEvent, EventBus};
use gamekit_core::memory::Role;
use gamekit_core::model::LanguageModel;
use gamekit_providers::OpenAiCompatModel;
use gamekit_tools::Workspace;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::approval::ConsoleApprovalGate;
use crate::team::{self, EnvironmentKind, Team, TeamSettings};

pub struct RunArgs {
    pub message: String,
    pub agent: String,
    pub language: Option<String>,
    pub max_iterations: Option<usize>,
    pub environment: EnvironmentKind,
    pub manual_approval: bool,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early, with a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    GAMEKIT_API_KEY=sk-...   (preferred)");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let spec = team::role(&args.agent).ok_or_else(|| {
        let known: Vec<&str> = team::ROLES.iter().map(|r| r.name).collect();
        format!("Unknown agent '{}'. Available: {}", args.agent, known.join(", "))
    })?;

    let model: Arc<dyn LanguageModel> = Arc::new(OpenAiCompatModel::from_config(&config)?);

    let workspace = Workspace::new(config.workspace_dir());
    tokio::fs::create_dir_all(workspace.root()).await?;

    let gate: Option<Arc<dyn ApprovalGate>> = match args.environment {
        EnvironmentKind::Staged => Some(Arc::new(ConsoleApprovalGate)),
        _ => None,
    };
    let environment = team::environment(
        args.environment,
        &config.review,
        &workspace,
        gate,
        !args.manual_approval,
    );

    let mut settings = TeamSettings::from_config(&config);
    settings.max_iterations = args.max_iterations;

    let events = Arc::new(EventBus::default());
    log_events(&events);

    let team = Team::assemble(
        model,
        &team::catalog(&workspace),
        environment,
        &settings,
        Some(events.clone()),
    )?;
    let agent = team
        .agent(spec.name)
        .ok_or_else(|| format!("Agent '{}' was not assembled", spec.name))?;

    let interrupt = Arc::new(AtomicBool::new(false));
    {
        let flag = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping before the next iteration");
                flag.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut properties = config.properties.clone();
    if let Some(language) = args.language {
        properties.insert("target_language".into(), Value::String(language));
    }
    if args.environment == EnvironmentKind::Staged {
        properties.insert("task_id".into(), Value::String(Uuid::new_v4().to_string()));
    }

    let options = RunOptions::new()
        .with_properties(properties)
        .with_agent_registry(team.registry())
        .with_interrupt(interrupt)
        .with_max_delegation_depth(config.agent.max_delegation_depth);

    info!(agent = spec.name, environment = ?args.environment, "Running task");
    let report = agent.run(&args.message, None, options).await?;

    let entries = report.memory.entries();
    if let Some(last) = entries.last() {
        println!("\nFinal Result: {}", last.content);
    }
    println!("\nFull Memory:");
    for entry in &entries {
        println!(
            "[{}] ({}): {}\n",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            role_label(entry.role),
            entry.content
        );
    }

    match report.termination {
        Termination::TerminalAction(_) => {
            println!("Finished after {} iteration(s).", report.iterations)
        }
        other => println!("Stopped after {} iteration(s): {other}", report.iterations),
    }

    Ok(())
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::System => "system",
        Role::Environment => "environment",
    }
}

/// Mirror the run's domain events into the log.
fn log_events(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => match event.as_ref() {
                    DomainEvent::ResponseGenerated {
                        agent,
                        iteration,
                        response_chars,
                        ..
                    } => debug!(agent = %agent, iteration, response_chars, "Model responded"),
                    DomainEvent::ActionExecuted {
                        agent,
                        action,
                        success,
                        duration_ms,
                        ..
                    } => info!(
                        agent = %agent,
                        action = %action,
                        success,
                        duration_ms,
                        "Action executed"
                    ),
                    DomainEvent::RunFinished {
                        agent,
                        iterations,
                        termination,
                        ..
                    } => info!(
                        agent = %agent,
                        iterations,
                        termination = %termination,
                        "Run finished"
                    ),
                    DomainEvent::ErrorOccurred {
                        context,
                        error_message,
                        ..
                    } => warn!(context = %context, error = %error_message, "Run error"),
                },
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Event log fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}
