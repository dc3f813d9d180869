//! GameKit CLI: the main entry point.
//!
//! Commands:
//! - `init`    : Write a default config and create the workspace
//! - `run`     : Give a task to one of the team's agents
//! - `agents`  : List the team and the tools each agent can use

use clap::{Parser, Subcommand};

mod approval;
mod commands;
mod team;

use team::EnvironmentKind;

#[derive(Parser)]
#[command(
    name = "gamekit",
    about = "GameKit: a team of cooperating AI agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and create the workspace
    Init,

    /// Run a task through an agent
    Run {
        /// The task to perform
        #[arg(short, long)]
        message: String,

        /// Which agent receives the task
        #[arg(short, long, default_value = team::PROJECT_MANAGER)]
        agent: String,

        /// Target programming language passed to every tool as `_target_language`
        #[arg(short, long)]
        language: Option<String>,

        /// Override the per-agent iteration cap
        #[arg(long)]
        max_iterations: Option<usize>,

        /// How actions are executed
        #[arg(short, long, value_enum, default_value_t = EnvironmentKind::Context)]
        environment: EnvironmentKind,

        /// Ask on the console instead of the model before staged actions run
        #[arg(long)]
        manual_approval: bool,
    },

    /// List the agents and their tools
    Agents,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Run {
            message,
            agent,
            language,
            max_iterations,
            environment,
            manual_approval,
        } => {
            commands::run::run(commands::run::RunArgs {
                message,
                agent,
                language,
                max_iterations,
                environment,
                manual_approval,
            })
            .await?
        }
        Commands::Agents => commands::agents::run().await?,
    }

    Ok(())
}
