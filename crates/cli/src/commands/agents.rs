//! `gamekit agents`: list the team and what each member can do.

use gamekit_config::AppConfig;
use gamekit_tools::Workspace;

use crate::team::{self, ROLES};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let catalog = team::catalog(&Workspace::new(config.workspace_dir()));

    println!("GameKit Agents");
    println!("==============");
    println!("  Workspace: {}\n", config.workspace_dir().display());

    for spec in &ROLES {
        let registry = spec.registry(&catalog)?;
        println!("  {}", spec.name);
        for goal in spec.goals() {
            println!("    goal {}: {}", goal.priority, goal.name);
        }
        println!("    tags:  {}", spec.tags.join(", "));
        println!("    tools: {}\n", registry.names().join(", "));
    }

    Ok(())
}
