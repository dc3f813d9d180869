//! `gamekit init`: write the default config and create the workspace.

use gamekit_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("GameKit Setup");
    println!("=============\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("  Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n  Config already exists at: {}", config_path.display());
        println!("  Edit it manually or delete it and re-run init.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("  Created config.toml at: {}", config_path.display());
    }

    let config =
        AppConfig::load_from(&config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let workspace_dir = config.workspace_dir();
    if !workspace_dir.exists() {
        std::fs::create_dir_all(&workspace_dir)?;
        println!("  Created workspace directory: {}", workspace_dir.display());
    }

    println!("\n  Next steps:");
    println!("   1. Set GAMEKIT_API_KEY (or api_key in {})", config_path.display());
    println!("   2. Run: gamekit run -m \"<your task>\"\n");

    Ok(())
}
