use crate::project;
use anyhow::{Context, Result};
use scry_core::config::Config;
use std::path::Path;

pub fn run(path: Option<String>, config_file: Option<&Path>, force: bool) -> Result<()> {
    let root = project::resolve_root(path)?;
    let config = Config::load_with_file(&root, config_file)
        .map_err(|e| anyhow::anyhow!("failed to load config: {e}"))?;

    let meta_dir = config.meta_dir(&root);
    let config_path = meta_dir.join("config.toml");
    if config_path.exists() && !force {
        println!("Project already initialized: {}", meta_dir.display());
        println!("Pass --force to recreate the store and rewrite config.toml.");
        return Ok(());
    }

    std::fs::create_dir_all(&meta_dir).context("failed to create metadata directory")?;
    std::fs::create_dir_all(config.hybrid_dir(&root)).context("failed to create hybrid index directory")?;
    std::fs::create_dir_all(config.logs_dir(&root)).context("failed to create logs directory")?;
    std::fs::create_dir_all(config.backups_dir(&root)).context("failed to create backups directory")?;

    let toml = toml::to_string_pretty(&config).context("failed to serialize default config")?;
    std::fs::write(&config_path, toml).context("failed to write config.toml")?;

    // Opening the store creates the schema and runs the integrity checks
    // that a later `diagnose` relies on having already passed once.
    project::open_store(&root, &config)?;

    println!("Initialized scry project in {}", meta_dir.display());
    println!("  config:  {}", config_path.display());
    println!("  store:   {}", config.db_path(&root).display());
    println!("  hybrid:  {}", config.hybrid_dir(&root).display());
    println!();
    println!("Next step: run `scry index` to index your codebase.");

    tracing::info!(root = %root.display(), "project initialized");
    Ok(())
}
