//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::Store;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone)]
pub struct InitOptions {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub force: bool,
}

/// Where init put things
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitOutcome {
    pub config_path: String,
    pub db_path: String,
    pub overwritten: bool,
}

/// Initialize studyplan-sync configuration and database
pub async fn cmd_init(options: InitOptions) -> Result<InitOutcome> {
    let InitOptions {
        base_dir,
        config_path,
        force,
    } = options;

    let overwritten = config_path.exists();
    if overwritten && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    let mut config = Config::default();
    config.init_paths(Some(base_dir));
    config.paths.config_file = config_path;
    config.save()?;

    // Schema creation is idempotent, so an existing database keeps its data
    let store = Store::connect(&config).await?;
    store.init_schema().await?;

    info!("Initialized studyplan-sync at {:?}", config.paths.base_dir);

    Ok(InitOutcome {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        overwritten,
    })
}

pub fn print_init(outcome: &InitOutcome) {
    println!("✓ studyplan-sync initialized successfully");
    println!("  Config: {}", outcome.config_path);
    println!("  Database: {}", outcome.db_path);
    println!("\nNext steps:");
    println!("  1. Load a catalog: studyplan-sync catalog load catalog.json");
    println!("  2. Apply an event: studyplan-sync apply event.json");
}
