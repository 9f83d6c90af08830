//! Status command implementation

use crate::config::{Config, EngineConfig};
use crate::error::Result;
use crate::meta::{GlobalStats, Store};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub engine: EngineConfig,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, store: &Store) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = store.global_stats().await?;

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        engine: config.engine,
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\n📊 studyplan-sync Status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("\nEngine:");
    println!(
        "  Explicit null clears dates: {}",
        status.engine.allow_explicit_clear
    );
    println!(
        "  Master imports reach copies: {}",
        status.engine.propagate_import_to_copies
    );
    println!("\nDatabase Stats:");
    println!("  Books: {}", status.db_stats.book_count);
    println!(
        "  Study plans: {} ({} master)",
        status.db_stats.study_plan_count, status.db_stats.master_plan_count
    );
    println!("  Items: {}", status.db_stats.item_count);
    println!("  Join rows: {}", status.db_stats.join_row_count);
    println!("  Tasks: {}", status.db_stats.task_count);
}
