//! Catalog loading

use crate::error::Result;
use crate::meta::{CatalogFixture, FixtureStats, Store};
use std::path::Path;
use tracing::info;

/// Load books, chapters, topics, content units and study plans from a JSON file
pub async fn cmd_load_catalog(store: &Store, path: &Path) -> Result<FixtureStats> {
    info!("Loading catalog from {:?}", path);
    let content = std::fs::read_to_string(path)?;
    let fixture: CatalogFixture = serde_json::from_str(&content)?;
    store.load_fixture(&fixture).await
}

pub fn print_catalog_stats(stats: &FixtureStats) {
    println!("✓ Catalog loaded");
    println!("  Books: {}", stats.books);
    println!("  Chapters: {}", stats.chapters);
    println!("  Topics: {}", stats.topics);
    println!("  Content units: {}", stats.units);
    println!("  Study plans: {}", stats.study_plans);
}
