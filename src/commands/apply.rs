//! Event application and book resync

use crate::config::Config;
use crate::error::Result;
use crate::events::Event;
use crate::meta::Store;
use crate::sync::{RunReport, TrackedRun};
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Read an event from a file, or from stdin when the path is `-`
pub fn read_event(path: &Path) -> Result<Event> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    Event::from_json(&content)
}

/// Apply one event as a tracked run
pub async fn cmd_apply(config: &Config, store: &Store, event: &Event) -> Result<TrackedRun> {
    info!("Applying {} event", event.task_kind());
    store.propagator(config.engine).run_tracked(event).await
}

/// Re-propagate every catalog unit of a book as a tracked run
pub async fn cmd_resync(config: &Config, store: &Store, book_id: &str) -> Result<TrackedRun> {
    store
        .propagator(config.engine)
        .resync_book_tracked(book_id)
        .await
}

pub fn print_run(run: &TrackedRun) {
    match &run.report {
        RunReport::Propagation(report) => {
            println!("✓ Propagation complete (task {})", run.task_id);
            println!(
                "  Units: {} requested, {} resolved",
                report.units_requested, report.units_resolved
            );
            println!("  Plans touched: {}", report.plans_touched);
            println!("  Items created: {}", report.items_created);
            println!("  Items updated: {}", report.items_updated);
            println!("  Join rows created: {}", report.join_rows_created);
            println!("  Copy items linked: {}", report.lineage_linked);
            if !report.dropped.is_empty() {
                println!("\n⚠ Dropped units:");
                for dropped in &report.dropped {
                    println!("  {}: {}", dropped.unit_id, dropped.reason);
                }
            }
        }
        RunReport::Import(report) => {
            println!("✓ Schedule import complete (task {})", run.task_id);
            println!("  Study plan: {}", report.study_plan_id);
            println!("  Rows: {}", report.rows_requested);
            println!("  Items updated: {}", report.items_updated);
            println!("  Copy items updated: {}", report.copies_updated);
            if !report.unmatched.is_empty() {
                println!("\n⚠ No item for: {}", report.unmatched.join(", "));
            }
        }
    }
}
