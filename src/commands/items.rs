//! Study plan listing commands

use crate::error::{Error, Result};
use crate::meta::{Store, SyncTask};
use crate::model::{StudyPlan, StudyPlanItem, TaskStatus};
use crate::sync::PlanRepository;
use serde::{Deserialize, Serialize};

/// A plan with its items in reading order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanItems {
    pub plan: StudyPlan,
    pub items: Vec<StudyPlanItem>,
}

pub async fn cmd_list_items(store: &Store, study_plan_id: &str) -> Result<PlanItems> {
    let plan = store
        .find_study_plan(study_plan_id)
        .await?
        .ok_or_else(|| Error::StudyPlanNotFound(study_plan_id.to_string()))?;
    let items = store.list_plan_items(study_plan_id).await?;
    Ok(PlanItems { plan, items })
}

pub async fn cmd_list_plans(store: &Store) -> Result<Vec<StudyPlan>> {
    store.list_study_plans().await
}

pub async fn cmd_list_tasks(store: &Store, limit: i64) -> Result<Vec<SyncTask>> {
    store.list_tasks(limit).await
}

fn fmt_date(date: Option<chrono::DateTime<chrono::Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn print_items(listing: &PlanItems) {
    let plan = &listing.plan;
    println!(
        "\n📘 {} [{}] book {}",
        plan.name.as_deref().unwrap_or(&plan.id),
        plan.tier(),
        plan.book_id
    );
    if let Some(master) = &plan.master_study_plan_id {
        println!("  Master: {}", master);
    }
    println!();

    if listing.items.is_empty() {
        println!("No items. Apply a content event or run 'studyplan-sync resync <book>'.");
        return;
    }

    for item in &listing.items {
        let (kind, unit) = item
            .content_unit()
            .map(|(k, u)| (k.to_string(), u.to_string()))
            .unwrap_or_default();
        println!("• {} {} [{}] #{}", kind, unit, item.status, item.display_order);
        println!("  ID: {}", item.id);
        println!(
            "  Window: {} → {}  Available: {} → {}",
            fmt_date(item.start_date),
            fmt_date(item.end_date),
            fmt_date(item.available_from),
            fmt_date(item.available_to)
        );
        if let Some(source) = &item.copied_from_item_id {
            println!("  Copied from: {}", source);
        }
    }
}

pub fn print_plans(plans: &[StudyPlan]) {
    println!("\n📚 Study Plans\n");

    if plans.is_empty() {
        println!("No study plans. Use 'studyplan-sync catalog load' to add some.");
        return;
    }

    for plan in plans {
        println!(
            "• {} [{}] book {}",
            plan.name.as_deref().unwrap_or(&plan.id),
            plan.tier(),
            plan.book_id
        );
        println!("  ID: {}", plan.id);
    }
}

pub fn print_tasks(tasks: &[SyncTask]) {
    println!("\n🗂 Sync Tasks\n");

    if tasks.is_empty() {
        println!("No tasks recorded yet.");
        return;
    }

    for task in tasks {
        let marker = match task.get_status() {
            Ok(TaskStatus::Completed) => "✓",
            Ok(TaskStatus::Error) => "✗",
            Ok(TaskStatus::InProgress) => "…",
            Err(_) => "?",
        };
        println!("{} {} [{}] {}", marker, task.kind, task.status, task.started_at);
        println!("  ID: {}", task.task_id);
        if let Some(detail) = &task.detail {
            println!("  Detail: {}", detail);
        }
    }
}
