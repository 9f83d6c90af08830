//! Item materialization

use super::ResolvedUnit;
use crate::error::{Error, Result};
use crate::model::{new_item_id, ItemStatus, StudyPlan, StudyPlanItem};
use chrono::{DateTime, Utc};

/// Item payload ready for upsert
#[derive(Debug, Clone)]
pub struct Materialized {
    pub item: StudyPlanItem,
    /// True when the item id was minted in this run
    pub is_new: bool,
}

/// Build the item for one (plan, unit) pair.
///
/// An existing item keeps its id, status, creation time and lineage; only the
/// structure, display order and supplied dates change. Display order always comes from
/// the event, 0 when absent. Lineage is set by the caller.
pub fn materialize(
    plan: &StudyPlan,
    unit: &ResolvedUnit,
    existing: Option<&StudyPlanItem>,
    allow_clear: bool,
    now: DateTime<Utc>,
) -> Result<Materialized> {
    let mut structure = unit.structure.clone();
    if let Some(course_id) = plan.course_id.as_deref().filter(|c| !c.is_empty()) {
        structure.course_id = course_id.to_string();
    }

    let flatten = structure.flatten().ok_or_else(|| Error::Resolution {
        unit_id: unit.unit_id.clone(),
        reason: "structure has no content unit".to_string(),
    })?;

    let (mut item, is_new) = match existing {
        Some(existing) => (existing.clone(), false),
        None => (
            StudyPlanItem {
                id: new_item_id(),
                study_plan_id: plan.id.clone(),
                content_structure: structure.clone(),
                content_structure_flatten: flatten.clone(),
                display_order: 0,
                status: ItemStatus::Active,
                start_date: None,
                end_date: None,
                available_from: None,
                available_to: None,
                copied_from_item_id: None,
                created_at: now,
                updated_at: now,
            },
            true,
        ),
    };

    item.content_structure = structure;
    item.content_structure_flatten = flatten;
    item.display_order = unit.display_order.unwrap_or(0);
    item.updated_at = now;
    unit.times.apply(&mut item, allow_clear);

    Ok(Materialized { item, is_new })
}
