//! Study plan item propagation
//!
//! This module keeps study plans in step with the content catalog:
//! - Resolving content units to their catalog structure
//! - Locating every plan of the affected books in one read
//! - Materializing one item per (study plan, content unit), reusing existing ids
//! - Linking copy items to the master item of the same batch
//! - Committing items and join rows in a single transaction
//!
//! The engine talks to storage only through the traits below.

mod executor;
mod index;
mod locate;
mod materialize;
mod resolve;

pub use executor::*;
pub use index::*;
pub use locate::*;
pub use materialize::*;
pub use resolve::*;

use crate::error::Result;
use crate::model::{ContentKind, ContentStructure, JoinRow, StudyPlan, StudyPlanItem, TaskStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A content unit as listed by the catalog for a book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogUnit {
    pub kind: ContentKind,
    pub unit_id: String,
    pub topic_id: String,
    pub display_order: i32,
}

/// Content units a located item must reference, split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFilter {
    pub lo_ids: Vec<String>,
    pub assignment_ids: Vec<String>,
}

impl UnitFilter {
    pub fn push(&mut self, kind: ContentKind, unit_id: &str) {
        let ids = match kind {
            ContentKind::LearningObjective => &mut self.lo_ids,
            ContentKind::Assignment => &mut self.assignment_ids,
        };
        if !ids.iter().any(|id| id == unit_id) {
            ids.push(unit_id.to_string());
        }
    }

    pub fn ids(&self, kind: ContentKind) -> &[String] {
        match kind {
            ContentKind::LearningObjective => &self.lo_ids,
            ContentKind::Assignment => &self.assignment_ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lo_ids.is_empty() && self.assignment_ids.is_empty()
    }
}

/// A live study plan, with one of its items matching the filter if there is one
#[derive(Debug, Clone)]
pub struct LocatedRow {
    pub plan: StudyPlan,
    pub item: Option<StudyPlanItem>,
}

/// Everything one run writes
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub items: Vec<StudyPlanItem>,
    pub join_rows: Vec<JoinRow>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.join_rows.is_empty()
    }
}

/// Row counts reported by a successful commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub items_upserted: u64,
    /// Join rows actually inserted; rows that already existed are not counted
    pub join_rows_inserted: u64,
}

/// Read access to the content catalog
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve units of one kind to their structures. Units the catalog does not know
    /// are absent from the returned map.
    async fn resolve_structures(
        &self,
        kind: ContentKind,
        unit_ids: &[String],
    ) -> Result<HashMap<String, ContentStructure>>;

    /// Every learning objective and assignment in a book, in catalog order
    async fn list_book_units(&self, book_id: &str) -> Result<Vec<CatalogUnit>>;
}

/// Study plan storage
#[async_trait]
pub trait PlanRepository: Send + Sync {
    /// Live plans of the given books, each joined to its live items that reference a
    /// filtered unit. A plan without matching items appears once with `item: None`.
    /// Master plans come first.
    async fn find_items_by_books(
        &self,
        book_ids: &[String],
        filter: &UnitFilter,
    ) -> Result<Vec<LocatedRow>>;

    async fn find_study_plan(&self, study_plan_id: &str) -> Result<Option<StudyPlan>>;

    async fn find_items_by_study_plan(&self, study_plan_id: &str) -> Result<Vec<StudyPlanItem>>;

    /// Live items of live plans whose `copied_from_item_id` is one of `item_ids`
    async fn find_items_copied_from(&self, item_ids: &[String]) -> Result<Vec<StudyPlanItem>>;

    /// Upsert items, then insert join rows, in one transaction.
    ///
    /// Failures come back as `Error::Write` naming the step; nothing is persisted.
    async fn commit(&self, batch: &WriteBatch) -> Result<CommitOutcome>;
}

/// Bookkeeping for tracked runs
#[async_trait]
pub trait TaskTracker: Send + Sync {
    /// Record a new task in progress and return its id
    async fn start_task(&self, kind: &str) -> Result<String>;

    async fn finish_task(&self, task_id: &str, status: TaskStatus, detail: Option<&str>)
        -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_filter_dedupes_per_kind() {
        let mut filter = UnitFilter::default();
        assert!(filter.is_empty());

        filter.push(ContentKind::LearningObjective, "lo-1");
        filter.push(ContentKind::LearningObjective, "lo-1");
        filter.push(ContentKind::Assignment, "lo-1");

        assert_eq!(filter.ids(ContentKind::LearningObjective), ["lo-1".to_string()]);
        assert_eq!(filter.ids(ContentKind::Assignment).len(), 1);
        assert!(!filter.is_empty());
    }
}
