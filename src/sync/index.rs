//! Batch-scoped lookup tables
//!
//! Both indexes are built fresh for every run and dropped with it.

use crate::model::StudyPlanItem;
use std::collections::HashMap;
use tracing::warn;

/// Existing items keyed by (study plan id, content unit id)
#[derive(Debug, Default)]
pub struct IdentityIndex {
    items: HashMap<(String, String), StudyPlanItem>,
}

impl IdentityIndex {
    pub fn from_items(items: impl IntoIterator<Item = StudyPlanItem>) -> Self {
        let mut index = Self::default();
        for item in items {
            index.insert(item);
        }
        index
    }

    /// Index an item under its plan and content unit.
    ///
    /// The first item seen for a key wins. Items without a content unit are skipped.
    pub fn insert(&mut self, item: StudyPlanItem) -> bool {
        let Some(unit_id) = item.content_unit_id() else {
            warn!(item_id = %item.id, "Item has no content unit in its structure, skipping");
            return false;
        };

        let key = (item.study_plan_id.clone(), unit_id.to_string());
        if let Some(existing) = self.items.get(&key) {
            warn!(
                study_plan_id = %key.0,
                content_unit_id = %key.1,
                kept = %existing.id,
                ignored = %item.id,
                "Duplicate live items for one content unit"
            );
            return false;
        }

        self.items.insert(key, item);
        true
    }

    pub fn get(&self, study_plan_id: &str, unit_id: &str) -> Option<&StudyPlanItem> {
        self.items
            .get(&(study_plan_id.to_string(), unit_id.to_string()))
    }

    pub fn item_id(&self, study_plan_id: &str, unit_id: &str) -> Option<&str> {
        self.get(study_plan_id, unit_id).map(|item| item.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Master items materialized in the current batch, keyed by (master plan id, content unit id)
#[derive(Debug, Default)]
pub struct LineageTracker {
    masters: HashMap<(String, String), String>,
}

impl LineageTracker {
    pub fn record(&mut self, master_plan_id: &str, unit_id: &str, item_id: &str) {
        self.masters.insert(
            (master_plan_id.to_string(), unit_id.to_string()),
            item_id.to_string(),
        );
    }

    pub fn lookup(&self, master_plan_id: &str, unit_id: &str) -> Option<&str> {
        self.masters
            .get(&(master_plan_id.to_string(), unit_id.to_string()))
            .map(String::as_str)
    }
}
