//! Study plan location

use super::{IdentityIndex, PlanRepository, ResolvedUnit, UnitFilter};
use crate::error::{Error, Result};
use crate::model::StudyPlan;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Plans reachable from a batch, and the items they already hold for its units
#[derive(Debug, Default)]
pub struct Coverage {
    plans_by_book: HashMap<String, Vec<StudyPlan>>,
    pub index: IdentityIndex,
}

impl Coverage {
    /// Live plans of a book, masters before copies
    pub fn plans_for(&self, book_id: &str) -> &[StudyPlan] {
        self.plans_by_book
            .get(book_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn plan_count(&self) -> usize {
        self.plans_by_book.values().map(Vec::len).sum()
    }
}

/// Load every plan of the batch's books in one repository call
pub async fn locate(repo: &dyn PlanRepository, units: &[ResolvedUnit]) -> Result<Coverage> {
    let mut book_ids = Vec::new();
    let mut filter = UnitFilter::default();
    for unit in units {
        if !book_ids.contains(&unit.structure.book_id) {
            book_ids.push(unit.structure.book_id.clone());
        }
        filter.push(unit.kind, &unit.unit_id);
    }

    if book_ids.is_empty() {
        return Ok(Coverage::default());
    }

    let rows = repo
        .find_items_by_books(&book_ids, &filter)
        .await
        .map_err(|e| Error::lookup("find_items_by_books", e))?;

    let mut coverage = Coverage::default();
    let mut seen = HashSet::new();
    for row in rows {
        if seen.insert(row.plan.id.clone()) {
            coverage
                .plans_by_book
                .entry(row.plan.book_id.clone())
                .or_default()
                .push(row.plan);
        }
        if let Some(item) = row.item {
            coverage.index.insert(item);
        }
    }

    for plans in coverage.plans_by_book.values_mut() {
        plans.sort_by_key(StudyPlan::tier);
    }

    debug!(
        "Located {} plan(s) across {} book(s), {} existing item(s)",
        coverage.plan_count(),
        book_ids.len(),
        coverage.index.len()
    );

    Ok(coverage)
}
