//! Propagation executor
//!
//! Ties resolution, location, materialization and lineage together, then commits the
//! whole batch through the repository in one transaction.

use super::{
    locate, materialize, resolve_units, Catalog, DroppedUnit, LineageTracker, PlanRepository,
    Resolution, TaskTracker, WriteBatch,
};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::{ContentUnitsCreated, CreatedUnit, Event, ScheduleImport};
use crate::model::{ContentKind, JoinRow, StudyPlanItem, TaskStatus, TimeOverrides};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outcome of a content propagation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationReport {
    pub units_requested: usize,
    pub units_resolved: usize,
    pub dropped: Vec<DroppedUnit>,
    pub plans_touched: usize,
    pub items_created: usize,
    pub items_updated: usize,
    pub join_rows_created: u64,
    pub lineage_linked: usize,
}

/// Outcome of a schedule import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub study_plan_id: String,
    pub rows_requested: usize,
    pub items_updated: usize,
    pub copies_updated: usize,
    /// Requested content units with no item in the plan
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunReport {
    Propagation(PropagationReport),
    Import(ImportReport),
}

/// A run recorded in the task tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedRun {
    pub task_id: String,
    pub report: RunReport,
}

/// The propagation engine
#[derive(Clone)]
pub struct Propagator {
    catalog: Arc<dyn Catalog>,
    repo: Arc<dyn PlanRepository>,
    tasks: Arc<dyn TaskTracker>,
    settings: EngineConfig,
}

impl Propagator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        repo: Arc<dyn PlanRepository>,
        tasks: Arc<dyn TaskTracker>,
        settings: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            repo,
            tasks,
            settings,
        }
    }

    pub fn settings(&self) -> EngineConfig {
        self.settings
    }

    /// Apply an event without task tracking
    pub async fn apply(&self, event: &Event) -> Result<RunReport> {
        match event {
            Event::ContentUnitsCreated(e) => self.propagate(e).await.map(RunReport::Propagation),
            Event::ScheduleImport(e) => self.import_schedule(e).await.map(RunReport::Import),
        }
    }

    /// Apply an event and record it as a sync task.
    ///
    /// Invalid events are rejected before a task row is written.
    pub async fn run_tracked(&self, event: &Event) -> Result<TrackedRun> {
        event.validate()?;
        self.tracked(event.task_kind(), self.apply(event)).await
    }

    /// Resync a book and record it as a sync task
    pub async fn resync_book_tracked(&self, book_id: &str) -> Result<TrackedRun> {
        let run = async {
            self.resync_book(book_id)
                .await
                .map(RunReport::Propagation)
        };
        self.tracked("book_resync", run).await
    }

    async fn tracked<F>(&self, kind: &str, run: F) -> Result<TrackedRun>
    where
        F: Future<Output = Result<RunReport>>,
    {
        let task_id = self.tasks.start_task(kind).await?;
        info!(task_id = %task_id, kind, "Sync task started");

        match run.await {
            Ok(report) => {
                self.tasks
                    .finish_task(&task_id, TaskStatus::Completed, None)
                    .await?;
                info!(task_id = %task_id, "Sync task completed");
                Ok(TrackedRun { task_id, report })
            }
            Err(err) => {
                let detail = err.to_string();
                error!(task_id = %task_id, retryable = err.is_retryable(), "Sync task failed: {}", detail);
                if let Err(e) = self
                    .tasks
                    .finish_task(&task_id, TaskStatus::Error, Some(&detail))
                    .await
                {
                    warn!(task_id = %task_id, "Could not record task failure: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Propagate newly created content units into every plan of their books
    pub async fn propagate(&self, event: &ContentUnitsCreated) -> Result<PropagationReport> {
        event.validate()?;
        info!(
            "Propagating {} {} unit(s)",
            event.units.len(),
            event.kind
        );

        let resolution = resolve_units(self.catalog.as_ref(), event).await?;
        self.propagate_resolved(event.units.len(), resolution).await
    }

    /// Re-run propagation for every unit the catalog places in a book
    pub async fn resync_book(&self, book_id: &str) -> Result<PropagationReport> {
        let units = self
            .catalog
            .list_book_units(book_id)
            .await
            .map_err(|e| Error::lookup("list_book_units", e))?;
        info!(book_id, "Resyncing {} unit(s)", units.len());

        let mut resolution = Resolution::default();
        for kind in [ContentKind::LearningObjective, ContentKind::Assignment] {
            let created = ContentUnitsCreated {
                kind,
                units: units
                    .iter()
                    .filter(|u| u.kind == kind)
                    .map(|u| CreatedUnit {
                        display_order: Some(u.display_order),
                        topic_id: Some(u.topic_id.clone()),
                        ..CreatedUnit::new(u.unit_id.clone())
                    })
                    .collect(),
                content_structures: Default::default(),
            };
            if created.units.is_empty() {
                continue;
            }
            resolution.merge(resolve_units(self.catalog.as_ref(), &created).await?);
        }

        self.propagate_resolved(units.len(), resolution).await
    }

    async fn propagate_resolved(
        &self,
        units_requested: usize,
        resolution: Resolution,
    ) -> Result<PropagationReport> {
        let coverage = locate(self.repo.as_ref(), &resolution.resolved).await?;
        let mut lineage = LineageTracker::default();
        let mut batch = WriteBatch::default();
        let now = Utc::now();

        let mut report = PropagationReport {
            units_requested,
            units_resolved: resolution.resolved.len(),
            plans_touched: coverage.plan_count(),
            ..Default::default()
        };

        for unit in &resolution.resolved {
            let plans = coverage.plans_for(&unit.structure.book_id);
            if plans.is_empty() {
                debug!(unit_id = %unit.unit_id, book_id = %unit.structure.book_id, "No study plans for book");
                continue;
            }

            // Masters come first, so copies can find their master item in the tracker
            for plan in plans {
                let existing = coverage.index.get(&plan.id, &unit.unit_id);
                let mut m = materialize(
                    plan,
                    unit,
                    existing,
                    self.settings.allow_explicit_clear,
                    now,
                )?;

                match plan.master_study_plan_id.as_deref() {
                    None => lineage.record(&plan.id, &unit.unit_id, &m.item.id),
                    Some(master_id) => {
                        if let Some(master_item) = lineage.lookup(master_id, &unit.unit_id) {
                            m.item.copied_from_item_id = Some(master_item.to_string());
                            report.lineage_linked += 1;
                        }
                    }
                }

                if m.is_new {
                    batch.join_rows.push(JoinRow {
                        kind: unit.kind,
                        content_unit_id: unit.unit_id.clone(),
                        study_plan_item_id: m.item.id.clone(),
                        created_at: now,
                    });
                    report.items_created += 1;
                } else {
                    report.items_updated += 1;
                }
                batch.items.push(m.item);
            }
        }

        report.dropped = resolution.dropped;

        if !batch.is_empty() {
            let outcome = self.repo.commit(&batch).await?;
            report.join_rows_created = outcome.join_rows_inserted;
        }

        info!(
            "Propagation done: {} created, {} updated, {} dropped",
            report.items_created,
            report.items_updated,
            report.dropped.len()
        );
        Ok(report)
    }

    /// Apply date overrides to the items of one plan, and to linked copies of a master
    pub async fn import_schedule(&self, event: &ScheduleImport) -> Result<ImportReport> {
        event.validate()?;

        let plan = self
            .repo
            .find_study_plan(&event.study_plan_id)
            .await
            .map_err(|e| Error::lookup("find_study_plan", e))?
            .ok_or_else(|| Error::StudyPlanNotFound(event.study_plan_id.clone()))?;

        let items = self
            .repo
            .find_items_by_study_plan(&plan.id)
            .await
            .map_err(|e| Error::lookup("find_items_by_study_plan", e))?;

        // Every live item of a unit is edited, duplicates included
        let mut by_unit: HashMap<&str, Vec<&StudyPlanItem>> = HashMap::new();
        for item in &items {
            if let Some(unit) = item.content_unit_id() {
                by_unit.entry(unit).or_default().push(item);
            }
        }

        let allow_clear = self.settings.allow_explicit_clear;
        let now = Utc::now();
        let mut batch = WriteBatch::default();
        let mut edited: HashMap<String, TimeOverrides> = HashMap::new();
        let mut report = ImportReport {
            study_plan_id: plan.id.clone(),
            rows_requested: event.items.len(),
            ..Default::default()
        };

        for row in &event.items {
            let Some(targets) = by_unit.get(row.content_unit_id.as_str()) else {
                warn!(
                    study_plan_id = %plan.id,
                    content_unit_id = %row.content_unit_id,
                    "No item for content unit, skipping"
                );
                report.unmatched.push(row.content_unit_id.clone());
                continue;
            };

            let overrides = row.overrides();
            for existing in targets {
                let mut item = (*existing).clone();
                overrides.apply(&mut item, allow_clear);
                item.updated_at = now;

                edited.insert(item.id.clone(), overrides.clone());
                batch.items.push(item);
                report.items_updated += 1;
            }
        }

        if plan.is_master() && self.settings.propagate_import_to_copies && !edited.is_empty() {
            let master_ids: Vec<String> = edited.keys().cloned().collect();
            let copies = self
                .repo
                .find_items_copied_from(&master_ids)
                .await
                .map_err(|e| Error::lookup("find_items_copied_from", e))?;

            for mut copy in copies {
                let source = copy.copied_from_item_id.clone();
                let Some(overrides) = source.as_deref().and_then(|id| edited.get(id)) else {
                    continue;
                };
                overrides.apply(&mut copy, allow_clear);
                copy.updated_at = now;
                batch.items.push(copy);
                report.copies_updated += 1;
            }
        }

        if !batch.is_empty() {
            self.repo.commit(&batch).await?;
        }

        info!(
            study_plan_id = %plan.id,
            "Schedule import done: {} updated, {} copies, {} unmatched",
            report.items_updated,
            report.copies_updated,
            report.unmatched.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::events::InlineStructure;
    use crate::meta::{CatalogFixture, Store};
    use crate::model::Patch;
    use chrono::{DateTime, TimeZone};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const FIXTURE: &str = r#"{
        "books": [{
            "book_id": "book-1",
            "name": "Algebra",
            "course_ids": ["course-1"],
            "chapters": [{
                "chapter_id": "chapter-1",
                "display_order": 1,
                "topics": [{
                    "topic_id": "topic-1",
                    "display_order": 1,
                    "learning_objectives": [
                        {"id": "lo-1", "display_order": 1},
                        {"id": "lo-2", "display_order": 2},
                        {"id": "lo-3", "display_order": 3}
                    ],
                    "assignments": [{"id": "as-1", "display_order": 4}]
                }]
            }]
        }],
        "study_plans": [
            {"id": "sp-master", "book_id": "book-1"},
            {"id": "sp-copy-1", "book_id": "book-1", "master_study_plan_id": "sp-master"},
            {"id": "sp-other", "book_id": "book-2"}
        ]
    }"#;

    async fn setup_with(settings: EngineConfig) -> (Propagator, Store, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(&tmp.path().join("test.db")).await.unwrap();
        let fixture: CatalogFixture = serde_json::from_str(FIXTURE).unwrap();
        store.load_fixture(&fixture).await.unwrap();
        (store.propagator(settings), store, tmp)
    }

    async fn setup() -> (Propagator, Store, TempDir) {
        setup_with(EngineConfig::default()).await
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn lo_event(ids: &[&str]) -> ContentUnitsCreated {
        ContentUnitsCreated {
            kind: ContentKind::LearningObjective,
            units: ids.iter().map(|id| CreatedUnit::new(*id)).collect(),
            content_structures: BTreeMap::new(),
        }
    }

    fn inline_lo1() -> ContentUnitsCreated {
        let mut event = lo_event(&["lo-1"]);
        event.units[0].topic_id = Some("topic-1".into());
        event.content_structures.insert(
            "lo-1".into(),
            InlineStructure {
                course_id: Some("course-1".into()),
                book_id: Some("book-1".into()),
                ..Default::default()
            },
        );
        event
    }

    fn import(plan: &str, unit: &str) -> ScheduleImport {
        ScheduleImport {
            study_plan_id: plan.into(),
            items: vec![crate::events::ScheduleRow {
                content_unit_id: unit.into(),
                start_date: Patch::Unset,
                end_date: Patch::Unset,
                available_from: Patch::Unset,
                available_to: Patch::Unset,
            }],
        }
    }

    async fn item_for(store: &Store, plan: &str, unit: &str) -> StudyPlanItem {
        store
            .list_plan_items(plan)
            .await
            .unwrap()
            .into_iter()
            .find(|i| i.content_unit_id() == Some(unit))
            .unwrap()
    }

    #[tokio::test]
    async fn test_new_lo_reaches_master_and_copy() {
        let (engine, store, _tmp) = setup().await;

        let report = engine.propagate(&inline_lo1()).await.unwrap();
        assert_eq!(report.items_created, 2);
        assert_eq!(report.join_rows_created, 2);
        assert_eq!(report.lineage_linked, 1);

        let master = store.list_plan_items("sp-master").await.unwrap();
        let copy = store.list_plan_items("sp-copy-1").await.unwrap();
        assert_eq!(master.len(), 1);
        assert_eq!(copy.len(), 1);
        assert_eq!(copy[0].copied_from_item_id.as_deref(), Some(master[0].id.as_str()));
        assert_eq!(master[0].copied_from_item_id, None);
        assert_eq!(master[0].content_structure.course_id, "course-1");
        assert_eq!(master[0].content_structure.topic_id, "topic-1");

        assert!(store.list_plan_items("sp-other").await.unwrap().is_empty());
        assert_eq!(store.count_join_rows(ContentKind::LearningObjective).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_repeated_event_is_idempotent() {
        let (engine, store, _tmp) = setup().await;

        engine.propagate(&inline_lo1()).await.unwrap();
        let first = item_for(&store, "sp-master", "lo-1").await;

        let report = engine.propagate(&inline_lo1()).await.unwrap();
        assert_eq!(report.items_created, 0);
        assert_eq!(report.items_updated, 2);
        assert_eq!(report.join_rows_created, 0);

        let again = item_for(&store, "sp-master", "lo-1").await;
        assert_eq!(again.id, first.id);
        assert_eq!(again.created_at, first.created_at);

        let stats = store.global_stats().await.unwrap();
        assert_eq!(stats.item_count, 2);
        assert_eq!(store.count_join_rows(ContentKind::LearningObjective).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_unit_does_not_block_others() {
        let (engine, store, _tmp) = setup().await;

        let report = engine
            .propagate(&lo_event(&["lo-2", "lo-ghost", "lo-3"]))
            .await
            .unwrap();

        assert_eq!(report.units_requested, 3);
        assert_eq!(report.units_resolved, 2);
        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].unit_id, "lo-ghost");
        assert_eq!(report.items_created, 4);

        let master = store.list_plan_items("sp-master").await.unwrap();
        let units: Vec<_> = master.iter().filter_map(|i| i.content_unit_id()).collect();
        assert_eq!(units, ["lo-2", "lo-3"]);
    }

    #[tokio::test]
    async fn test_catalog_structure_drives_items() {
        let (engine, store, _tmp) = setup().await;

        engine.propagate(&lo_event(&["lo-2"])).await.unwrap();
        let item = item_for(&store, "sp-copy-1", "lo-2").await;

        assert_eq!(item.content_structure.chapter_id, "chapter-1");
        assert_eq!(item.content_structure.course_id, "course-1");
        assert_eq!(
            item.content_structure_flatten,
            "book::book-1topic::topic-1chapter::chapter-1course::course-1lo::lo-2"
        );
    }

    #[tokio::test]
    async fn test_join_row_failure_rolls_back_items() {
        let (engine, store, _tmp) = setup().await;

        sqlx::query(
            "CREATE TRIGGER fail_lo_join BEFORE INSERT ON lo_study_plan_items BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let err = engine.propagate(&inline_lo1()).await.unwrap_err();
        assert!(matches!(err, Error::Write { .. }));
        assert_eq!(err.failed_step(), Some("upsert_join_rows"));
        assert!(err.is_retryable());

        let stats = store.global_stats().await.unwrap();
        assert_eq!(stats.item_count, 0);
        assert_eq!(stats.join_row_count, 0);
    }

    #[tokio::test]
    async fn test_tracked_run_records_failure_detail() {
        let (engine, store, _tmp) = setup().await;

        sqlx::query(
            "CREATE TRIGGER fail_lo_join BEFORE INSERT ON lo_study_plan_items BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )
        .execute(store.pool())
        .await
        .unwrap();

        let event = Event::ContentUnitsCreated(inline_lo1());
        assert!(engine.run_tracked(&event).await.is_err());

        let tasks = store.list_tasks(10).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, "error");
        assert!(tasks[0].detail.as_deref().unwrap().contains("upsert_join_rows"));
        assert!(tasks[0].finished_at.is_some());
    }

    #[tokio::test]
    async fn test_tracked_run_completes() {
        let (engine, store, _tmp) = setup().await;

        let run = engine
            .run_tracked(&Event::ContentUnitsCreated(inline_lo1()))
            .await
            .unwrap();
        assert!(matches!(run.report, RunReport::Propagation(_)));

        let tasks = store.list_tasks(10).await.unwrap();
        assert_eq!(tasks[0].task_id, run.task_id);
        assert_eq!(tasks[0].kind, "content_units_created");
        assert_eq!(tasks[0].status, "completed");
    }

    #[tokio::test]
    async fn test_invalid_event_creates_no_task() {
        let (engine, store, _tmp) = setup().await;

        let err = engine
            .run_tracked(&Event::ContentUnitsCreated(lo_event(&[])))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.list_tasks(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_only_touches_supplied_fields() {
        let (engine, store, _tmp) = setup().await;

        let mut created = inline_lo1();
        created.units[0].times = TimeOverrides {
            start_date: Patch::Value(ts(1)),
            end_date: Patch::Value(ts(20)),
            available_from: Patch::Value(ts(1)),
            available_to: Patch::Value(ts(25)),
        };
        engine.propagate(&created).await.unwrap();

        let mut request = import("sp-copy-1", "lo-1");
        request.items[0].start_date = Patch::Value(ts(5));
        request.items[0].end_date = Patch::Null;
        let report = engine.import_schedule(&request).await.unwrap();
        assert_eq!(report.items_updated, 1);
        assert_eq!(report.copies_updated, 0);

        let copy = item_for(&store, "sp-copy-1", "lo-1").await;
        assert_eq!(copy.start_date, Some(ts(5)));
        assert_eq!(copy.end_date, Some(ts(20)));
        assert_eq!(copy.available_from, Some(ts(1)));
        assert_eq!(copy.available_to, Some(ts(25)));

        // The master is left alone when a copy is edited
        let master = item_for(&store, "sp-master", "lo-1").await;
        assert_eq!(master.start_date, Some(ts(1)));
    }

    #[tokio::test]
    async fn test_import_clears_when_allowed() {
        let settings = EngineConfig {
            allow_explicit_clear: true,
            ..Default::default()
        };
        let (engine, store, _tmp) = setup_with(settings).await;

        let mut created = inline_lo1();
        created.units[0].times.end_date = Patch::Value(ts(20));
        engine.propagate(&created).await.unwrap();

        let mut request = import("sp-copy-1", "lo-1");
        request.items[0].end_date = Patch::Null;
        engine.import_schedule(&request).await.unwrap();

        let copy = item_for(&store, "sp-copy-1", "lo-1").await;
        assert_eq!(copy.end_date, None);
    }

    #[tokio::test]
    async fn test_master_import_reaches_linked_copies() {
        let (engine, store, _tmp) = setup().await;
        engine.propagate(&inline_lo1()).await.unwrap();

        let mut request = import("sp-master", "lo-1");
        request.items[0].available_from = Patch::Value(ts(3));
        let report = engine.import_schedule(&request).await.unwrap();
        assert_eq!(report.items_updated, 1);
        assert_eq!(report.copies_updated, 1);

        let copy = item_for(&store, "sp-copy-1", "lo-1").await;
        assert_eq!(copy.available_from, Some(ts(3)));
    }

    #[tokio::test]
    async fn test_master_import_skips_deleted_copy_plans() {
        let (engine, store, _tmp) = setup().await;
        engine.propagate(&inline_lo1()).await.unwrap();
        store.soft_delete_study_plan("sp-copy-1").await.unwrap();

        let mut request = import("sp-master", "lo-1");
        request.items[0].start_date = Patch::Value(ts(3));
        let report = engine.import_schedule(&request).await.unwrap();
        assert_eq!(report.items_updated, 1);
        assert_eq!(report.copies_updated, 0);

        let copy = item_for(&store, "sp-copy-1", "lo-1").await;
        assert_eq!(copy.start_date, None);
    }

    #[tokio::test]
    async fn test_import_edits_every_duplicate_item() {
        let (engine, store, _tmp) = setup().await;
        engine.propagate(&inline_lo1()).await.unwrap();

        let mut duplicate = item_for(&store, "sp-master", "lo-1").await;
        duplicate.id = "item-dup".into();
        store
            .commit(&WriteBatch {
                items: vec![duplicate],
                join_rows: vec![],
            })
            .await
            .unwrap();

        let mut request = import("sp-master", "lo-1");
        request.items[0].start_date = Patch::Value(ts(4));
        let report = engine.import_schedule(&request).await.unwrap();
        assert_eq!(report.items_updated, 2);
        assert_eq!(report.copies_updated, 1);

        let master = store.list_plan_items("sp-master").await.unwrap();
        assert_eq!(master.len(), 2);
        assert!(master.iter().all(|i| i.start_date == Some(ts(4))));
    }

    #[tokio::test]
    async fn test_master_import_stays_local_when_disabled() {
        let settings = EngineConfig {
            propagate_import_to_copies: false,
            ..Default::default()
        };
        let (engine, store, _tmp) = setup_with(settings).await;
        engine.propagate(&inline_lo1()).await.unwrap();

        let mut request = import("sp-master", "lo-1");
        request.items[0].available_from = Patch::Value(ts(3));
        let report = engine.import_schedule(&request).await.unwrap();
        assert_eq!(report.copies_updated, 0);

        let copy = item_for(&store, "sp-copy-1", "lo-1").await;
        assert_eq!(copy.available_from, None);
    }

    #[tokio::test]
    async fn test_import_reports_unmatched_and_missing_plan() {
        let (engine, _store, _tmp) = setup().await;
        engine.propagate(&inline_lo1()).await.unwrap();

        let mut request = import("sp-master", "lo-1");
        request.items.push(crate::events::ScheduleRow {
            content_unit_id: "lo-9".into(),
            start_date: Patch::Value(ts(2)),
            end_date: Patch::Unset,
            available_from: Patch::Unset,
            available_to: Patch::Unset,
        });
        let report = engine.import_schedule(&request).await.unwrap();
        assert_eq!(report.unmatched, vec!["lo-9".to_string()]);

        let err = engine
            .import_schedule(&import("sp-missing", "lo-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StudyPlanNotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_resync_book_fills_gaps() {
        let (engine, store, _tmp) = setup().await;
        engine.propagate(&inline_lo1()).await.unwrap();
        let lo1 = item_for(&store, "sp-master", "lo-1").await;

        let report = engine.resync_book("book-1").await.unwrap();
        assert_eq!(report.units_requested, 4);
        assert_eq!(report.items_created, 6);
        assert_eq!(report.items_updated, 2);
        assert_eq!(report.lineage_linked, 4);

        let master = store.list_plan_items("sp-master").await.unwrap();
        assert_eq!(master.len(), 4);
        assert_eq!(item_for(&store, "sp-master", "lo-1").await.id, lo1.id);

        let assignment = item_for(&store, "sp-copy-1", "as-1").await;
        let master_assignment = item_for(&store, "sp-master", "as-1").await;
        assert_eq!(
            assignment.copied_from_item_id.as_deref(),
            Some(master_assignment.id.as_str())
        );
        assert_eq!(
            store.count_join_rows(ContentKind::Assignment).await.unwrap(),
            2
        );

        let again = engine.resync_book("book-1").await.unwrap();
        assert_eq!(again.items_created, 0);
        assert_eq!(again.join_rows_created, 0);
    }

    #[tokio::test]
    async fn test_copy_keeps_lineage_when_master_missing() {
        let (engine, store, _tmp) = setup().await;
        engine.propagate(&inline_lo1()).await.unwrap();
        let linked = item_for(&store, "sp-copy-1", "lo-1").await;

        store.soft_delete_study_plan("sp-master").await.unwrap();
        let report = engine.propagate(&inline_lo1()).await.unwrap();
        assert_eq!(report.lineage_linked, 0);

        let copy = item_for(&store, "sp-copy-1", "lo-1").await;
        assert_eq!(copy.copied_from_item_id, linked.copied_from_item_id);
    }
}
