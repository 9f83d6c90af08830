//! Study plan and item persistence

use super::{placeholders, Store};
use crate::error::{Error, Result};
use crate::model::{ContentKind, ContentStructure, JoinRow, StudyPlan, StudyPlanItem};
use crate::sync::{CommitOutcome, LocatedRow, PlanRepository, UnitFilter, WriteBatch};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Row};
use tracing::debug;

/// A study plan row
#[derive(Debug, Clone, FromRow)]
pub struct PlanRow {
    pub study_plan_id: String,
    pub book_id: String,
    pub course_id: Option<String>,
    pub master_study_plan_id: Option<String>,
    pub name: Option<String>,
}

impl From<PlanRow> for StudyPlan {
    fn from(row: PlanRow) -> Self {
        StudyPlan {
            id: row.study_plan_id,
            book_id: row.book_id,
            course_id: row.course_id,
            master_study_plan_id: row.master_study_plan_id,
            name: row.name,
        }
    }
}

/// A study plan item row as stored
#[derive(Debug, Clone, FromRow)]
pub struct ItemRow {
    pub study_plan_item_id: String,
    pub study_plan_id: String,
    pub content_structure: String,
    pub content_structure_flatten: String,
    pub display_order: i32,
    pub status: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub available_from: Option<String>,
    pub available_to: Option<String>,
    pub copied_from_item_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::InvalidRecord(format!("Bad timestamp '{}': {}", value, e)))
}

fn parse_opt_ts(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value.map(parse_ts).transpose()
}

fn ts(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(|d| d.to_rfc3339())
}

impl TryFrom<ItemRow> for StudyPlanItem {
    type Error = Error;

    fn try_from(row: ItemRow) -> Result<Self> {
        let content_structure: ContentStructure = serde_json::from_str(&row.content_structure)
            .map_err(|e| {
                Error::InvalidRecord(format!(
                    "Item {} has an unreadable structure: {}",
                    row.study_plan_item_id, e
                ))
            })?;

        Ok(StudyPlanItem {
            start_date: parse_opt_ts(row.start_date.as_deref())?,
            end_date: parse_opt_ts(row.end_date.as_deref())?,
            available_from: parse_opt_ts(row.available_from.as_deref())?,
            available_to: parse_opt_ts(row.available_to.as_deref())?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
            status: row.status.parse()?,
            id: row.study_plan_item_id,
            study_plan_id: row.study_plan_id,
            content_structure,
            content_structure_flatten: row.content_structure_flatten,
            display_order: row.display_order,
            copied_from_item_id: row.copied_from_item_id,
        })
    }
}

fn rows_to_items(rows: Vec<ItemRow>) -> Result<Vec<StudyPlanItem>> {
    rows.into_iter().map(StudyPlanItem::try_from).collect()
}

const ITEM_COLUMNS: &str = r#"
    spi.study_plan_item_id, spi.study_plan_id, spi.content_structure, spi.content_structure_flatten,
    spi.display_order, spi.status, spi.start_date, spi.end_date, spi.available_from, spi.available_to,
    spi.copied_from_item_id, spi.created_at, spi.updated_at
"#;

impl Store {
    /// Live items of a plan in reading order: display order, then catalog order
    /// (chapter, topic, unit), then path
    pub async fn list_plan_items(&self, study_plan_id: &str) -> Result<Vec<StudyPlanItem>> {
        let query = format!(
            r#"
            SELECT {columns}
            FROM study_plan_items spi
            LEFT JOIN chapters c ON c.chapter_id = json_extract(spi.content_structure, '$.chapter_id')
            LEFT JOIN topics t ON t.topic_id = json_extract(spi.content_structure, '$.topic_id')
            LEFT JOIN learning_objectives lo
                ON spi.content_kind = '{lo_kind}' AND lo.lo_id = spi.content_unit_id
            LEFT JOIN assignments a
                ON spi.content_kind = '{assignment_kind}' AND a.assignment_id = spi.content_unit_id
            WHERE spi.study_plan_id = ? AND spi.deleted_at IS NULL
            ORDER BY spi.display_order, COALESCE(c.display_order, 0), COALESCE(t.display_order, 0),
                COALESCE(lo.display_order, a.display_order, 0), spi.content_structure_flatten
            "#,
            columns = ITEM_COLUMNS,
            lo_kind = ContentKind::LearningObjective,
            assignment_kind = ContentKind::Assignment,
        );

        let rows = sqlx::query_as::<_, ItemRow>(&query)
            .bind(study_plan_id)
            .fetch_all(&self.pool)
            .await?;
        rows_to_items(rows)
    }

    /// All live study plans, masters first
    pub async fn list_study_plans(&self) -> Result<Vec<StudyPlan>> {
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT study_plan_id, book_id, course_id, master_study_plan_id, name
            FROM study_plans WHERE deleted_at IS NULL
            ORDER BY book_id, master_study_plan_id IS NOT NULL, study_plan_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(StudyPlan::from).collect())
    }
}

async fn upsert_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    items: &[StudyPlanItem],
) -> Result<u64> {
    let mut written = 0;
    for item in items {
        let (kind, unit_id) = item.content_unit().ok_or_else(|| {
            Error::InvalidRecord(format!("Item {} has no content unit", item.id))
        })?;
        let structure = serde_json::to_string(&item.content_structure)?;

        let result = sqlx::query(
            r#"
            INSERT INTO study_plan_items (
                study_plan_item_id, study_plan_id, content_kind, content_unit_id, book_id,
                content_structure, content_structure_flatten, display_order, status,
                start_date, end_date, available_from, available_to, copied_from_item_id,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(study_plan_item_id) DO UPDATE SET
                book_id = excluded.book_id,
                content_structure = excluded.content_structure,
                content_structure_flatten = excluded.content_structure_flatten,
                display_order = excluded.display_order,
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                available_from = excluded.available_from,
                available_to = excluded.available_to,
                copied_from_item_id = excluded.copied_from_item_id,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&item.id)
        .bind(&item.study_plan_id)
        .bind(kind.to_string())
        .bind(unit_id)
        .bind(&item.content_structure.book_id)
        .bind(structure)
        .bind(&item.content_structure_flatten)
        .bind(item.display_order)
        .bind(item.status.to_string())
        .bind(ts(item.start_date))
        .bind(ts(item.end_date))
        .bind(ts(item.available_from))
        .bind(ts(item.available_to))
        .bind(&item.copied_from_item_id)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;
        written += result.rows_affected();
    }
    Ok(written)
}

async fn upsert_join_rows(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    rows: &[JoinRow],
) -> Result<u64> {
    let mut inserted = 0;
    for row in rows {
        let query = format!(
            r#"
            INSERT INTO {table} ({key}, study_plan_item_id, created_at) VALUES (?, ?, ?)
            ON CONFLICT({key}, study_plan_item_id) DO NOTHING
            "#,
            table = row.kind.join_table(),
            key = row.kind.catalog_key(),
        );
        let result = sqlx::query(&query)
            .bind(&row.content_unit_id)
            .bind(&row.study_plan_item_id)
            .bind(row.created_at.to_rfc3339())
            .execute(&mut **tx)
            .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

#[async_trait]
impl PlanRepository for Store {
    async fn find_items_by_books(
        &self,
        book_ids: &[String],
        filter: &UnitFilter,
    ) -> Result<Vec<LocatedRow>> {
        if book_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut unit_clauses = Vec::new();
        for kind in [ContentKind::LearningObjective, ContentKind::Assignment] {
            let ids = filter.ids(kind);
            if !ids.is_empty() {
                unit_clauses.push(format!(
                    "(spi.content_kind = '{}' AND spi.content_unit_id IN ({}))",
                    kind,
                    placeholders(ids.len())
                ));
            }
        }
        let unit_clause = if unit_clauses.is_empty() {
            "0".to_string()
        } else {
            unit_clauses.join(" OR ")
        };

        let query = format!(
            r#"
            SELECT sp.study_plan_id, sp.book_id, sp.course_id, sp.master_study_plan_id, sp.name,
                {columns}
            FROM study_plans sp
            LEFT JOIN study_plan_items spi
                ON spi.study_plan_id = sp.study_plan_id
                AND spi.deleted_at IS NULL
                AND ({units})
            WHERE sp.deleted_at IS NULL AND sp.book_id IN ({books})
            ORDER BY sp.master_study_plan_id IS NOT NULL, sp.study_plan_id, spi.created_at, spi.study_plan_item_id
            "#,
            // Item columns alias to unique names; the plan already owns study_plan_id
            columns = r#"
                spi.study_plan_item_id, spi.content_structure, spi.content_structure_flatten,
                spi.display_order, spi.status, spi.start_date, spi.end_date, spi.available_from,
                spi.available_to, spi.copied_from_item_id, spi.created_at, spi.updated_at
            "#,
            units = unit_clause,
            books = placeholders(book_ids.len()),
        );

        // Bind order follows the placeholders: unit ids inside the join, then book ids
        let mut query_builder = sqlx::query(&query);
        for kind in [ContentKind::LearningObjective, ContentKind::Assignment] {
            for id in filter.ids(kind) {
                query_builder = query_builder.bind(id);
            }
        }
        for book_id in book_ids {
            query_builder = query_builder.bind(book_id);
        }

        let rows = query_builder.fetch_all(&self.pool).await?;
        debug!("Located {} plan/item row(s)", rows.len());

        let mut located = Vec::with_capacity(rows.len());
        for row in rows {
            let plan = StudyPlan::from(PlanRow::from_row(&row)?);
            let item_id: Option<String> = row.try_get("study_plan_item_id")?;
            let item = match item_id {
                Some(_) => Some(StudyPlanItem::try_from(ItemRow::from_row(&row)?)?),
                None => None,
            };
            located.push(LocatedRow { plan, item });
        }
        Ok(located)
    }

    async fn find_study_plan(&self, study_plan_id: &str) -> Result<Option<StudyPlan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT study_plan_id, book_id, course_id, master_study_plan_id, name
            FROM study_plans WHERE study_plan_id = ? AND deleted_at IS NULL
            "#,
        )
        .bind(study_plan_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StudyPlan::from))
    }

    async fn find_items_by_study_plan(&self, study_plan_id: &str) -> Result<Vec<StudyPlanItem>> {
        let query = format!(
            r#"
            SELECT {columns} FROM study_plan_items spi
            WHERE spi.study_plan_id = ? AND spi.deleted_at IS NULL
            ORDER BY spi.created_at, spi.study_plan_item_id
            "#,
            columns = ITEM_COLUMNS,
        );
        let rows = sqlx::query_as::<_, ItemRow>(&query)
            .bind(study_plan_id)
            .fetch_all(&self.pool)
            .await?;
        rows_to_items(rows)
    }

    async fn find_items_copied_from(&self, item_ids: &[String]) -> Result<Vec<StudyPlanItem>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            r#"
            SELECT {columns} FROM study_plan_items spi
            JOIN study_plans sp ON sp.study_plan_id = spi.study_plan_id AND sp.deleted_at IS NULL
            WHERE spi.deleted_at IS NULL AND spi.copied_from_item_id IN ({ids})
            ORDER BY spi.study_plan_id, spi.study_plan_item_id
            "#,
            columns = ITEM_COLUMNS,
            ids = placeholders(item_ids.len()),
        );
        let mut query_builder = sqlx::query_as::<_, ItemRow>(&query);
        for id in item_ids {
            query_builder = query_builder.bind(id);
        }
        rows_to_items(query_builder.fetch_all(&self.pool).await?)
    }

    async fn commit(&self, batch: &WriteBatch) -> Result<CommitOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::write("begin", e.into()))?;

        let items_upserted = upsert_items(&mut tx, &batch.items)
            .await
            .map_err(|e| Error::write("upsert_items", e))?;
        let join_rows_inserted = upsert_join_rows(&mut tx, &batch.join_rows)
            .await
            .map_err(|e| Error::write("upsert_join_rows", e))?;

        tx.commit()
            .await
            .map_err(|e| Error::write("commit", e.into()))?;

        debug!(
            "Committed {} item(s), {} new join row(s)",
            items_upserted, join_rows_inserted
        );
        Ok(CommitOutcome {
            items_upserted,
            join_rows_inserted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::CatalogFixture;
    use crate::model::{ItemStatus, Patch, TimeOverrides};
    use chrono::TimeZone;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Store, TempDir) {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(&tmp.path().join("test.db")).await.unwrap();
        for (id, master) in [("sp-master", None), ("sp-copy-1", Some("sp-master"))] {
            store
                .upsert_study_plan(&StudyPlan {
                    id: id.into(),
                    book_id: "book-1".into(),
                    course_id: None,
                    master_study_plan_id: master.map(String::from),
                    name: None,
                })
                .await
                .unwrap();
        }
        (store, tmp)
    }

    fn item(id: &str, plan: &str, lo: &str, order: i32) -> StudyPlanItem {
        let structure = ContentStructure {
            course_id: "course-1".into(),
            book_id: "book-1".into(),
            chapter_id: "chapter-1".into(),
            topic_id: "topic-1".into(),
            ..Default::default()
        }
        .with_unit(ContentKind::LearningObjective, lo);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        StudyPlanItem {
            id: id.into(),
            study_plan_id: plan.into(),
            content_structure_flatten: structure.flatten().unwrap(),
            content_structure: structure,
            display_order: order,
            status: ItemStatus::Active,
            start_date: None,
            end_date: None,
            available_from: None,
            available_to: None,
            copied_from_item_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn join(lo: &str, item_id: &str) -> JoinRow {
        JoinRow {
            kind: ContentKind::LearningObjective,
            content_unit_id: lo.into(),
            study_plan_item_id: item_id.into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_commit_round_trips_items() {
        let (store, _tmp) = setup_test_db().await;

        let mut first = item("item-1", "sp-master", "lo-1", 2);
        TimeOverrides {
            start_date: Patch::Value(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        }
        .apply(&mut first, false);

        let batch = WriteBatch {
            items: vec![first.clone(), item("item-2", "sp-master", "lo-2", 1)],
            join_rows: vec![join("lo-1", "item-1"), join("lo-2", "item-2")],
        };
        let outcome = store.commit(&batch).await.unwrap();
        assert_eq!(outcome.items_upserted, 2);
        assert_eq!(outcome.join_rows_inserted, 2);

        let items = store.list_plan_items("sp-master").await.unwrap();
        assert_eq!(items.len(), 2);
        // Display order drives reading order
        assert_eq!(items[0].id, "item-2");
        assert_eq!(items[1], first);
    }

    #[tokio::test]
    async fn test_list_plan_items_ties_follow_catalog_order() {
        let (store, _tmp) = setup_test_db().await;
        let fixture: CatalogFixture = serde_json::from_str(
            r#"{"books": [{
                "book_id": "book-1",
                "chapters": [
                    {"chapter_id": "chapter-a", "display_order": 2, "topics": [
                        {"topic_id": "topic-a", "learning_objectives": [{"id": "lo-a"}]}
                    ]},
                    {"chapter_id": "chapter-b", "display_order": 1, "topics": [
                        {"topic_id": "topic-b", "learning_objectives": [
                            {"id": "lo-2", "display_order": 1},
                            {"id": "lo-10", "display_order": 2}
                        ]}
                    ]}
                ]
            }]}"#,
        )
        .unwrap();
        store.load_fixture(&fixture).await.unwrap();

        let placed = |id: &str, lo: &str, chapter: &str, topic: &str| {
            let mut it = item(id, "sp-master", lo, 0);
            it.content_structure.chapter_id = chapter.into();
            it.content_structure.topic_id = topic.into();
            it.content_structure_flatten = it.content_structure.flatten().unwrap();
            it
        };
        store
            .commit(&WriteBatch {
                items: vec![
                    placed("item-1", "lo-a", "chapter-a", "topic-a"),
                    placed("item-2", "lo-10", "chapter-b", "topic-b"),
                    placed("item-3", "lo-2", "chapter-b", "topic-b"),
                ],
                join_rows: vec![],
            })
            .await
            .unwrap();

        let items = store.list_plan_items("sp-master").await.unwrap();
        let units: Vec<_> = items.iter().filter_map(|i| i.content_unit_id()).collect();
        assert_eq!(units, ["lo-2", "lo-10", "lo-a"]);
    }

    #[tokio::test]
    async fn test_join_rows_are_idempotent() {
        let (store, _tmp) = setup_test_db().await;

        let batch = WriteBatch {
            items: vec![item("item-1", "sp-master", "lo-1", 0)],
            join_rows: vec![join("lo-1", "item-1")],
        };
        store.commit(&batch).await.unwrap();
        let outcome = store.commit(&batch).await.unwrap();

        assert_eq!(outcome.join_rows_inserted, 0);
        assert_eq!(
            store
                .count_join_rows(ContentKind::LearningObjective)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_upsert_keeps_status_and_created_at() {
        let (store, _tmp) = setup_test_db().await;
        let original = item("item-1", "sp-master", "lo-1", 0);
        store
            .commit(&WriteBatch {
                items: vec![original.clone()],
                join_rows: vec![],
            })
            .await
            .unwrap();

        let mut changed = original.clone();
        changed.status = ItemStatus::Archived;
        changed.created_at = Utc::now();
        changed.display_order = 7;
        store
            .commit(&WriteBatch {
                items: vec![changed],
                join_rows: vec![],
            })
            .await
            .unwrap();

        let stored = store.list_plan_items("sp-master").await.unwrap();
        assert_eq!(stored[0].status, ItemStatus::Active);
        assert_eq!(stored[0].created_at, original.created_at);
        assert_eq!(stored[0].display_order, 7);
    }

    #[tokio::test]
    async fn test_find_items_by_books_left_joins_plans() {
        let (store, _tmp) = setup_test_db().await;
        store
            .commit(&WriteBatch {
                items: vec![
                    item("item-1", "sp-master", "lo-1", 0),
                    item("item-2", "sp-master", "lo-2", 0),
                ],
                join_rows: vec![],
            })
            .await
            .unwrap();

        let mut filter = UnitFilter::default();
        filter.push(ContentKind::LearningObjective, "lo-1");
        let rows = store
            .find_items_by_books(&["book-1".to_string()], &filter)
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].plan.id, "sp-master");
        assert_eq!(rows[0].item.as_ref().unwrap().id, "item-1");
        assert_eq!(rows[1].plan.id, "sp-copy-1");
        assert!(rows[1].item.is_none());

        let none = store
            .find_items_by_books(&["book-9".to_string()], &filter)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_find_items_copied_from() {
        let (store, _tmp) = setup_test_db().await;
        let master = item("item-m", "sp-master", "lo-1", 0);
        let mut copy = item("item-c", "sp-copy-1", "lo-1", 0);
        copy.copied_from_item_id = Some(master.id.clone());
        store
            .commit(&WriteBatch {
                items: vec![master, copy],
                join_rows: vec![],
            })
            .await
            .unwrap();

        let copies = store
            .find_items_copied_from(&["item-m".to_string()])
            .await
            .unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].id, "item-c");
        assert!(store.find_items_copied_from(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_item_without_unit_fails_commit() {
        let (store, _tmp) = setup_test_db().await;
        let mut broken = item("item-1", "sp-master", "lo-1", 0);
        broken.content_structure.lo_id = None;

        let err = store
            .commit(&WriteBatch {
                items: vec![broken],
                join_rows: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.failed_step(), Some("upsert_items"));
        assert_eq!(store.global_stats().await.unwrap().item_count, 0);
    }
}
