//! Content catalog storage and lookups

use super::{placeholders, Store};
use crate::error::Result;
use crate::model::{ContentKind, ContentStructure, StudyPlan};
use crate::sync::{Catalog, CatalogUnit};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use tracing::{debug, info};

/// Catalog and study plans to load in one go
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFixture {
    #[serde(default)]
    pub books: Vec<BookFixture>,
    #[serde(default)]
    pub study_plans: Vec<StudyPlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookFixture {
    pub book_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub course_ids: Vec<String>,
    #[serde(default)]
    pub chapters: Vec<ChapterFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterFixture {
    pub chapter_id: String,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub topics: Vec<TopicFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicFixture {
    pub topic_id: String,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub learning_objectives: Vec<UnitFixture>,
    #[serde(default)]
    pub assignments: Vec<UnitFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFixture {
    pub id: String,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub name: Option<String>,
}

/// Rows written by a fixture load
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FixtureStats {
    pub books: usize,
    pub chapters: usize,
    pub topics: usize,
    pub units: usize,
    pub study_plans: usize,
}

#[derive(Debug, FromRow)]
struct StructureRow {
    unit_id: String,
    topic_id: String,
    chapter_id: String,
    book_id: String,
    course_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct BookUnitRow {
    kind: String,
    unit_id: String,
    topic_id: String,
    display_order: i32,
}

impl Store {
    /// Load a catalog fixture in one transaction; existing rows are updated in place
    pub async fn load_fixture(&self, fixture: &CatalogFixture) -> Result<FixtureStats> {
        let mut tx = self.pool.begin().await?;
        let mut stats = FixtureStats::default();
        let now = Utc::now().to_rfc3339();

        for book in &fixture.books {
            sqlx::query(
                r#"
                INSERT INTO books (book_id, name, created_at) VALUES (?, ?, ?)
                ON CONFLICT(book_id) DO UPDATE SET name = excluded.name
                "#,
            )
            .bind(&book.book_id)
            .bind(&book.name)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
            stats.books += 1;

            for course_id in &book.course_ids {
                sqlx::query("INSERT OR IGNORE INTO course_books (course_id, book_id) VALUES (?, ?)")
                    .bind(course_id)
                    .bind(&book.book_id)
                    .execute(&mut *tx)
                    .await?;
            }

            for chapter in &book.chapters {
                sqlx::query(
                    r#"
                    INSERT INTO chapters (chapter_id, book_id, display_order, name) VALUES (?, ?, ?, ?)
                    ON CONFLICT(chapter_id) DO UPDATE SET
                        book_id = excluded.book_id,
                        display_order = excluded.display_order,
                        name = excluded.name
                    "#,
                )
                .bind(&chapter.chapter_id)
                .bind(&book.book_id)
                .bind(chapter.display_order)
                .bind(&chapter.name)
                .execute(&mut *tx)
                .await?;
                stats.chapters += 1;

                for topic in &chapter.topics {
                    sqlx::query(
                        r#"
                        INSERT INTO topics (topic_id, chapter_id, display_order, name) VALUES (?, ?, ?, ?)
                        ON CONFLICT(topic_id) DO UPDATE SET
                            chapter_id = excluded.chapter_id,
                            display_order = excluded.display_order,
                            name = excluded.name
                        "#,
                    )
                    .bind(&topic.topic_id)
                    .bind(&chapter.chapter_id)
                    .bind(topic.display_order)
                    .bind(&topic.name)
                    .execute(&mut *tx)
                    .await?;
                    stats.topics += 1;

                    let units = topic
                        .learning_objectives
                        .iter()
                        .map(|u| (ContentKind::LearningObjective, u))
                        .chain(topic.assignments.iter().map(|u| (ContentKind::Assignment, u)));

                    for (kind, unit) in units {
                        let query = format!(
                            r#"
                            INSERT INTO {table} ({key}, topic_id, display_order, name) VALUES (?, ?, ?, ?)
                            ON CONFLICT({key}) DO UPDATE SET
                                topic_id = excluded.topic_id,
                                display_order = excluded.display_order,
                                name = excluded.name
                            "#,
                            table = kind.catalog_table(),
                            key = kind.catalog_key(),
                        );
                        sqlx::query(&query)
                            .bind(&unit.id)
                            .bind(&topic.topic_id)
                            .bind(unit.display_order)
                            .bind(&unit.name)
                            .execute(&mut *tx)
                            .await?;
                        stats.units += 1;
                    }
                }
            }
        }

        // Masters first so copies can reference them
        let mut plans: Vec<&StudyPlan> = fixture.study_plans.iter().collect();
        plans.sort_by_key(|p| p.tier());
        for plan in plans {
            Self::upsert_study_plan_in(&mut tx, plan, &now).await?;
            stats.study_plans += 1;
        }

        tx.commit().await?;

        info!(
            "Loaded {} book(s), {} unit(s), {} study plan(s)",
            stats.books, stats.units, stats.study_plans
        );
        Ok(stats)
    }

    /// Insert or update a single study plan
    pub async fn upsert_study_plan(&self, plan: &StudyPlan) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_study_plan_in(&mut tx, plan, &Utc::now().to_rfc3339()).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_study_plan_in(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        plan: &StudyPlan,
        now: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO study_plans (study_plan_id, book_id, course_id, master_study_plan_id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(study_plan_id) DO UPDATE SET
                book_id = excluded.book_id,
                course_id = excluded.course_id,
                master_study_plan_id = excluded.master_study_plan_id,
                name = excluded.name,
                updated_at = excluded.updated_at,
                deleted_at = NULL
            "#,
        )
        .bind(&plan.id)
        .bind(&plan.book_id)
        .bind(&plan.course_id)
        .bind(&plan.master_study_plan_id)
        .bind(&plan.name)
        .bind(now)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Catalog for Store {
    async fn resolve_structures(
        &self,
        kind: ContentKind,
        unit_ids: &[String],
    ) -> Result<HashMap<String, ContentStructure>> {
        if unit_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // A book attached to several courses resolves to the lowest course id
        let query = format!(
            r#"
            SELECT u.{key} AS unit_id, t.topic_id, c.chapter_id, c.book_id,
                (SELECT cb.course_id FROM course_books cb
                 WHERE cb.book_id = c.book_id ORDER BY cb.course_id LIMIT 1) AS course_id
            FROM {table} u
            JOIN topics t ON t.topic_id = u.topic_id
            JOIN chapters c ON c.chapter_id = t.chapter_id
            WHERE u.{key} IN ({ids})
            "#,
            key = kind.catalog_key(),
            table = kind.catalog_table(),
            ids = placeholders(unit_ids.len()),
        );

        let mut query_builder = sqlx::query_as::<_, StructureRow>(&query);
        for id in unit_ids {
            query_builder = query_builder.bind(id);
        }
        let rows = query_builder.fetch_all(&self.pool).await?;
        debug!("Catalog resolved {} of {} unit(s)", rows.len(), unit_ids.len());

        Ok(rows
            .into_iter()
            .map(|row| {
                let structure = ContentStructure {
                    course_id: row.course_id.unwrap_or_default(),
                    book_id: row.book_id,
                    chapter_id: row.chapter_id,
                    topic_id: row.topic_id,
                    lo_id: None,
                    assignment_id: None,
                }
                .with_unit(kind, &row.unit_id);
                (row.unit_id, structure)
            })
            .collect())
    }

    async fn list_book_units(&self, book_id: &str) -> Result<Vec<CatalogUnit>> {
        let rows = sqlx::query_as::<_, BookUnitRow>(
            r#"
            SELECT 'learning_objective' AS kind, u.lo_id AS unit_id, u.topic_id, u.display_order AS display_order,
                c.display_order AS chapter_order, t.display_order AS topic_order
            FROM learning_objectives u
            JOIN topics t ON t.topic_id = u.topic_id
            JOIN chapters c ON c.chapter_id = t.chapter_id
            WHERE c.book_id = ?
            UNION ALL
            SELECT 'assignment' AS kind, u.assignment_id AS unit_id, u.topic_id, u.display_order AS display_order,
                c.display_order AS chapter_order, t.display_order AS topic_order
            FROM assignments u
            JOIN topics t ON t.topic_id = u.topic_id
            JOIN chapters c ON c.chapter_id = t.chapter_id
            WHERE c.book_id = ?
            ORDER BY chapter_order, topic_order, display_order, unit_id
            "#,
        )
        .bind(book_id)
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<CatalogUnit> {
                Ok(CatalogUnit {
                    kind: row.kind.parse()?,
                    unit_id: row.unit_id,
                    topic_id: row.topic_id,
                    display_order: row.display_order,
                })
            })
            .collect()
    }
}
