//! SQLite schema definition

/// SQL schema for the study plan database
pub const SCHEMA_SQL: &str = r#"
-- Catalog: books, chapters, topics and the content units inside them
CREATE TABLE IF NOT EXISTS books (
    book_id TEXT PRIMARY KEY,
    name TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    chapter_id TEXT PRIMARY KEY,
    book_id TEXT NOT NULL REFERENCES books(book_id),
    display_order INTEGER NOT NULL DEFAULT 0,
    name TEXT
);

CREATE TABLE IF NOT EXISTS topics (
    topic_id TEXT PRIMARY KEY,
    chapter_id TEXT NOT NULL REFERENCES chapters(chapter_id),
    display_order INTEGER NOT NULL DEFAULT 0,
    name TEXT
);

CREATE TABLE IF NOT EXISTS learning_objectives (
    lo_id TEXT PRIMARY KEY,
    topic_id TEXT NOT NULL REFERENCES topics(topic_id),
    display_order INTEGER NOT NULL DEFAULT 0,
    name TEXT
);

CREATE TABLE IF NOT EXISTS assignments (
    assignment_id TEXT PRIMARY KEY,
    topic_id TEXT NOT NULL REFERENCES topics(topic_id),
    display_order INTEGER NOT NULL DEFAULT 0,
    name TEXT
);

-- Courses a book is attached to
CREATE TABLE IF NOT EXISTS course_books (
    course_id TEXT NOT NULL,
    book_id TEXT NOT NULL REFERENCES books(book_id),
    PRIMARY KEY (course_id, book_id)
);

-- Study plans: one master per book, any number of copies
CREATE TABLE IF NOT EXISTS study_plans (
    study_plan_id TEXT PRIMARY KEY,
    book_id TEXT NOT NULL,
    course_id TEXT,
    master_study_plan_id TEXT REFERENCES study_plans(study_plan_id),
    name TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

-- Study plan items: one live item per (study plan, content unit)
CREATE TABLE IF NOT EXISTS study_plan_items (
    study_plan_item_id TEXT PRIMARY KEY,
    study_plan_id TEXT NOT NULL REFERENCES study_plans(study_plan_id),
    content_kind TEXT NOT NULL,
    content_unit_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    content_structure TEXT NOT NULL,
    content_structure_flatten TEXT NOT NULL,
    display_order INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT,
    available_from TEXT,
    available_to TEXT,
    copied_from_item_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

-- Join tables between content units and the items representing them
CREATE TABLE IF NOT EXISTS lo_study_plan_items (
    lo_id TEXT NOT NULL,
    study_plan_item_id TEXT NOT NULL REFERENCES study_plan_items(study_plan_item_id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (lo_id, study_plan_item_id)
);

CREATE TABLE IF NOT EXISTS assignment_study_plan_items (
    assignment_id TEXT NOT NULL,
    study_plan_item_id TEXT NOT NULL REFERENCES study_plan_items(study_plan_item_id),
    created_at TEXT NOT NULL,
    PRIMARY KEY (assignment_id, study_plan_item_id)
);

-- Sync tasks: one row per tracked run
CREATE TABLE IF NOT EXISTS sync_tasks (
    task_id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    status TEXT NOT NULL,
    detail TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_chapters_book ON chapters(book_id);
CREATE INDEX IF NOT EXISTS idx_topics_chapter ON topics(chapter_id);
CREATE INDEX IF NOT EXISTS idx_los_topic ON learning_objectives(topic_id);
CREATE INDEX IF NOT EXISTS idx_assignments_topic ON assignments(topic_id);
CREATE INDEX IF NOT EXISTS idx_plans_book ON study_plans(book_id);
CREATE INDEX IF NOT EXISTS idx_plans_master ON study_plans(master_study_plan_id);
CREATE INDEX IF NOT EXISTS idx_items_plan ON study_plan_items(study_plan_id);
CREATE INDEX IF NOT EXISTS idx_items_unit ON study_plan_items(content_unit_id);
CREATE INDEX IF NOT EXISTS idx_items_copied_from ON study_plan_items(copied_from_item_id);
CREATE INDEX IF NOT EXISTS idx_tasks_started ON sync_tasks(started_at);
"#;
