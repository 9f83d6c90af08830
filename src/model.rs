//! Domain types shared by the engine and the store
//!
//! Content units (learning objectives, assignments) live in the catalog and are only
//! read here. Study plans and their items are what the engine creates and updates.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use ulid::Ulid;

/// Kind of content unit an item schedules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    #[serde(alias = "lo")]
    LearningObjective,
    Assignment,
}

impl ContentKind {
    /// Catalog table holding units of this kind
    pub fn catalog_table(self) -> &'static str {
        match self {
            ContentKind::LearningObjective => "learning_objectives",
            ContentKind::Assignment => "assignments",
        }
    }

    /// Primary key column of the catalog table
    pub fn catalog_key(self) -> &'static str {
        match self {
            ContentKind::LearningObjective => "lo_id",
            ContentKind::Assignment => "assignment_id",
        }
    }

    /// Join table linking units of this kind to study plan items
    pub fn join_table(self) -> &'static str {
        match self {
            ContentKind::LearningObjective => "lo_study_plan_items",
            ContentKind::Assignment => "assignment_study_plan_items",
        }
    }

    fn flatten_tag(self) -> &'static str {
        match self {
            ContentKind::LearningObjective => "lo",
            ContentKind::Assignment => "assignment",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentKind::LearningObjective => write!(f, "learning_objective"),
            ContentKind::Assignment => write!(f, "assignment"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "learning_objective" | "lo" => Ok(ContentKind::LearningObjective),
            "assignment" => Ok(ContentKind::Assignment),
            _ => Err(Error::InvalidRecord(format!("Unknown content kind: {}", s))),
        }
    }
}

/// Catalog location of a content unit, denormalized onto each item
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStructure {
    #[serde(default)]
    pub course_id: String,
    pub book_id: String,
    #[serde(default)]
    pub chapter_id: String,
    #[serde(default)]
    pub topic_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lo_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
}

impl ContentStructure {
    /// The content unit this structure points at, whichever slot is populated
    pub fn content_unit(&self) -> Option<(ContentKind, &str)> {
        match (&self.lo_id, &self.assignment_id) {
            (Some(id), _) if !id.is_empty() => Some((ContentKind::LearningObjective, id)),
            (_, Some(id)) if !id.is_empty() => Some((ContentKind::Assignment, id)),
            _ => None,
        }
    }

    /// Place a unit id into the slot for its kind, clearing the other slot
    pub fn with_unit(mut self, kind: ContentKind, unit_id: &str) -> Self {
        match kind {
            ContentKind::LearningObjective => {
                self.lo_id = Some(unit_id.to_string());
                self.assignment_id = None;
            }
            ContentKind::Assignment => {
                self.assignment_id = Some(unit_id.to_string());
                self.lo_id = None;
            }
        }
        self
    }

    /// Structural path used for sorting and rendering, never for identity
    pub fn flatten(&self) -> Option<String> {
        let (kind, unit_id) = self.content_unit()?;
        Some(format!(
            "book::{}topic::{}chapter::{}course::{}{}::{}",
            self.book_id,
            self.topic_id,
            self.chapter_id,
            self.course_id,
            kind.flatten_tag(),
            unit_id
        ))
    }
}

/// Study plan tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Master,
    Copy,
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanTier::Master => write!(f, "master"),
            PlanTier::Copy => write!(f, "copy"),
        }
    }
}

/// A study plan; copies point at the master plan of the same book
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyPlan {
    pub id: String,
    pub book_id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub master_study_plan_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl StudyPlan {
    pub fn tier(&self) -> PlanTier {
        match self.master_study_plan_id {
            Some(_) => PlanTier::Copy,
            None => PlanTier::Master,
        }
    }

    pub fn is_master(&self) -> bool {
        self.tier() == PlanTier::Master
    }
}

/// Study plan item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Archived,
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Active => write!(f, "active"),
            ItemStatus::Archived => write!(f, "archived"),
        }
    }
}

impl FromStr for ItemStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ItemStatus::Active),
            "archived" => Ok(ItemStatus::Archived),
            _ => Err(Error::InvalidRecord(format!("Unknown item status: {}", s))),
        }
    }
}

/// One scheduled occurrence of a content unit inside one study plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyPlanItem {
    pub id: String,
    pub study_plan_id: String,
    pub content_structure: ContentStructure,
    pub content_structure_flatten: String,
    pub display_order: i32,
    pub status: ItemStatus,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub available_from: Option<DateTime<Utc>>,
    pub available_to: Option<DateTime<Utc>>,
    pub copied_from_item_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StudyPlanItem {
    pub fn content_unit(&self) -> Option<(ContentKind, &str)> {
        self.content_structure.content_unit()
    }

    pub fn content_unit_id(&self) -> Option<&str> {
        self.content_unit().map(|(_, id)| id)
    }
}

/// Mint a globally unique, lexicographically sortable item id
pub fn new_item_id() -> String {
    Ulid::new().to_string()
}

/// Association between a content unit and the item that represents it in one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRow {
    pub kind: ContentKind,
    pub content_unit_id: String,
    pub study_plan_item_id: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle of a tracked sync task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    InProgress,
    Completed,
    Error,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "error" => Ok(TaskStatus::Error),
            _ => Err(Error::InvalidRecord(format!("Unknown task status: {}", s))),
        }
    }
}

/// Tri-state field update
///
/// `Unset` means the caller said nothing about the field, `Null` means the caller sent
/// an explicit null, `Value` carries a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patch<T> {
    Unset,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unset
    }
}

impl<T: Clone> Patch<T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Patch::Unset)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Patch::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Resolve the new field value from the persisted one.
    ///
    /// `Null` only clears when `allow_clear` is set; otherwise it keeps the persisted
    /// value, which is `None` anyway for a fresh insert.
    pub fn apply(&self, current: Option<T>, allow_clear: bool) -> Option<T> {
        match self {
            Patch::Unset => current,
            Patch::Value(v) => Some(v.clone()),
            Patch::Null if allow_clear => None,
            Patch::Null => current,
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Missing fields never reach here; they take `#[serde(default)]` (Unset)
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Value(v),
            None => Patch::Null,
        })
    }
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Patch::Value(v) => serializer.serialize_some(v),
            Patch::Unset | Patch::Null => serializer.serialize_none(),
        }
    }
}

/// Start/end and availability overrides carried by an event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOverrides {
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub start_date: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub end_date: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub available_from: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub available_to: Patch<DateTime<Utc>>,
}

impl TimeOverrides {
    pub fn is_empty(&self) -> bool {
        self.start_date.is_unset()
            && self.end_date.is_unset()
            && self.available_from.is_unset()
            && self.available_to.is_unset()
    }

    /// Apply every supplied field to the item; unset fields stay as they are
    pub fn apply(&self, item: &mut StudyPlanItem, allow_clear: bool) {
        item.start_date = self.start_date.apply(item.start_date, allow_clear);
        item.end_date = self.end_date.apply(item.end_date, allow_clear);
        item.available_from = self.available_from.apply(item.available_from, allow_clear);
        item.available_to = self.available_to.apply(item.available_to, allow_clear);
    }

    /// Reject windows that close before they open
    pub fn check_windows(&self) -> Result<(), String> {
        if let (Some(start), Some(end)) = (self.start_date.value(), self.end_date.value()) {
            if start > end {
                return Err(format!("start_date {} is after end_date {}", start, end));
            }
        }
        if let (Some(from), Some(to)) = (self.available_from.value(), self.available_to.value())
        {
            if from > to {
                return Err(format!(
                    "available_from {} is after available_to {}",
                    from, to
                ));
            }
        }
        Ok(())
    }
}
