//! Inbound events
//!
//! Events arrive as JSON objects tagged by `"event"`. They are validated before the
//! engine does any work; a rejected event never reaches the store.

use crate::error::{Error, Result};
use crate::model::{ContentKind, Patch, TimeOverrides};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// An inbound event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    ContentUnitsCreated(ContentUnitsCreated),
    ScheduleImport(ScheduleImport),
}

impl Event {
    /// Parse an event from its JSON form
    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Task kind recorded when this event is applied as a tracked run
    pub fn task_kind(&self) -> &'static str {
        match self {
            Event::ContentUnitsCreated(_) => "content_units_created",
            Event::ScheduleImport(_) => "schedule_import",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Event::ContentUnitsCreated(e) => e.validate(),
            Event::ScheduleImport(e) => e.validate(),
        }
    }
}

/// Learning objectives or assignments were added to the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentUnitsCreated {
    pub kind: ContentKind,
    pub units: Vec<CreatedUnit>,
    /// Structures the sender already knows, keyed by unit id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub content_structures: BTreeMap<String, InlineStructure>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedUnit {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<i32>,
    #[serde(default, skip_serializing_if = "TimeOverrides::is_empty")]
    pub times: TimeOverrides,
}

impl CreatedUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic_id: None,
            display_order: None,
            times: TimeOverrides::default(),
        }
    }
}

/// Partial content structure supplied by the sender
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineStructure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,
}

impl ContentUnitsCreated {
    pub fn validate(&self) -> Result<()> {
        if self.units.is_empty() {
            return Err(Error::Validation("units must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for unit in &self.units {
            if unit.id.trim().is_empty() {
                return Err(Error::Validation("unit id must not be empty".to_string()));
            }
            if !seen.insert(unit.id.as_str()) {
                return Err(Error::Validation(format!(
                    "unit {} appears more than once",
                    unit.id
                )));
            }
            unit.times
                .check_windows()
                .map_err(|e| Error::Validation(format!("unit {}: {}", unit.id, e)))?;
        }

        Ok(())
    }
}

/// Date changes for items of one study plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleImport {
    pub study_plan_id: String,
    pub items: Vec<ScheduleRow>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRow {
    pub content_unit_id: String,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub start_date: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub end_date: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub available_from: Patch<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Patch::is_unset")]
    pub available_to: Patch<DateTime<Utc>>,
}

impl ScheduleRow {
    pub fn overrides(&self) -> TimeOverrides {
        TimeOverrides {
            start_date: self.start_date,
            end_date: self.end_date,
            available_from: self.available_from,
            available_to: self.available_to,
        }
    }
}

impl ScheduleImport {
    pub fn validate(&self) -> Result<()> {
        if self.study_plan_id.trim().is_empty() {
            return Err(Error::Validation(
                "study_plan_id must not be empty".to_string(),
            ));
        }
        if self.items.is_empty() {
            return Err(Error::Validation("items must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for row in &self.items {
            if row.content_unit_id.trim().is_empty() {
                return Err(Error::Validation(
                    "content_unit_id must not be empty".to_string(),
                ));
            }
            if !seen.insert(row.content_unit_id.as_str()) {
                return Err(Error::Validation(format!(
                    "content unit {} appears more than once",
                    row.content_unit_id
                )));
            }
            row.overrides().check_windows().map_err(|e| {
                Error::Validation(format!("content unit {}: {}", row.content_unit_id, e))
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_units_created() {
        let event = Event::from_json(
            r#"{
                "event": "content_units_created",
                "kind": "learning_objective",
                "units": [{"id": "lo-1", "topic_id": "topic-1", "display_order": 3}],
                "content_structures": {"lo-1": {"course_id": "course-1", "book_id": "book-1"}}
            }"#,
        )
        .unwrap();

        let Event::ContentUnitsCreated(created) = &event else {
            panic!("wrong variant");
        };
        assert_eq!(created.kind, ContentKind::LearningObjective);
        assert_eq!(created.units[0].display_order, Some(3));
        assert!(created.units[0].times.is_empty());
        assert_eq!(
            created.content_structures["lo-1"].book_id.as_deref(),
            Some("book-1")
        );
        assert_eq!(event.task_kind(), "content_units_created");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_parse_schedule_import_keeps_null_distinct() {
        let event = Event::from_json(
            r#"{
                "event": "schedule_import",
                "study_plan_id": "sp-master",
                "items": [{"content_unit_id": "lo-1", "start_date": "2024-03-01T00:00:00Z", "end_date": null}]
            }"#,
        )
        .unwrap();

        let Event::ScheduleImport(import) = &event else {
            panic!("wrong variant");
        };
        let overrides = import.items[0].overrides();
        assert!(matches!(overrides.start_date, Patch::Value(_)));
        assert_eq!(overrides.end_date, Patch::Null);
        assert_eq!(overrides.available_to, Patch::Unset);
    }

    #[test]
    fn test_rejects_empty_and_duplicate_units() {
        let empty = Event::ContentUnitsCreated(ContentUnitsCreated {
            kind: ContentKind::Assignment,
            units: vec![],
            content_structures: BTreeMap::new(),
        });
        assert!(matches!(empty.validate(), Err(Error::Validation(_))));

        let dup = Event::ContentUnitsCreated(ContentUnitsCreated {
            kind: ContentKind::Assignment,
            units: vec![CreatedUnit::new("as-1"), CreatedUnit::new("as-1")],
            content_structures: BTreeMap::new(),
        });
        let err = dup.validate().unwrap_err();
        assert!(err.to_string().contains("as-1"));
    }

    #[test]
    fn test_rejects_inverted_window() {
        let event = Event::from_json(
            r#"{
                "event": "schedule_import",
                "study_plan_id": "sp-master",
                "items": [{
                    "content_unit_id": "lo-1",
                    "available_from": "2024-03-10T00:00:00Z",
                    "available_to": "2024-03-01T00:00:00Z"
                }]
            }"#,
        )
        .unwrap();
        assert!(matches!(event.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_unknown_event_fails_to_parse() {
        let err = Event::from_json(r#"{"event": "content_deleted", "ids": []}"#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
