//! Content structure resolution

use super::Catalog;
use crate::error::{Error, Result};
use crate::events::{ContentUnitsCreated, CreatedUnit, InlineStructure};
use crate::model::{ContentKind, ContentStructure, TimeOverrides};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A content unit with its catalog location
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUnit {
    pub kind: ContentKind,
    pub unit_id: String,
    pub structure: ContentStructure,
    pub display_order: Option<i32>,
    pub times: TimeOverrides,
}

/// A unit that could not be placed in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedUnit {
    pub unit_id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Resolution {
    /// Resolved units, in event order
    pub resolved: Vec<ResolvedUnit>,
    pub dropped: Vec<DroppedUnit>,
}

impl Resolution {
    pub fn merge(&mut self, other: Resolution) {
        self.resolved.extend(other.resolved);
        self.dropped.extend(other.dropped);
    }
}

fn from_inline(unit: &CreatedUnit, inline: &InlineStructure) -> Option<ContentStructure> {
    let book_id = inline.book_id.as_deref().filter(|b| !b.is_empty())?;
    let topic_id = inline
        .topic_id
        .as_deref()
        .or(unit.topic_id.as_deref())
        .unwrap_or_default();

    Some(ContentStructure {
        course_id: inline.course_id.clone().unwrap_or_default(),
        book_id: book_id.to_string(),
        chapter_id: inline.chapter_id.clone().unwrap_or_default(),
        topic_id: topic_id.to_string(),
        lo_id: None,
        assignment_id: None,
    })
}

/// Resolve every unit of the event.
///
/// Inline structures win per unit. The rest go to the catalog in one call; units the
/// catalog does not know are dropped and reported, the others carry on.
pub async fn resolve_units(
    catalog: &dyn Catalog,
    event: &ContentUnitsCreated,
) -> Result<Resolution> {
    let kind = event.kind;
    let mut inline = Vec::with_capacity(event.units.len());
    let mut pending = Vec::new();

    for unit in &event.units {
        let structure = event
            .content_structures
            .get(&unit.id)
            .and_then(|s| from_inline(unit, s));
        if structure.is_none() {
            pending.push(unit.id.clone());
        }
        inline.push(structure);
    }

    let mut from_catalog = if pending.is_empty() {
        Default::default()
    } else {
        debug!("Resolving {} {} unit(s) through the catalog", pending.len(), kind);
        catalog
            .resolve_structures(kind, &pending)
            .await
            .map_err(|e| Error::lookup("resolve_structures", e))?
    };

    let mut resolution = Resolution::default();
    for (unit, structure) in event.units.iter().zip(inline) {
        let structure = match structure.or_else(|| from_catalog.remove(&unit.id)) {
            Some(s) => s,
            None => {
                let reason = if event.content_structures.contains_key(&unit.id) {
                    "inline structure has no book_id and the catalog has no entry"
                } else {
                    "not found in the catalog"
                };
                let err = Error::Resolution {
                    unit_id: unit.id.clone(),
                    reason: reason.to_string(),
                };
                warn!("{}", err);
                resolution.dropped.push(DroppedUnit {
                    unit_id: unit.id.clone(),
                    reason: reason.to_string(),
                });
                continue;
            }
        };

        resolution.resolved.push(ResolvedUnit {
            kind,
            unit_id: unit.id.clone(),
            structure: structure.with_unit(kind, &unit.id),
            display_order: unit.display_order,
            times: unit.times.clone(),
        });
    }

    Ok(resolution)
}
