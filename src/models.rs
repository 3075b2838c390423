use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub type EventId = i64;
pub type ItemId = i64;

/// Label and colour used when an item points at an event we do not know
pub const PLACEHOLDER_EVENT_TITLE: &str = "Event";
pub const PLACEHOLDER_EVENT_COLOR: &str = "#999999";

/// A named, coloured category that items are grouped under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub color: String,
}

/// One occurrence of an event on a calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub event_id: EventId,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: Option<String>,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Item {
    /// An item counts as modified once it differs from what draw mode creates
    pub fn is_modified(&self, default_title: &str) -> bool {
        fn filled(field: &Option<String>) -> bool {
            field.as_deref().is_some_and(|s| !s.is_empty())
        }
        self.title != default_title
            || filled(&self.time)
            || filled(&self.description)
            || filled(&self.notes)
    }
}

/// Body of `POST /items`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewItem {
    pub event_id: EventId,
    pub date: NaiveDate,
    pub title: String,
    pub time: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

/// Body of `PATCH /items/{id}`; absent fields are left untouched,
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
}

impl ItemPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Body of `POST /events`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewEvent {
    pub title: String,
    pub color: String,
}

/// Body of `PATCH /events/{id}`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EventPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Turn an empty form field into `None`
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
