//! Best-effort client-side preference storage.
//!
//! A flat string key/value map persisted as JSON. Every failure to read or
//! write is logged and otherwise ignored; preferences simply do not stick.

use crate::models::EventId;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub const HIGHLIGHT_KEY: &str = "highlightEventIds";
pub const EVENT_ORDER_KEY: &str = "eventOrder";
pub const ITEMS_COLLAPSED_KEY: &str = "itemsCollapsed";
pub const EVENTS_COLLAPSED_KEY: &str = "eventsCollapsed";
pub const SIDEBAR_COLLAPSED_KEY: &str = "sidebarCollapsed";

pub struct PreferenceStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl PreferenceStore {
    /// Open the store backed by `path`; an unreadable or corrupt file starts empty
    pub fn open(path: PathBuf) -> Self {
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|content| match serde_json::from_str(&content) {
                Ok(values) => Some(values),
                Err(e) => {
                    tracing::debug!(error = %e, path = %path.display(), "ignoring corrupt preferences");
                    None
                }
            })
            .unwrap_or_default();
        Self {
            path: Some(path),
            values,
        }
    }

    /// A store that never touches disk
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
        self.flush();
    }

    fn flush(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let write = || -> std::io::Result<()> {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            let json = serde_json::to_string_pretty(&self.values)?;
            fs::write(path, json)
        };
        if let Err(e) = write() {
            tracing::debug!(error = %e, path = %path.display(), "failed to persist preferences");
        }
    }

    pub fn get_flag(&self, key: &str) -> Option<bool> {
        self.get(key).map(|v| v == "1")
    }

    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.set(key, if value { "1" } else { "0" });
    }

    /// Read an id list; missing or malformed values read as `None`
    pub fn get_ids(&self, key: &str) -> Option<Vec<EventId>> {
        self.get(key).and_then(|raw| serde_json::from_str(raw).ok())
    }

    pub fn set_ids(&mut self, key: &str, ids: &[EventId]) {
        match serde_json::to_string(ids) {
            Ok(json) => self.set(key, json),
            Err(e) => tracing::debug!(error = %e, key, "failed to encode id list"),
        }
    }
}

/// Collapse state of the three side panels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelLayout {
    pub items_collapsed: bool,
    pub events_collapsed: bool,
    pub sidebar_collapsed: bool,
}

impl PanelLayout {
    /// The items panel starts collapsed for people who never touched it
    pub fn restore(store: &PreferenceStore) -> Self {
        Self {
            items_collapsed: store.get_flag(ITEMS_COLLAPSED_KEY).unwrap_or(true),
            events_collapsed: store.get_flag(EVENTS_COLLAPSED_KEY).unwrap_or(false),
            sidebar_collapsed: store.get_flag(SIDEBAR_COLLAPSED_KEY).unwrap_or(false),
        }
    }

    pub fn toggle_items(&mut self, store: &mut PreferenceStore) {
        self.items_collapsed = !self.items_collapsed;
        store.set_flag(ITEMS_COLLAPSED_KEY, self.items_collapsed);
    }

    pub fn toggle_events(&mut self, store: &mut PreferenceStore) {
        self.events_collapsed = !self.events_collapsed;
        store.set_flag(EVENTS_COLLAPSED_KEY, self.events_collapsed);
    }

    pub fn toggle_sidebar(&mut self, store: &mut PreferenceStore) {
        self.sidebar_collapsed = !self.sidebar_collapsed;
        store.set_flag(SIDEBAR_COLLAPSED_KEY, self.sidebar_collapsed);
    }
}
