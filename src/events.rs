use crate::models::{Event, EventId, PLACEHOLDER_EVENT_COLOR, PLACEHOLDER_EVENT_TITLE};
use crate::prefs::{EVENT_ORDER_KEY, PreferenceStore};

/// Events in user display order
#[derive(Debug, Clone, Default)]
pub struct EventList {
    events: Vec<Event>,
}

impl EventList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with a fresh server response, keeping the saved order
    pub fn replace(&mut self, server_events: Vec<Event>, store: &PreferenceStore) {
        self.events = apply_saved_order(server_events, store.get_ids(EVENT_ORDER_KEY).as_deref());
    }

    pub fn all(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.iter_mut().find(|e| e.id == id)
    }

    pub fn contains(&self, id: EventId) -> bool {
        self.get(id).is_some()
    }

    pub fn position(&self, id: EventId) -> Option<usize> {
        self.events.iter().position(|e| e.id == id)
    }

    pub fn ids(&self) -> Vec<EventId> {
        self.events.iter().map(|e| e.id).collect()
    }

    pub fn title_of(&self, id: EventId) -> &str {
        self.get(id).map(|e| e.title.as_str()).unwrap_or(PLACEHOLDER_EVENT_TITLE)
    }

    pub fn color_of(&self, id: EventId) -> &str {
        self.get(id).map(|e| e.color.as_str()).unwrap_or(PLACEHOLDER_EVENT_COLOR)
    }

    /// Move an event one slot earlier; returns false at the top or when unknown
    pub fn move_up(&mut self, id: EventId, store: &mut PreferenceStore) -> bool {
        match self.position(id) {
            Some(pos) if pos > 0 => {
                self.events.swap(pos, pos - 1);
                self.save_order(store);
                true
            }
            _ => false,
        }
    }

    /// Move an event one slot later; returns false at the bottom or when unknown
    pub fn move_down(&mut self, id: EventId, store: &mut PreferenceStore) -> bool {
        match self.position(id) {
            Some(pos) if pos + 1 < self.events.len() => {
                self.events.swap(pos, pos + 1);
                self.save_order(store);
                true
            }
            _ => false,
        }
    }

    fn save_order(&self, store: &mut PreferenceStore) {
        store.set_ids(EVENT_ORDER_KEY, &self.ids());
    }
}

/// Order events by a saved id list. Ids missing from the saved list keep their
/// server order and go at the end; saved ids that no longer exist are skipped.
pub fn apply_saved_order(server_events: Vec<Event>, saved: Option<&[EventId]>) -> Vec<Event> {
    let Some(saved) = saved else {
        return server_events;
    };

    let mut remaining = server_events;
    let mut ordered = Vec::with_capacity(remaining.len());
    for id in saved {
        if let Some(pos) = remaining.iter().position(|e| e.id == *id) {
            ordered.push(remaining.remove(pos));
        }
    }
    ordered.extend(remaining);
    ordered
}
