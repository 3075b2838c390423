use crate::date_util::date_range_inclusive;
use crate::events::EventList;
use crate::models::{Event, EventId};
use crate::prefs::{HIGHLIGHT_KEY, PreferenceStore};
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Which dates are selected. The modes are exclusive: entering one drops
/// everything the previous mode selected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DateSelection {
    #[default]
    None,
    /// One active cell; drives the day panel
    Single(NaiveDate),
    /// Inclusive range, always stored ascending
    Range { start: NaiveDate, end: NaiveDate },
    /// Individually toggled dates
    Multi(BTreeSet<NaiveDate>),
}

/// Highlighted events, the draw event, and the date selection
#[derive(Debug, Default)]
pub struct SelectionModel {
    highlighted: BTreeSet<EventId>,
    draw_event: Option<EventId>,
    dates: DateSelection,
    anchor: Option<NaiveDate>,
}

impl SelectionModel {
    pub fn new() -> Self {
        Self::default()
    }

    // --- highlight set ---

    /// Restore the persisted highlight set, dropping ids that no longer exist
    pub fn restore_highlights(&mut self, store: &PreferenceStore, events: &EventList) {
        if let Some(ids) = store.get_ids(HIGHLIGHT_KEY) {
            self.highlighted = ids.into_iter().filter(|id| events.contains(*id)).collect();
        }
    }

    pub fn is_highlighted(&self, id: EventId) -> bool {
        self.highlighted.contains(&id)
    }

    pub fn highlighted(&self) -> &BTreeSet<EventId> {
        &self.highlighted
    }

    pub fn has_highlights(&self) -> bool {
        !self.highlighted.is_empty()
    }

    /// Highlighted events in display order
    pub fn highlighted_events<'a>(&self, events: &'a EventList) -> Vec<&'a Event> {
        events.all().iter().filter(|e| self.is_highlighted(e.id)).collect()
    }

    /// Flip one event's membership; returns whether it is now highlighted
    pub fn toggle_highlight(&mut self, id: EventId, store: &mut PreferenceStore) -> bool {
        let now_highlighted = if self.highlighted.remove(&id) {
            false
        } else {
            self.highlighted.insert(id);
            true
        };
        self.save_highlights(store);
        now_highlighted
    }

    /// Replace the whole highlight set with just `id`
    pub fn isolate(&mut self, id: EventId, store: &mut PreferenceStore) {
        self.highlighted = BTreeSet::from([id]);
        self.save_highlights(store);
    }

    /// Drop references to events that no longer exist
    pub fn retain_existing(&mut self, events: &EventList, store: &mut PreferenceStore) {
        let before = self.highlighted.len();
        self.highlighted.retain(|id| events.contains(*id));
        if self.highlighted.len() != before {
            self.save_highlights(store);
        }
        if self.draw_event.is_some_and(|id| !events.contains(id)) {
            self.draw_event = None;
        }
    }

    fn save_highlights(&self, store: &mut PreferenceStore) {
        let ids: Vec<EventId> = self.highlighted.iter().copied().collect();
        store.set_ids(HIGHLIGHT_KEY, &ids);
    }

    // --- draw mode ---

    pub fn draw_event(&self) -> Option<EventId> {
        self.draw_event
    }

    #[allow(dead_code)]
    pub fn set_draw_event(&mut self, id: Option<EventId>) {
        self.draw_event = id;
    }

    /// Enter draw mode for `id`, or leave it when `id` is already drawing.
    /// Returns whether `id` is now the draw event.
    pub fn toggle_draw(&mut self, id: EventId) -> bool {
        if self.draw_event == Some(id) {
            self.draw_event = None;
            false
        } else {
            self.draw_event = Some(id);
            true
        }
    }

    /// Leave draw mode; returns whether anything changed
    pub fn clear_draw(&mut self) -> bool {
        self.draw_event.take().is_some()
    }

    // --- date selection ---

    pub fn dates(&self) -> &DateSelection {
        &self.dates
    }

    /// Select exactly one date, clearing any range or multi selection
    pub fn select_single(&mut self, date: NaiveDate) {
        self.dates = DateSelection::Single(date);
        self.anchor = Some(date);
    }

    /// Shift-click: select the inclusive range between the anchor and `date`
    pub fn extend_range(&mut self, date: NaiveDate) {
        let anchor = *self.anchor.get_or_insert(date);
        let (start, end) = if anchor <= date { (anchor, date) } else { (date, anchor) };
        self.dates = DateSelection::Range { start, end };
    }

    /// Command-click: add or remove one date from the accumulated set
    pub fn toggle_date(&mut self, date: NaiveDate) {
        let mut set = match std::mem::take(&mut self.dates) {
            DateSelection::Multi(set) => set,
            _ => BTreeSet::new(),
        };
        if !set.remove(&date) {
            set.insert(date);
        }
        self.anchor = Some(date);
        self.dates = if set.is_empty() {
            DateSelection::None
        } else {
            DateSelection::Multi(set)
        };
    }

    pub fn clear_dates(&mut self) {
        self.dates = DateSelection::None;
        self.anchor = None;
    }

    /// Selected dates, ascending
    pub fn selected_dates(&self) -> Vec<NaiveDate> {
        match &self.dates {
            DateSelection::None => Vec::new(),
            DateSelection::Single(date) => vec![*date],
            DateSelection::Range { start, end } => date_range_inclusive(*start, *end),
            DateSelection::Multi(set) => set.iter().copied().collect(),
        }
    }

    pub fn single_date(&self) -> Option<NaiveDate> {
        match self.dates {
            DateSelection::Single(date) => Some(date),
            _ => None,
        }
    }

    #[allow(dead_code)]
    pub fn is_multi(&self) -> bool {
        matches!(self.dates, DateSelection::Range { .. } | DateSelection::Multi(_))
    }

    /// The single active cell (only in single mode)
    pub fn is_active(&self, date: NaiveDate) -> bool {
        self.single_date() == Some(date)
    }

    /// Part of a range or multi selection
    pub fn is_in_multi(&self, date: NaiveDate) -> bool {
        match &self.dates {
            DateSelection::Range { start, end } => *start <= date && date <= *end,
            DateSelection::Multi(set) => set.contains(&date),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::d;
    use crate::events::tests::event;

    fn events(ids: &[EventId]) -> EventList {
        let mut list = EventList::new();
        list.replace(
            ids.iter().map(|id| event(*id, "e", "#123456")).collect(),
            &PreferenceStore::in_memory(),
        );
        list
    }

    #[test]
    fn test_toggle_twice_restores_original() {
        let mut store = PreferenceStore::in_memory();
        let mut sel = SelectionModel::new();
        assert!(sel.toggle_highlight(4, &mut store));
        assert!(!sel.toggle_highlight(4, &mut store));
        assert!(!sel.is_highlighted(4));
        assert_eq!(store.get_ids(HIGHLIGHT_KEY), Some(vec![]));
    }

    #[test]
    fn test_isolate_replaces_set() {
        let mut store = PreferenceStore::in_memory();
        let mut sel = SelectionModel::new();
        sel.toggle_highlight(1, &mut store);
        sel.toggle_highlight(2, &mut store);
        sel.isolate(3, &mut store);
        assert_eq!(sel.highlighted().iter().copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(store.get_ids(HIGHLIGHT_KEY), Some(vec![3]));
    }

    #[test]
    fn test_restore_filters_dangling_ids() {
        let mut store = PreferenceStore::in_memory();
        store.set_ids(HIGHLIGHT_KEY, &[1, 5, 2]);
        let mut sel = SelectionModel::new();
        sel.restore_highlights(&store, &events(&[1, 2, 3]));
        assert_eq!(sel.highlighted().iter().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_highlighted_events_follow_display_order() {
        let mut store = PreferenceStore::in_memory();
        let list = events(&[3, 1, 2]);
        let mut sel = SelectionModel::new();
        sel.toggle_highlight(1, &mut store);
        sel.toggle_highlight(3, &mut store);
        let order: Vec<EventId> = sel.highlighted_events(&list).iter().map(|e| e.id).collect();
        assert_eq!(order, vec![3, 1]);
    }

    #[test]
    fn test_retain_existing_clears_deleted_draw_event() {
        let mut store = PreferenceStore::in_memory();
        let mut sel = SelectionModel::new();
        sel.toggle_highlight(9, &mut store);
        sel.set_draw_event(Some(9));
        sel.retain_existing(&events(&[1]), &mut store);
        assert!(!sel.is_highlighted(9));
        assert_eq!(sel.draw_event(), None);
    }

    #[test]
    fn test_draw_mode_toggle_and_idempotent_clear() {
        let mut sel = SelectionModel::new();
        assert!(sel.toggle_draw(2));
        assert!(sel.toggle_draw(5));
        assert_eq!(sel.draw_event(), Some(5));
        assert!(!sel.toggle_draw(5));
        assert!(!sel.clear_draw());
        assert!(!sel.clear_draw());
        assert_eq!(sel.draw_event(), None);
    }

    #[test]
    fn test_extend_range_backwards() {
        let mut sel = SelectionModel::new();
        sel.select_single(d(2024, 3, 5));
        sel.extend_range(d(2024, 3, 2));
        assert_eq!(
            sel.selected_dates(),
            vec![d(2024, 3, 2), d(2024, 3, 3), d(2024, 3, 4), d(2024, 3, 5)]
        );
        assert!(sel.single_date().is_none());
        assert!(sel.is_in_multi(d(2024, 3, 3)));
        assert!(!sel.is_active(d(2024, 3, 5)));
    }

    #[test]
    fn test_extend_range_keeps_anchor() {
        let mut sel = SelectionModel::new();
        sel.select_single(d(2024, 3, 5));
        sel.extend_range(d(2024, 3, 8));
        sel.extend_range(d(2024, 3, 3));
        assert_eq!(sel.selected_dates().first(), Some(&d(2024, 3, 3)));
        assert_eq!(sel.selected_dates().last(), Some(&d(2024, 3, 5)));
    }

    #[test]
    fn test_toggle_date_accumulates_and_clears_previous_mode() {
        let mut sel = SelectionModel::new();
        sel.select_single(d(2024, 1, 1));
        sel.toggle_date(d(2024, 1, 10));
        sel.toggle_date(d(2024, 1, 4));
        assert_eq!(sel.selected_dates(), vec![d(2024, 1, 4), d(2024, 1, 10)]);
        assert!(!sel.is_active(d(2024, 1, 1)));
        assert!(!sel.is_in_multi(d(2024, 1, 1)));

        sel.toggle_date(d(2024, 1, 4));
        assert_eq!(sel.selected_dates(), vec![d(2024, 1, 10)]);
        sel.toggle_date(d(2024, 1, 10));
        assert_eq!(*sel.dates(), DateSelection::None);
    }

    #[test]
    fn test_select_single_clears_multi() {
        let mut sel = SelectionModel::new();
        sel.toggle_date(d(2024, 1, 10));
        sel.toggle_date(d(2024, 1, 11));
        sel.select_single(d(2024, 2, 1));
        assert_eq!(sel.selected_dates(), vec![d(2024, 2, 1)]);
        assert!(!sel.is_in_multi(d(2024, 1, 10)));
        assert!(sel.is_active(d(2024, 2, 1)));
    }
}
