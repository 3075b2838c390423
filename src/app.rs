use crate::cache::{CacheKey, ItemCache, Refresh};
use crate::color::{hex_to_rgb, random_color, rgb_to_hex};
use crate::date_util::format_date;
use crate::error::{ColendarError, Result};
use crate::events::EventList;
use crate::jobs::{Affected, Job, JobOutcome, Mutation, Revert};
use crate::models::{
    Event, EventId, EventPatch, Item, ItemId, ItemPatch, NewEvent, NewItem, non_empty,
};
use crate::panels::{self, PanelView};
use crate::prefs::{PanelLayout, PreferenceStore};
use crate::selection::SelectionModel;
use crate::ui;
use crate::years::{CELL_HEIGHT, YearRenderer};
use chrono::{Datelike, Duration, NaiveDate};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use std::collections::HashSet;
use std::time::Instant;

/// Rows moved per mouse wheel notch
const WHEEL_ROWS: i32 = 3;

/// Which list keyboard input goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Calendar,
    Events,
    Items,
}

/// What is under the mouse, as resolved by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hit {
    Cell(NaiveDate),
    EventRow(usize),
    ItemRow(usize),
    EventsHeader,
    ItemsHeader,
    /// A year pill in the header
    Year(i32),
    Calendar,
    Nothing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemField {
    Event,
    Title,
    Time,
    Description,
    Notes,
}

pub const ITEM_FIELDS: [ItemField; 5] = [
    ItemField::Event,
    ItemField::Title,
    ItemField::Time,
    ItemField::Description,
    ItemField::Notes,
];

#[derive(Debug, Clone, PartialEq)]
pub struct ItemForm {
    pub editing: Option<ItemId>,
    pub date: NaiveDate,
    pub event_id: Option<EventId>,
    pub title: String,
    pub time: String,
    pub description: String,
    pub notes: String,
    pub field: usize,
}

impl ItemForm {
    pub fn field(&self) -> ItemField {
        ITEM_FIELDS[self.field % ITEM_FIELDS.len()]
    }

    fn text_mut(&mut self) -> Option<&mut String> {
        match self.field() {
            ItemField::Event => None,
            ItemField::Title => Some(&mut self.title),
            ItemField::Time => Some(&mut self.time),
            ItemField::Description => Some(&mut self.description),
            ItemField::Notes => Some(&mut self.notes),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventForm {
    pub editing: Option<EventId>,
    pub title: String,
    pub color: String,
    /// 0 = title, 1 = colour
    pub field: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineTarget {
    Event(EventId),
    Item {
        id: ItemId,
        event_id: EventId,
        date: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InlineEdit {
    pub target: InlineTarget,
    pub original: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorPopover {
    pub event_id: EventId,
    pub original: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmAction {
    DeleteItems {
        event_id: EventId,
        date: NaiveDate,
        ids: Vec<ItemId>,
    },
    DeleteEvent(EventId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confirm {
    pub message: String,
    pub action: ConfirmAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dialog {
    Item(ItemForm),
    Event(EventForm),
    Inline(InlineEdit),
    Color(ColorPopover),
    Confirm(Confirm),
}

/// Application state. Owns everything; backend work leaves through the
/// outbox and comes back through [`App::apply_outcome`].
pub struct App {
    pub events: EventList,
    pub cache: ItemCache,
    pub selection: SelectionModel,
    pub years: YearRenderer,
    pub layout: PanelLayout,
    pub prefs: PreferenceStore,
    pub today: NaiveDate,
    /// Keyboard cell cursor
    pub cursor: NaiveDate,
    pub hover: Option<NaiveDate>,
    pub focus: Focus,
    pub event_index: usize,
    pub item_index: usize,
    pub dialog: Option<Dialog>,
    pub show_logs: bool,
    pub should_quit: bool,
    pub status_message: Option<String>,
    pub status_message_time: Option<Instant>,
    term_size: (u16, u16),
    outbox: Vec<Job>,
    in_flight: usize,
    events_seq: u64,
    booting: bool,
    /// Tickets of best-effort loads whose failures are only logged
    quiet: HashSet<u64>,
}

impl App {
    pub fn new(prefs: PreferenceStore, today: NaiveDate, term_size: (u16, u16)) -> Self {
        let layout = PanelLayout::restore(&prefs);
        let regions = ui::regions(term_size, &layout, false);
        let years = YearRenderer::new(today.year(), ui::grid_layout(&regions), regions.calendar.height);

        Self {
            events: EventList::new(),
            cache: ItemCache::new(),
            selection: SelectionModel::new(),
            years,
            layout,
            prefs,
            today,
            cursor: today,
            hover: None,
            focus: Focus::Calendar,
            event_index: 0,
            item_index: 0,
            dialog: None,
            show_logs: false,
            should_quit: false,
            status_message: None,
            status_message_time: None,
            term_size,
            outbox: Vec::new(),
            in_flight: 0,
            events_seq: 0,
            booting: false,
            quiet: HashSet::new(),
        }
    }

    pub fn set_status(&mut self, msg: impl Into<String>) {
        self.status_message = Some(msg.into());
        self.status_message_time = Some(Instant::now());
    }

    pub fn clear_expired_status(&mut self) {
        if let Some(time) = self.status_message_time
            && time.elapsed() > std::time::Duration::from_secs(3)
        {
            self.status_message = None;
            self.status_message_time = None;
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn term_size(&self) -> (u16, u16) {
        self.term_size
    }

    /// Jobs queued since the last call, for the runtime to execute
    pub fn take_jobs(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.outbox)
    }

    fn push(&mut self, job: Job) {
        self.in_flight += 1;
        self.outbox.push(job);
    }

    /// Start up: events first, then the rest follows when they arrive
    pub fn boot(&mut self) {
        self.booting = true;
        self.fetch_events();
    }

    pub fn tick(&mut self) -> bool {
        self.clear_expired_status();
        self.years.tick()
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.term_size = (width, height);
        self.relayout();
    }

    /// The right-hand day / multi panel is open whenever dates are selected
    pub fn panel_open(&self) -> bool {
        !self.selection.selected_dates().is_empty()
    }

    fn relayout(&mut self) {
        let regions = ui::regions(self.term_size, &self.layout, self.panel_open());
        self.years.resize(ui::grid_layout(&regions), regions.calendar.height);
    }

    // --- backend plumbing ---

    fn fetch_events(&mut self) {
        self.events_seq += 1;
        self.push(Job::FetchEvents(self.events_seq));
    }

    fn load(&mut self, key: CacheKey) -> Refresh {
        let refresh = self.cache.issue(key);
        self.push(Job::Load(refresh));
        refresh
    }

    fn load_quietly(&mut self, key: CacheKey) {
        let refresh = self.load(key);
        self.quiet.insert(refresh.ticket);
    }

    /// Load a date unless it is already cached or on its way
    fn ensure_date_loaded(&mut self, date: NaiveDate) {
        let key = CacheKey::Date(date);
        if !self.cache.is_date_loaded(date) && !self.cache.is_pending(key) {
            self.load(key);
        }
    }

    fn mutate(&mut self, mutation: Mutation, affected: Affected, revert: Option<Revert>) {
        self.push(Job::Mutate {
            mutation,
            affected,
            revert,
        });
    }

    fn report(&mut self, action: &str, error: &ColendarError) {
        tracing::warn!(action, error = %error, "request failed");
        self.set_status(format!("Failed to {}: {}", action, error));
    }

    pub fn apply_outcome(&mut self, outcome: JobOutcome) {
        self.in_flight = self.in_flight.saturating_sub(1);
        match outcome {
            JobOutcome::Events(seq, result) => self.on_events(seq, result),
            JobOutcome::Loaded(refresh, result) => self.on_loaded(refresh, result),
            JobOutcome::Mutated {
                label,
                result,
                affected,
                revert,
            } => self.on_mutated(label, result, affected, revert),
        }
    }

    fn on_events(&mut self, seq: u64, result: Result<Vec<Event>>) {
        if seq != self.events_seq {
            tracing::debug!(seq, latest = self.events_seq, "discarding superseded event list");
            return;
        }
        match result {
            Ok(list) => {
                self.events.replace(list, &self.prefs);
                if self.booting {
                    self.selection.restore_highlights(&self.prefs, &self.events);
                    let ids: Vec<EventId> = self.selection.highlighted().iter().copied().collect();
                    for id in ids {
                        self.load_quietly(CacheKey::Event(id));
                    }
                    self.finish_boot();
                } else {
                    self.selection.retain_existing(&self.events, &mut self.prefs);
                }
                self.clamp_indices();
            }
            Err(e) => {
                self.report("load events", &e);
                if self.booting {
                    self.finish_boot();
                }
            }
        }
    }

    fn finish_boot(&mut self) {
        self.booting = false;
        self.selection.select_single(self.today);
        self.relayout();
        self.load(CacheKey::Date(self.today));
    }

    fn on_loaded(&mut self, refresh: Refresh, result: Result<Vec<Item>>) {
        let quiet = self.quiet.remove(&refresh.ticket);
        match result {
            Ok(items) => {
                self.cache.apply(refresh, items);
                self.clamp_indices();
            }
            Err(e) => {
                let current = self.cache.is_current(&refresh);
                self.cache.abandon(&refresh);
                if quiet {
                    tracing::warn!(key = ?refresh.key, error = %e, "best-effort load failed");
                } else if current {
                    self.report("load items", &e);
                }
            }
        }
    }

    fn on_mutated(&mut self, label: &str, result: Result<()>, affected: Affected, revert: Option<Revert>) {
        if let Err(e) = result {
            if let Some(Revert::EventColor { event_id, color }) = revert
                && let Some(event) = self.events.get_mut(event_id)
            {
                event.color = color;
            }
            self.report(label, &e);
        }

        // A failed mutation may still have partly landed, so reload either way
        if affected.events {
            self.fetch_events();
        }
        for key in affected.keys {
            self.load(key);
        }
    }

    fn clamp_indices(&mut self) {
        self.event_index = self.event_index.min(self.events.len().saturating_sub(1));
        let items = self.item_list().map(|v| v.count()).unwrap_or(0);
        self.item_index = self.item_index.min(items.saturating_sub(1));
    }

    // --- views ---

    /// The list the items focus operates on: the day / multi panel when it is
    /// open, otherwise the sidebar items panel when expanded
    pub fn item_list(&self) -> Option<PanelView> {
        if let Some(view) = panels::selection_panel(&self.selection, &self.cache, &self.events) {
            return Some(view);
        }
        if !self.layout.items_collapsed {
            return Some(panels::items_panel(&self.selection, &self.cache, &self.events));
        }
        None
    }

    pub fn selected_event(&self) -> Option<&Event> {
        self.events.all().get(self.event_index)
    }

    fn selected_item(&self) -> Option<Item> {
        let view = self.item_list()?;
        let row = view.row(self.item_index)?;
        self.cache.get(row.date).iter().find(|i| i.id == row.item_id).cloned()
    }

    // --- highlight and draw ---

    pub fn toggle_highlight(&mut self, id: EventId) {
        self.selection.toggle_highlight(id, &mut self.prefs);
        self.load(CacheKey::Event(id));
    }

    pub fn isolate(&mut self, id: EventId) {
        self.selection.isolate(id, &mut self.prefs);
        self.load(CacheKey::Event(id));
    }

    pub fn toggle_draw(&mut self, id: EventId) {
        self.selection.toggle_draw(id);
        self.load(CacheKey::Event(id));
    }

    // --- calendar cells ---

    /// Plain click or Enter on a day cell
    pub fn activate_cell(&mut self, date: NaiveDate) {
        self.cursor = date;
        self.selection.select_single(date);
        self.relayout();

        let Some(draw_id) = self.selection.draw_event() else {
            self.load(CacheKey::Date(date));
            return;
        };
        if self.cache.has_event_on(date, draw_id) {
            self.load(CacheKey::Date(date));
        } else {
            let item = NewItem {
                event_id: draw_id,
                date,
                title: self.events.title_of(draw_id).to_string(),
                time: None,
                description: None,
                notes: None,
            };
            self.mutate(
                Mutation::CreateItem(item),
                Affected {
                    keys: vec![CacheKey::Date(date), CacheKey::Event(draw_id)],
                    events: false,
                },
                None,
            );
        }
    }

    /// Shift-click: range from the anchor to `date`
    pub fn extend_to(&mut self, date: NaiveDate) {
        self.cursor = date;
        self.selection.extend_range(date);
        for d in self.selection.selected_dates() {
            self.ensure_date_loaded(d);
        }
        self.relayout();
    }

    /// Ctrl-click: add or remove one date
    pub fn toggle_date(&mut self, date: NaiveDate) {
        self.cursor = date;
        self.selection.toggle_date(date);
        self.ensure_date_loaded(date);
        self.relayout();
    }

    /// Close the day / multi panel
    pub fn close_panel(&mut self) {
        self.selection.clear_dates();
        self.relayout();
    }

    /// Right click in draw mode: remove the draw event's items from a date
    pub fn draw_delete(&mut self, date: NaiveDate) {
        let Some(draw_id) = self.selection.draw_event() else {
            return;
        };
        let items: Vec<&Item> = self.cache.get(date).iter().filter(|i| i.event_id == draw_id).collect();
        if items.is_empty() {
            return;
        }
        let title = self.events.title_of(draw_id).to_string();
        let modified = items.iter().any(|i| i.is_modified(&title));
        let action = ConfirmAction::DeleteItems {
            event_id: draw_id,
            date,
            ids: items.iter().map(|i| i.id).collect(),
        };

        if modified {
            self.dialog = Some(Dialog::Confirm(Confirm {
                message: format!(
                    "This event has been modified. Delete all items for \"{}\" on {}?",
                    title,
                    format_date(date)
                ),
                action,
            }));
        } else {
            self.run_confirmed(action);
        }
    }

    fn run_confirmed(&mut self, action: ConfirmAction) {
        match action {
            ConfirmAction::DeleteItems { event_id, date, ids } => self.mutate(
                Mutation::DeleteItems(ids),
                Affected {
                    keys: vec![CacheKey::Date(date), CacheKey::Event(event_id)],
                    events: false,
                },
                None,
            ),
            ConfirmAction::DeleteEvent(id) => {
                // In-flight date loads may still bring the event's items back
                let mut dates: Vec<NaiveDate> = self
                    .cache
                    .iter()
                    .filter(|i| i.event_id == id)
                    .map(|i| i.date)
                    .chain(self.cache.pending_dates())
                    .collect();
                dates.sort();
                dates.dedup();
                self.mutate(
                    Mutation::DeleteEvent(id),
                    Affected {
                        keys: dates.into_iter().map(CacheKey::Date).collect(),
                        events: true,
                    },
                    None,
                );
            }
        }
    }

    /// Pointer moved over a cell (or off the calendar)
    pub fn hover(&mut self, date: Option<NaiveDate>) {
        self.hover = date;
        if let Some(date) = date {
            self.ensure_date_loaded(date);
        }
    }

    // --- navigation ---

    pub fn goto_today(&mut self) {
        self.today = crate::date_util::today();
        self.cursor = self.today;
        self.years.scroll_to_date(self.today);
    }

    pub fn goto_year(&mut self, delta: i32) {
        let year = self.years.current_year() + delta;
        self.years.scroll_to_year(year, true);
    }

    pub fn scroll(&mut self, rows: i32) {
        self.years.scroll_by(rows);
    }

    fn move_cursor(&mut self, days: i64) {
        self.cursor += Duration::days(days);
        let cursor = self.cursor;
        self.hover(Some(cursor));
        self.ensure_visible(cursor);
    }

    fn ensure_visible(&mut self, date: NaiveDate) {
        self.years.ensure_year(date.year());
        let Some((row, _)) = self.years.cell_origin(date) else {
            return;
        };
        let bottom = row + CELL_HEIGHT as i64;
        let height = self.years.viewport_height() as i64;
        if row < 0 {
            self.years.scroll_by((row - 1) as i32);
        } else if bottom > height {
            self.years.scroll_by((bottom - height + 1) as i32);
        }
    }

    // --- dialogs ---

    pub fn open_item_form(&mut self, date: NaiveDate, item: Option<&Item>) {
        self.dialog = Some(Dialog::Item(ItemForm {
            editing: item.map(|i| i.id),
            date: item.map(|i| i.date).unwrap_or(date),
            event_id: item.map(|i| i.event_id).or(self.selection.draw_event()),
            title: item.map(|i| i.title.clone()).unwrap_or_default(),
            time: item.and_then(|i| i.time.clone()).unwrap_or_default(),
            description: item.and_then(|i| i.description.clone()).unwrap_or_default(),
            notes: item.and_then(|i| i.notes.clone()).unwrap_or_default(),
            field: 0,
        }));
    }

    /// Validate and queue an item form; errors leave the dialog open
    pub fn submit_item(&mut self, form: &ItemForm) -> Result<()> {
        let event_id = form
            .event_id
            .ok_or_else(|| ColendarError::Validation("Please select an event".to_string()))?;
        let title = non_empty(&form.title).unwrap_or_else(|| self.events.title_of(event_id).to_string());
        let affected = Affected {
            keys: vec![CacheKey::Date(form.date), CacheKey::Event(event_id)],
            events: false,
        };
        let mutation = match form.editing {
            None => Mutation::CreateItem(NewItem {
                event_id,
                date: form.date,
                title,
                time: non_empty(&form.time),
                description: non_empty(&form.description),
                notes: non_empty(&form.notes),
            }),
            Some(id) => Mutation::UpdateItem {
                id,
                patch: ItemPatch {
                    title: Some(title),
                    time: Some(non_empty(&form.time)),
                    description: Some(non_empty(&form.description)),
                    notes: Some(non_empty(&form.notes)),
                },
            },
        };
        self.mutate(mutation, affected, None);
        Ok(())
    }

    pub fn open_event_form(&mut self, event: Option<&Event>) {
        self.dialog = Some(Dialog::Event(EventForm {
            editing: event.map(|e| e.id),
            title: event.map(|e| e.title.clone()).unwrap_or_default(),
            color: event.map(|e| e.color.clone()).unwrap_or_else(random_color),
            field: 0,
        }));
    }

    pub fn submit_event(&mut self, form: &EventForm) -> Result<()> {
        let title = non_empty(&form.title)
            .ok_or_else(|| ColendarError::Validation("Please enter a title".to_string()))?;
        let color = hex_to_rgb(&form.color)
            .map(rgb_to_hex)
            .ok_or_else(|| ColendarError::Validation(format!("Not a colour: {}", form.color)))?;
        let affected = Affected {
            keys: Vec::new(),
            events: true,
        };
        let mutation = match form.editing {
            None => Mutation::CreateEvent(NewEvent { title, color }),
            Some(id) => Mutation::UpdateEvent {
                id,
                patch: EventPatch {
                    title: Some(title),
                    color: Some(color),
                },
            },
        };
        self.mutate(mutation, affected, None);
        Ok(())
    }

    pub fn start_inline_edit(&mut self, target: InlineTarget) {
        let original = match target {
            InlineTarget::Event(id) => self.events.title_of(id).to_string(),
            InlineTarget::Item { id, date, .. } => match self.cache.get(date).iter().find(|i| i.id == id) {
                Some(item) => item.title.clone(),
                None => return,
            },
        };
        self.dialog = Some(Dialog::Inline(InlineEdit {
            target,
            value: original.clone(),
            original,
        }));
    }

    /// Enter in an inline edit: saves only a non-empty, changed title
    pub fn commit_inline(&mut self, edit: &InlineEdit) {
        let value = edit.value.trim();
        if value.is_empty() || value == edit.original {
            return;
        }
        match edit.target {
            InlineTarget::Event(id) => self.mutate(
                Mutation::UpdateEvent {
                    id,
                    patch: EventPatch {
                        title: Some(value.to_string()),
                        color: None,
                    },
                },
                Affected {
                    keys: Vec::new(),
                    events: true,
                },
                None,
            ),
            InlineTarget::Item { id, event_id, date } => self.mutate(
                Mutation::UpdateItem {
                    id,
                    patch: ItemPatch::title(value),
                },
                Affected {
                    keys: vec![CacheKey::Date(date), CacheKey::Event(event_id)],
                    events: false,
                },
                None,
            ),
        }
    }

    pub fn open_color_popover(&mut self, event_id: EventId) {
        let original = self.events.color_of(event_id).to_string();
        self.dialog = Some(Dialog::Color(ColorPopover {
            event_id,
            value: original.clone(),
            original,
        }));
    }

    /// Show a typed colour immediately, before anything is saved
    fn preview_color(&mut self, event_id: EventId, color: &str) {
        if let Some(event) = self.events.get_mut(event_id) {
            event.color = color.to_string();
        }
    }

    pub fn commit_color(&mut self, popover: &ColorPopover) {
        let Some(color) = hex_to_rgb(&popover.value).map(rgb_to_hex) else {
            self.preview_color(popover.event_id, &popover.original);
            self.set_status(format!("Not a colour: {}", popover.value));
            return;
        };
        if color == popover.original {
            return;
        }
        self.preview_color(popover.event_id, &color);
        self.mutate(
            Mutation::UpdateEvent {
                id: popover.event_id,
                patch: EventPatch {
                    title: None,
                    color: Some(color),
                },
            },
            Affected {
                keys: Vec::new(),
                events: true,
            },
            Some(Revert::EventColor {
                event_id: popover.event_id,
                color: popover.original.clone(),
            }),
        );
    }

    pub fn confirm_delete_event(&mut self, id: EventId) {
        self.dialog = Some(Dialog::Confirm(Confirm {
            message: format!("Delete \"{}\" and all of its items?", self.events.title_of(id)),
            action: ConfirmAction::DeleteEvent(id),
        }));
    }

    // --- input ---

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if self.dialog.is_some() {
            self.handle_dialog_key(key);
            return;
        }
        if self.show_logs {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('L') | KeyCode::Char('q')) {
                self.show_logs = false;
            }
            return;
        }

        match key.code {
            KeyCode::Esc => {
                if !self.selection.clear_draw() && self.panel_open() {
                    self.close_panel();
                }
            }
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Char('t') => self.goto_today(),
            KeyCode::Char('[') => self.goto_year(-1),
            KeyCode::Char(']') => self.goto_year(1),
            KeyCode::Char('L') => self.show_logs = true,
            KeyCode::Char('1') => {
                self.layout.toggle_items(&mut self.prefs);
                self.relayout();
            }
            KeyCode::Char('2') => {
                self.layout.toggle_events(&mut self.prefs);
                self.relayout();
            }
            KeyCode::Char('3') => {
                self.layout.toggle_sidebar(&mut self.prefs);
                self.relayout();
            }
            KeyCode::Tab => self.cycle_focus(),
            KeyCode::PageUp => self.scroll(-(self.years.viewport_height() as i32)),
            KeyCode::PageDown => self.scroll(self.years.viewport_height() as i32),
            _ => match self.focus {
                Focus::Calendar => self.calendar_key(key.code),
                Focus::Events => self.events_key(key.code),
                Focus::Items => self.items_key(key.code),
            },
        }
    }

    fn cycle_focus(&mut self) {
        let sidebar = !self.layout.sidebar_collapsed;
        self.focus = match self.focus {
            Focus::Calendar if sidebar && !self.layout.events_collapsed => Focus::Events,
            Focus::Calendar | Focus::Events if self.item_list().is_some() => Focus::Items,
            _ => Focus::Calendar,
        };
    }

    fn calendar_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Left | KeyCode::Char('h') => self.move_cursor(-1),
            KeyCode::Right | KeyCode::Char('l') => self.move_cursor(1),
            KeyCode::Up | KeyCode::Char('k') => self.move_cursor(-7),
            KeyCode::Down | KeyCode::Char('j') => self.move_cursor(7),
            KeyCode::Enter | KeyCode::Char(' ') => self.activate_cell(self.cursor),
            KeyCode::Char('v') => self.extend_to(self.cursor),
            KeyCode::Char('m') => self.toggle_date(self.cursor),
            KeyCode::Char('x') => self.draw_delete(self.cursor),
            KeyCode::Char('a') => self.open_item_form(self.cursor, None),
            _ => {}
        }
    }

    fn events_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.event_index = self.event_index.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => {
                self.event_index = (self.event_index + 1).min(self.events.len().saturating_sub(1));
            }
            KeyCode::Char('n') => self.open_event_form(None),
            _ => {
                let Some(id) = self.selected_event().map(|e| e.id) else {
                    return;
                };
                match code {
                    KeyCode::Char(' ') | KeyCode::Enter => self.toggle_highlight(id),
                    KeyCode::Char('i') => self.isolate(id),
                    KeyCode::Char('d') => self.toggle_draw(id),
                    KeyCode::Char('e') => {
                        let event = self.events.get(id).cloned();
                        self.open_event_form(event.as_ref());
                    }
                    KeyCode::Char('c') => self.open_color_popover(id),
                    KeyCode::Char('r') => self.start_inline_edit(InlineTarget::Event(id)),
                    KeyCode::Char('X') => self.confirm_delete_event(id),
                    KeyCode::Char('J') => {
                        if self.events.move_down(id, &mut self.prefs) {
                            self.event_index += 1;
                        }
                    }
                    KeyCode::Char('K') => {
                        if self.events.move_up(id, &mut self.prefs) {
                            self.event_index -= 1;
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn items_key(&mut self, code: KeyCode) {
        let count = self.item_list().map(|v| v.count()).unwrap_or(0);
        match code {
            KeyCode::Up | KeyCode::Char('k') => self.item_index = self.item_index.saturating_sub(1),
            KeyCode::Down | KeyCode::Char('j') => self.item_index = (self.item_index + 1).min(count.saturating_sub(1)),
            KeyCode::Char('a') => {
                let date = self
                    .selected_item()
                    .map(|i| i.date)
                    .or(self.selection.single_date())
                    .unwrap_or(self.cursor);
                self.open_item_form(date, None);
            }
            _ => {
                let Some(item) = self.selected_item() else {
                    return;
                };
                match code {
                    KeyCode::Char('e') => self.open_item_form(item.date, Some(&item)),
                    KeyCode::Char('x') => self.mutate(
                        Mutation::DeleteItems(vec![item.id]),
                        Affected {
                            keys: vec![CacheKey::Date(item.date), CacheKey::Event(item.event_id)],
                            events: false,
                        },
                        None,
                    ),
                    KeyCode::Char('r') => self.start_inline_edit(InlineTarget::Item {
                        id: item.id,
                        event_id: item.event_id,
                        date: item.date,
                    }),
                    KeyCode::Enter => {
                        self.cursor = item.date;
                        self.years.scroll_to_date(item.date);
                    }
                    _ => {}
                }
            }
        }
    }

    fn handle_dialog_key(&mut self, key: KeyEvent) {
        let Some(dialog) = self.dialog.take() else {
            return;
        };
        self.dialog = match dialog {
            Dialog::Item(form) => self.item_form_key(form, key),
            Dialog::Event(form) => self.event_form_key(form, key),
            Dialog::Inline(edit) => self.inline_key(edit, key),
            Dialog::Color(popover) => self.color_key(popover, key),
            Dialog::Confirm(confirm) => match key.code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    self.run_confirmed(confirm.action);
                    None
                }
                KeyCode::Char('n') | KeyCode::Esc => None,
                _ => Some(Dialog::Confirm(confirm)),
            },
        };
    }

    fn item_form_key(&mut self, mut form: ItemForm, key: KeyEvent) -> Option<Dialog> {
        match key.code {
            KeyCode::Esc => return None,
            KeyCode::Enter => {
                return match self.submit_item(&form) {
                    Ok(()) => None,
                    Err(e) => {
                        self.set_status(e.to_string());
                        Some(Dialog::Item(form))
                    }
                };
            }
            KeyCode::Tab | KeyCode::Down => form.field = (form.field + 1) % ITEM_FIELDS.len(),
            KeyCode::BackTab | KeyCode::Up => form.field = (form.field + ITEM_FIELDS.len() - 1) % ITEM_FIELDS.len(),
            KeyCode::Left | KeyCode::Right if form.field() == ItemField::Event && form.editing.is_none() => {
                form.event_id = self.cycle_event(form.event_id, key.code == KeyCode::Right);
            }
            KeyCode::Backspace => {
                if let Some(text) = form.text_mut() {
                    text.pop();
                }
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                if let Some(text) = form.text_mut() {
                    text.push(c);
                }
            }
            _ => {}
        }
        Some(Dialog::Item(form))
    }

    fn cycle_event(&self, current: Option<EventId>, forward: bool) -> Option<EventId> {
        let ids = self.events.ids();
        if ids.is_empty() {
            return None;
        }
        let next = match current.and_then(|id| ids.iter().position(|i| *i == id)) {
            None => 0,
            Some(pos) if forward => (pos + 1) % ids.len(),
            Some(pos) => (pos + ids.len() - 1) % ids.len(),
        };
        Some(ids[next])
    }

    fn event_form_key(&mut self, mut form: EventForm, key: KeyEvent) -> Option<Dialog> {
        match key.code {
            KeyCode::Esc => return None,
            KeyCode::Enter => {
                return match self.submit_event(&form) {
                    Ok(()) => None,
                    Err(e) => {
                        self.set_status(e.to_string());
                        Some(Dialog::Event(form))
                    }
                };
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => form.field = 1 - form.field,
            KeyCode::Backspace => {
                if form.field == 0 {
                    form.title.pop();
                } else {
                    form.color.pop();
                }
            }
            KeyCode::Char(c) => {
                if form.field == 0 {
                    form.title.push(c);
                } else {
                    form.color.push(c);
                }
            }
            _ => {}
        }
        Some(Dialog::Event(form))
    }

    fn inline_key(&mut self, mut edit: InlineEdit, key: KeyEvent) -> Option<Dialog> {
        match key.code {
            KeyCode::Enter => {
                self.commit_inline(&edit);
                None
            }
            KeyCode::Esc => None,
            KeyCode::Backspace => {
                edit.value.pop();
                Some(Dialog::Inline(edit))
            }
            KeyCode::Char(c) => {
                edit.value.push(c);
                Some(Dialog::Inline(edit))
            }
            _ => Some(Dialog::Inline(edit)),
        }
    }

    fn color_key(&mut self, mut popover: ColorPopover, key: KeyEvent) -> Option<Dialog> {
        match key.code {
            KeyCode::Enter => {
                self.commit_color(&popover);
                return None;
            }
            KeyCode::Esc => {
                self.preview_color(popover.event_id, &popover.original);
                return None;
            }
            KeyCode::Backspace => {
                popover.value.pop();
            }
            KeyCode::Char(c) if c.is_ascii_hexdigit() || c == '#' => popover.value.push(c),
            _ => return Some(Dialog::Color(popover)),
        }
        if let Some(rgb) = hex_to_rgb(&popover.value) {
            self.preview_color(popover.event_id, &rgb_to_hex(rgb));
        }
        Some(Dialog::Color(popover))
    }

    pub fn handle_mouse(&mut self, hit: Hit, mouse: MouseEvent) {
        if self.dialog.is_some() || self.show_logs {
            return;
        }
        let mods = mouse.modifiers;
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => match hit {
                Hit::Cell(date) => {
                    self.focus = Focus::Calendar;
                    if mods.contains(KeyModifiers::SHIFT) {
                        self.extend_to(date);
                    } else if mods.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
                        self.toggle_date(date);
                    } else {
                        self.activate_cell(date);
                    }
                }
                Hit::EventRow(index) => {
                    self.focus = Focus::Events;
                    self.event_index = index;
                    if let Some(id) = self.selected_event().map(|e| e.id) {
                        if mods.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
                            self.isolate(id);
                        } else {
                            self.toggle_highlight(id);
                        }
                    }
                }
                Hit::ItemRow(index) => {
                    self.focus = Focus::Items;
                    self.item_index = index;
                }
                Hit::EventsHeader => {
                    self.layout.toggle_events(&mut self.prefs);
                    self.relayout();
                }
                Hit::ItemsHeader => {
                    self.layout.toggle_items(&mut self.prefs);
                    self.relayout();
                }
                Hit::Year(year) => self.years.scroll_to_year(year, true),
                Hit::Calendar | Hit::Nothing => {}
            },
            MouseEventKind::Down(MouseButton::Right) => match hit {
                Hit::Cell(date) => self.draw_delete(date),
                Hit::EventRow(index) => {
                    self.event_index = index;
                    if let Some(id) = self.selected_event().map(|e| e.id) {
                        self.toggle_draw(id);
                    }
                }
                _ => {}
            },
            MouseEventKind::ScrollUp => self.scroll(-WHEEL_ROWS),
            MouseEventKind::ScrollDown => self.scroll(WHEEL_ROWS),
            MouseEventKind::Moved => match hit {
                Hit::Cell(date) => {
                    if self.hover != Some(date) {
                        self.hover(Some(date));
                    }
                }
                _ => self.hover = None,
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::{FakeSource, d, item};
    use crate::events::tests::event;
    use crate::api::tests::{client_for, item_json};
    use crate::jobs;
    use crate::prefs::HIGHLIGHT_KEY;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TODAY: (i32, u32, u32) = (2024, 1, 15);

    fn today() -> NaiveDate {
        d(TODAY.0, TODAY.1, TODAY.2)
    }

    fn app() -> App {
        App::new(PreferenceStore::in_memory(), today(), (140, 50))
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    /// An app whose boot already received `events`
    fn booted(events: Vec<Event>) -> App {
        let mut app = app();
        app.boot();
        let jobs = app.take_jobs();
        assert_eq!(jobs, vec![Job::FetchEvents(1)]);
        app.apply_outcome(JobOutcome::Events(1, Ok(events)));
        app
    }

    /// Run every queued job against an in-memory backend until the outbox is empty
    async fn drain(app: &mut App, source: &FakeSource) {
        loop {
            let queued = app.take_jobs();
            if queued.is_empty() {
                break;
            }
            for job in queued {
                let outcome = match job {
                    Job::Load(refresh) => JobOutcome::Loaded(refresh, jobs::load(source, refresh.key).await),
                    Job::FetchEvents(seq) => JobOutcome::Events(seq, Ok(app.events.all().to_vec())),
                    Job::Mutate {
                        mutation,
                        affected,
                        revert,
                    } => {
                        let label = mutation.label();
                        apply_to_fake(source, mutation);
                        JobOutcome::Mutated {
                            label,
                            result: Ok(()),
                            affected,
                            revert,
                        }
                    }
                };
                app.apply_outcome(outcome);
            }
        }
    }

    fn apply_to_fake(source: &FakeSource, mutation: Mutation) {
        let mut items = source.items.lock().unwrap();
        match mutation {
            Mutation::CreateItem(new) => {
                let id = items.iter().map(|i| i.id).max().unwrap_or(0) + 1;
                items.push(Item {
                    id,
                    event_id: new.event_id,
                    date: new.date,
                    time: new.time,
                    title: new.title,
                    notes: new.notes,
                    description: new.description,
                });
            }
            Mutation::DeleteItems(ids) => items.retain(|i| !ids.contains(&i.id)),
            other => panic!("fake backend does not handle {:?}", other),
        }
    }

    #[test]
    fn test_boot_restores_highlights_and_loads() {
        let mut prefs = PreferenceStore::in_memory();
        prefs.set_ids(HIGHLIGHT_KEY, &[2, 99]);
        let mut app = App::new(prefs, today(), (140, 50));
        app.boot();
        app.take_jobs();
        app.apply_outcome(JobOutcome::Events(1, Ok(vec![event(1, "Run", "#f00"), event(2, "Read", "#0f0")])));

        assert_eq!(app.selection.highlighted().iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_eq!(app.selection.single_date(), Some(today()));
        let keys: Vec<CacheKey> = app
            .take_jobs()
            .into_iter()
            .filter_map(|j| match j {
                Job::Load(r) => Some(r.key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![CacheKey::Event(2), CacheKey::Date(today())]);
    }

    #[test]
    fn test_boot_swallows_event_load_failures() {
        let mut prefs = PreferenceStore::in_memory();
        prefs.set_ids(HIGHLIGHT_KEY, &[1]);
        let mut app = App::new(prefs, today(), (140, 50));
        app.boot();
        app.take_jobs();
        app.apply_outcome(JobOutcome::Events(1, Ok(vec![event(1, "Run", "#f00")])));

        let loads: Vec<Refresh> = app
            .take_jobs()
            .into_iter()
            .filter_map(|j| match j {
                Job::Load(r) => Some(r),
                _ => None,
            })
            .collect();
        let err = ColendarError::Api {
            context: "GET /items".to_string(),
            status: 500,
            body: String::new(),
        };
        app.apply_outcome(JobOutcome::Loaded(loads[0], Err(err)));
        assert!(app.status_message.is_none());
        app.apply_outcome(JobOutcome::Loaded(loads[1], Ok(vec![item(1, 1, today())])));
        assert_eq!(app.cache.get(today()).len(), 1);
    }

    #[test]
    fn test_rapid_double_toggle_keeps_last_response() {
        let date = d(2024, 2, 1);
        let mut app = booted(vec![event(5, "Run", "#ff0000")]);
        app.take_jobs();

        app.toggle_highlight(5);
        app.toggle_highlight(5);
        assert!(!app.selection.is_highlighted(5));

        let loads: Vec<Refresh> = app
            .take_jobs()
            .into_iter()
            .filter_map(|j| match j {
                Job::Load(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(loads.len(), 2);

        // Second response lands first, then the stale first one
        app.apply_outcome(JobOutcome::Loaded(loads[1], Ok(vec![])));
        app.apply_outcome(JobOutcome::Loaded(loads[0], Ok(vec![item(1, 5, date)])));
        assert!(app.cache.get(date).is_empty());
        assert!(!app.selection.is_highlighted(5));
    }

    #[tokio::test]
    async fn test_created_item_round_trips_through_load() {
        let date = today();
        let source = FakeSource::new(vec![]);
        let mut app = booted(vec![event(1, "Gym", "#00ff00")]);
        drain(&mut app, &source).await;

        app.open_item_form(date, None);
        let Some(Dialog::Item(mut form)) = app.dialog.take() else {
            panic!("item form should be open");
        };
        form.event_id = Some(1);
        form.title = "Leg day".to_string();
        form.time = "07:30".to_string();
        form.notes = "squats".to_string();
        app.submit_item(&form).unwrap();
        drain(&mut app, &source).await;

        let mut cache = ItemCache::new();
        cache.load_for_date(&source, date).await.unwrap();
        let stored = &cache.get(date)[0];
        assert_eq!(stored.title, "Leg day");
        assert_eq!(stored.time.as_deref(), Some("07:30"));
        assert_eq!(stored.notes.as_deref(), Some("squats"));
        assert_eq!(app.cache.get(date), cache.get(date));
    }

    #[test]
    fn test_item_form_requires_event() {
        let mut app = booted(vec![event(1, "Gym", "#00ff00")]);
        app.take_jobs();
        app.open_item_form(today(), None);
        app.handle_key(key(KeyCode::Enter));

        assert!(matches!(app.dialog, Some(Dialog::Item(_))));
        assert_eq!(app.status_message.as_deref(), Some("Please select an event"));
        assert!(app.take_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_draw_mode_creates_then_opens() {
        let date = d(2024, 1, 20);
        let source = FakeSource::new(vec![]);
        let mut app = booted(vec![event(3, "Water", "#0000ff")]);
        drain(&mut app, &source).await;

        app.toggle_draw(3);
        app.activate_cell(date);
        drain(&mut app, &source).await;
        assert_eq!(app.cache.get(date).len(), 1);
        assert_eq!(app.cache.get(date)[0].title, "Water");
        assert_eq!(app.selection.single_date(), Some(date));

        // Second click on the same cell only opens it
        app.activate_cell(date);
        drain(&mut app, &source).await;
        assert_eq!(source.items.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_draw_delete_confirms_modified_items() {
        let date = d(2024, 1, 20);
        let mut modified = item(1, 3, date);
        modified.title = "Water".to_string();
        modified.notes = Some("2 litres".to_string());
        let source = FakeSource::new(vec![modified]);
        let mut app = booted(vec![event(3, "Water", "#0000ff")]);
        drain(&mut app, &source).await;
        app.toggle_draw(3);
        drain(&mut app, &source).await;

        app.draw_delete(date);
        assert!(matches!(app.dialog, Some(Dialog::Confirm(_))));
        assert!(app.take_jobs().is_empty());

        app.handle_key(key(KeyCode::Char('y')));
        drain(&mut app, &source).await;
        assert!(app.cache.get(date).is_empty());
        assert!(source.items.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_draw_delete_of_default_items_is_immediate() {
        let date = d(2024, 1, 20);
        let mut plain = item(1, 3, date);
        plain.title = "Water".to_string();
        let source = FakeSource::new(vec![plain]);
        let mut app = booted(vec![event(3, "Water", "#0000ff")]);
        drain(&mut app, &source).await;
        app.toggle_draw(3);
        drain(&mut app, &source).await;

        app.draw_delete(date);
        assert!(app.dialog.is_none());
        drain(&mut app, &source).await;
        assert!(app.cache.get(date).is_empty());
    }

    #[tokio::test]
    async fn test_partly_failed_delete_still_reloads() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/items/1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/items/2"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/items"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([item_json(2, 3, "2024-01-20", "item 2")])),
            )
            .mount(&server)
            .await;
        let api = client_for(&server);

        let date = d(2024, 1, 20);
        let mut app = booted(vec![event(3, "Water", "#0000ff")]);
        app.toggle_draw(3);
        app.take_jobs();
        let refresh = app.cache.issue(CacheKey::Date(date));
        app.cache.apply(refresh, vec![item(1, 3, date), item(2, 3, date)]);

        app.draw_delete(date);
        app.handle_key(key(KeyCode::Char('y')));
        for job in app.take_jobs() {
            let outcome = jobs::run(&api, job).await;
            app.apply_outcome(outcome);
        }
        assert!(app.status_message.as_deref().is_some_and(|m| m.starts_with("Failed to delete items")));

        let reloads = app.take_jobs();
        let keys: Vec<CacheKey> = reloads
            .iter()
            .filter_map(|job| match job {
                Job::Load(refresh) => Some(refresh.key),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![CacheKey::Date(date), CacheKey::Event(3)]);

        for job in reloads {
            let outcome = jobs::run(&api, job).await;
            app.apply_outcome(outcome);
        }
        let ids: Vec<ItemId> = app.cache.get(date).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[test]
    fn test_event_delete_reloads_dates_still_loading() {
        let mut app = booted(vec![event(3, "Water", "#0000ff")]);
        app.take_jobs();
        let cached = d(2024, 1, 20);
        let refresh = app.cache.issue(CacheKey::Date(cached));
        app.cache.apply(refresh, vec![item(1, 3, cached)]);
        let loading = d(2024, 3, 3);
        app.hover(Some(loading));
        app.take_jobs();

        app.confirm_delete_event(3);
        app.handle_key(key(KeyCode::Char('y')));
        let queued = app.take_jobs();
        let [Job::Mutate { affected, .. }] = queued.as_slice() else {
            panic!("expected a single delete, got {:?}", queued);
        };
        assert!(affected.events);
        assert!(affected.keys.contains(&CacheKey::Date(cached)));
        assert!(affected.keys.contains(&CacheKey::Date(loading)));
    }

    #[test]
    fn test_year_pill_click_scrolls_to_year() {
        let mut app = booted(vec![]);
        let click = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 0,
            row: 0,
            modifiers: KeyModifiers::NONE,
        };
        app.handle_mouse(Hit::Year(2025), click);
        assert_eq!(app.years.current_year(), 2025);
        assert!(app.years.is_materialized(2025));
    }

    #[test]
    fn test_escape_clears_draw_mode_first() {
        let mut app = booted(vec![event(3, "Water", "#0000ff")]);
        app.toggle_draw(3);
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.selection.draw_event(), None);
        assert!(app.panel_open());

        app.handle_key(key(KeyCode::Esc));
        assert!(!app.panel_open());
    }

    #[test]
    fn test_color_preview_reverts_on_failure() {
        let mut app = booted(vec![event(2, "Read", "#112233")]);
        app.take_jobs();
        app.open_color_popover(2);
        for _ in 0..7 {
            app.handle_key(key(KeyCode::Backspace));
        }
        for c in "#ffffff".chars() {
            app.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(app.events.color_of(2), "#ffffff");

        app.handle_key(key(KeyCode::Enter));
        let jobs = app.take_jobs();
        let Some(Job::Mutate { revert, .. }) = jobs.into_iter().next() else {
            panic!("expected a colour update");
        };
        app.apply_outcome(JobOutcome::Mutated {
            label: "update event",
            result: Err(ColendarError::Timeout),
            affected: Affected::default(),
            revert,
        });
        assert_eq!(app.events.color_of(2), "#112233");
        assert!(app.status_message.as_deref().unwrap_or("").contains("update event"));
    }

    #[test]
    fn test_color_escape_reverts_preview() {
        let mut app = booted(vec![event(2, "Read", "#112233")]);
        app.open_color_popover(2);
        app.handle_key(key(KeyCode::Backspace));
        app.handle_key(key(KeyCode::Backspace));
        app.handle_key(key(KeyCode::Backspace));
        app.handle_key(key(KeyCode::Char('f')));
        app.handle_key(key(KeyCode::Char('f')));
        app.handle_key(key(KeyCode::Char('f')));
        assert_eq!(app.events.color_of(2), "#112fff");
        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.events.color_of(2), "#112233");
        assert!(app.dialog.is_none());
    }

    #[test]
    fn test_inline_edit_saves_only_changes() {
        let mut app = booted(vec![event(2, "Read", "#112233")]);
        app.take_jobs();

        app.start_inline_edit(InlineTarget::Event(2));
        app.handle_key(key(KeyCode::Char(' ')));
        app.handle_key(key(KeyCode::Enter));
        assert!(app.take_jobs().is_empty());

        app.start_inline_edit(InlineTarget::Event(2));
        app.handle_key(key(KeyCode::Char('s')));
        app.handle_key(key(KeyCode::Enter));
        let jobs = app.take_jobs();
        assert!(matches!(
            &jobs[..],
            [Job::Mutate { mutation: Mutation::UpdateEvent { id: 2, patch }, .. }]
                if patch.title.as_deref() == Some("Reads")
        ));
    }

    #[test]
    fn test_refreshed_events_drop_deleted_highlights_and_draw() {
        let mut app = booted(vec![event(1, "Run", "#f00"), event(2, "Read", "#0f0")]);
        app.toggle_highlight(2);
        app.toggle_draw(2);
        app.take_jobs();

        app.on_mutated("delete event", Ok(()), Affected { keys: vec![], events: true }, None);
        let seq = app.events_seq;
        app.apply_outcome(JobOutcome::Events(seq, Ok(vec![event(1, "Run", "#f00")])));

        assert!(!app.selection.is_highlighted(2));
        assert_eq!(app.selection.draw_event(), None);
        assert_eq!(app.prefs.get_ids(HIGHLIGHT_KEY), Some(vec![]));
    }

    #[test]
    fn test_stale_event_list_is_discarded() {
        let mut app = booted(vec![event(1, "Run", "#f00")]);
        app.fetch_events();
        app.fetch_events();
        app.apply_outcome(JobOutcome::Events(3, Ok(vec![event(1, "Run", "#f00"), event(2, "New", "#0f0")])));
        app.apply_outcome(JobOutcome::Events(2, Ok(vec![])));
        assert_eq!(app.events.len(), 2);
    }

    #[test]
    fn test_hover_loads_each_date_once() {
        let mut app = booted(vec![]);
        app.take_jobs();
        let date = d(2024, 3, 3);
        app.hover(Some(date));
        app.hover(Some(date));
        assert_eq!(app.take_jobs().len(), 1);
        assert_eq!(app.hover, Some(date));
    }

    #[test]
    fn test_panel_toggles_persist() {
        let mut app = app();
        assert!(app.layout.items_collapsed);
        app.handle_key(key(KeyCode::Char('1')));
        app.handle_key(key(KeyCode::Char('3')));
        let restored = PanelLayout::restore(&app.prefs);
        assert!(!restored.items_collapsed);
        assert!(restored.sidebar_collapsed);
    }

    #[test]
    fn test_event_reorder_keys_follow_selection() {
        let mut app = booted(vec![event(1, "a", "#000"), event(2, "b", "#000")]);
        app.focus = Focus::Events;
        app.handle_key(key(KeyCode::Char('J')));
        assert_eq!(app.events.ids(), vec![2, 1]);
        assert_eq!(app.event_index, 1);
        assert_eq!(app.selected_event().map(|e| e.id), Some(1));
    }
}
