//! Declarative views for the day, multi-date and items panels and the hover tooltip.

use crate::cache::ItemCache;
use crate::date_util::format_date;
use crate::events::EventList;
use crate::models::{EventId, Item, ItemId};
use crate::selection::{DateSelection, SelectionModel};
use chrono::NaiveDate;

pub const EMPTY_TEXT: &str = "Nothing to see here!";
pub const TOOLTIP_MAX_ITEMS: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRow {
    pub item_id: ItemId,
    pub event_id: EventId,
    pub date: NaiveDate,
    pub color: String,
    /// "Event • 15th Jan, 2024 • 09:00"
    pub meta: String,
    pub title: String,
    pub description: Option<String>,
    pub notes: Option<String>,
}

impl ItemRow {
    fn new(item: &Item, events: &EventList) -> Self {
        let mut meta = format!("{} • {}", events.title_of(item.event_id), format_date(item.date));
        if let Some(time) = item.time.as_deref().filter(|t| !t.is_empty()) {
            meta.push_str(" • ");
            meta.push_str(time);
        }
        Self {
            item_id: item.id,
            event_id: item.event_id,
            date: item.date,
            color: events.color_of(item.event_id).to_string(),
            meta,
            title: item.title.clone(),
            description: item.description.clone().filter(|s| !s.is_empty()),
            notes: item.notes.clone().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelView {
    pub title: String,
    pub rows: Vec<ItemRow>,
}

impl PanelView {
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&ItemRow> {
        self.rows.get(index)
    }
}

/// Stable ordering shared by every panel: date, then event, then item id
fn sort_rows(rows: &mut [ItemRow]) {
    rows.sort_by_key(|r| (r.date, r.event_id, r.item_id));
}

fn rows_for<'a>(items: impl Iterator<Item = &'a Item>, events: &EventList) -> Vec<ItemRow> {
    let mut rows: Vec<ItemRow> = items.map(|item| ItemRow::new(item, events)).collect();
    sort_rows(&mut rows);
    rows
}

/// Every cached item on one date
pub fn day_panel(date: NaiveDate, cache: &ItemCache, events: &EventList) -> PanelView {
    PanelView {
        title: format_date(date),
        rows: rows_for(cache.get(date).iter(), events),
    }
}

/// Every cached item across a range or multi selection
pub fn multi_panel(dates: &[NaiveDate], cache: &ItemCache, events: &EventList) -> PanelView {
    let title = match (dates.first(), dates.last()) {
        (Some(first), Some(last)) if dates.len() > 1 => {
            format!("{} days • {} – {}", dates.len(), format_date(*first), format_date(*last))
        }
        (Some(only), _) => format_date(*only),
        _ => String::new(),
    };
    PanelView {
        title,
        rows: rows_for(dates.iter().flat_map(|d| cache.get(*d).iter()), events),
    }
}

/// Whichever of the day or multi panel the current date selection drives
pub fn selection_panel(selection: &SelectionModel, cache: &ItemCache, events: &EventList) -> Option<PanelView> {
    match selection.dates() {
        DateSelection::None => None,
        DateSelection::Single(date) => Some(day_panel(*date, cache, events)),
        DateSelection::Range { .. } | DateSelection::Multi(_) => {
            Some(multi_panel(&selection.selected_dates(), cache, events))
        }
    }
}

/// Items of highlighted events across every cached date; empty without highlights
pub fn items_panel(selection: &SelectionModel, cache: &ItemCache, events: &EventList) -> PanelView {
    let rows = if selection.has_highlights() {
        rows_for(cache.iter().filter(|item| selection.is_highlighted(item.event_id)), events)
    } else {
        Vec::new()
    };
    PanelView {
        title: "Items".to_string(),
        rows,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TooltipLine {
    pub color: String,
    pub title: String,
    pub time: Option<String>,
    pub description: Option<String>,
}

/// Hover preview for a date, `None` when there is nothing to show
pub fn tooltip(
    date: NaiveDate,
    cache: &ItemCache,
    events: &EventList,
    selection: &SelectionModel,
) -> Option<Vec<TooltipLine>> {
    let filter = selection.has_highlights();
    let lines: Vec<TooltipLine> = cache
        .get(date)
        .iter()
        .filter(|item| !filter || selection.is_highlighted(item.event_id))
        .take(TOOLTIP_MAX_ITEMS)
        .map(|item| TooltipLine {
            color: events.color_of(item.event_id).to_string(),
            title: item.title.clone(),
            time: item.time.clone().filter(|t| !t.is_empty()),
            description: item.description.clone().filter(|d| !d.is_empty()),
        })
        .collect();
    (!lines.is_empty()).then_some(lines)
}
