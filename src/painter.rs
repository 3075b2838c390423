//! Turns cached items and the selection into declarative per-cell paint.

use crate::cache::ItemCache;
use crate::color::{TextContrast, contrast_for};
use crate::events::EventList;
use crate::models::EventId;
use crate::selection::SelectionModel;
use chrono::NaiveDate;

/// A rectangle in percent of the cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: u8,
    pub top: u8,
    pub width: u8,
    pub height: u8,
}

const fn rect(left: u8, top: u8, width: u8, height: u8) -> Rect {
    Rect {
        left,
        top,
        width,
        height,
    }
}

pub const MAX_SEGMENTS: usize = 4;

const LAYOUT_ONE: [Rect; 1] = [rect(0, 0, 100, 100)];
const LAYOUT_TWO: [Rect; 2] = [rect(0, 0, 50, 100), rect(50, 0, 50, 100)];
const LAYOUT_THREE: [Rect; 3] = [rect(0, 0, 50, 50), rect(50, 0, 50, 50), rect(0, 50, 100, 50)];
const LAYOUT_FOUR: [Rect; 4] = [
    rect(0, 0, 50, 50),
    rect(50, 0, 50, 50),
    rect(0, 50, 50, 50),
    rect(50, 50, 50, 50),
];

/// Segment positions for `count` events; anything past four uses the 2x2 grid
pub fn segment_layout(count: usize) -> &'static [Rect] {
    match count {
        0 => &[],
        1 => &LAYOUT_ONE,
        2 => &LAYOUT_TWO,
        3 => &LAYOUT_THREE,
        _ => &LAYOUT_FOUR,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub rect: Rect,
    pub event_id: EventId,
    pub color: String,
}

/// Everything needed to draw one day cell
#[derive(Debug, Clone, PartialEq)]
pub struct CellPaint {
    pub date: NaiveDate,
    pub segments: Vec<Segment>,
    /// Text contrast against the last segment; `None` when nothing is painted
    pub contrast: Option<TextContrast>,
    pub today: bool,
    /// Single active cell
    pub active: bool,
    /// Member of a range / multi selection
    pub selected: bool,
    /// Draw-mode hover border colour
    pub draw_border: Option<String>,
}

impl CellPaint {
    #[allow(dead_code)]
    pub fn is_colored(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Colour of each quadrant `[row][col]`, rasterised from the segments
    pub fn quadrants(&self) -> [[Option<&str>; 2]; 2] {
        let mut grid = [[None; 2]; 2];
        for (row, cells) in grid.iter_mut().enumerate() {
            for (col, cell) in cells.iter_mut().enumerate() {
                let (cx, cy) = (col as u8 * 50 + 25, row as u8 * 50 + 25);
                *cell = self
                    .segments
                    .iter()
                    .find(|s| {
                        let r = s.rect;
                        r.left <= cx && cx < r.left + r.width && r.top <= cy && cy < r.top + r.height
                    })
                    .map(|s| s.color.as_str());
            }
        }
        grid
    }
}

pub struct CalendarPainter<'a> {
    pub cache: &'a ItemCache,
    pub events: &'a EventList,
    pub selection: &'a SelectionModel,
    pub today: NaiveDate,
    pub hover: Option<NaiveDate>,
}

impl CalendarPainter<'_> {
    /// Highlighted events with at least one cached item on `date`, in display order
    pub fn events_on(&self, date: NaiveDate) -> Vec<EventId> {
        let items = self.cache.get(date);
        self.selection
            .highlighted_events(self.events)
            .into_iter()
            .filter(|e| items.iter().any(|item| item.event_id == e.id))
            .map(|e| e.id)
            .collect()
    }

    pub fn paint(&self, date: NaiveDate) -> CellPaint {
        let event_ids = self.events_on(date);
        let shown = &event_ids[..event_ids.len().min(MAX_SEGMENTS)];
        let segments: Vec<Segment> = shown
            .iter()
            .zip(segment_layout(shown.len()))
            .map(|(id, rect)| Segment {
                rect: *rect,
                event_id: *id,
                color: self.events.color_of(*id).to_string(),
            })
            .collect();

        let contrast = if segments.is_empty() {
            None
        } else {
            let last_color = segments
                .iter()
                .rev()
                .map(|s| s.color.as_str())
                .find(|c| !c.is_empty())
                .unwrap_or("");
            Some(contrast_for(last_color))
        };

        let draw_border = match (self.hover, self.selection.draw_event()) {
            (Some(hover), Some(draw_id)) if hover == date => Some(self.events.color_of(draw_id).to_string()),
            _ => None,
        };

        CellPaint {
            date,
            segments,
            contrast,
            today: date == self.today,
            active: self.selection.is_active(date),
            selected: self.selection.is_in_multi(date),
            draw_border,
        }
    }
}
