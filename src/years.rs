//! Virtualized, effectively infinite stack of year sections.
//!
//! Sections are materialized on demand and kept forever once built. Viewport
//! changes are fed in as discrete "section intersecting" observations so the
//! prepend/append policy does not depend on any particular terminal API.

use crate::date_util::{WEEKS_PER_MONTH, month_grid};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeSet;

pub const CELL_WIDTH: u16 = 4;
pub const CELL_HEIGHT: u16 = 2;
pub const MONTH_WIDTH: u16 = CELL_WIDTH * 7;
pub const MONTH_GAP_X: u16 = 2;
/// Month title and weekday labels
pub const MONTH_HEADER_ROWS: u32 = 2;
pub const MONTH_HEIGHT: u32 = MONTH_HEADER_ROWS + WEEKS_PER_MONTH as u32 * CELL_HEIGHT as u32;
/// Vertical gap between month rows
pub const GRID_GAP: u32 = 1;
pub const YEAR_BADGE_ROWS: u32 = 1;
/// Sections this close to the viewport count as intersecting for materialization
pub const OBSERVER_MARGIN: u32 = 8;
/// Frames to keep the year indicator frozen after a programmatic jump lands
const SETTLE_FRAMES: u8 = 2;

/// How months are arranged inside a year section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub months_per_row: u16,
}

impl GridLayout {
    pub fn for_width(width: u16) -> Self {
        let per_row = (width + MONTH_GAP_X) / (MONTH_WIDTH + MONTH_GAP_X);
        Self {
            months_per_row: per_row.clamp(1, 4),
        }
    }

    pub fn month_rows(&self) -> u32 {
        12u32.div_ceil(self.months_per_row as u32)
    }

    pub fn width(&self) -> u16 {
        self.months_per_row * (MONTH_WIDTH + MONTH_GAP_X) - MONTH_GAP_X
    }

    pub fn section_height(&self) -> u32 {
        YEAR_BADGE_ROWS + GRID_GAP + self.month_rows() * (MONTH_HEIGHT + GRID_GAP)
    }

    /// Row offset (from the section top) and column of a month's top-left corner
    pub fn month_origin(&self, month: u32) -> (u32, u16) {
        let index = month.clamp(1, 12) - 1;
        let row = index / self.months_per_row as u32;
        let col = (index % self.months_per_row as u32) as u16;
        (
            YEAR_BADGE_ROWS + GRID_GAP + row * (MONTH_HEIGHT + GRID_GAP),
            col * (MONTH_WIDTH + MONTH_GAP_X),
        )
    }

    /// Month and day under a point relative to the section's top-left corner
    fn date_at(&self, section: &YearSection, row: u32, col: u16) -> Option<NaiveDate> {
        let grid_top = YEAR_BADGE_ROWS + GRID_GAP;
        let within = row.checked_sub(grid_top)?;
        let month_row = within / (MONTH_HEIGHT + GRID_GAP);
        let row_in_month = within % (MONTH_HEIGHT + GRID_GAP);
        let month_col = col / (MONTH_WIDTH + MONTH_GAP_X);
        let col_in_month = col % (MONTH_WIDTH + MONTH_GAP_X);
        if month_col >= self.months_per_row || col_in_month >= MONTH_WIDTH {
            return None;
        }
        let week_row = row_in_month.checked_sub(MONTH_HEADER_ROWS)?;
        let week = (week_row / CELL_HEIGHT as u32) as usize;
        if week >= WEEKS_PER_MONTH {
            return None;
        }
        let month = month_row * self.months_per_row as u32 + month_col as u32 + 1;
        if month > 12 {
            return None;
        }
        let weekday = (col_in_month / CELL_WIDTH) as usize;
        section.months.get(month as usize - 1)?.weeks[week][weekday]
    }
}

/// One prebuilt month grid
#[derive(Debug, Clone)]
pub struct MonthView {
    pub month: u32,
    pub weeks: Vec<[Option<NaiveDate>; 7]>,
}

/// One materialized year
#[derive(Debug, Clone)]
pub struct YearSection {
    pub year: i32,
    pub months: Vec<MonthView>,
}

impl YearSection {
    fn build(year: i32) -> Self {
        let months = (1..=12)
            .map(|month| MonthView {
                month,
                weeks: month_grid(year, month),
            })
            .collect();
        Self { year, months }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy)]
struct ScrollAnimation {
    target: u32,
}

pub struct YearRenderer {
    sections: Vec<YearSection>,
    layout: GridLayout,
    viewport_height: u32,
    scroll_top: u32,
    last_scroll_top: u32,
    direction: ScrollDirection,
    current_year: i32,
    suppress_tracking: bool,
    settle_frames: u8,
    animation: Option<ScrollAnimation>,
}

impl YearRenderer {
    /// Materialize `year - 1`, `year`, `year + 1` and land on `year`
    pub fn new(year: i32, layout: GridLayout, viewport_height: u16) -> Self {
        let mut renderer = Self {
            sections: Vec::new(),
            layout,
            viewport_height: viewport_height as u32,
            scroll_top: 0,
            last_scroll_top: 0,
            direction: ScrollDirection::Down,
            current_year: year,
            suppress_tracking: false,
            settle_frames: 0,
            animation: None,
        };
        renderer.ensure_year(year - 1);
        renderer.ensure_year(year);
        renderer.ensure_year(year + 1);
        renderer.scroll_to_year(year, false);
        renderer
    }

    pub fn layout(&self) -> GridLayout {
        self.layout
    }

    pub fn years(&self) -> Vec<i32> {
        self.sections.iter().map(|s| s.year).collect()
    }

    pub fn min_year(&self) -> Option<i32> {
        self.sections.first().map(|s| s.year)
    }

    pub fn max_year(&self) -> Option<i32> {
        self.sections.last().map(|s| s.year)
    }

    pub fn is_materialized(&self, year: i32) -> bool {
        self.sections.iter().any(|s| s.year == year)
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    pub fn scroll_top(&self) -> u32 {
        self.scroll_top
    }

    #[allow(dead_code)]
    pub fn direction(&self) -> ScrollDirection {
        self.direction
    }

    #[allow(dead_code)]
    pub fn is_tracking_suppressed(&self) -> bool {
        self.suppress_tracking
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    fn total_height(&self) -> u32 {
        self.sections.len() as u32 * self.layout.section_height()
    }

    fn max_scroll(&self) -> u32 {
        self.total_height().saturating_sub(self.viewport_height)
    }

    /// Absolute top row of a materialized section
    pub fn section_top(&self, year: i32) -> Option<u32> {
        let index = self.sections.iter().position(|s| s.year == year)?;
        Some(index as u32 * self.layout.section_height())
    }

    /// Materialize `year` if needed, keeping sections in ascending order.
    /// Returns whether a section was created.
    pub fn ensure_year(&mut self, year: i32) -> bool {
        if self.is_materialized(year) {
            return false;
        }
        let section = YearSection::build(year);
        let index = match (self.min_year(), self.max_year()) {
            (None, _) | (_, None) => 0,
            (Some(min), _) if year < min => 0,
            (_, Some(max)) if year > max => self.sections.len(),
            _ => self
                .sections
                .iter()
                .position(|s| year < s.year)
                .unwrap_or(self.sections.len()),
        };
        self.sections.insert(index, section);
        tracing::debug!(year, "materialized year section");

        // Keep the visible content still when something lands above it
        let new_top = index as u32 * self.layout.section_height();
        if new_top <= self.scroll_top && self.sections.len() > 1 {
            let height = self.layout.section_height();
            self.scroll_top += height;
            self.last_scroll_top += height;
            if let Some(animation) = &mut self.animation {
                animation.target += height;
            }
        }
        true
    }

    /// A section is within the observer margin of the viewport. Prepends when
    /// scrolling up into the first section, appends when scrolling down into
    /// the last. Returns the year materialized, if any.
    pub fn on_viewport_entered(&mut self, year: i32, direction: ScrollDirection) -> Option<i32> {
        match direction {
            ScrollDirection::Up if Some(year) == self.min_year() => {
                let new_year = year - 1;
                self.ensure_year(new_year).then_some(new_year)
            }
            ScrollDirection::Down if Some(year) == self.max_year() => {
                let new_year = year + 1;
                self.ensure_year(new_year).then_some(new_year)
            }
            _ => None,
        }
    }

    /// Sections overlapping the viewport grown by `margin` rows on each side
    fn intersecting(&self, margin: u32) -> Vec<(i32, u32)> {
        let height = self.layout.section_height();
        let view_start = self.scroll_top.saturating_sub(margin);
        let view_end = self.scroll_top + self.viewport_height + margin;
        self.sections
            .iter()
            .enumerate()
            .map(|(i, s)| (s.year, i as u32 * height))
            .filter(|(_, top)| *top < view_end && top + height > view_start)
            .collect()
    }

    /// Run both observers after any viewport change. Returns newly materialized years.
    fn observe(&mut self) -> Vec<i32> {
        let mut created = Vec::new();
        // Each pass can bring a fresh boundary section into range; bounded by the margin
        for _ in 0..8 {
            let years: BTreeSet<i32> = self.intersecting(OBSERVER_MARGIN).into_iter().map(|(y, _)| y).collect();
            let mut changed = false;
            for year in years {
                if let Some(new_year) = self.on_viewport_entered(year, self.direction) {
                    created.push(new_year);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        if !self.suppress_tracking {
            // The intersecting section with the smallest top is the one at the top edge
            if let Some((year, _)) = self.intersecting(0).into_iter().min_by_key(|(_, top)| *top) {
                self.current_year = year;
            }
        }
        created
    }

    fn set_scroll_top(&mut self, top: u32) -> Vec<i32> {
        let top = top.min(self.max_scroll());
        if top != self.scroll_top {
            self.direction = if top > self.last_scroll_top {
                ScrollDirection::Down
            } else {
                ScrollDirection::Up
            };
        }
        self.scroll_top = top;
        self.last_scroll_top = top;
        self.observe()
    }

    /// User-driven scroll by `delta` rows; takes over from any programmatic jump
    pub fn scroll_by(&mut self, delta: i32) -> Vec<i32> {
        self.animation = None;
        self.suppress_tracking = false;
        self.settle_frames = 0;
        let target = (self.scroll_top as i64 + delta as i64).max(0) as u32;
        if target == self.scroll_top && delta < 0 {
            // Pinned at the very top: still moving up, so let the observer see it
            self.direction = ScrollDirection::Up;
            return self.observe();
        }
        self.set_scroll_top(target)
    }

    /// Programmatic jump to a year section
    pub fn scroll_to_year(&mut self, year: i32, smooth: bool) {
        self.ensure_year(year);
        let Some(top) = self.section_top(year) else {
            return;
        };
        self.suppress_tracking = true;
        self.current_year = year;
        self.start_scroll(top, smooth);
    }

    /// Programmatic jump aligning the date's month (minus the grid gap) with the viewport top
    pub fn scroll_to_date(&mut self, date: NaiveDate) {
        self.ensure_year(date.year());
        let Some(section_top) = self.section_top(date.year()) else {
            return;
        };
        let (month_row, _) = self.layout.month_origin(date.month());
        let target = (section_top + month_row).saturating_sub(GRID_GAP);
        self.suppress_tracking = true;
        self.current_year = date.year();
        self.start_scroll(target, true);
    }

    fn start_scroll(&mut self, target: u32, smooth: bool) {
        if smooth {
            self.animation = Some(ScrollAnimation { target });
        } else {
            self.animation = None;
            self.set_scroll_top(target);
            self.settle_frames = SETTLE_FRAMES;
        }
    }

    /// Advance smooth scrolling and settle the year indicator. Returns whether
    /// anything visible changed.
    pub fn tick(&mut self) -> bool {
        if let Some(animation) = self.animation {
            let target = animation.target.min(self.max_scroll());
            let remaining = target as i64 - self.scroll_top as i64;
            if remaining == 0 {
                self.animation = None;
                self.settle_frames = SETTLE_FRAMES;
                return false;
            }
            let step = remaining.signum() * (remaining.abs() / 3).max(1);
            self.set_scroll_top((self.scroll_top as i64 + step) as u32);
            return true;
        }
        if self.suppress_tracking {
            if self.settle_frames > 0 {
                self.settle_frames -= 1;
            }
            if self.settle_frames == 0 {
                self.suppress_tracking = false;
                self.observe();
                return true;
            }
        }
        false
    }

    pub fn viewport_height(&self) -> u32 {
        self.viewport_height
    }

    /// Year and month whose row is at the top of the viewport
    fn month_at_top(&self) -> Option<(i32, u32)> {
        let height = self.layout.section_height();
        let section = self.sections.get((self.scroll_top / height) as usize)?;
        // A jump parks the viewport one gap row above the month
        let within = (self.scroll_top % height + GRID_GAP).saturating_sub(YEAR_BADGE_ROWS + GRID_GAP);
        let month_row = within / (MONTH_HEIGHT + GRID_GAP);
        let month = (month_row * self.layout.months_per_row as u32 + 1).min(12);
        Some((section.year, month))
    }

    /// Re-layout after the calendar area changed size. With the same grid the
    /// scroll position is kept; a new grid keeps the top month in view.
    pub fn resize(&mut self, layout: GridLayout, viewport_height: u16) {
        let anchor = self.month_at_top();
        let relaid = layout != self.layout;
        self.layout = layout;
        self.viewport_height = viewport_height as u32;
        if relaid && let Some((year, month)) = anchor
            && let Some(top) = self.section_top(year)
        {
            let (month_row, _) = layout.month_origin(month);
            self.scroll_top = (top + month_row).saturating_sub(GRID_GAP);
        }
        self.scroll_top = self.scroll_top.min(self.max_scroll());
        self.last_scroll_top = self.scroll_top;
        self.observe();
    }

    /// Sections overlapping the viewport with their top row relative to it
    pub fn visible_sections(&self) -> Vec<(&YearSection, i64)> {
        self.intersecting(0)
            .into_iter()
            .filter_map(|(year, top)| {
                let section = self.sections.iter().find(|s| s.year == year)?;
                Some((section, top as i64 - self.scroll_top as i64))
            })
            .collect()
    }

    /// Date under a viewport-relative position
    pub fn hit_test(&self, row: u16, col: u16) -> Option<NaiveDate> {
        let abs_row = self.scroll_top + row as u32;
        let height = self.layout.section_height();
        let section = self.sections.get((abs_row / height) as usize)?;
        self.layout.date_at(section, abs_row % height, col)
    }

    /// Viewport-relative top-left of a date's cell, when its year is materialized
    pub fn cell_origin(&self, date: NaiveDate) -> Option<(i64, u16)> {
        let section_top = self.section_top(date.year())?;
        let section = self.sections.iter().find(|s| s.year == date.year())?;
        let (month_row, month_col) = self.layout.month_origin(date.month());
        let grid = &section.months.get(date.month0() as usize)?.weeks;
        let (week, weekday) = grid.iter().enumerate().find_map(|(w, days)| {
            days.iter().position(|d| *d == Some(date)).map(|wd| (w, wd))
        })?;
        let row = section_top + month_row + MONTH_HEADER_ROWS + week as u32 * CELL_HEIGHT as u32;
        Some((
            row as i64 - self.scroll_top as i64,
            month_col + weekday as u16 * CELL_WIDTH,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::tests::d;

    fn layout() -> GridLayout {
        GridLayout { months_per_row: 3 }
    }

    fn settle(renderer: &mut YearRenderer) {
        for _ in 0..200 {
            renderer.tick();
        }
    }

    #[test]
    fn test_initial_render_has_three_ascending_years() {
        let renderer = YearRenderer::new(2024, layout(), 30);
        assert_eq!(renderer.years(), vec![2023, 2024, 2025]);
        assert_eq!(renderer.current_year(), 2024);
        assert_eq!(renderer.scroll_top(), renderer.section_top(2024).unwrap());
    }

    #[test]
    fn test_layout_dimensions() {
        let layout = layout();
        assert_eq!(layout.month_rows(), 4);
        assert_eq!(MONTH_HEIGHT, 14);
        assert_eq!(layout.section_height(), 1 + 1 + 4 * 15);
        assert_eq!(layout.month_origin(1), (2, 0));
        assert_eq!(layout.month_origin(5), (17, 30));
        assert_eq!(GridLayout::for_width(200).months_per_row, 4);
        assert_eq!(GridLayout::for_width(10).months_per_row, 1);
    }

    #[test]
    fn test_insertion_keeps_ascending_order() {
        let mut renderer = YearRenderer::new(2024, layout(), 30);
        assert!(renderer.ensure_year(2030));
        assert!(renderer.ensure_year(2020));
        assert!(renderer.ensure_year(2027));
        assert!(renderer.ensure_year(2021));
        assert!(!renderer.ensure_year(2024));
        assert_eq!(renderer.years(), vec![2020, 2021, 2023, 2024, 2025, 2027, 2030]);
    }

    #[test]
    fn test_entered_policy_depends_on_direction() {
        let mut renderer = YearRenderer::new(2024, layout(), 30);
        // Bottom section while scrolling up, top section while scrolling down: nothing
        assert_eq!(renderer.on_viewport_entered(2025, ScrollDirection::Up), None);
        assert_eq!(renderer.on_viewport_entered(2023, ScrollDirection::Down), None);
        // Middle sections never trigger
        assert_eq!(renderer.on_viewport_entered(2024, ScrollDirection::Down), None);

        assert_eq!(renderer.on_viewport_entered(2023, ScrollDirection::Up), Some(2022));
        assert_eq!(renderer.on_viewport_entered(2025, ScrollDirection::Down), Some(2026));
        assert_eq!(renderer.years(), vec![2022, 2023, 2024, 2025, 2026]);
    }

    #[test]
    fn test_scrolling_down_appends() {
        let mut renderer = YearRenderer::new(2024, layout(), 30);
        let height = layout().section_height() as i32;
        let created = renderer.scroll_by(height);
        assert_eq!(created, vec![2026]);
        assert_eq!(renderer.direction(), ScrollDirection::Down);
        assert_eq!(renderer.max_year(), Some(2026));
    }

    #[test]
    fn test_scrolling_up_prepends_and_keeps_content_still() {
        let mut renderer = YearRenderer::new(2024, layout(), 30);
        let before = renderer.section_top(2024).unwrap();
        // Scroll into the lower rows of 2023
        let created = renderer.scroll_by(-5);
        assert_eq!(created, vec![2022]);
        assert_eq!(renderer.min_year(), Some(2022));
        // 2023 moved down by one section height and so did the scroll position
        let height = layout().section_height();
        assert_eq!(renderer.section_top(2024).unwrap(), before + height);
        assert_eq!(renderer.scroll_top(), before + height - 5);
        assert_eq!(renderer.current_year(), 2023);
    }

    #[test]
    fn test_sections_are_never_removed() {
        let mut renderer = YearRenderer::new(2024, layout(), 30);
        let height = layout().section_height() as i32;
        for _ in 0..5 {
            renderer.scroll_by(height);
        }
        for _ in 0..10 {
            renderer.scroll_by(-height);
        }
        let years = renderer.years();
        assert!(years.contains(&2024));
        assert!(years.windows(2).all(|w| w[0] + 1 == w[1]));
    }

    #[test]
    fn test_tracking_suppressed_during_jump() {
        let mut renderer = YearRenderer::new(2024, layout(), 30);
        settle(&mut renderer);
        renderer.scroll_to_date(d(2025, 7, 14));
        assert!(renderer.is_tracking_suppressed());
        assert_eq!(renderer.current_year(), 2025);

        // Mid-animation the viewport passes over other sections; indicator stays put
        renderer.tick();
        assert_eq!(renderer.current_year(), 2025);

        settle(&mut renderer);
        assert!(!renderer.is_tracking_suppressed());
        assert!(!renderer.is_animating());
        assert_eq!(renderer.current_year(), 2025);
    }

    #[test]
    fn test_scroll_to_date_aligns_month_top() {
        let mut renderer = YearRenderer::new(2024, layout(), 30);
        renderer.scroll_to_date(d(2024, 8, 20));
        settle(&mut renderer);
        let (month_row, _) = layout().month_origin(8);
        let expected = renderer.section_top(2024).unwrap() + month_row - GRID_GAP;
        assert_eq!(renderer.scroll_top(), expected);
    }

    #[test]
    fn test_jump_to_unmaterialized_year() {
        let mut renderer = YearRenderer::new(2024, layout(), 30);
        renderer.scroll_to_year(2030, false);
        assert!(renderer.is_materialized(2030));
        assert_eq!(renderer.scroll_top(), renderer.section_top(2030).unwrap());
        assert_eq!(renderer.current_year(), 2030);
    }

    #[test]
    fn test_hit_test_and_cell_origin_agree() {
        let mut renderer = YearRenderer::new(2024, layout(), 40);
        settle(&mut renderer);
        let date = d(2024, 2, 14);
        let (row, col) = renderer.cell_origin(date).unwrap();
        assert_eq!(renderer.hit_test(row as u16, col), Some(date));
        assert_eq!(renderer.hit_test(row as u16 + 1, col + 3), Some(date));
        // The year badge row is not a date
        assert_eq!(renderer.hit_test(0, 0), None);
    }

    #[test]
    fn test_resize_keeps_top_month() {
        let mut r = YearRenderer::new(2024, GridLayout { months_per_row: 3 }, 40);
        r.scroll_to_date(d(2024, 7, 1));
        settle(&mut r);
        let before = r.hit_test(3, 1).map(|date| (date.year(), date.month()));

        r.resize(GridLayout { months_per_row: 2 }, 40);
        assert_eq!(r.hit_test(3, 1).map(|date| (date.year(), date.month())), before);

        let top = r.scroll_top();
        r.resize(GridLayout { months_per_row: 2 }, 30);
        assert_eq!(r.scroll_top(), top);
    }
}
