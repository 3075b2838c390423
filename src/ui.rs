use crate::app::{App, ColorPopover, Confirm, Dialog, EventForm, Focus, Hit, ITEM_FIELDS, InlineEdit, ItemField, ItemForm};
use crate::color::{TextContrast, hex_to_rgb};
use crate::date_util::{WEEKDAY_LABELS, format_date, month_name};
use crate::get_recent_logs;
use crate::painter::{CalendarPainter, CellPaint};
use crate::panels::{self, EMPTY_TEXT, PanelView};
use crate::prefs::PanelLayout;
use crate::years::{CELL_HEIGHT, CELL_WIDTH, GridLayout, MONTH_HEADER_ROWS, MONTH_WIDTH};
use chrono::Datelike;
use crossterm::{
    cursor, queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use std::io::{self, Write};

pub const SIDEBAR_WIDTH: u16 = 30;
pub const PANEL_WIDTH: u16 = 38;
/// Item rows take two lines: meta, then title
const ITEM_ROW_HEIGHT: u16 = 2;
/// Panel title and separator
const PANEL_HEADER_ROWS: u16 = 2;
const TOOLTIP_WIDTH: u16 = 32;
const DIALOG_WIDTH: u16 = 56;
const HEADER_TITLE: &str = " colendar  ";

/// A terminal rectangle in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn contains(&self, col: u16, row: u16) -> bool {
        col >= self.x && col < self.x + self.width && row >= self.y && row < self.y + self.height
    }
}

/// Screen areas for the current terminal size and panel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Regions {
    /// Events section including its header row
    pub events: Option<Rect>,
    /// Items section including its header row
    pub items: Option<Rect>,
    pub calendar: Rect,
    /// Day / multi panel
    pub panel: Option<Rect>,
    pub status_row: u16,
    pub controls_row: u16,
}

pub fn regions(term: (u16, u16), layout: &PanelLayout, panel_open: bool) -> Regions {
    let (width, height) = term;
    let body_top = 1;
    let body_height = height.saturating_sub(3);

    let (events, items, left) = if layout.sidebar_collapsed || width < SIDEBAR_WIDTH + 1 + MONTH_WIDTH {
        (None, None, 0)
    } else {
        let events_height = if layout.events_collapsed {
            1
        } else if layout.items_collapsed {
            body_height.saturating_sub(1)
        } else {
            body_height / 2
        };
        let items_height = if layout.items_collapsed {
            1
        } else {
            body_height.saturating_sub(events_height)
        };
        (
            Some(Rect {
                x: 0,
                y: body_top,
                width: SIDEBAR_WIDTH,
                height: events_height,
            }),
            Some(Rect {
                x: 0,
                y: body_top + body_height.saturating_sub(items_height),
                width: SIDEBAR_WIDTH,
                height: items_height,
            }),
            SIDEBAR_WIDTH + 1,
        )
    };

    let remaining = width.saturating_sub(left);
    let panel = (panel_open && remaining >= PANEL_WIDTH + 1 + MONTH_WIDTH).then(|| Rect {
        x: width - PANEL_WIDTH,
        y: body_top,
        width: PANEL_WIDTH,
        height: body_height,
    });
    let calendar_width = match panel {
        Some(_) => remaining - PANEL_WIDTH - 1,
        None => remaining,
    };

    Regions {
        events,
        items,
        calendar: Rect {
            x: left,
            y: body_top,
            width: calendar_width,
            height: body_height,
        },
        panel,
        status_row: height.saturating_sub(2),
        controls_row: height.saturating_sub(1),
    }
}

pub fn grid_layout(regions: &Regions) -> GridLayout {
    GridLayout::for_width(regions.calendar.width)
}

/// Left column of the month grid, centred in the calendar area
fn grid_left(area: &Rect, layout: GridLayout) -> u16 {
    area.x + area.width.saturating_sub(layout.width()) / 2
}

/// First visible index of a list so that `selected` stays on screen
fn list_offset(selected: usize, visible: usize) -> usize {
    if visible == 0 {
        0
    } else {
        selected.saturating_sub(visible - 1)
    }
}

/// Scroll offset for an item list; only the list the items focus drives follows `item_index`
fn items_offset(app: &App, in_panel: bool, visible: usize) -> usize {
    if in_panel == app.panel_open() {
        list_offset(app.item_index, visible)
    } else {
        0
    }
}

fn item_slots(rows: u16) -> usize {
    (rows / ITEM_ROW_HEIGHT) as usize
}

/// Resolve a mouse position against the same layout `render` draws
/// Previous, current and next year pills on the header row as (year, x, width)
fn year_pills(current: i32) -> [(i32, u16, u16); 3] {
    let mut x = HEADER_TITLE.len() as u16;
    [current - 1, current, current + 1].map(|year| {
        let width = year.to_string().len() as u16 + 2;
        let pill = (year, x, width);
        x += width + 1;
        pill
    })
}

pub fn hit_test(app: &App, col: u16, row: u16) -> Hit {
    if row == 0 {
        return year_pills(app.years.current_year())
            .into_iter()
            .find(|&(_, x, width)| col >= x && col < x + width)
            .map_or(Hit::Nothing, |(year, _, _)| Hit::Year(year));
    }

    let regions = regions(app.term_size(), &app.layout, app.panel_open());

    if let Some(rect) = regions.events
        && rect.contains(col, row)
    {
        if row == rect.y {
            return Hit::EventsHeader;
        }
        let visible = rect.height.saturating_sub(1) as usize;
        let index = list_offset(app.event_index, visible) + (row - rect.y - 1) as usize;
        return if index < app.events.len() {
            Hit::EventRow(index)
        } else {
            Hit::Nothing
        };
    }

    if let Some(rect) = regions.items
        && rect.contains(col, row)
    {
        if row == rect.y {
            return Hit::ItemsHeader;
        }
        if app.panel_open() {
            return Hit::Nothing;
        }
        let visible = item_slots(rect.height.saturating_sub(1));
        let index = items_offset(app, false, visible) + ((row - rect.y - 1) / ITEM_ROW_HEIGHT) as usize;
        let count = panels::items_panel(&app.selection, &app.cache, &app.events).count();
        return if index < count { Hit::ItemRow(index) } else { Hit::Nothing };
    }

    if let Some(rect) = regions.panel
        && rect.contains(col, row)
    {
        if row < rect.y + PANEL_HEADER_ROWS {
            return Hit::Nothing;
        }
        let visible = item_slots(rect.height.saturating_sub(PANEL_HEADER_ROWS));
        let index = items_offset(app, true, visible) + ((row - rect.y - PANEL_HEADER_ROWS) / ITEM_ROW_HEIGHT) as usize;
        let count = app.item_list().map(|v| v.count()).unwrap_or(0);
        return if index < count { Hit::ItemRow(index) } else { Hit::Nothing };
    }

    if regions.calendar.contains(col, row) {
        let left = grid_left(&regions.calendar, app.years.layout());
        if col < left {
            return Hit::Calendar;
        }
        return match app.years.hit_test(row - regions.calendar.y, col - left) {
            Some(date) => Hit::Cell(date),
            None => Hit::Calendar,
        };
    }

    Hit::Nothing
}

fn hex_color(hex: &str) -> Color {
    hex_to_rgb(hex)
        .map(|c| Color::Rgb { r: c.r, g: c.g, b: c.b })
        .unwrap_or(Color::Grey)
}

fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}

pub fn render(out: &mut impl Write, app: &App) -> io::Result<()> {
    let (width, _) = app.term_size();
    let regions = regions(app.term_size(), &app.layout, app.panel_open());

    queue!(out, Clear(ClearType::All), cursor::Hide)?;

    draw_header(out, app, width)?;
    if let Some(rect) = regions.events {
        draw_events(out, app, rect)?;
    }
    if let Some(rect) = regions.items {
        draw_items(out, app, rect)?;
    }
    draw_calendar(out, app, regions.calendar)?;
    if let Some(rect) = regions.panel
        && let Some(view) = panels::selection_panel(&app.selection, &app.cache, &app.events)
    {
        draw_panel(out, app, rect, &view)?;
    }
    if app.dialog.is_none() && !app.show_logs {
        draw_tooltip(out, app, &regions, width)?;
    }
    draw_status(out, app, &regions, width)?;

    if let Some(dialog) = &app.dialog {
        draw_dialog(out, app, dialog)?;
    }
    if app.show_logs {
        draw_logs(out, app)?;
    }

    out.flush()
}

fn draw_header(out: &mut impl Write, app: &App, width: u16) -> io::Result<()> {
    queue!(
        out,
        cursor::MoveTo(0, 0),
        SetForegroundColor(Color::Cyan),
        SetAttribute(Attribute::Bold),
        Print(HEADER_TITLE),
        ResetColor,
        SetAttribute(Attribute::Reset)
    )?;

    let current = app.years.current_year();
    let pills = year_pills(current);
    for (year, x, _) in pills {
        queue!(out, cursor::MoveTo(x, 0))?;
        if year == current {
            queue!(out, SetAttribute(Attribute::Reverse), SetAttribute(Attribute::Bold))?;
        } else {
            queue!(out, SetForegroundColor(Color::DarkGrey))?;
        }
        queue!(out, Print(format!(" {} ", year)), ResetColor, SetAttribute(Attribute::Reset))?;
    }

    let (_, last_x, last_width) = pills[2];
    let mut used = last_x + last_width;
    if app.is_loading() {
        queue!(out, SetForegroundColor(Color::Cyan), Print(" *"), ResetColor)?;
        used += 2;
    }

    if let Some(id) = app.selection.draw_event() {
        let label = format!("Drawing: {} (Esc to stop) ", app.events.title_of(id));
        let x = width.saturating_sub(label.chars().count() as u16 + 2);
        queue!(
            out,
            cursor::MoveTo(x, 0),
            SetForegroundColor(hex_color(app.events.color_of(id))),
            Print("■ "),
            ResetColor,
            Print(truncate_str(&label, width.saturating_sub(used + 3) as usize))
        )?;
    }
    Ok(())
}

fn draw_section_header(out: &mut impl Write, rect: Rect, title: &str, collapsed: bool, focused: bool) -> io::Result<()> {
    let arrow = if collapsed { "▸" } else { "▾" };
    queue!(out, cursor::MoveTo(rect.x, rect.y))?;
    if focused {
        queue!(out, SetForegroundColor(Color::Cyan))?;
    }
    queue!(
        out,
        SetAttribute(Attribute::Bold),
        Print(truncate_str(&format!("{} {}", arrow, title), rect.width as usize)),
        ResetColor,
        SetAttribute(Attribute::Reset)
    )
}

fn draw_events(out: &mut impl Write, app: &App, rect: Rect) -> io::Result<()> {
    let title = format!("Events ({})", app.events.len());
    draw_section_header(out, rect, &title, app.layout.events_collapsed, app.focus == Focus::Events)?;
    if app.layout.events_collapsed {
        return Ok(());
    }

    let visible = rect.height.saturating_sub(1) as usize;
    if app.events.is_empty() {
        queue!(
            out,
            cursor::MoveTo(rect.x + 2, rect.y + 1),
            SetForegroundColor(Color::DarkGrey),
            Print("No events (n to add)"),
            ResetColor
        )?;
        return Ok(());
    }

    let offset = list_offset(app.event_index, visible);
    for (i, event) in app.events.all().iter().enumerate().skip(offset).take(visible) {
        let y = rect.y + 1 + (i - offset) as u16;
        let highlighted = app.selection.is_highlighted(event.id);
        let drawing = app.selection.draw_event() == Some(event.id);
        let selected = app.focus == Focus::Events && i == app.event_index;

        queue!(out, cursor::MoveTo(rect.x, y))?;
        if selected {
            queue!(out, SetAttribute(Attribute::Reverse))?;
        }
        let mark = if highlighted { "● " } else { "○ " };
        queue!(
            out,
            Print(mark),
            SetForegroundColor(hex_color(&event.color)),
            Print("■ "),
            ResetColor
        )?;
        if selected {
            queue!(out, SetAttribute(Attribute::Reverse))?;
        }
        if !highlighted {
            queue!(out, SetForegroundColor(Color::DarkGrey))?;
        }
        let suffix = if drawing { " ✎" } else { "" };
        let title_width = (rect.width as usize).saturating_sub(4 + suffix.chars().count());
        queue!(
            out,
            Print(truncate_str(&event.title, title_width)),
            Print(suffix),
            ResetColor,
            SetAttribute(Attribute::Reset)
        )?;
    }
    Ok(())
}

fn draw_items(out: &mut impl Write, app: &App, rect: Rect) -> io::Result<()> {
    let view = panels::items_panel(&app.selection, &app.cache, &app.events);
    let title = format!("{} ({})", view.title, view.count());
    let focused = app.focus == Focus::Items && !app.panel_open();
    draw_section_header(out, rect, &title, app.layout.items_collapsed, focused)?;
    if app.layout.items_collapsed {
        return Ok(());
    }

    let list = Rect {
        x: rect.x,
        y: rect.y + 1,
        width: rect.width,
        height: rect.height.saturating_sub(1),
    };
    let offset = items_offset(app, false, item_slots(list.height));
    let selected = focused.then_some(app.item_index);
    draw_item_rows(out, &view, list, offset, selected)
}

fn draw_panel(out: &mut impl Write, app: &App, rect: Rect, view: &PanelView) -> io::Result<()> {
    queue!(
        out,
        cursor::MoveTo(rect.x, rect.y),
        SetForegroundColor(Color::Yellow),
        SetAttribute(Attribute::Bold),
        Print(truncate_str(&view.title, rect.width as usize)),
        ResetColor,
        SetAttribute(Attribute::Reset),
        cursor::MoveTo(rect.x, rect.y + 1),
        SetForegroundColor(Color::DarkGrey),
        Print("─".repeat(rect.width as usize)),
        ResetColor
    )?;

    let list = Rect {
        x: rect.x,
        y: rect.y + PANEL_HEADER_ROWS,
        width: rect.width,
        height: rect.height.saturating_sub(PANEL_HEADER_ROWS),
    };
    let offset = items_offset(app, true, item_slots(list.height));
    let selected = (app.focus == Focus::Items).then_some(app.item_index);
    draw_item_rows(out, view, list, offset, selected)
}

fn draw_item_rows(
    out: &mut impl Write,
    view: &PanelView,
    area: Rect,
    offset: usize,
    selected: Option<usize>,
) -> io::Result<()> {
    if view.is_empty() {
        queue!(
            out,
            cursor::MoveTo(area.x + 2, area.y),
            SetForegroundColor(Color::DarkGrey),
            Print(EMPTY_TEXT),
            ResetColor
        )?;
        return Ok(());
    }

    let slots = item_slots(area.height);
    let width = area.width as usize;
    for (i, row) in view.rows.iter().enumerate().skip(offset).take(slots) {
        let y = area.y + (i - offset) as u16 * ITEM_ROW_HEIGHT;
        let is_selected = selected == Some(i);

        queue!(
            out,
            cursor::MoveTo(area.x, y),
            SetForegroundColor(hex_color(&row.color)),
            Print("■ "),
            SetForegroundColor(Color::DarkGrey),
            Print(truncate_str(&row.meta, width.saturating_sub(2))),
            ResetColor,
            cursor::MoveTo(area.x, y + 1),
            Print("  ")
        )?;
        if is_selected {
            queue!(out, SetAttribute(Attribute::Reverse))?;
        }
        let mut text = row.title.clone();
        if let Some(detail) = row.description.as_ref().or(row.notes.as_ref()) {
            text.push_str(" · ");
            text.push_str(detail);
        }
        queue!(
            out,
            Print(truncate_str(&text, width.saturating_sub(2))),
            SetAttribute(Attribute::Reset)
        )?;
    }

    if view.count() > offset + slots {
        let y = area.y + area.height.saturating_sub(1);
        queue!(
            out,
            cursor::MoveTo(area.x + area.width.saturating_sub(12), y),
            SetForegroundColor(Color::DarkGrey),
            Print(format!("+{} more", view.count() - offset - slots)),
            ResetColor
        )?;
    }
    Ok(())
}

fn draw_calendar(out: &mut impl Write, app: &App, area: Rect) -> io::Result<()> {
    let layout = app.years.layout();
    let left = grid_left(&area, layout);
    let painter = CalendarPainter {
        cache: &app.cache,
        events: &app.events,
        selection: &app.selection,
        today: app.today,
        hover: app.hover,
    };
    let bottom = area.y as i64 + area.height as i64;
    let screen_row = |rel: i64| -> Option<u16> {
        let y = area.y as i64 + rel;
        (y >= area.y as i64 && y < bottom).then_some(y as u16)
    };

    for (section, top) in app.years.visible_sections() {
        if let Some(y) = screen_row(top) {
            let label = format!(" {} ", section.year);
            let x = left + layout.width().saturating_sub(label.len() as u16) / 2;
            queue!(out, cursor::MoveTo(x, y))?;
            if section.year == app.years.current_year() {
                queue!(
                    out,
                    SetForegroundColor(Color::Cyan),
                    SetAttribute(Attribute::Bold),
                    SetAttribute(Attribute::Reverse)
                )?;
            } else {
                queue!(out, SetForegroundColor(Color::DarkGrey))?;
            }
            queue!(out, Print(label), ResetColor, SetAttribute(Attribute::Reset))?;
        }

        for month in &section.months {
            let (month_row, month_col) = layout.month_origin(month.month);
            let month_top = top + month_row as i64;
            let x = left + month_col;

            if let Some(y) = screen_row(month_top) {
                let name = month_name(month.month);
                queue!(
                    out,
                    cursor::MoveTo(x + MONTH_WIDTH.saturating_sub(name.len() as u16) / 2, y),
                    SetAttribute(Attribute::Bold),
                    Print(name),
                    SetAttribute(Attribute::Reset)
                )?;
            }
            if let Some(y) = screen_row(month_top + 1) {
                queue!(out, cursor::MoveTo(x, y), SetForegroundColor(Color::DarkGrey))?;
                for label in WEEKDAY_LABELS {
                    queue!(out, Print(format!(" {:<3}", label)))?;
                }
                queue!(out, ResetColor)?;
            }

            for (week, days) in month.weeks.iter().enumerate() {
                let cell_top = month_top + MONTH_HEADER_ROWS as i64 + week as i64 * CELL_HEIGHT as i64;
                if screen_row(cell_top).is_none() && screen_row(cell_top + CELL_HEIGHT as i64 - 1).is_none() {
                    continue;
                }
                for (weekday, day) in days.iter().enumerate() {
                    let Some(date) = day else {
                        continue;
                    };
                    let paint = painter.paint(*date);
                    let style = CellStyle {
                        cursor: app.focus == Focus::Calendar && *date == app.cursor,
                        weekend: weekday >= 5,
                    };
                    let cell_x = x + weekday as u16 * CELL_WIDTH;
                    for line in 0..CELL_HEIGHT {
                        if let Some(y) = screen_row(cell_top + line as i64) {
                            draw_cell_line(out, &paint, style, line, cell_x, y)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy)]
struct CellStyle {
    cursor: bool,
    weekend: bool,
}

/// One text row of a 4x2 day cell; each row covers one row of quadrants
fn draw_cell_line(out: &mut impl Write, paint: &CellPaint, style: CellStyle, line: u16, x: u16, y: u16) -> io::Result<()> {
    let quadrants = paint.quadrants();
    let row = quadrants[line as usize];

    let text: Vec<char> = if line == 0 {
        let (open, close) = if paint.active {
            ('[', ']')
        } else if paint.selected {
            ('‹', '›')
        } else {
            (' ', ' ')
        };
        let mut chars = vec![open];
        chars.extend(format!("{:>2}", paint.date.day()).chars());
        chars.push(close);
        chars
    } else if paint.draw_border.is_some() {
        vec!['▁'; CELL_WIDTH as usize]
    } else {
        vec![' '; CELL_WIDTH as usize]
    };

    let fg = match (line, &paint.draw_border, paint.contrast) {
        (1, Some(border), _) => hex_color(border),
        (_, _, Some(TextContrast::Light)) => Color::White,
        (_, _, Some(TextContrast::Dark)) => Color::Black,
        _ if paint.today => Color::Green,
        _ if style.weekend => Color::DarkGrey,
        _ => Color::Reset,
    };

    queue!(out, cursor::MoveTo(x, y), SetForegroundColor(fg))?;
    if paint.today || style.cursor {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if style.cursor && line == 0 {
        queue!(out, SetAttribute(Attribute::Underlined))?;
    }
    for (half, color) in row.iter().enumerate() {
        let bg = color.map(hex_color).unwrap_or(Color::Reset);
        let start = half * 2;
        let chunk: String = text[start..start + 2].iter().collect();
        queue!(out, SetBackgroundColor(bg), Print(chunk))?;
    }
    queue!(out, ResetColor, SetAttribute(Attribute::Reset))
}

fn draw_tooltip(out: &mut impl Write, app: &App, regions: &Regions, width: u16) -> io::Result<()> {
    let Some(date) = app.hover else {
        return Ok(());
    };
    let Some(lines) = panels::tooltip(date, &app.cache, &app.events, &app.selection) else {
        return Ok(());
    };
    let Some((row, col)) = app.years.cell_origin(date) else {
        return Ok(());
    };
    let area = regions.calendar;
    if row < 0 || row >= area.height as i64 {
        return Ok(());
    }

    let cell_x = grid_left(&area, app.years.layout()) + col;
    let box_height = lines.len() as u16 + 2;
    let x = if cell_x + CELL_WIDTH + 1 + TOOLTIP_WIDTH <= width {
        cell_x + CELL_WIDTH + 1
    } else {
        cell_x.saturating_sub(TOOLTIP_WIDTH + 1)
    };
    let y = (area.y + row as u16).min((area.y + area.height).saturating_sub(box_height));
    let rect = Rect {
        x,
        y,
        width: TOOLTIP_WIDTH,
        height: box_height,
    };
    draw_box(out, rect, &format_date(date))?;

    let inner = TOOLTIP_WIDTH.saturating_sub(4) as usize;
    for (i, line) in lines.iter().enumerate() {
        let mut text = line.title.clone();
        if let Some(time) = &line.time {
            text = format!("{} {}", time, text);
        }
        if let Some(description) = &line.description {
            text.push_str(" · ");
            text.push_str(description);
        }
        queue!(
            out,
            cursor::MoveTo(x + 1, y + 1 + i as u16),
            SetForegroundColor(hex_color(&line.color)),
            Print("■ "),
            ResetColor,
            Print(truncate_str(&text, inner))
        )?;
    }
    Ok(())
}

fn draw_status(out: &mut impl Write, app: &App, regions: &Regions, width: u16) -> io::Result<()> {
    queue!(out, cursor::MoveTo(0, regions.status_row))?;
    if let Some(msg) = &app.status_message {
        queue!(
            out,
            SetForegroundColor(Color::Yellow),
            Print(format!(" {}", truncate_str(msg, width.saturating_sub(2) as usize))),
            ResetColor
        )?;
    } else if app.is_loading() {
        queue!(out, SetForegroundColor(Color::DarkGrey), Print(" Loading…"), ResetColor)?;
    }

    let controls = match (&app.dialog, app.focus) {
        (Some(_), _) => " enter:save esc:cancel",
        (None, Focus::Calendar) => {
            " hjkl:move enter:open v:range m:pick a:add x:erase tab:focus t:today [/]:year 1/2/3:panels L:logs q:quit"
        }
        (None, Focus::Events) => {
            " j/k:move space:show i:only d:draw n:new e:edit r:rename c:colour X:delete J/K:reorder tab:focus"
        }
        (None, Focus::Items) => " j/k:move a:add e:edit r:rename x:delete enter:go to tab:focus",
    };
    queue!(
        out,
        cursor::MoveTo(0, regions.controls_row),
        SetForegroundColor(Color::DarkGrey),
        Print(truncate_str(controls, width as usize)),
        ResetColor
    )
}

/// Bordered box with a cleared interior
fn draw_box(out: &mut impl Write, rect: Rect, title: &str) -> io::Result<()> {
    let inner = rect.width.saturating_sub(2) as usize;
    let title = truncate_str(title, inner.saturating_sub(2));
    let top = format!("┌ {} {}┐", title, "─".repeat(inner.saturating_sub(title.chars().count() + 2)));
    queue!(out, cursor::MoveTo(rect.x, rect.y), Print(top))?;
    for row in 1..rect.height.saturating_sub(1) {
        queue!(
            out,
            cursor::MoveTo(rect.x, rect.y + row),
            Print(format!("│{}│", " ".repeat(inner)))
        )?;
    }
    queue!(
        out,
        cursor::MoveTo(rect.x, rect.y + rect.height.saturating_sub(1)),
        Print(format!("└{}┘", "─".repeat(inner)))
    )
}

fn centered(app: &App, width: u16, height: u16) -> Rect {
    let (term_width, term_height) = app.term_size();
    let width = width.min(term_width.saturating_sub(2));
    let height = height.min(term_height.saturating_sub(2));
    Rect {
        x: term_width.saturating_sub(width) / 2,
        y: term_height.saturating_sub(height) / 2,
        width,
        height,
    }
}

/// One labelled field row inside a dialog
fn draw_field(out: &mut impl Write, rect: Rect, row: u16, label: &str, value: &str, active: bool) -> io::Result<()> {
    let inner = rect.width.saturating_sub(4) as usize;
    let marker = if active { "›" } else { " " };
    let cursor_mark = if active { "_" } else { "" };
    queue!(out, cursor::MoveTo(rect.x + 1, rect.y + row))?;
    if active {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    queue!(
        out,
        Print(truncate_str(&format!("{} {:<12} {}{}", marker, label, value, cursor_mark), inner)),
        SetAttribute(Attribute::Reset)
    )
}

fn draw_hint(out: &mut impl Write, rect: Rect, hint: &str) -> io::Result<()> {
    queue!(
        out,
        cursor::MoveTo(rect.x + 2, rect.y + rect.height.saturating_sub(2)),
        SetForegroundColor(Color::DarkGrey),
        Print(truncate_str(hint, rect.width.saturating_sub(4) as usize)),
        ResetColor
    )
}

fn draw_dialog(out: &mut impl Write, app: &App, dialog: &Dialog) -> io::Result<()> {
    match dialog {
        Dialog::Item(form) => draw_item_form(out, app, form),
        Dialog::Event(form) => draw_event_form(out, app, form),
        Dialog::Inline(edit) => draw_inline(out, app, edit),
        Dialog::Color(popover) => draw_color(out, app, popover),
        Dialog::Confirm(confirm) => draw_confirm(out, app, confirm),
    }
}

fn draw_item_form(out: &mut impl Write, app: &App, form: &ItemForm) -> io::Result<()> {
    let rect = centered(app, DIALOG_WIDTH, ITEM_FIELDS.len() as u16 + 6);
    let title = if form.editing.is_some() { "Edit item" } else { "New item" };
    draw_box(out, rect, title)?;
    queue!(
        out,
        cursor::MoveTo(rect.x + 3, rect.y + 1),
        SetForegroundColor(Color::Yellow),
        Print(format_date(form.date)),
        ResetColor
    )?;

    for (i, field) in ITEM_FIELDS.iter().enumerate() {
        let active = form.field() == *field;
        let row = i as u16 + 2;
        let (label, value) = match field {
            ItemField::Event => {
                let name = match form.event_id {
                    Some(id) => app.events.title_of(id).to_string(),
                    None => "(select with ←/→)".to_string(),
                };
                let value = if form.editing.is_some() { name } else { format!("‹ {} ›", name) };
                ("Event", value)
            }
            ItemField::Title => ("Title", form.title.clone()),
            ItemField::Time => ("Time", form.time.clone()),
            ItemField::Description => ("Description", form.description.clone()),
            ItemField::Notes => ("Notes", form.notes.clone()),
        };
        draw_field(out, rect, row, label, &value, active && *field != ItemField::Event)?;
        if *field == ItemField::Event
            && let Some(id) = form.event_id
        {
            queue!(
                out,
                cursor::MoveTo(rect.x + rect.width.saturating_sub(4), rect.y + row),
                SetForegroundColor(hex_color(app.events.color_of(id))),
                Print("■"),
                ResetColor
            )?;
        }
        if *field == ItemField::Event && active {
            queue!(out, cursor::MoveTo(rect.x + 1, rect.y + row), SetAttribute(Attribute::Bold), Print("›"), SetAttribute(Attribute::Reset))?;
        }
    }
    draw_hint(out, rect, "tab:next field  ←/→:event  enter:save  esc:cancel")
}

fn draw_event_form(out: &mut impl Write, app: &App, form: &EventForm) -> io::Result<()> {
    let rect = centered(app, DIALOG_WIDTH, 6);
    let title = if form.editing.is_some() { "Edit event" } else { "New event" };
    draw_box(out, rect, title)?;
    draw_field(out, rect, 1, "Title", &form.title, form.field == 0)?;
    draw_field(out, rect, 2, "Colour", &form.color, form.field == 1)?;
    if hex_to_rgb(&form.color).is_some() {
        queue!(
            out,
            cursor::MoveTo(rect.x + rect.width.saturating_sub(4), rect.y + 2),
            SetForegroundColor(hex_color(&form.color)),
            Print("■"),
            ResetColor
        )?;
    }
    draw_hint(out, rect, "tab:next field  enter:save  esc:cancel")
}

fn draw_inline(out: &mut impl Write, app: &App, edit: &InlineEdit) -> io::Result<()> {
    let rect = centered(app, DIALOG_WIDTH, 4);
    draw_box(out, rect, "Rename")?;
    draw_field(out, rect, 1, "Title", &edit.value, true)
}

fn draw_color(out: &mut impl Write, app: &App, popover: &ColorPopover) -> io::Result<()> {
    let rect = centered(app, 36, 5);
    draw_box(out, rect, app.events.title_of(popover.event_id))?;
    draw_field(out, rect, 1, "Colour", &popover.value, true)?;
    queue!(
        out,
        cursor::MoveTo(rect.x + 3, rect.y + 2),
        SetForegroundColor(hex_color(app.events.color_of(popover.event_id))),
        Print("■■■■"),
        ResetColor,
        SetForegroundColor(Color::DarkGrey),
        Print("  was "),
        SetForegroundColor(hex_color(&popover.original)),
        Print("■■■■"),
        ResetColor
    )
}

fn draw_confirm(out: &mut impl Write, app: &App, confirm: &Confirm) -> io::Result<()> {
    let inner = DIALOG_WIDTH.saturating_sub(4) as usize;
    let lines = wrap(&confirm.message, inner);
    let rect = centered(app, DIALOG_WIDTH, lines.len() as u16 + 4);
    draw_box(out, rect, "Confirm")?;
    for (i, line) in lines.iter().enumerate() {
        queue!(out, cursor::MoveTo(rect.x + 2, rect.y + 1 + i as u16), Print(line))?;
    }
    draw_hint(out, rect, "y:yes  n:no")
}

/// Greedy word wrap
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > width {
            lines.push(std::mem::take(&mut line));
        }
        if !line.is_empty() {
            line.push(' ');
        }
        line.push_str(word);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn draw_logs(out: &mut impl Write, app: &App) -> io::Result<()> {
    let (width, height) = app.term_size();
    let rect = centered(app, width.saturating_sub(4), height.saturating_sub(2));
    draw_box(out, rect, "Request log (L to close)")?;
    let rows = rect.height.saturating_sub(2) as usize;
    for (i, line) in get_recent_logs(rows).iter().enumerate() {
        queue!(
            out,
            cursor::MoveTo(rect.x + 2, rect.y + 1 + i as u16),
            Print(truncate_str(line, rect.width.saturating_sub(4) as usize))
        )?;
    }
    Ok(())
}
