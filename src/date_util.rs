//! Date arithmetic and formatting helpers

use chrono::{Datelike, Duration, Local, NaiveDate};

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const MONTH_ABBR: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

pub const WEEKDAY_LABELS: [&str; 7] = ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"];

/// Weeks shown per month grid; enough for any month starting on Sunday
pub const WEEKS_PER_MONTH: usize = 6;

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Number of days in `month` (1-12) of `year`
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(30)
}

/// Monday-based weekday index (Monday = 0, Sunday = 6)
pub fn weekday_index(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}

/// Full month name for `month` in 1-12
pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES[(month.clamp(1, 12) - 1) as usize]
}

pub fn to_date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[allow(dead_code)]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Human format used in panels and dialogs, e.g. "15th Jan, 2024"
pub fn format_date(date: NaiveDate) -> String {
    let day = date.day();
    format!(
        "{}{} {}, {}",
        day,
        ordinal_suffix(day),
        MONTH_ABBR[date.month0() as usize],
        date.year()
    )
}

fn ordinal_suffix(day: u32) -> &'static str {
    let teen = day % 100;
    if (11..=13).contains(&teen) {
        return "th";
    }
    match day % 10 {
        1 => "st",
        2 => "nd",
        3 => "rd",
        _ => "th",
    }
}

/// Every date between `a` and `b` inclusive, ascending regardless of argument order
pub fn date_range_inclusive(a: NaiveDate, b: NaiveDate) -> Vec<NaiveDate> {
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    let mut dates = Vec::with_capacity((end - start).num_days() as usize + 1);
    let mut current = start;
    while current <= end {
        dates.push(current);
        current += Duration::days(1);
    }
    dates
}

/// Month laid out as Monday-first weeks; blanks before the 1st and after the last day
pub fn month_grid(year: i32, month: u32) -> Vec<[Option<NaiveDate>; 7]> {
    let mut weeks = vec![[None; 7]; WEEKS_PER_MONTH];
    let Some(first) = NaiveDate::from_ymd_opt(year, month, 1) else {
        return weeks;
    };
    let offset = weekday_index(first);
    for day in 0..days_in_month(year, month) {
        let cell = (offset + day) as usize;
        weeks[cell / 7][cell % 7] = Some(first + Duration::days(day as i64));
    }
    weeks
}
