//! Local-calendar date keys and the week/month enumerations the aggregation
//! windows are built from.
//!
//! Every calendar value here is a `NaiveDate` already expressed in the local
//! timezone. Timestamps coming out of the store are converted with
//! [`date_key_of`] / [`local_date_of`] before they are compared to a window.

use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// `YYYY-MM-DD` for the given local calendar day.
pub fn local_date_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}-{:02}", date.year(), date.month(), date.day())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn local_date_key_now() -> String {
    local_date_key(today())
}

pub fn local_date_of(timestamp: &DateTime<Utc>) -> NaiveDate {
    timestamp.with_timezone(&Local).date_naive()
}

pub fn date_key_of(timestamp: &DateTime<Utc>) -> String {
    local_date_key(local_date_of(timestamp))
}

pub fn parse_date_key(raw: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_KEY_FORMAT)
        .map_err(|error| AppError::Validation(format!("invalid date key '{}': {}", raw, error)))
}

/// Most recent Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

/// The Sunday-start week containing `date`, Sunday first.
pub fn week_of(date: NaiveDate) -> [NaiveDate; 7] {
    let start = week_start(date);
    std::array::from_fn(|offset| start + Duration::days(offset as i64))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthWindow {
    pub year: i32,
    pub month: u32,
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl MonthWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first && date <= self.last
    }

    pub fn contains_timestamp(&self, timestamp: &DateTime<Utc>) -> bool {
        self.contains(local_date_of(timestamp))
    }

    pub fn first_key(&self) -> String {
        local_date_key(self.first)
    }

    pub fn last_key(&self) -> String {
        local_date_key(self.last)
    }
}

/// First and last day of `month` (1-based).
pub fn month_window(year: i32, month: u32) -> AppResult<MonthWindow> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| AppError::Validation(format!("invalid month {}-{}", year, month)))?;
    let next_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .ok_or_else(|| AppError::Validation(format!("month {}-{} is out of range", year, month)))?;

    Ok(MonthWindow {
        year,
        month,
        first,
        last: next_first - Duration::days(1),
    })
}

pub fn current_month_window() -> AppResult<MonthWindow> {
    let now = today();
    month_window(now.year(), now.month())
}

/// Calendar-grid view of a month: Sunday-first rows, blank cells before the
/// 1st and after the last day so the cell count is a multiple of 7.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthGrid {
    pub year: i32,
    pub month: u32,
    pub leading_blanks: usize,
    pub trailing_blanks: usize,
    pub days: Vec<NaiveDate>,
}

impl MonthGrid {
    pub fn cells(&self) -> Vec<Option<NaiveDate>> {
        let mut cells = Vec::with_capacity(self.leading_blanks + self.days.len() + self.trailing_blanks);
        cells.extend(std::iter::repeat(None).take(self.leading_blanks));
        cells.extend(self.days.iter().copied().map(Some));
        cells.extend(std::iter::repeat(None).take(self.trailing_blanks));
        cells
    }

    pub fn rows(&self) -> Vec<Vec<Option<NaiveDate>>> {
        self.cells().chunks(7).map(<[_]>::to_vec).collect()
    }
}

pub fn month_days(year: i32, month: u32) -> AppResult<MonthGrid> {
    let window = month_window(year, month)?;
    let leading_blanks = window.first.weekday().num_days_from_sunday() as usize;
    let days: Vec<NaiveDate> = window.first.iter_days().take_while(|day| *day <= window.last).collect();
    let used = leading_blanks + days.len();
    let trailing_blanks = (7 - used % 7) % 7;

    Ok(MonthGrid {
        year,
        month,
        leading_blanks,
        trailing_blanks,
        days,
    })
}

/// The month's days in sequential chunks of up to seven, starting from the
/// 1st. Chunks do not follow Sunday boundaries; week-selector indices and the
/// stored per-week notes are keyed by this chunking.
pub fn month_weeks(year: i32, month: u32) -> AppResult<Vec<Vec<NaiveDate>>> {
    let grid = month_days(year, month)?;
    let mut weeks = Vec::new();
    let mut current = Vec::with_capacity(7);
    let last_index = grid.days.len().saturating_sub(1);

    for (index, day) in grid.days.iter().enumerate() {
        current.push(*day);
        if current.len() == 7 || index == last_index {
            weeks.push(std::mem::take(&mut current));
        }
    }

    Ok(weeks)
}

/// Sunday-aligned rows of the month grid with blank cells dropped.
pub fn month_calendar_weeks(year: i32, month: u32) -> AppResult<Vec<Vec<NaiveDate>>> {
    let grid = month_days(year, month)?;
    Ok(grid
        .rows()
        .into_iter()
        .map(|row| row.into_iter().flatten().collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect())
}

pub fn year_months(year: i32) -> Vec<NaiveDate> {
    (1..=12)
        .filter_map(|month| NaiveDate::from_ymd_opt(year, month, 1))
        .collect()
}

/// `dd/mm/yyyy` for a stored date key or RFC 3339 timestamp.
pub fn format_date(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return "Not set".to_string();
    };
    match parse_loose(raw) {
        Some(LooseDate::Day(date)) => date.format("%d/%m/%Y").to_string(),
        Some(LooseDate::Instant(instant)) => instant.with_timezone(&Local).format("%d/%m/%Y").to_string(),
        None => "Invalid date".to_string(),
    }
}

/// `dd/mm/yyyy HH:MM` in local time.
pub fn format_date_time(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return "Not set".to_string();
    };
    match parse_loose(raw) {
        Some(LooseDate::Day(date)) => format!("{} 00:00", date.format("%d/%m/%Y")),
        Some(LooseDate::Instant(instant)) => instant.with_timezone(&Local).format("%d/%m/%Y %H:%M").to_string(),
        None => "Invalid date".to_string(),
    }
}

enum LooseDate {
    Day(NaiveDate),
    Instant(DateTime<Utc>),
}

fn parse_loose(raw: &str) -> Option<LooseDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_KEY_FORMAT) {
        return Some(LooseDate::Day(date));
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|instant| LooseDate::Instant(instant.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn date_key_is_zero_padded_and_round_trips() {
        let day = date(2024, 3, 5);
        let key = local_date_key(day);
        assert_eq!(key, "2024-03-05");
        assert_eq!(parse_date_key(&key).expect("parse"), day);
    }

    #[test]
    fn date_key_of_uses_local_calendar_day() {
        let instant = Local::now().with_timezone(&Utc);
        let expected = Local::now().date_naive();
        assert_eq!(parse_date_key(&date_key_of(&instant)).expect("parse"), expected);
    }

    #[test]
    fn rejects_malformed_date_key() {
        assert!(matches!(parse_date_key("2024-13-01"), Err(AppError::Validation(_))));
        assert!(parse_date_key("yesterday").is_err());
    }

    #[test]
    fn week_starts_on_sunday_on_or_before_date() {
        // 2024-05-15 is a Wednesday.
        let week = week_of(date(2024, 5, 15));
        assert_eq!(week[0], date(2024, 5, 12));
        assert_eq!(week[0].weekday(), Weekday::Sun);
        assert_eq!(week[6], date(2024, 5, 18));

        let sunday = week_of(date(2024, 5, 12));
        assert_eq!(sunday[0], date(2024, 5, 12));
    }

    #[test]
    fn week_crosses_month_and_year_boundaries() {
        let week = week_of(date(2025, 1, 1));
        assert_eq!(week[0], date(2024, 12, 29));
        assert_eq!(week[6], date(2025, 1, 4));
    }

    #[test]
    fn february_day_counts_follow_leap_years() {
        assert_eq!(month_days(2024, 2).expect("grid").days.len(), 29);
        assert_eq!(month_days(2023, 2).expect("grid").days.len(), 28);
    }

    #[test]
    fn month_grid_is_padded_to_whole_weeks() {
        // 2024-05-01 is a Wednesday.
        let grid = month_days(2024, 5).expect("grid");
        assert_eq!(grid.leading_blanks, 3);
        assert_eq!(grid.cells().len() % 7, 0);
        assert_eq!(grid.cells().iter().flatten().count(), 31);
        assert!(grid.days.windows(2).all(|pair| pair[1] == pair[0] + Duration::days(1)));
    }

    #[test]
    fn month_weeks_chunk_sequentially_from_the_first() {
        let weeks = month_weeks(2024, 5).expect("weeks");
        let sizes: Vec<usize> = weeks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![7, 7, 7, 7, 3]);
        assert_eq!(weeks[0][0], date(2024, 5, 1));
        assert_eq!(weeks[1][0], date(2024, 5, 8));
    }

    #[test]
    fn calendar_weeks_first_row_is_shortened_by_start_weekday() {
        let weeks = month_calendar_weeks(2024, 5).expect("weeks");
        assert_eq!(weeks[0].len(), 7 - 3);
        assert_eq!(weeks[0][0], date(2024, 5, 1));
        assert_eq!(weeks[1][0].weekday(), Weekday::Sun);
        assert_eq!(weeks.iter().map(Vec::len).sum::<usize>(), 31);
    }

    #[test]
    fn month_window_handles_december() {
        let window = month_window(2023, 12).expect("window");
        assert_eq!(window.first_key(), "2023-12-01");
        assert_eq!(window.last_key(), "2023-12-31");
        assert!(month_window(2023, 13).is_err());
        assert!(month_window(2023, 0).is_err());
    }

    #[test]
    fn formats_dates_for_display() {
        assert_eq!(format_date(Some("2024-03-05")), "05/03/2024");
        assert_eq!(format_date(None), "Not set");
        assert_eq!(format_date(Some("nonsense")), "Invalid date");
        assert_eq!(format_date_time(Some("2024-03-05")), "05/03/2024 00:00");
        assert_eq!(year_months(2024).len(), 12);
    }
}
