//! FILENAME: core/engine/src/date.rs
//! PURPOSE: Calendar dates for date-typed dimensions.
//! CONTEXT: Dates arrive as ISO text (`YYYY-MM-DD`, optionally followed by a
//! time part which is ignored). They are kept as plain year/month/day so that
//! derived ordering is chronological and keys are stable.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u8,
    pub day: u8,
}

impl CalendarDate {
    /// Builds a date, rejecting months and days that do not exist.
    pub fn new(year: i32, month: u8, day: u8) -> Option<Self> {
        if !(1..=12).contains(&month) {
            return None;
        }
        if day == 0 || day > days_in_month(year, month) {
            return None;
        }
        Some(CalendarDate { year, month, day })
    }

    /// Parses `YYYY-MM-DD`. Anything after the day that starts with `T` or a
    /// space (a time of day) is ignored.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let date_part = match text.find(|c| c == 'T' || c == ' ') {
            Some(pos) => &text[..pos],
            None => text,
        };

        let mut parts = date_part.splitn(3, '-');
        let year = parts.next()?.parse::<i32>().ok()?;
        let month = parts.next()?.parse::<u8>().ok()?;
        let day = parts.next()?.parse::<u8>().ok()?;
        CalendarDate::new(year, month, day)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}
