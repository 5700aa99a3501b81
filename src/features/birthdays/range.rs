//! Year-agnostic calendar range test.
//!
//! Birthdays have no useful year, so "is this birthday between these two
//! dates" has to work on (month, day) pairs and wrap across New Year when
//! the range does.

use chrono::{Datelike, NaiveDate};

/// A calendar position with the year stripped off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    /// Callers are expected to pass a valid month/day; this is checked only
    /// in debug builds.
    pub fn new(month: u32, day: u32) -> Self {
        debug_assert!((1..=12).contains(&month), "month out of range: {month}");
        debug_assert!((1..=31).contains(&day), "day out of range: {day}");
        MonthDay { month, day }
    }

    pub fn from_date(date: &NaiveDate) -> Self {
        MonthDay::new(date.month(), date.day())
    }

    /// Total ordering over the calendar year. 32 > any day number, so
    /// month*32+day sorts exactly like (month, day).
    fn position(self) -> u32 {
        self.month * 32 + self.day
    }
}

/// Whether `candidate` falls within `[start, end]`, inclusive of both
/// endpoints. When `start` orders after `end` in the calendar, the range is
/// interpreted as wrapping through year-end: (Dec 20, Jan 10) matches
/// Dec 25 and Jan 5 but not Jul 1.
pub fn in_birthday_range(start: MonthDay, end: MonthDay, candidate: MonthDay) -> bool {
    let wrap = start.position() > end.position();
    let d = candidate;

    if wrap {
        // Start goes forward and wraps around the year to end
        if end.month < d.month && d.month < start.month {
            return false;
        }
    } else if d.month < start.month || d.month > end.month {
        return false;
    }

    if wrap && d.month == start.month && d.month == end.month {
        // Wrapping with the same start/end month leaves a sliver of
        // exclusion within that month, strictly between the end and
        // start day.
        if end.day < d.day && d.day < start.day {
            return false;
        }
    } else {
        // The day bound only applies on the boundary months themselves.
        if d.month == start.month && d.day < start.day {
            return false;
        }
        if d.month == end.month && d.day > end.day {
            return false;
        }
    }

    true
}
