//! Worked-hours arithmetic.
//!
//! A shift is described by an entry and an exit clock time. When the exit is
//! earlier than the entry the shift crossed midnight, so a full day is added.
//! Results are expressed in hours, rounded to two decimals.

use chrono::{NaiveTime, Timelike};

use crate::error::{AppError, Result};

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Parse a clock time as sent by HTML time inputs (`HH:MM`, sometimes `HH:MM:SS`)
pub fn parse_clock(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| AppError::validation(format!("'{}' is not a valid time (HH:MM)", s)))
}

/// Minutes between entry and exit, wrapping past midnight.
/// Equal times are a zero-length shift.
pub fn shift_minutes(entry: NaiveTime, exit: NaiveTime) -> i64 {
    let start = minutes_of_day(entry);
    let end = minutes_of_day(exit);
    if end >= start {
        end - start
    } else {
        end + MINUTES_PER_DAY - start
    }
}

fn minutes_of_day(t: NaiveTime) -> i64 {
    i64::from(t.hour()) * 60 + i64::from(t.minute())
}

/// Hours worked for a shift, never negative
pub fn worked_hours(
    entry: NaiveTime,
    exit: NaiveTime,
    break_minutes: u32,
    discount_break: bool,
) -> f64 {
    let mut minutes = shift_minutes(entry, exit);
    if discount_break {
        minutes -= i64::from(break_minutes);
    }
    round2(minutes.max(0) as f64 / 60.0)
}

/// String variant used by the CLI; malformed times count as zero hours
pub fn calculate_worked_hours(
    entry: &str,
    exit: &str,
    break_minutes: u32,
    discount_break: bool,
) -> f64 {
    match (parse_clock(entry), parse_clock(exit)) {
        (Ok(entry), Ok(exit)) => worked_hours(entry, exit, break_minutes, discount_break),
        _ => 0.0,
    }
}

/// Round half away from zero to two decimals. Negative zero becomes 0.0.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0 + 0.0
}
