use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::hours;

/// Maximum length of a service's place name
pub const MAX_PLACE_LEN: usize = 120;

/// Maximum length of a sub-task description
pub const MAX_DESCRIPTION_LEN: usize = 255;

/// A registered user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
}

/// A single work shift
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: i64,
    pub user_id: i64,
    pub place: String,
    pub date: NaiveDate,
    #[serde(with = "clock")]
    pub entry_time: NaiveTime,
    #[serde(with = "clock")]
    pub exit_time: NaiveTime,
    /// Break length as entered, even when it is not discounted
    pub break_minutes: u32,
    pub discount_break: bool,
    pub worked_hours: f64,
    pub observations: String,
    pub subtasks: Vec<SubTask>,
}

impl Service {
    pub fn date_display(&self) -> String {
        self.date.format("%d/%m/%Y").to_string()
    }

    pub fn subtask_hours(&self) -> f64 {
        hours::round2(self.subtasks.iter().map(|s| s.hours).sum())
    }
}

/// Itemized portion of a service's hours
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubTask {
    pub id: i64,
    pub service_id: i64,
    pub description: String,
    pub hours: f64,
}

/// Sub-task data before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct SubTaskInput {
    pub description: String,
    pub hours: f64,
}

impl SubTaskInput {
    pub fn new(description: &str, hours: f64) -> Result<Self> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AppError::validation("task description cannot be empty"));
        }
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(AppError::validation(format!(
                "task description is longer than {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
        if !hours.is_finite() {
            return Err(AppError::validation(format!(
                "hours for task '{}' must be a finite number",
                description
            )));
        }
        if hours < 0.0 {
            return Err(AppError::validation(format!(
                "hours for task '{}' cannot be negative",
                description
            )));
        }
        Ok(Self {
            description: description.to_string(),
            hours,
        })
    }
}

/// A validated service ready to be inserted or used as an update.
/// Worked hours are computed once, here.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInput {
    pub place: String,
    pub date: NaiveDate,
    pub entry_time: NaiveTime,
    pub exit_time: NaiveTime,
    pub break_minutes: u32,
    pub discount_break: bool,
    pub worked_hours: f64,
    pub observations: String,
    pub subtasks: Vec<SubTaskInput>,
}

impl ServiceInput {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        place: &str,
        date: NaiveDate,
        entry_time: NaiveTime,
        exit_time: NaiveTime,
        break_minutes: u32,
        discount_break: bool,
        observations: &str,
        subtasks: Vec<SubTaskInput>,
    ) -> Result<Self> {
        let place = place.trim();
        if place.is_empty() {
            return Err(AppError::validation("place cannot be empty"));
        }
        if place.chars().count() > MAX_PLACE_LEN {
            return Err(AppError::validation(format!(
                "place is longer than {} characters",
                MAX_PLACE_LEN
            )));
        }
        if discount_break && i64::from(break_minutes) > hours::shift_minutes(entry_time, exit_time)
        {
            return Err(AppError::validation(
                "break is longer than the shift itself",
            ));
        }

        Ok(Self {
            place: place.to_string(),
            date,
            entry_time,
            exit_time,
            break_minutes,
            discount_break,
            worked_hours: hours::worked_hours(entry_time, exit_time, break_minutes, discount_break),
            observations: observations.trim().to_string(),
            subtasks,
        })
    }
}

/// Serialize clock times as `HH:MM`
mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        crate::hours::parse_clock(&s).map_err(serde::de::Error::custom)
    }
}
