//! Raw HTML form payloads and their validation into domain inputs.

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::hours::parse_clock;
use crate::types::{Service, ServiceInput, SubTaskInput};

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct MonthForm {
    #[serde(default)]
    pub selected_month: String,
}

/// Add/edit service form, as posted. Sub-task rows arrive as repeated fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceForm {
    #[serde(default)]
    pub place: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub entry_time: String,
    #[serde(default)]
    pub exit_time: String,
    #[serde(default)]
    pub break_duration: String,
    #[serde(default)]
    pub observations: String,
    /// Present (any value) when the break should not be subtracted
    #[serde(default)]
    pub no_discount_break: Option<String>,
    #[serde(default, rename = "subtask_description[]")]
    pub subtask_descriptions: Vec<String>,
    #[serde(default, rename = "subtask_hours[]")]
    pub subtask_hours: Vec<String>,
}

/// A validated form plus non-fatal problems to report back
#[derive(Debug)]
pub struct ParsedService {
    pub input: ServiceInput,
    pub warnings: Vec<String>,
}

impl ServiceForm {
    /// Blank form for a new service on `date`
    pub fn for_date(date: NaiveDate) -> Self {
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            break_duration: "0".to_string(),
            ..Default::default()
        }
    }

    /// Prefilled form for editing an existing service
    pub fn from_service(service: &Service) -> Self {
        Self {
            place: service.place.clone(),
            date: service.date.format("%Y-%m-%d").to_string(),
            entry_time: service.entry_time.format("%H:%M").to_string(),
            exit_time: service.exit_time.format("%H:%M").to_string(),
            break_duration: service.break_minutes.to_string(),
            observations: service.observations.clone(),
            no_discount_break: (!service.discount_break).then(|| "on".to_string()),
            subtask_descriptions: service
                .subtasks
                .iter()
                .map(|t| t.description.clone())
                .collect(),
            subtask_hours: service.subtasks.iter().map(|t| t.hours.to_string()).collect(),
        }
    }

    pub fn discount_break(&self) -> bool {
        self.no_discount_break.is_none()
    }

    /// Sub-task rows as (description, hours) pairs, as typed
    pub fn subtask_rows(&self) -> impl Iterator<Item = (&str, &str)> {
        self.subtask_descriptions
            .iter()
            .zip(&self.subtask_hours)
            .map(|(d, h)| (d.as_str(), h.as_str()))
    }

    /// Validate the form. Invalid service fields are an error; invalid
    /// sub-task rows are skipped and reported as warnings.
    pub fn parse(&self) -> Result<ParsedService> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d").map_err(|_| {
            AppError::validation(format!("'{}' is not a valid date (YYYY-MM-DD)", self.date))
        })?;
        let entry_time = parse_clock(&self.entry_time)?;
        let exit_time = parse_clock(&self.exit_time)?;

        let break_text = self.break_duration.trim();
        let break_minutes: u32 = if break_text.is_empty() {
            0
        } else {
            break_text.parse().map_err(|_| {
                AppError::validation(format!(
                    "break must be a whole number of minutes, got '{}'",
                    break_text
                ))
            })?
        };

        let mut warnings = Vec::new();
        let mut subtasks = Vec::new();
        for (description, hours) in self.subtask_rows() {
            if description.trim().is_empty() || hours.trim().is_empty() {
                continue;
            }
            let parsed = hours
                .trim()
                .replace(',', ".")
                .parse::<f64>()
                .map_err(|_| {
                    AppError::validation(format!(
                        "hours for task '{}' are not a valid number and it was not saved",
                        description.trim()
                    ))
                })
                .and_then(|h| SubTaskInput::new(description, h));
            match parsed {
                Ok(task) => subtasks.push(task),
                Err(AppError::Validation(msg)) => warnings.push(msg),
                Err(e) => return Err(e),
            }
        }

        let input = ServiceInput::new(
            &self.place,
            date,
            entry_time,
            exit_time,
            break_minutes,
            self.discount_break(),
            &self.observations,
            subtasks,
        )?;

        Ok(ParsedService { input, warnings })
    }
}
