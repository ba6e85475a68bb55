//! Monthly aggregation shared by the list page, the JSON API and the exports.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::hours::round2;
use crate::month::YearMonth;
use crate::types::Service;

pub mod csv_report;
pub mod pdf;

/// Output format of a downloadable report
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Pdf,
    Csv,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Csv => "csv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "application/pdf",
            ReportFormat::Csv => "text/csv; charset=utf-8",
        }
    }
}

/// A user's services for one month, with totals
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyReport {
    pub owner: String,
    pub month: YearMonth,
    pub services: Vec<Service>,
    pub total_hours: f64,
    pub subtask_hours: f64,
    pub days_worked: usize,
    pub hours_by_place: BTreeMap<String, f64>,
}

impl MonthlyReport {
    pub fn new(owner: &str, month: YearMonth, services: Vec<Service>) -> Self {
        let total_hours = round2(services.iter().map(|s| s.worked_hours).sum());
        let subtask_hours = round2(
            services
                .iter()
                .flat_map(|s| &s.subtasks)
                .map(|t| t.hours)
                .sum(),
        );
        let days_worked = services
            .iter()
            .map(|s| s.date)
            .collect::<BTreeSet<_>>()
            .len();

        let mut hours_by_place: BTreeMap<String, f64> = BTreeMap::new();
        for service in &services {
            *hours_by_place.entry(service.place.clone()).or_default() += service.worked_hours;
        }
        for hours in hours_by_place.values_mut() {
            *hours = round2(*hours);
        }

        Self {
            owner: owner.to_string(),
            month,
            services,
            total_hours,
            subtask_hours,
            days_worked,
            hours_by_place,
        }
    }

    pub fn has_subtasks(&self) -> bool {
        self.services.iter().any(|s| !s.subtasks.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Render the report in the requested format
    pub fn render(&self, format: ReportFormat) -> crate::error::Result<Vec<u8>> {
        match format {
            ReportFormat::Pdf => pdf::render(self),
            ReportFormat::Csv => csv_report::render(self),
        }
    }

    /// Download name, e.g. `worked_hours_ana_2025-01.pdf`
    pub fn file_name(&self, format: ReportFormat) -> String {
        let owner: String = self
            .owner
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "worked_hours_{}_{}.{}",
            owner,
            self.month,
            format.extension()
        )
    }
}
