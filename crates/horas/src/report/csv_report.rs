use crate::error::{AppError, Result};

use super::MonthlyReport;

const HEADERS: [&str; 8] = [
    "Date",
    "Place",
    "Entry",
    "Break (min)",
    "Exit",
    "Hours",
    "Observations",
    "Tasks",
];

/// Render the month as CSV: one row per service plus a closing total row
pub fn render(report: &MonthlyReport) -> Result<Vec<u8>> {
    let mut writer = ::csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADERS).map_err(csv_error)?;

    for service in &report.services {
        let tasks = service
            .subtasks
            .iter()
            .map(|t| format!("{} ({:.2} h)", t.description, t.hours))
            .collect::<Vec<_>>()
            .join("; ");

        writer
            .write_record([
                service.date_display(),
                service.place.clone(),
                service.entry_time.format("%H:%M").to_string(),
                service.break_minutes.to_string(),
                service.exit_time.format("%H:%M").to_string(),
                format!("{:.2}", service.worked_hours),
                service.observations.clone(),
                tasks,
            ])
            .map_err(csv_error)?;
    }

    let total = format!("{:.2}", report.total_hours);
    writer
        .write_record(["Total", "", "", "", "", total.as_str(), "", ""])
        .map_err(csv_error)?;

    writer
        .into_inner()
        .map_err(|e| AppError::report(format!("csv: {}", e)))
}

fn csv_error(e: ::csv::Error) -> AppError {
    AppError::report(format!("csv: {}", e))
}
