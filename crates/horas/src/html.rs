use axum::http::StatusCode;
use maud::{html, Markup, PreEscaped, DOCTYPE};

use crate::auth::Flash;
use crate::forms::ServiceForm;
use crate::report::MonthlyReport;

/// What a logged-in page needs besides its content
pub struct PageContext<'a> {
    pub username: &'a str,
    pub flashes: &'a [Flash],
}

fn layout(title: &str, ctx: Option<&PageContext>, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) " · Horas" }
                style { (PreEscaped(CSS)) }
            }
            body {
                nav.navbar {
                    a.brand href="/" { "Horas" }
                    @if let Some(ctx) = ctx {
                        span.user { (ctx.username) }
                        a href="/logout" { "Log out" }
                    }
                }
                div.container {
                    @if let Some(ctx) = ctx {
                        @for flash in ctx.flashes {
                            div class={ "flash flash-" (flash.level.as_str()) } { (flash.message) }
                        }
                    }
                    (content)
                }
            }
        }
    }
}

pub fn render_login(error: Option<&str>, notice: Option<&str>, username: &str) -> Markup {
    let content = html! {
        div.card.narrow {
            h1 { "Log in" }
            @if let Some(notice) = notice {
                div.flash.flash-info { (notice) }
            }
            @if let Some(error) = error {
                div.flash.flash-danger { (error) }
            }
            form method="post" action="/login" {
                label for="username" { "Username" }
                input #username type="text" name="username" value=(username) required autofocus;
                label for="password" { "Password" }
                input #password type="password" name="password" required;
                button.primary type="submit" { "Log in" }
            }
        }
    };
    layout("Log in", None, content)
}

pub fn render_index(ctx: &PageContext, report: &MonthlyReport) -> Markup {
    let month = report.month;
    let content = html! {
        div.month-bar {
            a.button href={ "/month/" (month.previous()) } { "‹ " (month.previous().label()) }
            form.inline method="post" action="/month" {
                input type="month" name="selected_month" value=(month.to_string()) required;
                button type="submit" { "Load month" }
            }
            a.button href={ "/month/" (month.next()) } { (month.next().label()) " ›" }
        }

        h1 { "Services · " (month.label()) }

        div.actions {
            a.button.primary href="/services/new" { "+ Add service" }
            a.button href="/report/preview" target="_blank" { "Preview PDF" }
            a.button href="/report.pdf" { "Download PDF" }
            a.button href="/report.csv" { "Download CSV" }
        }

        @if report.is_empty() {
            div.empty-state {
                p { "No services recorded for " (month.label()) "." }
            }
        } @else {
            table.services {
                thead {
                    tr {
                        th { "Date" }
                        th { "Place" }
                        th { "Entry" }
                        th { "Break" }
                        th { "Exit" }
                        th { "Hours" }
                        th { "Observations" }
                        th {}
                    }
                }
                tbody {
                    @for service in &report.services {
                        tr {
                            td { (service.date_display()) }
                            td { (service.place) }
                            td { (service.entry_time.format("%H:%M")) }
                            td {
                                (service.break_minutes) " min"
                                @if !service.discount_break {
                                    span.muted { " (not discounted)" }
                                }
                            }
                            td { (service.exit_time.format("%H:%M")) }
                            td.num { (format!("{:.2}", service.worked_hours)) }
                            td {
                                (service.observations)
                                @if !service.subtasks.is_empty() {
                                    ul.subtasks {
                                        @for task in &service.subtasks {
                                            li { (task.description) ": " (format!("{:.2}", task.hours)) " h" }
                                        }
                                    }
                                }
                            }
                            td.row-actions {
                                a href={ "/services/" (service.id) "/edit" } { "Edit" }
                                form.inline method="post" action={ "/services/" (service.id) "/delete" }
                                    onsubmit="return confirm('Delete this service?');" {
                                    button.link.danger type="submit" { "Delete" }
                                }
                            }
                        }
                    }
                }
            }
        }

        div.summary {
            div { span.label { "Total hours" } span.value #"total-hours" { (format!("{:.2}", report.total_hours)) } }
            div { span.label { "Days worked" } span.value { (report.days_worked) } }
            div { span.label { "Services" } span.value { (report.services.len()) } }
            @if report.has_subtasks() {
                div { span.label { "Task hours" } span.value { (format!("{:.2}", report.subtask_hours)) } }
            }
        }

        @if report.hours_by_place.len() > 1 {
            h2 { "Hours by place" }
            ul.by-place {
                @for (place, hours) in &report.hours_by_place {
                    li { (place) ": " (format!("{:.2}", hours)) " h" }
                }
            }
        }
    };
    layout(&month.label(), Some(ctx), content)
}

/// Add or edit form for a service
pub fn render_service_form(
    ctx: &PageContext,
    heading: &str,
    action: &str,
    form: &ServiceForm,
    error: Option<&str>,
) -> Markup {
    let content = html! {
        div.card {
            h1 { (heading) }
            @if let Some(error) = error {
                div.flash.flash-danger { (error) }
            }
            form method="post" action=(action) {
                label for="place" { "Place" }
                input #place type="text" name="place" maxlength="120" value=(form.place) required;

                label for="date" { "Date" }
                input #date type="date" name="date" value=(form.date) required;

                div.row {
                    div {
                        label for="entry_time" { "Entry time" }
                        input #entry_time type="time" name="entry_time" value=(form.entry_time) required;
                    }
                    div {
                        label for="break_duration" { "Break (minutes)" }
                        input #break_duration type="number" min="0" step="1" name="break_duration" value=(form.break_duration);
                    }
                    div {
                        label for="exit_time" { "Exit time" }
                        input #exit_time type="time" name="exit_time" value=(form.exit_time) required;
                    }
                }

                label.checkbox {
                    input type="checkbox" name="no_discount_break" checked[!form.discount_break()];
                    " Do not discount the break from worked hours"
                }

                label for="observations" { "Observations" }
                textarea #observations name="observations" rows="3" { (form.observations) }

                h2 { "Tasks" }
                p.muted { "Optional breakdown of the hours of this service." }
                div #subtasks {
                    @for (description, hours) in form.subtask_rows() {
                        (subtask_row(description, hours))
                    }
                }
                template #"subtask-template" { (subtask_row("", "")) }
                button type="button" onclick="addSubtask()" { "+ Add task" }

                div.actions {
                    button.primary type="submit" { "Save" }
                    a.button href="/" { "Cancel" }
                }
            }
        }
        script { (PreEscaped(JAVASCRIPT)) }
    };
    layout(heading, Some(ctx), content)
}

fn subtask_row(description: &str, hours: &str) -> Markup {
    html! {
        div.subtask-row {
            input type="text" name="subtask_description[]" maxlength="255" placeholder="Description" value=(description);
            input type="text" inputmode="decimal" name="subtask_hours[]" placeholder="Hours" value=(hours);
            button.link.danger type="button" onclick="this.parentElement.remove()" { "Remove" }
        }
    }
}

pub fn render_error(status: StatusCode, message: &str) -> Markup {
    let content = html! {
        div.card.narrow {
            h1 { (status.as_u16()) " " (status.canonical_reason().unwrap_or("Error")) }
            p { (message) }
            a.button href="/" { "Back to services" }
        }
    };
    layout("Error", None, content)
}

const CSS: &str = r#"
* { box-sizing: border-box; }

body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif;
    margin: 0;
    background: #f4f6f8;
    color: #323232;
}

.navbar {
    display: flex;
    gap: 16px;
    align-items: center;
    padding: 12px 24px;
    background: #34495e;
    color: #fff;
}

.navbar a { color: #fff; text-decoration: none; }
.navbar .brand { font-weight: 700; font-size: 1.2em; margin-right: auto; }

.container { max-width: 1100px; margin: 0 auto; padding: 24px; }

.card {
    background: #fff;
    border-radius: 6px;
    padding: 24px;
    box-shadow: 0 1px 3px rgba(0,0,0,0.1);
}

.card.narrow { max-width: 420px; margin: 40px auto; }

label { display: block; margin: 12px 0 4px; font-weight: 600; }
label.checkbox { font-weight: normal; }

input[type=text], input[type=password], input[type=date], input[type=time],
input[type=number], input[type=month], textarea {
    width: 100%;
    padding: 8px;
    border: 1px solid #ccc;
    border-radius: 4px;
    font: inherit;
}

.row { display: flex; gap: 12px; }
.row > div { flex: 1; }

button, .button {
    display: inline-block;
    padding: 8px 14px;
    border: 1px solid #ccc;
    border-radius: 4px;
    background: #fff;
    color: #323232;
    font: inherit;
    text-decoration: none;
    cursor: pointer;
}

.primary { background: #3498db; border-color: #3498db; color: #fff; }
.link { border: none; background: none; padding: 0; color: #3498db; }
.danger { color: #c0392b; }
.muted { color: #888; }
.inline { display: inline; }

.actions { display: flex; gap: 8px; margin: 16px 0; flex-wrap: wrap; }
.month-bar { display: flex; gap: 8px; align-items: center; justify-content: space-between; }
.month-bar input { width: auto; }

.flash { padding: 10px 14px; border-radius: 4px; margin-bottom: 12px; }
.flash-success { background: #e8f6ee; color: #1e7e45; }
.flash-info { background: #e8f2fb; color: #1f5f8b; }
.flash-warning { background: #fdf5e6; color: #8a5a00; }
.flash-danger { background: #fbeaea; color: #a12a2a; }

table.services { width: 100%; border-collapse: collapse; background: #fff; }
table.services th { background: #34495e; color: #fff; padding: 8px; text-align: left; }
table.services td { padding: 8px; border-bottom: 1px solid #eee; vertical-align: top; }
table.services tbody tr:nth-child(even) { background: #f0f0f0; }
td.num { text-align: right; font-variant-numeric: tabular-nums; }
td.row-actions { white-space: nowrap; }
td.row-actions a { margin-right: 8px; }
ul.subtasks { margin: 6px 0 0; padding-left: 18px; color: #555; font-size: 0.9em; }

.summary { display: flex; gap: 24px; margin: 24px 0; }
.summary .label { display: block; color: #888; font-size: 0.8em; text-transform: uppercase; }
.summary .value { font-size: 1.6em; font-weight: 700; color: #3498db; }

.subtask-row { display: flex; gap: 8px; margin-bottom: 8px; align-items: center; }
.subtask-row input[name="subtask_hours[]"] { width: 100px; }

.empty-state { padding: 40px; text-align: center; color: #888; }
"#;

const JAVASCRIPT: &str = r#"
function addSubtask() {
    const template = document.getElementById('subtask-template');
    const row = template.content.firstElementChild.cloneNode(true);
    document.getElementById('subtasks').appendChild(row);
    row.querySelector('input').focus();
}
"#;
