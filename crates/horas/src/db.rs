//! Database operations module for SQLite storage
//!
//! This module handles all database operations including:
//! - Database initialization and migrations
//! - User accounts
//! - CRUD operations for services and their sub-tasks
//! - Month-scoped listings used by the list page and the reports

use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::month::YearMonth;
use crate::types::{Service, ServiceInput, SubTask, SubTaskInput, User};

/// Schema migrations, applied in order and recorded in `schema_migrations`
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial_schema",
    include_str!("../db/migrations/001_initial_schema.sql"),
)];

const SERVICE_COLUMNS: &str = "id, user_id, place, date, entry_time, exit_time, break_minutes, \
     discount_break, worked_hours, observations";

/// Open (or create) the database at the given path, running any pending migrations
pub fn open(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    prepare(&conn)?;
    debug!(path = %db_path.display(), "Database opened");
    Ok(conn)
}

/// Open a private in-memory database
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    prepare(&conn)?;
    Ok(conn)
}

fn prepare(conn: &Connection) -> Result<()> {
    // Sub-task cleanup relies on ON DELETE CASCADE
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let count = run_migrations(conn)?;
    if count > 0 {
        info!(count = count, "Applied migrations");
    }
    Ok(())
}

/// Run pending migrations, returning how many were applied
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
             version TEXT PRIMARY KEY,
             applied_at TEXT NOT NULL
         );",
    )?;

    let mut applied = 0;

    for &(version, sql) in MIGRATIONS {
        let already_applied: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM schema_migrations WHERE version = ?1",
            [version],
            |row| row.get(0),
        )?;

        if already_applied {
            continue;
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(sql)
            .map_err(|e| AppError::Migration(format!("{}: {}", version, e)))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            [version],
        )?;
        tx.commit()?;

        debug!(version = %version, "Applied migration");
        applied += 1;
    }

    Ok(applied)
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Create a user, returning its id. Usernames are unique.
pub fn create_user(conn: &Connection, username: &str, password_hash: &str) -> Result<i64> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::validation("username cannot be empty"));
    }
    if find_user_by_username(conn, username)?.is_some() {
        return Err(AppError::validation(format!(
            "user '{}' already exists",
            username
        )));
    }

    conn.execute(
        "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
        params![username, password_hash],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_user_by_username(conn: &Connection, username: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, username, password_hash, created_at FROM users WHERE username = ?1",
            [username],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn count_users(conn: &Connection) -> Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
    Ok(count as usize)
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

fn service_from_row(row: &Row) -> rusqlite::Result<Service> {
    Ok(Service {
        id: row.get(0)?,
        user_id: row.get(1)?,
        place: row.get(2)?,
        date: row.get(3)?,
        entry_time: row.get(4)?,
        exit_time: row.get(5)?,
        break_minutes: row.get(6)?,
        discount_break: row.get(7)?,
        worked_hours: row.get(8)?,
        observations: row.get(9)?,
        subtasks: Vec::new(),
    })
}

fn insert_subtasks(conn: &Connection, service_id: i64, subtasks: &[SubTaskInput]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO subtasks (service_id, description, hours, position) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (position, task) in subtasks.iter().enumerate() {
        stmt.execute(params![
            service_id,
            task.description,
            task.hours,
            position as i64
        ])?;
    }
    Ok(())
}

fn load_subtasks(conn: &Connection, service_id: i64) -> Result<Vec<SubTask>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, description, hours
         FROM subtasks
         WHERE service_id = ?1
         ORDER BY position ASC, id ASC",
    )?;

    let tasks = stmt
        .query_map([service_id], |row| {
            Ok(SubTask {
                id: row.get(0)?,
                service_id: row.get(1)?,
                description: row.get(2)?,
                hours: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(tasks)
}

/// Insert a service and its sub-tasks atomically, returning the new id
pub fn insert_service(conn: &Connection, user_id: i64, input: &ServiceInput) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO services (user_id, place, date, entry_time, exit_time, break_minutes,
                               discount_break, worked_hours, observations)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            user_id,
            input.place,
            input.date,
            input.entry_time,
            input.exit_time,
            input.break_minutes,
            input.discount_break,
            input.worked_hours,
            input.observations,
        ],
    )?;
    let id = tx.last_insert_rowid();

    insert_subtasks(&tx, id, &input.subtasks)?;
    tx.commit()?;

    debug!(id = id, user_id = user_id, subtasks = input.subtasks.len(), "Inserted service");
    Ok(id)
}

/// Replace a service's fields and its whole sub-task list.
/// Returns false when the service does not exist or belongs to someone else.
pub fn update_service(
    conn: &Connection,
    user_id: i64,
    id: i64,
    input: &ServiceInput,
) -> Result<bool> {
    let tx = conn.unchecked_transaction()?;

    let affected = tx.execute(
        "UPDATE services
         SET place = ?1, date = ?2, entry_time = ?3, exit_time = ?4, break_minutes = ?5,
             discount_break = ?6, worked_hours = ?7, observations = ?8,
             updated_at = datetime('now')
         WHERE id = ?9 AND user_id = ?10",
        params![
            input.place,
            input.date,
            input.entry_time,
            input.exit_time,
            input.break_minutes,
            input.discount_break,
            input.worked_hours,
            input.observations,
            id,
            user_id,
        ],
    )?;

    if affected == 0 {
        return Ok(false);
    }

    tx.execute("DELETE FROM subtasks WHERE service_id = ?1", [id])?;
    insert_subtasks(&tx, id, &input.subtasks)?;
    tx.commit()?;

    debug!(id = id, subtasks = input.subtasks.len(), "Updated service");
    Ok(true)
}

/// Delete a service (its sub-tasks cascade)
pub fn delete_service(conn: &Connection, user_id: i64, id: i64) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM services WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(affected > 0)
}

/// Get a single service owned by `user_id`, with its sub-tasks
pub fn get_service(conn: &Connection, user_id: i64, id: i64) -> Result<Option<Service>> {
    let sql = format!(
        "SELECT {} FROM services WHERE id = ?1 AND user_id = ?2",
        SERVICE_COLUMNS
    );
    let service = conn
        .query_row(&sql, params![id, user_id], service_from_row)
        .optional()?;

    match service {
        Some(mut service) => {
            service.subtasks = load_subtasks(conn, service.id)?;
            Ok(Some(service))
        }
        None => Ok(None),
    }
}

/// All services of a user within a month, sorted by date and entry time
pub fn list_services_for_month(
    conn: &Connection,
    user_id: i64,
    month: YearMonth,
) -> Result<Vec<Service>> {
    let sql = format!(
        "SELECT {} FROM services
         WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
         ORDER BY date ASC, entry_time ASC, id ASC",
        SERVICE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut services = stmt
        .query_map(
            params![user_id, month.first_day(), month.last_day()],
            service_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    // One query for every sub-task in the month
    let mut stmt = conn.prepare(
        "SELECT st.id, st.service_id, st.description, st.hours
         FROM subtasks st
         JOIN services s ON s.id = st.service_id
         WHERE s.user_id = ?1 AND s.date >= ?2 AND s.date <= ?3
         ORDER BY st.service_id ASC, st.position ASC, st.id ASC",
    )?;
    let mut by_service: HashMap<i64, Vec<SubTask>> = HashMap::new();
    let rows = stmt.query_map(
        params![user_id, month.first_day(), month.last_day()],
        |row| {
            Ok(SubTask {
                id: row.get(0)?,
                service_id: row.get(1)?,
                description: row.get(2)?,
                hours: row.get(3)?,
            })
        },
    )?;
    for task in rows {
        let task = task?;
        by_service.entry(task.service_id).or_default().push(task);
    }

    for service in &mut services {
        if let Some(tasks) = by_service.remove(&service.id) {
            service.subtasks = tasks;
        }
    }

    debug!(user_id = user_id, month = %month, count = services.len(), "Listed services");
    Ok(services)
}

/// Count all services of a user
pub fn count_services(conn: &Connection, user_id: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM services WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hours::parse_clock;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn setup_test_db() -> (Connection, i64) {
        let conn = open_in_memory().unwrap();
        let user_id = create_user(&conn, "ana", "hash").unwrap();
        (conn, user_id)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn month(s: &str) -> YearMonth {
        s.parse().unwrap()
    }

    fn make_input(place: &str, day: &str, tasks: &[(&str, f64)]) -> ServiceInput {
        ServiceInput::new(
            place,
            date(day),
            parse_clock("09:00").unwrap(),
            parse_clock("17:00").unwrap(),
            30,
            true,
            "",
            tasks
                .iter()
                .map(|(d, h)| SubTaskInput::new(d, *h).unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn subtask_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM subtasks", [], |row| row.get(0))
            .unwrap()
    }

    // ========== open tests ==========

    #[test]
    fn test_open_creates_tables() {
        let conn = open_in_memory().unwrap();

        for table in ["users", "services", "subtasks", "schema_migrations"] {
            let exists: bool = conn
                .query_row(
                    "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {}", table);
        }
    }

    #[test]
    fn test_open_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn1 = open(&db_path).unwrap();
        create_user(&conn1, "ana", "hash").unwrap();
        drop(conn1);

        let conn2 = open(&db_path).unwrap();
        assert_eq!(run_migrations(&conn2).unwrap(), 0);
        assert_eq!(count_users(&conn2).unwrap(), 1);
    }

    // ========== user tests ==========

    #[test]
    fn test_create_and_find_user() {
        let (conn, user_id) = setup_test_db();

        let user = find_user_by_username(&conn, "ana").unwrap().unwrap();
        assert_eq!(user.id, user_id);
        assert_eq!(user.password_hash, "hash");
        assert_eq!(user.username, "ana");
        assert!(find_user_by_username(&conn, "nobody").unwrap().is_none());
    }

    #[test]
    fn test_create_user_rejects_duplicates_and_empty() {
        let (conn, _) = setup_test_db();
        assert!(matches!(
            create_user(&conn, "ana", "other"),
            Err(AppError::Validation(_))
        ));
        assert!(create_user(&conn, "  ", "hash").is_err());
        assert_eq!(count_users(&conn).unwrap(), 1);
    }

    // ========== service CRUD tests ==========

    #[test]
    fn test_insert_and_get_service() {
        let (conn, user_id) = setup_test_db();
        let input = make_input("Warehouse", "2025-01-15", &[("Inventory", 2.0), ("Loading", 1.5)]);

        let id = insert_service(&conn, user_id, &input).unwrap();
        let service = get_service(&conn, user_id, id).unwrap().unwrap();

        assert_eq!(service.place, "Warehouse");
        assert_eq!(service.date, date("2025-01-15"));
        assert_eq!(service.entry_time, parse_clock("09:00").unwrap());
        assert_eq!(service.break_minutes, 30);
        assert!(service.discount_break);
        assert_eq!(service.worked_hours, 7.5);
        assert_eq!(service.subtasks.len(), 2);
        assert_eq!(service.subtasks[0].description, "Inventory");
        assert_eq!(service.subtasks[1].hours, 1.5);
    }

    #[test]
    fn test_get_service_of_other_user_is_none() {
        let (conn, user_id) = setup_test_db();
        let other = create_user(&conn, "luis", "hash").unwrap();
        let id = insert_service(&conn, user_id, &make_input("Office", "2025-01-15", &[])).unwrap();

        assert!(get_service(&conn, other, id).unwrap().is_none());
        assert!(get_service(&conn, user_id, 999).unwrap().is_none());
    }

    #[test]
    fn test_update_service_replaces_subtasks() {
        let (conn, user_id) = setup_test_db();
        let id = insert_service(
            &conn,
            user_id,
            &make_input("Office", "2025-01-15", &[("Old A", 1.0), ("Old B", 2.0)]),
        )
        .unwrap();

        let updated = update_service(
            &conn,
            user_id,
            id,
            &make_input("Depot", "2025-01-16", &[("New", 3.0)]),
        )
        .unwrap();
        assert!(updated);

        let service = get_service(&conn, user_id, id).unwrap().unwrap();
        assert_eq!(service.place, "Depot");
        assert_eq!(service.date, date("2025-01-16"));
        assert_eq!(service.subtasks.len(), 1);
        assert_eq!(service.subtasks[0].description, "New");
        assert_eq!(subtask_count(&conn), 1);
    }

    #[test]
    fn test_update_service_of_other_user_changes_nothing() {
        let (conn, user_id) = setup_test_db();
        let other = create_user(&conn, "luis", "hash").unwrap();
        let id = insert_service(
            &conn,
            user_id,
            &make_input("Office", "2025-01-15", &[("Task", 1.0)]),
        )
        .unwrap();

        let updated =
            update_service(&conn, other, id, &make_input("Stolen", "2025-01-15", &[])).unwrap();
        assert!(!updated);

        let service = get_service(&conn, user_id, id).unwrap().unwrap();
        assert_eq!(service.place, "Office");
        assert_eq!(service.subtasks.len(), 1);
    }

    #[test]
    fn test_delete_service_cascades_subtasks() {
        let (conn, user_id) = setup_test_db();
        let id = insert_service(
            &conn,
            user_id,
            &make_input("Office", "2025-01-15", &[("Task", 1.0)]),
        )
        .unwrap();

        assert!(delete_service(&conn, user_id, id).unwrap());
        assert!(get_service(&conn, user_id, id).unwrap().is_none());
        assert_eq!(subtask_count(&conn), 0);
        assert!(!delete_service(&conn, user_id, id).unwrap());
    }

    #[test]
    fn test_delete_service_of_other_user_is_refused() {
        let (conn, user_id) = setup_test_db();
        let other = create_user(&conn, "luis", "hash").unwrap();
        let id = insert_service(&conn, user_id, &make_input("Office", "2025-01-15", &[])).unwrap();

        assert!(!delete_service(&conn, other, id).unwrap());
        assert_eq!(count_services(&conn, user_id).unwrap(), 1);
    }

    #[test]
    fn test_failed_insert_rolls_back() {
        let (conn, user_id) = setup_test_db();
        let input = make_input("Office", "2025-01-15", &[("Task", 1.0)]);
        // Sub-task inserts fail after the service row is written
        conn.execute_batch(
            "CREATE TRIGGER reject_subtasks BEFORE INSERT ON subtasks
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        assert!(insert_service(&conn, user_id, &input).is_err());
        assert_eq!(count_services(&conn, user_id).unwrap(), 0);
    }

    // ========== month listing tests ==========

    #[test]
    fn test_list_services_for_month_filters_and_sorts() {
        let (conn, user_id) = setup_test_db();
        let other = create_user(&conn, "luis", "hash").unwrap();

        insert_service(&conn, user_id, &make_input("C", "2025-01-31", &[])).unwrap();
        insert_service(&conn, user_id, &make_input("A", "2025-01-01", &[("a", 1.0)])).unwrap();
        insert_service(&conn, user_id, &make_input("B", "2025-01-15", &[])).unwrap();
        insert_service(&conn, user_id, &make_input("Dec", "2024-12-31", &[])).unwrap();
        insert_service(&conn, user_id, &make_input("Feb", "2025-02-01", &[])).unwrap();
        insert_service(&conn, other, &make_input("Other", "2025-01-10", &[])).unwrap();

        let services = list_services_for_month(&conn, user_id, month("2025-01")).unwrap();
        let places: Vec<_> = services.iter().map(|s| s.place.as_str()).collect();
        assert_eq!(places, vec!["A", "B", "C"]);
        assert_eq!(services[0].subtasks.len(), 1);
        assert!(services[1].subtasks.is_empty());
    }

    #[test]
    fn test_list_services_same_day_sorted_by_entry_time() {
        let (conn, user_id) = setup_test_db();
        let mut late = make_input("Late", "2025-03-03", &[]);
        late.entry_time = parse_clock("14:00").unwrap();
        let early = make_input("Early", "2025-03-03", &[]);

        insert_service(&conn, user_id, &late).unwrap();
        insert_service(&conn, user_id, &early).unwrap();

        let services = list_services_for_month(&conn, user_id, month("2025-03")).unwrap();
        assert_eq!(services[0].place, "Early");
        assert_eq!(services[1].place, "Late");
    }

    #[test]
    fn test_list_services_empty_month() {
        let (conn, user_id) = setup_test_db();
        let services = list_services_for_month(&conn, user_id, month("2030-06")).unwrap();
        assert!(services.is_empty());
    }
}
