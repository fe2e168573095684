//! SQLite database handle and schema bootstrap.
//!
//! A single connection guarded by a mutex is shared by every store; services
//! that need multi-table atomicity open an explicit transaction on the
//! guarded connection. Timestamps are stored as RFC3339 text, deadlines as
//! `YYYY-MM-DD` text.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;

use crate::error::{Error, Result};

/// Shared database handle. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file and initialize the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Lock the connection. Callers needing atomicity across several stores
    /// open a `Transaction` on the guard and pass it down.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }
}

/// Current instant as stored in the database.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Parse an RFC3339 timestamp column.
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse an optional `YYYY-MM-DD` deadline.
pub fn parse_deadline(deadline: Option<&str>) -> Result<Option<NaiveDate>> {
    match deadline {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| Error::bad_request("invalid deadline format, please use YYYY-MM-DD")),
    }
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS department (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            receive_job INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS area (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS physical_location (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS specified_location (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            physical_location_id INTEGER NOT NULL REFERENCES physical_location(id),
            UNIQUE (name, physical_location_id)
        );

        CREATE TABLE IF NOT EXISTS employee_position (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS employee (
            npk TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            department_id INTEGER NOT NULL REFERENCES department(id),
            area_id INTEGER REFERENCES area(id),
            position_id INTEGER NOT NULL REFERENCES employee_position(id)
        );

        CREATE TABLE IF NOT EXISTS app_user (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            user_type TEXT NOT NULL DEFAULT 'regular',
            employee_npk TEXT REFERENCES employee(npk),
            employee_position_id INTEGER NOT NULL REFERENCES employee_position(id)
        );

        CREATE TABLE IF NOT EXISTS position_permission (
            employee_position_id INTEGER NOT NULL REFERENCES employee_position(id),
            name TEXT NOT NULL,
            PRIMARY KEY (employee_position_id, name)
        );

        CREATE TABLE IF NOT EXISTS section_status_ticket (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            sequence INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS status_ticket (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            sequence INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            section_id INTEGER NOT NULL REFERENCES section_status_ticket(id),
            hex_color TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workflow (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS workflow_step (
            workflow_id INTEGER NOT NULL REFERENCES workflow(id) ON DELETE CASCADE,
            status_ticket_id INTEGER NOT NULL REFERENCES status_ticket(id),
            step_sequence INTEGER NOT NULL,
            PRIMARY KEY (workflow_id, step_sequence)
        );

        CREATE TABLE IF NOT EXISTS position_to_workflow_mapping (
            employee_position_id INTEGER PRIMARY KEY REFERENCES employee_position(id),
            workflow_id INTEGER NOT NULL REFERENCES workflow(id)
        );

        CREATE TABLE IF NOT EXISTS action (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            hex_code TEXT,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE TABLE IF NOT EXISTS actor_role (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS actor_role_mapping (
            employee_position_id INTEGER NOT NULL REFERENCES employee_position(id),
            context TEXT NOT NULL,
            actor_role_id INTEGER NOT NULL REFERENCES actor_role(id),
            PRIMARY KEY (employee_position_id, context, actor_role_id)
        );

        CREATE TABLE IF NOT EXISTS status_transition (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            from_status_id INTEGER NOT NULL REFERENCES status_ticket(id),
            to_status_id INTEGER NOT NULL REFERENCES status_ticket(id),
            action_id INTEGER NOT NULL REFERENCES action(id),
            actor_role_id INTEGER NOT NULL REFERENCES actor_role(id),
            require_reason INTEGER NOT NULL DEFAULT 0,
            reason_label TEXT,
            require_file INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        CREATE INDEX IF NOT EXISTS idx_status_transition_from
            ON status_transition(from_status_id);

        CREATE TABLE IF NOT EXISTS ticket (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            requestor TEXT NOT NULL REFERENCES employee(npk),
            department_target_id INTEGER NOT NULL REFERENCES department(id),
            physical_location_id INTEGER REFERENCES physical_location(id),
            specified_location_id INTEGER REFERENCES specified_location(id),
            description TEXT NOT NULL,
            ticket_priority INTEGER NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            deadline TEXT,
            support_file TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ticket_department
            ON ticket(department_target_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS ticket_fts USING fts5(
            description,
            content='ticket',
            content_rowid='id'
        );

        CREATE TRIGGER IF NOT EXISTS ticket_fts_insert AFTER INSERT ON ticket BEGIN
            INSERT INTO ticket_fts(rowid, description) VALUES (new.id, new.description);
        END;

        CREATE TRIGGER IF NOT EXISTS ticket_fts_delete AFTER DELETE ON ticket BEGIN
            INSERT INTO ticket_fts(ticket_fts, rowid, description)
            VALUES ('delete', old.id, old.description);
        END;

        CREATE TRIGGER IF NOT EXISTS ticket_fts_update AFTER UPDATE OF description ON ticket BEGIN
            INSERT INTO ticket_fts(ticket_fts, rowid, description)
            VALUES ('delete', old.id, old.description);
            INSERT INTO ticket_fts(rowid, description) VALUES (new.id, new.description);
        END;

        CREATE TABLE IF NOT EXISTS job (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id INTEGER NOT NULL UNIQUE REFERENCES ticket(id),
            pic_job TEXT REFERENCES employee(npk),
            job_priority INTEGER NOT NULL,
            report_file TEXT NOT NULL DEFAULT '[]',
            spending_amount INTEGER,
            version INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS track_status_ticket (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id INTEGER NOT NULL REFERENCES ticket(id),
            status_ticket_id INTEGER NOT NULL REFERENCES status_ticket(id),
            start_date TEXT NOT NULL,
            finish_date TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_track_status_open
            ON track_status_ticket(ticket_id) WHERE finish_date IS NULL;

        CREATE TABLE IF NOT EXISTS ticket_action_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id INTEGER NOT NULL REFERENCES ticket(id),
            action_id INTEGER NOT NULL REFERENCES action(id),
            performed_by_npk TEXT NOT NULL,
            details_text TEXT,
            file_paths TEXT NOT NULL DEFAULT '[]',
            from_status_id INTEGER,
            to_status_id INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_ticket_action_log_ticket
            ON ticket_action_log(ticket_id);

        CREATE TABLE IF NOT EXISTS rejected_ticket (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ticket_id INTEGER NOT NULL REFERENCES ticket(id),
            rejected_by_npk TEXT NOT NULL,
            feedback TEXT NOT NULL,
            already_seen INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        -- Token expiries are unix timestamps so range scans stay index-friendly.
        CREATE TABLE IF NOT EXISTS active_refresh_tokens (
            token_id TEXT PRIMARY KEY,
            user_id INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS token_blacklist (
            token_id TEXT PRIMARY KEY,
            expires_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS websocket_tickets (
            ticket TEXT PRIMARY KEY,
            user_id INTEGER,
            expires_at INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_websocket_tickets_expires_at
            ON websocket_tickets(expires_at);

        CREATE INDEX IF NOT EXISTS idx_websocket_tickets_user_id
            ON websocket_tickets(user_id);

        CREATE TABLE IF NOT EXISTS system_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    Ok(())
}
