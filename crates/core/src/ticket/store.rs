//! Ticket table access. Functions take a connection so services can compose
//! them inside transactions.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{NewTicket, OpenTicket, Ticket, UpdateTicketRequest};
use crate::db::{now_rfc3339, parse_deadline, parse_timestamp};
use crate::error::{Error, Result};
use crate::files::FileMetadata;
use crate::workflow::types::OPEN_WORK_STATUSES;

const TICKET_COLUMNS: &str = "id, requestor, department_target_id, physical_location_id, \
                              specified_location_id, description, ticket_priority, version, \
                              deadline, support_file, created_at, updated_at";

pub fn insert_ticket(conn: &Connection, ticket: NewTicket) -> Result<Ticket> {
    let now = now_rfc3339();
    let support_files_json = serde_json::to_string(&ticket.support_files)?;
    conn.execute(
        r#"
        INSERT INTO ticket (requestor, department_target_id, physical_location_id,
                            specified_location_id, description, ticket_priority, version,
                            deadline, support_file, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?)"#,
        params![
            ticket.requestor,
            ticket.department_target_id,
            ticket.physical_location_id,
            ticket.specified_location_id,
            ticket.description,
            ticket.ticket_priority,
            ticket.deadline.map(|d| d.to_string()),
            support_files_json,
            now,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    find_ticket(conn, id)?.ok_or_else(|| Error::Database("ticket vanished after insert".into()))
}

pub fn find_ticket(conn: &Connection, id: i64) -> Result<Option<Ticket>> {
    let ticket = conn
        .query_row(
            &format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE id = ?"),
            params![id],
            row_to_ticket,
        )
        .optional()?;
    Ok(ticket)
}

/// Next ticket priority in a target department: `max + 1`, or 1 when the
/// department has no tickets yet.
pub fn last_priority(conn: &Connection, department_target_id: i64) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(ticket_priority) FROM ticket WHERE department_target_id = ?",
        params![department_target_id],
        |row| row.get(0),
    )?;
    Ok(max.map_or(1, |m| m + 1))
}

/// Optimistic full update. Returns the number of rows written; zero means a
/// version conflict.
pub fn update_ticket(
    conn: &Connection,
    id: i64,
    req: &UpdateTicketRequest,
    specified_location_id: Option<i64>,
) -> Result<usize> {
    let deadline = parse_deadline(req.deadline.as_deref())?;
    let updated = conn.execute(
        r#"
        UPDATE ticket
        SET department_target_id = ?,
            description = ?,
            physical_location_id = ?,
            specified_location_id = ?,
            deadline = ?,
            version = version + 1,
            updated_at = ?
        WHERE id = ? AND version = ?"#,
        params![
            req.department_target_id,
            req.description,
            req.physical_location_id,
            specified_location_id,
            deadline.map(|d| d.to_string()),
            now_rfc3339(),
            id,
            req.version,
        ],
    )?;
    Ok(updated)
}

/// CAS priority write used by manual reorder.
pub fn update_priority(conn: &Connection, id: i64, version: i64, new_priority: i64) -> Result<usize> {
    let updated = conn.execute(
        r#"
        UPDATE ticket
        SET ticket_priority = ?, version = version + 1, updated_at = ?
        WHERE id = ? AND version = ?"#,
        params![new_priority, now_rfc3339(), id, version],
    )?;
    Ok(updated)
}

/// Blind priority write used by the scheduled recalculation, which is the
/// last writer by design.
pub fn force_update_priority(conn: &Connection, id: i64, new_priority: i64) -> Result<()> {
    conn.execute(
        r#"
        UPDATE ticket
        SET ticket_priority = ?, version = version + 1, updated_at = ?
        WHERE id = ?"#,
        params![new_priority, now_rfc3339(), id],
    )?;
    Ok(())
}

pub fn add_support_files(conn: &Connection, id: i64, files: &[FileMetadata]) -> Result<()> {
    let mut existing = support_files(conn, id)?;
    existing.extend(files.iter().cloned());
    write_support_files(conn, id, &existing)
}

/// Remove support-file metadata by path. The caller removes the underlying
/// files after the database write succeeds.
pub fn remove_support_files(conn: &Connection, id: i64, paths: &[String]) -> Result<()> {
    let existing = support_files(conn, id)?;
    let remaining: Vec<FileMetadata> = existing
        .into_iter()
        .filter(|f| !paths.contains(&f.file_path))
        .collect();
    write_support_files(conn, id, &remaining)
}

fn support_files(conn: &Connection, id: i64) -> Result<Vec<FileMetadata>> {
    let json: Option<String> = conn
        .query_row("SELECT support_file FROM ticket WHERE id = ?", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    let Some(json) = json else {
        return Err(Error::not_found("ticket not found"));
    };
    Ok(serde_json::from_str(&json).unwrap_or_default())
}

fn write_support_files(conn: &Connection, id: i64, files: &[FileMetadata]) -> Result<()> {
    let json = serde_json::to_string(files)?;
    conn.execute(
        "UPDATE ticket SET support_file = ?, updated_at = ? WHERE id = ?",
        params![json, now_rfc3339(), id],
    )?;
    Ok(())
}

/// How many of the given tickets target the given department.
pub fn count_tickets_in_department(
    conn: &Connection,
    ticket_ids: &[i64],
    department_target_id: i64,
) -> Result<i64> {
    if ticket_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; ticket_ids.len()].join(",");
    let sql = format!(
        "SELECT COUNT(id) FROM ticket WHERE id IN ({placeholders}) AND department_target_id = ?"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut args: Vec<&dyn rusqlite::ToSql> =
        ticket_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    args.push(&department_target_id);
    Ok(stmt.query_row(args.as_slice(), |row| row.get(0))?)
}

/// Open tickets of a department for the scheduled rescore: current status is
/// one of the work statuses.
pub fn open_tickets_for_scheduling(
    conn: &Connection,
    department_target_id: i64,
) -> Result<Vec<OpenTicket>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT t.id, t.created_at, t.ticket_priority, t.deadline
        FROM ticket t
        WHERE t.department_target_id = ?1
        AND EXISTS (
            SELECT 1 FROM track_status_ticket tst
            JOIN status_ticket st ON tst.status_ticket_id = st.id
            WHERE tst.ticket_id = t.id
              AND tst.finish_date IS NULL
              AND st.name IN (?2, ?3)
        )"#,
    )?;
    let tickets = stmt
        .query_map(
            params![department_target_id, OPEN_WORK_STATUSES[0], OPEN_WORK_STATUSES[1]],
            |row| {
                Ok(OpenTicket {
                    id: row.get(0)?,
                    created_at: parse_timestamp(&row.get::<_, String>(1)?),
                    ticket_priority: row.get(2)?,
                    deadline: row
                        .get::<_, Option<String>>(3)?
                        .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(tickets)
}

fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
    let deadline: Option<String> = row.get(8)?;
    let support_files_json: String = row.get(9)?;
    Ok(Ticket {
        id: row.get(0)?,
        requestor: row.get(1)?,
        department_target_id: row.get(2)?,
        physical_location_id: row.get(3)?,
        specified_location_id: row.get(4)?,
        description: row.get(5)?,
        ticket_priority: row.get(6)?,
        version: row.get(7)?,
        deadline: deadline.and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        support_files: serde_json::from_str(&support_files_json).unwrap_or_default(),
        created_at: parse_timestamp(&row.get::<_, String>(10)?),
        updated_at: parse_timestamp(&row.get::<_, String>(11)?),
    })
}
