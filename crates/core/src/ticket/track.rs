//! Append-only status ledger.
//!
//! Exactly one row per ticket is open (`finish_date IS NULL`) at any instant.
//! That invariant rests on close-then-insert running inside one transaction;
//! the two statements must never be reordered.

use rusqlite::{params, Connection, OptionalExtension};

use super::types::TrackStatusRow;
use crate::db::{now_rfc3339, parse_timestamp};
use crate::error::{Error, Result};

/// Open the first ledger row for a freshly created ticket.
pub fn create_initial_status(conn: &Connection, ticket_id: i64, status_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO track_status_ticket (ticket_id, status_ticket_id, start_date) VALUES (?, ?, ?)",
        params![ticket_id, status_id, now_rfc3339()],
    )?;
    Ok(())
}

/// Close the ticket's open row and open a new one for the destination status.
pub fn change_status(conn: &Connection, ticket_id: i64, new_status_id: i64) -> Result<()> {
    let now = now_rfc3339();
    conn.execute(
        "UPDATE track_status_ticket SET finish_date = ? WHERE ticket_id = ? AND finish_date IS NULL",
        params![now, ticket_id],
    )?;
    conn.execute(
        "INSERT INTO track_status_ticket (ticket_id, status_ticket_id, start_date) VALUES (?, ?, ?)",
        params![ticket_id, new_status_id, now],
    )?;
    Ok(())
}

/// Current status of a ticket: the open ledger row.
pub fn current_status(conn: &Connection, ticket_id: i64) -> Result<Option<(i64, String)>> {
    let row = conn
        .query_row(
            r#"
            SELECT st.id, st.name
            FROM track_status_ticket tst
            JOIN status_ticket st ON tst.status_ticket_id = st.id
            WHERE tst.ticket_id = ? AND tst.finish_date IS NULL
            LIMIT 1"#,
            params![ticket_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(row)
}

/// Migrate every ticket whose open row points into the given section onto the
/// fallback status. The ledger stays append-only: open rows are closed and
/// new ones inserted, never deleted.
pub fn migrate_open_rows_to_fallback(
    conn: &Connection,
    section_id: i64,
    fallback_status_id: i64,
) -> Result<usize> {
    let mut stmt = conn.prepare(
        r#"
        SELECT tst.ticket_id
        FROM track_status_ticket tst
        WHERE tst.finish_date IS NULL
          AND tst.status_ticket_id IN (SELECT id FROM status_ticket WHERE section_id = ?)"#,
    )?;
    let ticket_ids = stmt
        .query_map(params![section_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;

    if ticket_ids.is_empty() {
        return Ok(0);
    }

    let now = now_rfc3339();
    conn.execute(
        r#"
        UPDATE track_status_ticket SET finish_date = ?
        WHERE finish_date IS NULL
          AND status_ticket_id IN (SELECT id FROM status_ticket WHERE section_id = ?)"#,
        params![now, section_id],
    )?;

    let mut insert = conn.prepare(
        "INSERT INTO track_status_ticket (ticket_id, status_ticket_id, start_date) VALUES (?, ?, ?)",
    )?;
    for ticket_id in &ticket_ids {
        insert.execute(params![ticket_id, fallback_status_id, now])?;
    }

    Ok(ticket_ids.len())
}

/// Full ledger of one ticket, oldest first.
pub fn history(conn: &Connection, ticket_id: i64) -> Result<Vec<TrackStatusRow>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, ticket_id, status_ticket_id, start_date, finish_date
        FROM track_status_ticket
        WHERE ticket_id = ?
        ORDER BY id ASC"#,
    )?;
    let rows = stmt
        .query_map(params![ticket_id], |row| {
            Ok(TrackStatusRow {
                id: row.get(0)?,
                ticket_id: row.get(1)?,
                status_ticket_id: row.get(2)?,
                start_date: parse_timestamp(&row.get::<_, String>(3)?),
                finish_date: row
                    .get::<_, Option<String>>(4)?
                    .map(|s| parse_timestamp(&s)),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Count of open ledger rows for a ticket. Used by invariant checks.
pub fn open_row_count(conn: &Connection, ticket_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM track_status_ticket WHERE ticket_id = ? AND finish_date IS NULL",
        params![ticket_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::directory::store::{insert_department, insert_employee, insert_position};
    use crate::ticket::store::insert_ticket;
    use crate::ticket::types::NewTicket;
    use crate::workflow::store::{insert_section, insert_status};

    struct Fixture {
        db: Database,
        ticket_id: i64,
        status_a: i64,
        status_b: i64,
        section_id: i64,
    }

    fn fixture() -> Fixture {
        let db = Database::in_memory().unwrap();
        let (ticket_id, status_a, status_b, section_id) = {
            let conn = db.conn();
            let dept = insert_department(&conn, "GA", true, true).unwrap();
            let pos = insert_position(&conn, "Staff").unwrap();
            insert_employee(&conn, "E1", "Asep", dept, None, pos).unwrap();
            let section = insert_section(&conn, "Work", 1).unwrap();
            let a = insert_status(&conn, "A", 0, section.id, None).unwrap();
            let b = insert_status(&conn, "B", 1, section.id, None).unwrap();
            let ticket = insert_ticket(
                &conn,
                NewTicket {
                    requestor: "E1".to_string(),
                    department_target_id: dept,
                    physical_location_id: None,
                    specified_location_id: None,
                    description: "d".to_string(),
                    ticket_priority: 1,
                    deadline: None,
                    support_files: Vec::new(),
                },
            )
            .unwrap();
            (ticket.id, a.id, b.id, section.id)
        };
        Fixture {
            db,
            ticket_id,
            status_a,
            status_b,
            section_id,
        }
    }

    #[test]
    fn test_single_open_row_through_changes() {
        let f = fixture();
        let conn = f.db.conn();
        create_initial_status(&conn, f.ticket_id, f.status_a).unwrap();
        assert_eq!(open_row_count(&conn, f.ticket_id).unwrap(), 1);

        change_status(&conn, f.ticket_id, f.status_b).unwrap();
        assert_eq!(open_row_count(&conn, f.ticket_id).unwrap(), 1);
        assert_eq!(
            current_status(&conn, f.ticket_id).unwrap().unwrap().0,
            f.status_b
        );

        change_status(&conn, f.ticket_id, f.status_a).unwrap();
        assert_eq!(open_row_count(&conn, f.ticket_id).unwrap(), 1);

        let ledger = history(&conn, f.ticket_id).unwrap();
        assert_eq!(ledger.len(), 3);
        assert!(ledger[0].finish_date.is_some());
        assert!(ledger[1].finish_date.is_some());
        assert!(ledger[2].finish_date.is_none());
    }

    #[test]
    fn test_current_status_none_without_rows() {
        let f = fixture();
        let conn = f.db.conn();
        assert!(current_status(&conn, f.ticket_id).unwrap().is_none());
    }

    #[test]
    fn test_fallback_migration_keeps_ledger_append_only() {
        let f = fixture();
        let conn = f.db.conn();
        create_initial_status(&conn, f.ticket_id, f.status_a).unwrap();

        // A fallback status outside the migrating section.
        let other_section = insert_section(&conn, "Earlier", 0).unwrap();
        let fallback = insert_status(&conn, "Fallback", -1, other_section.id, None).unwrap();

        let moved =
            migrate_open_rows_to_fallback(&conn, f.section_id, fallback.id).unwrap();
        assert_eq!(moved, 1);

        assert_eq!(
            current_status(&conn, f.ticket_id).unwrap().unwrap().0,
            fallback.id
        );
        assert_eq!(open_row_count(&conn, f.ticket_id).unwrap(), 1);
        // Old row closed, not deleted.
        assert_eq!(history(&conn, f.ticket_id).unwrap().len(), 2);
    }

    #[test]
    fn test_fallback_migration_without_open_rows_is_noop() {
        let f = fixture();
        let conn = f.db.conn();
        let moved = migrate_open_rows_to_fallback(&conn, f.section_id, f.status_b).unwrap();
        assert_eq!(moved, 0);
    }
}
