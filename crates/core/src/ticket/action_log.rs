//! Append-only audit log of executed workflow actions.

use rusqlite::{params, Connection};

use super::types::ActionLogEntry;
use crate::db::{now_rfc3339, parse_timestamp};
use crate::error::Result;

/// Input for one log entry.
#[derive(Debug, Clone)]
pub struct NewActionLogEntry {
    pub ticket_id: i64,
    pub action_id: i64,
    pub performed_by_npk: String,
    pub details_text: Option<String>,
    pub file_paths: Vec<String>,
    pub from_status_id: Option<i64>,
    pub to_status_id: i64,
}

pub fn insert(conn: &Connection, entry: &NewActionLogEntry) -> Result<i64> {
    let file_paths_json = serde_json::to_string(&entry.file_paths)?;
    conn.execute(
        r#"
        INSERT INTO ticket_action_log
            (ticket_id, action_id, performed_by_npk, details_text, file_paths,
             from_status_id, to_status_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        params![
            entry.ticket_id,
            entry.action_id,
            entry.performed_by_npk,
            entry.details_text,
            file_paths_json,
            entry.from_status_id,
            entry.to_status_id,
            now_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Log entries for one ticket in commit order.
pub fn list_by_ticket(conn: &Connection, ticket_id: i64) -> Result<Vec<ActionLogEntry>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, ticket_id, action_id, performed_by_npk, details_text, file_paths,
               from_status_id, to_status_id, created_at
        FROM ticket_action_log
        WHERE ticket_id = ?
        ORDER BY id ASC"#,
    )?;
    let entries = stmt
        .query_map(params![ticket_id], |row| {
            let file_paths_json: String = row.get(5)?;
            Ok(ActionLogEntry {
                id: row.get(0)?,
                ticket_id: row.get(1)?,
                action_id: row.get(2)?,
                performed_by_npk: row.get(3)?,
                details_text: row.get(4)?,
                file_paths: serde_json::from_str(&file_paths_json).unwrap_or_default(),
                from_status_id: row.get(6)?,
                to_status_id: row.get(7)?,
                created_at: parse_timestamp(&row.get::<_, String>(8)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::directory::store::{insert_department, insert_employee, insert_position};
    use crate::ticket::store::insert_ticket;
    use crate::ticket::types::NewTicket;
    use crate::workflow::store::{insert_action, insert_section, insert_status};

    #[test]
    fn test_insert_and_list_in_order() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn();
        let dept = insert_department(&conn, "GA", true, true).unwrap();
        let pos = insert_position(&conn, "Staff").unwrap();
        insert_employee(&conn, "E1", "Asep", dept, None, pos).unwrap();
        let section = insert_section(&conn, "Work", 1).unwrap();
        let a = insert_status(&conn, "A", 0, section.id, None).unwrap();
        let b = insert_status(&conn, "B", 1, section.id, None).unwrap();
        let action = insert_action(&conn, "Setujui", None).unwrap();
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

        insert(
            &conn,
            &NewActionLogEntry {
                ticket_id: ticket.id,
                action_id: action,
                performed_by_npk: "E1".to_string(),
                details_text: None,
                file_paths: Vec::new(),
                from_status_id: Some(a.id),
                to_status_id: b.id,
            },
        )
        .unwrap();
        insert(
            &conn,
            &NewActionLogEntry {
                ticket_id: ticket.id,
                action_id: action,
                performed_by_npk: "E1".to_string(),
                details_text: Some("returned".to_string()),
                file_paths: vec!["/uploads/x.pdf".to_string()],
                from_status_id: Some(b.id),
                to_status_id: a.id,
            },
        )
        .unwrap();

        let entries = list_by_ticket(&conn, ticket.id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].from_status_id, Some(a.id));
        assert_eq!(entries[0].to_status_id, b.id);
        assert_eq!(entries[1].details_text.as_deref(), Some("returned"));
        assert_eq!(entries[1].file_paths, vec!["/uploads/x.pdf"]);
    }
}
