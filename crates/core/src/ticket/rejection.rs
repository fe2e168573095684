//! Rejection feedback records.
//!
//! Filing a rejection moves the ticket into the rejected status in the same
//! transaction; the record then tracks whether the requestor side has seen
//! the feedback.

use rusqlite::{params, Connection, OptionalExtension};

use super::types::RejectedTicket;
use crate::db::{now_rfc3339, parse_timestamp, Database};
use crate::directory::store as directory;
use crate::error::{Error, Result};
use crate::ticket::{store as ticket_store, track};
use crate::workflow::store as workflow_store;
use crate::workflow::types::STATUS_REJECTED;

/// Positions allowed to act on rejection records on behalf of a department.
const APPROVER_POSITIONS: [&str; 2] = ["Head of Department", "Section"];

#[derive(Debug, Clone, serde::Deserialize)]
pub struct NewRejection {
    pub ticket_id: i64,
    pub feedback: String,
}

pub struct RejectionService {
    db: Database,
}

impl RejectionService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// File a rejection and move the ticket to the rejected status atomically.
    pub fn create(&self, req: &NewRejection, user_npk: &str) -> Result<RejectedTicket> {
        let mut conn = self.db.conn();

        if let Some(latest) = find_latest_by_ticket(&conn, req.ticket_id)? {
            if !latest.already_seen {
                return Err(Error::conflict(
                    "ticket already has an active rejection that has not been seen",
                ));
            }
            let current = track::current_status(&conn, req.ticket_id)?;
            if current.map(|(_, name)| name).as_deref() == Some(STATUS_REJECTED) {
                return Err(Error::conflict(
                    "ticket is still in rejected status from a previous rejection",
                ));
            }
        }

        let rejected_status = workflow_store::find_status_by_name(&conn, STATUS_REJECTED)?
            .ok_or_else(|| {
                Error::Database("critical configuration error: rejected status not found".into())
            })?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO rejected_ticket (ticket_id, rejected_by_npk, feedback, already_seen, created_at) \
             VALUES (?, ?, ?, 0, ?)",
            params![req.ticket_id, user_npk, req.feedback, now_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        track::change_status(&tx, req.ticket_id, rejected_status.id)?;
        tx.commit()?;

        find_by_id(&conn, id)?.ok_or_else(|| Error::Database("rejection vanished after insert".into()))
    }

    pub fn update_feedback(&self, rejection_id: i64, feedback: &str, user_npk: &str) -> Result<RejectedTicket> {
        let conn = self.db.conn();
        let (rejection, ticket) = self.load_pair(&conn, rejection_id)?;
        let user = directory::find_employee_by_npk(&conn, user_npk)?
            .ok_or_else(|| Error::not_found("user not found"))?;

        let allowed = user.department_id == ticket.department_target_id
            && APPROVER_POSITIONS.contains(&user.position.name.as_str());
        if !allowed {
            return Err(Error::forbidden("user is not authorized to update this feedback"));
        }

        conn.execute(
            "UPDATE rejected_ticket SET feedback = ? WHERE id = ?",
            params![feedback, rejection.id],
        )?;
        find_by_id(&conn, rejection.id)?
            .ok_or_else(|| Error::not_found("rejection record not found"))
    }

    /// Mark the feedback as seen. Only the original requestor or an approver
    /// from the requestor's department may do this.
    pub fn update_already_seen(&self, rejection_id: i64, seen: bool, user_npk: &str) -> Result<()> {
        let conn = self.db.conn();
        let (rejection, ticket) = self.load_pair(&conn, rejection_id)?;
        let user = directory::find_employee_by_npk(&conn, user_npk)?
            .ok_or_else(|| Error::not_found("user not found"))?;
        let requestor = directory::find_employee_by_npk(&conn, &ticket.requestor)?
            .ok_or_else(|| Error::not_found("original requestor not found"))?;

        let is_original_requestor = user.npk == ticket.requestor;
        let is_same_dept_approver = user.department_id == requestor.department_id
            && APPROVER_POSITIONS.contains(&user.position.name.as_str());
        if !is_original_requestor && !is_same_dept_approver {
            return Err(Error::forbidden("user is not authorized to perform this action"));
        }

        conn.execute(
            "UPDATE rejected_ticket SET already_seen = ? WHERE id = ?",
            params![seen, rejection.id],
        )?;
        Ok(())
    }

    /// Delete a rejection record. Allowed only for target-department approvers
    /// and only while the ticket still sits in the rejected status.
    pub fn delete(&self, rejection_id: i64, user_npk: &str) -> Result<()> {
        let conn = self.db.conn();
        let (rejection, ticket) = self.load_pair(&conn, rejection_id)?;
        let user = directory::find_employee_by_npk(&conn, user_npk)?
            .ok_or_else(|| Error::not_found("user not found"))?;

        let allowed = user.department_id == ticket.department_target_id
            && APPROVER_POSITIONS.contains(&user.position.name.as_str());
        if !allowed {
            return Err(Error::forbidden(
                "user is not authorized to delete this rejection record",
            ));
        }

        let current = track::current_status(&conn, rejection.ticket_id)?;
        if current.map(|(_, name)| name).as_deref() != Some(STATUS_REJECTED) {
            return Err(Error::conflict(
                "can only delete rejection record if ticket status is 'Ditolak'",
            ));
        }

        conn.execute("DELETE FROM rejected_ticket WHERE id = ?", params![rejection.id])?;
        Ok(())
    }

    pub fn list_by_ticket(&self, ticket_id: i64) -> Result<Vec<RejectedTicket>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REJECTION_COLUMNS} FROM rejected_ticket WHERE ticket_id = ? ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![ticket_id], row_to_rejection)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn load_pair(
        &self,
        conn: &Connection,
        rejection_id: i64,
    ) -> Result<(RejectedTicket, super::types::Ticket)> {
        let rejection = find_by_id(conn, rejection_id)?
            .ok_or_else(|| Error::not_found("rejection record not found"))?;
        let ticket = ticket_store::find_ticket(conn, rejection.ticket_id)?
            .ok_or_else(|| Error::not_found("associated ticket not found"))?;
        Ok((rejection, ticket))
    }
}

const REJECTION_COLUMNS: &str = "id, ticket_id, rejected_by_npk, feedback, already_seen, created_at";

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<RejectedTicket>> {
    let rejection = conn
        .query_row(
            &format!("SELECT {REJECTION_COLUMNS} FROM rejected_ticket WHERE id = ?"),
            params![id],
            row_to_rejection,
        )
        .optional()?;
    Ok(rejection)
}

pub fn find_latest_by_ticket(conn: &Connection, ticket_id: i64) -> Result<Option<RejectedTicket>> {
    let rejection = conn
        .query_row(
            &format!(
                "SELECT {REJECTION_COLUMNS} FROM rejected_ticket \
                 WHERE ticket_id = ? ORDER BY id DESC LIMIT 1"
            ),
            params![ticket_id],
            row_to_rejection,
        )
        .optional()?;
    Ok(rejection)
}

fn row_to_rejection(row: &rusqlite::Row) -> rusqlite::Result<RejectedTicket> {
    Ok(RejectedTicket {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        rejected_by_npk: row.get(2)?,
        feedback: row.get(3)?,
        already_seen: row.get(4)?,
        created_at: parse_timestamp(&row.get::<_, String>(5)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::store::{insert_department, insert_employee, insert_position};
    use crate::ticket::store::insert_ticket;
    use crate::ticket::types::NewTicket;
    use crate::workflow::store::{insert_section, insert_status};

    struct Fixture {
        service: RejectionService,
        ticket_id: i64,
        work_status: i64,
    }

    // E1 requestor (dept GA), E2 target-dept head (dept IT), E3 unrelated staff.
    fn fixture() -> Fixture {
        let db = Database::in_memory().unwrap();
        let (ticket_id, work_status) = {
            let conn = db.conn();
            let ga = insert_department(&conn, "GA", true, false).unwrap();
            let it = insert_department(&conn, "IT", true, true).unwrap();
            let staff = insert_position(&conn, "Staff").unwrap();
            let head = insert_position(&conn, "Head of Department").unwrap();
            insert_employee(&conn, "E1", "Asep", ga, None, staff).unwrap();
            insert_employee(&conn, "E2", "Budi", it, None, head).unwrap();
            insert_employee(&conn, "E3", "Cici", ga, None, staff).unwrap();

            let section = insert_section(&conn, "Work", 1).unwrap();
            let work = insert_status(&conn, "Menunggu Job", 0, section.id, None).unwrap();
            insert_status(&conn, STATUS_REJECTED, -100, section.id, None).unwrap();

            let ticket = insert_ticket(
                &conn,
                NewTicket {
                    requestor: "E1".to_string(),
                    department_target_id: it,
                    physical_location_id: None,
                    specified_location_id: None,
                    description: "d".to_string(),
                    ticket_priority: 1,
                    deadline: None,
                    support_files: Vec::new(),
                },
            )
            .unwrap();
            track::create_initial_status(&conn, ticket.id, work.id).unwrap();
            (ticket.id, work.id)
        };
        Fixture {
            service: RejectionService::new(db),
            ticket_id,
            work_status,
        }
    }

    #[test]
    fn test_create_moves_ticket_to_rejected() {
        let f = fixture();
        let rejection = f
            .service
            .create(
                &NewRejection {
                    ticket_id: f.ticket_id,
                    feedback: "incomplete description".to_string(),
                },
                "E2",
            )
            .unwrap();
        assert!(!rejection.already_seen);

        let conn = f.service.db.conn();
        let (_, name) = track::current_status(&conn, f.ticket_id).unwrap().unwrap();
        assert_eq!(name, STATUS_REJECTED);
        assert_eq!(track::open_row_count(&conn, f.ticket_id).unwrap(), 1);
    }

    #[test]
    fn test_unseen_rejection_blocks_another() {
        let f = fixture();
        let req = NewRejection {
            ticket_id: f.ticket_id,
            feedback: "first".to_string(),
        };
        f.service.create(&req, "E2").unwrap();
        let err = f.service.create(&req, "E2").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_seen_but_still_rejected_blocks_another() {
        let f = fixture();
        let rejection = f
            .service
            .create(
                &NewRejection {
                    ticket_id: f.ticket_id,
                    feedback: "first".to_string(),
                },
                "E2",
            )
            .unwrap();
        f.service.update_already_seen(rejection.id, true, "E1").unwrap();

        let err = f
            .service
            .create(
                &NewRejection {
                    ticket_id: f.ticket_id,
                    feedback: "second".to_string(),
                },
                "E2",
            )
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_already_seen_authorization() {
        let f = fixture();
        let rejection = f
            .service
            .create(
                &NewRejection {
                    ticket_id: f.ticket_id,
                    feedback: "fb".to_string(),
                },
                "E2",
            )
            .unwrap();

        // Unrelated staff may not mark it seen; the requestor may.
        assert!(matches!(
            f.service.update_already_seen(rejection.id, true, "E3"),
            Err(Error::Forbidden(_))
        ));
        f.service.update_already_seen(rejection.id, true, "E1").unwrap();
    }

    #[test]
    fn test_feedback_update_requires_target_dept_approver() {
        let f = fixture();
        let rejection = f
            .service
            .create(
                &NewRejection {
                    ticket_id: f.ticket_id,
                    feedback: "fb".to_string(),
                },
                "E2",
            )
            .unwrap();

        assert!(matches!(
            f.service.update_feedback(rejection.id, "new", "E1"),
            Err(Error::Forbidden(_))
        ));
        let updated = f.service.update_feedback(rejection.id, "new", "E2").unwrap();
        assert_eq!(updated.feedback, "new");
    }

    #[test]
    fn test_delete_only_while_rejected() {
        let f = fixture();
        let rejection = f
            .service
            .create(
                &NewRejection {
                    ticket_id: f.ticket_id,
                    feedback: "fb".to_string(),
                },
                "E2",
            )
            .unwrap();

        // Move the ticket back out of the rejected status.
        {
            let conn = f.service.db.conn();
            track::change_status(&conn, f.ticket_id, f.work_status).unwrap();
        }
        assert!(matches!(
            f.service.delete(rejection.id, "E2"),
            Err(Error::Conflict(_))
        ));

        {
            let conn = f.service.db.conn();
            let rejected = workflow_store::find_status_by_name(&conn, STATUS_REJECTED)
                .unwrap()
                .unwrap();
            track::change_status(&conn, f.ticket_id, rejected.id).unwrap();
        }
        f.service.delete(rejection.id, "E2").unwrap();
        let conn = f.service.db.conn();
        assert!(find_by_id(&conn, rejection.id).unwrap().is_none());
    }
}
