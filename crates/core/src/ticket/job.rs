//! Job table access.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};

use super::types::{Job, OpenJob, OpenTicket};
use crate::db::{now_rfc3339, parse_timestamp};
use crate::error::{Error, Result};
use crate::files::FileMetadata;
use crate::workflow::types::OPEN_WORK_STATUSES;

const JOB_COLUMNS: &str = "id, ticket_id, pic_job, job_priority, report_file, spending_amount, \
                           version, created_at, updated_at";

/// Create the companion job for a freshly inserted ticket.
pub fn insert_job(conn: &Connection, ticket_id: i64, initial_priority: i64) -> Result<i64> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO job (ticket_id, job_priority, version, created_at, updated_at) \
         VALUES (?, ?, 1, ?, ?)",
        params![ticket_id, initial_priority, now, now],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_job(conn: &Connection, id: i64) -> Result<Option<Job>> {
    let job = conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM job WHERE id = ?"),
            params![id],
            row_to_job,
        )
        .optional()?;
    Ok(job)
}

pub fn find_job_by_ticket(conn: &Connection, ticket_id: i64) -> Result<Option<Job>> {
    let job = conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM job WHERE ticket_id = ?"),
            params![ticket_id],
            row_to_job,
        )
        .optional()?;
    Ok(job)
}

pub fn assign_pic(conn: &Connection, id: i64, pic_npk: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE job SET pic_job = ?, updated_at = ? WHERE id = ?",
        params![pic_npk, now_rfc3339(), id],
    )?;
    if updated == 0 {
        return Err(Error::not_found("job not found"));
    }
    Ok(())
}

/// CAS priority write used by manual reorder.
pub fn update_priority(conn: &Connection, id: i64, version: i64, new_priority: i64) -> Result<usize> {
    let updated = conn.execute(
        r#"
        UPDATE job
        SET job_priority = ?, version = version + 1, updated_at = ?
        WHERE id = ? AND version = ?"#,
        params![new_priority, now_rfc3339(), id, version],
    )?;
    Ok(updated)
}

/// Blind priority write used by the scheduled recalculation.
pub fn force_update_priority(conn: &Connection, id: i64, new_priority: i64) -> Result<()> {
    conn.execute(
        r#"
        UPDATE job
        SET job_priority = ?, version = version + 1, updated_at = ?
        WHERE id = ?"#,
        params![new_priority, now_rfc3339(), id],
    )?;
    Ok(())
}

/// Overwrite completion artifacts: the report-file list is replaced, not
/// appended, and the spending amount is set when given.
pub fn update_completion_details(
    conn: &Connection,
    ticket_id: i64,
    files: &[FileMetadata],
    spending_amount: Option<i64>,
) -> Result<()> {
    if !files.is_empty() {
        let json = serde_json::to_string(files)?;
        let updated = conn.execute(
            "UPDATE job SET report_file = ?, updated_at = ? WHERE ticket_id = ?",
            params![json, now_rfc3339(), ticket_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("job associated with this ticket not found"));
        }
    }

    if let Some(amount) = spending_amount {
        let updated = conn.execute(
            "UPDATE job SET spending_amount = ?, updated_at = ? WHERE ticket_id = ?",
            params![amount, now_rfc3339(), ticket_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found("job associated with this ticket not found"));
        }
    }

    Ok(())
}

/// How many of the given jobs belong to tickets targeting the department.
pub fn count_jobs_in_department(
    conn: &Connection,
    job_ids: &[i64],
    department_target_id: i64,
) -> Result<i64> {
    if job_ids.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; job_ids.len()].join(",");
    let sql = format!(
        r#"
        SELECT COUNT(j.id)
        FROM job j
        JOIN ticket t ON j.ticket_id = t.id
        WHERE j.id IN ({placeholders}) AND t.department_target_id = ?"#
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut args: Vec<&dyn rusqlite::ToSql> =
        job_ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();
    args.push(&department_target_id);
    Ok(stmt.query_row(args.as_slice(), |row| row.get(0))?)
}

/// The department a job's work is assigned to (through its ticket).
pub fn job_department(conn: &Connection, job_id: i64) -> Result<Option<i64>> {
    let dept: Option<i64> = conn
        .query_row(
            "SELECT t.department_target_id FROM job j JOIN ticket t ON j.ticket_id = t.id \
             WHERE j.id = ?",
            params![job_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(dept)
}

/// Open jobs of a department for the scheduled rescore, joined with the
/// ticket fields the score formula needs.
pub fn open_jobs_for_scheduling(
    conn: &Connection,
    department_target_id: i64,
) -> Result<Vec<OpenJob>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT j.id, j.job_priority,
               t.id, t.created_at, t.ticket_priority, t.deadline
        FROM job j
        JOIN ticket t ON j.ticket_id = t.id
        WHERE t.department_target_id = ?1
        AND EXISTS (
            SELECT 1 FROM track_status_ticket tst
            JOIN status_ticket st ON tst.status_ticket_id = st.id
            WHERE tst.ticket_id = t.id
              AND tst.finish_date IS NULL
              AND st.name IN (?2, ?3)
        )"#,
    )?;
    let jobs = stmt
        .query_map(
            params![department_target_id, OPEN_WORK_STATUSES[0], OPEN_WORK_STATUSES[1]],
            |row| {
                Ok(OpenJob {
                    id: row.get(0)?,
                    job_priority: row.get(1)?,
                    ticket: OpenTicket {
                        id: row.get(2)?,
                        created_at: parse_timestamp(&row.get::<_, String>(3)?),
                        ticket_priority: row.get(4)?,
                        deadline: row
                            .get::<_, Option<String>>(5)?
                            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                    },
                })
            },
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(jobs)
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
    let report_files_json: String = row.get(4)?;
    Ok(Job {
        id: row.get(0)?,
        ticket_id: row.get(1)?,
        pic_job: row.get(2)?,
        job_priority: row.get(3)?,
        report_files: serde_json::from_str(&report_files_json).unwrap_or_default(),
        spending_amount: row.get(5)?,
        version: row.get(6)?,
        created_at: parse_timestamp(&row.get::<_, String>(7)?),
        updated_at: parse_timestamp(&row.get::<_, String>(8)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::directory::store::{insert_department, insert_employee, insert_position};
    use crate::ticket::store::insert_ticket;
    use crate::ticket::types::NewTicket;

    fn seeded() -> (Database, i64, i64) {
        let db = Database::in_memory().unwrap();
        let (dept, ticket_id) = {
            let conn = db.conn();
            let dept = insert_department(&conn, "GA", true, true).unwrap();
            let pos = insert_position(&conn, "Staff").unwrap();
            insert_employee(&conn, "E1", "Asep", dept, None, pos).unwrap();
            insert_employee(&conn, "E2", "Budi", dept, None, pos).unwrap();
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
            (dept, ticket.id)
        };
        (db, dept, ticket_id)
    }

    #[test]
    fn test_insert_and_find_job() {
        let (db, _dept, ticket_id) = seeded();
        let conn = db.conn();
        let job_id = insert_job(&conn, ticket_id, 1).unwrap();

        let by_id = find_job(&conn, job_id).unwrap().unwrap();
        let by_ticket = find_job_by_ticket(&conn, ticket_id).unwrap().unwrap();
        assert_eq!(by_id.id, by_ticket.id);
        assert_eq!(by_id.pic_job, None);
        assert_eq!(by_id.job_priority, 1);
    }

    #[test]
    fn test_assign_pic() {
        let (db, _dept, ticket_id) = seeded();
        let conn = db.conn();
        let job_id = insert_job(&conn, ticket_id, 1).unwrap();
        assign_pic(&conn, job_id, "E2").unwrap();
        assert_eq!(
            find_job(&conn, job_id).unwrap().unwrap().pic_job.as_deref(),
            Some("E2")
        );
        assert!(matches!(assign_pic(&conn, 999, "E2"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_completion_details_replace_files() {
        let (db, _dept, ticket_id) = seeded();
        let conn = db.conn();
        insert_job(&conn, ticket_id, 1).unwrap();

        let first = vec![FileMetadata {
            file_name: "before.pdf".into(),
            file_path: "/uploads/before.pdf".into(),
            content_type: None,
            size: 1,
        }];
        update_completion_details(&conn, ticket_id, &first, None).unwrap();

        let second = vec![FileMetadata {
            file_name: "after.pdf".into(),
            file_path: "/uploads/after.pdf".into(),
            content_type: None,
            size: 2,
        }];
        update_completion_details(&conn, ticket_id, &second, Some(120_000)).unwrap();

        let job = find_job_by_ticket(&conn, ticket_id).unwrap().unwrap();
        assert_eq!(job.report_files.len(), 1);
        assert_eq!(job.report_files[0].file_name, "after.pdf");
        assert_eq!(job.spending_amount, Some(120_000));
    }

    #[test]
    fn test_completion_details_spending_only() {
        let (db, _dept, ticket_id) = seeded();
        let conn = db.conn();
        insert_job(&conn, ticket_id, 1).unwrap();
        update_completion_details(&conn, ticket_id, &[], Some(5)).unwrap();
        let job = find_job_by_ticket(&conn, ticket_id).unwrap().unwrap();
        assert!(job.report_files.is_empty());
        assert_eq!(job.spending_amount, Some(5));
    }

    #[test]
    fn test_completion_details_missing_job() {
        let (db, _dept, _ticket_id) = seeded();
        let conn = db.conn();
        let err = update_completion_details(&conn, 12345, &[], Some(5)).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_job_priority_cas_and_force() {
        let (db, _dept, ticket_id) = seeded();
        let conn = db.conn();
        let job_id = insert_job(&conn, ticket_id, 1).unwrap();

        assert_eq!(update_priority(&conn, job_id, 1, 3).unwrap(), 1);
        assert_eq!(update_priority(&conn, job_id, 1, 4).unwrap(), 0);
        force_update_priority(&conn, job_id, 7).unwrap();

        let job = find_job(&conn, job_id).unwrap().unwrap();
        assert_eq!(job.job_priority, 7);
        assert_eq!(job.version, 3);
    }

    #[test]
    fn test_job_department_resolution() {
        let (db, dept, ticket_id) = seeded();
        let conn = db.conn();
        let job_id = insert_job(&conn, ticket_id, 1).unwrap();
        assert_eq!(job_department(&conn, job_id).unwrap(), Some(dept));
        assert_eq!(job_department(&conn, 999).unwrap(), None);
        assert_eq!(count_jobs_in_department(&conn, &[job_id], dept).unwrap(), 1);
    }
}
