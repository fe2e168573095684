//! Rehydrated ticket views for API responses and event payloads.

use rusqlite::{Connection, OptionalExtension};

use super::types::{TicketDetail, TicketFilter};
use crate::error::Result;

const BASE_TICKET_QUERY: &str = r#"
    SELECT
        t.id,
        t.description,
        t.department_target_id,
        dt.name AS department_target_name,
        t.ticket_priority,
        t.version,
        j.id AS job_id,
        j.job_priority,
        j.version AS job_version,
        pl.name AS physical_location_name,
        sl.name AS specified_location_name,
        t.created_at,
        CAST(julianday('now', 'start of day')
             - julianday(t.created_at, 'start of day') AS INTEGER) AS ticket_age_days,
        t.deadline,
        CASE WHEN t.deadline IS NULL THEN NULL
             ELSE CAST(julianday(t.deadline)
                       - julianday('now', 'start of day') AS INTEGER) END AS days_remaining,
        t.requestor,
        req_emp.name AS requestor_name,
        req_dept.name AS requestor_department,
        j.pic_job,
        pic_emp.name AS pic_name,
        pic_area.name AS pic_area_name,
        current_st.name AS current_status,
        current_st.hex_color AS current_status_hex_code,
        current_sst.name AS current_section_name,
        t.support_file,
        j.report_file,
        j.spending_amount
    FROM ticket t
    LEFT JOIN job j ON t.id = j.ticket_id
    LEFT JOIN department dt ON t.department_target_id = dt.id
    LEFT JOIN physical_location pl ON t.physical_location_id = pl.id
    LEFT JOIN specified_location sl ON t.specified_location_id = sl.id
    JOIN employee req_emp ON t.requestor = req_emp.npk
    LEFT JOIN department req_dept ON req_emp.department_id = req_dept.id
    LEFT JOIN employee pic_emp ON j.pic_job = pic_emp.npk
    LEFT JOIN area pic_area ON pic_emp.area_id = pic_area.id
    LEFT JOIN track_status_ticket current_tst
        ON t.id = current_tst.ticket_id AND current_tst.finish_date IS NULL
    LEFT JOIN status_ticket current_st ON current_tst.status_ticket_id = current_st.id
    LEFT JOIN section_status_ticket current_sst ON current_st.section_id = current_sst.id
"#;

pub fn ticket_detail(conn: &Connection, id: i64) -> Result<Option<TicketDetail>> {
    let sql = format!("{BASE_TICKET_QUERY} WHERE t.id = ?");
    let detail = conn
        .query_row(&sql, [id], row_to_detail)
        .optional()?;
    Ok(detail)
}

/// Filtered ticket list, default-ordered by ticket priority.
pub fn list_tickets(conn: &Connection, filter: &TicketFilter) -> Result<Vec<TicketDetail>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(section_id) = filter.section_id {
        conditions.push("current_sst.id = ?".to_string());
        args.push(Box::new(section_id));
    }
    if !filter.status_ids.is_empty() {
        conditions.push(format!(
            "current_st.id IN ({})",
            vec!["?"; filter.status_ids.len()].join(",")
        ));
        for id in &filter.status_ids {
            args.push(Box::new(*id));
        }
    }
    if let Some(dept) = filter.department_target_id {
        conditions.push("t.department_target_id = ?".to_string());
        args.push(Box::new(dept));
    }
    if !filter.requestor_department_ids.is_empty() {
        conditions.push(format!(
            "req_emp.department_id IN ({})",
            vec!["?"; filter.requestor_department_ids.len()].join(",")
        ));
        for id in &filter.requestor_department_ids {
            args.push(Box::new(*id));
        }
    }
    if !filter.requestors.is_empty() {
        conditions.push(format!(
            "t.requestor IN ({})",
            vec!["?"; filter.requestors.len()].join(",")
        ));
        for npk in &filter.requestors {
            args.push(Box::new(npk.clone()));
        }
    }
    if !filter.pic_npks.is_empty() {
        conditions.push(format!(
            "j.pic_job IN ({})",
            vec!["?"; filter.pic_npks.len()].join(",")
        ));
        for npk in &filter.pic_npks {
            args.push(Box::new(npk.clone()));
        }
    }
    if let Some(year) = filter.year {
        conditions.push("CAST(strftime('%Y', t.created_at) AS INTEGER) = ?".to_string());
        args.push(Box::new(year));
    }
    if let Some(month) = filter.month {
        conditions.push("CAST(strftime('%m', t.created_at) AS INTEGER) = ?".to_string());
        args.push(Box::new(month as i64));
    }
    if let Some(search) = filter.search.as_deref() {
        // Ticket search is permissive: terms are OR-ed.
        if let Some(match_expr) = fts_query(search, "OR") {
            conditions.push(
                "t.id IN (SELECT rowid FROM ticket_fts WHERE ticket_fts MATCH ?)".to_string(),
            );
            args.push(Box::new(match_expr));
        }
    }

    let mut sql = BASE_TICKET_QUERY.to_string();
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(&order_by_clause(filter.sort_by.as_deref()));

    run_detail_query(conn, &sql, args)
}

/// Job-side listing: same rehydrated view, ordered by job priority, with the
/// stricter AND-joined search.
pub fn list_jobs(conn: &Connection, filter: &TicketFilter) -> Result<Vec<TicketDetail>> {
    let mut conditions: Vec<String> = vec!["j.id IS NOT NULL".to_string()];
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(dept) = filter.department_target_id {
        conditions.push("t.department_target_id = ?".to_string());
        args.push(Box::new(dept));
    }
    if !filter.pic_npks.is_empty() {
        conditions.push(format!(
            "j.pic_job IN ({})",
            vec!["?"; filter.pic_npks.len()].join(",")
        ));
        for npk in &filter.pic_npks {
            args.push(Box::new(npk.clone()));
        }
    }
    if !filter.status_ids.is_empty() {
        conditions.push(format!(
            "current_st.id IN ({})",
            vec!["?"; filter.status_ids.len()].join(",")
        ));
        for id in &filter.status_ids {
            args.push(Box::new(*id));
        }
    }
    if let Some(search) = filter.search.as_deref() {
        // Job search is strict: terms are AND-ed.
        if let Some(match_expr) = fts_query(search, "AND") {
            conditions.push(
                "t.id IN (SELECT rowid FROM ticket_fts WHERE ticket_fts MATCH ?)".to_string(),
            );
            args.push(Box::new(match_expr));
        }
    }

    let mut sql = BASE_TICKET_QUERY.to_string();
    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
    sql.push_str(" ORDER BY j.job_priority ASC");

    run_detail_query(conn, &sql, args)
}

/// Tokenize a raw search string into an FTS match expression. Terms are
/// quoted so user input cannot inject FTS syntax.
fn fts_query(raw: &str, operator: &str) -> Option<String> {
    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .filter(|t| t.len() > 2)
        .collect();
    if terms.is_empty() {
        return None;
    }
    Some(terms.join(&format!(" {operator} ")))
}

fn order_by_clause(sort_by: Option<&str>) -> String {
    let Some(sort_by) = sort_by else {
        return " ORDER BY t.ticket_priority ASC".to_string();
    };

    let allowed = [
        ("priority", "t.ticket_priority"),
        ("deadline", "t.deadline"),
        ("age", "ticket_age_days"),
        ("status", "current_status"),
        ("requestor", "requestor_name"),
        ("pic", "pic_name"),
    ];

    let mut clauses = Vec::new();
    for param in sort_by.split(',') {
        let Some((key, direction)) = param.trim().rsplit_once('_') else {
            continue;
        };
        let direction = direction.to_uppercase();
        if direction != "ASC" && direction != "DESC" {
            continue;
        }
        if let Some((_, column)) = allowed.iter().find(|(k, _)| *k == key) {
            clauses.push(format!("{column} {direction}"));
        }
    }

    if clauses.is_empty() {
        " ORDER BY t.ticket_priority ASC".to_string()
    } else {
        format!(" ORDER BY {}", clauses.join(", "))
    }
}

fn run_detail_query(
    conn: &Connection,
    sql: &str,
    args: Vec<Box<dyn rusqlite::ToSql>>,
) -> Result<Vec<TicketDetail>> {
    let mut stmt = conn.prepare(sql)?;
    let refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|a| a.as_ref()).collect();
    let details = stmt
        .query_map(refs.as_slice(), row_to_detail)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(details)
}

fn row_to_detail(row: &rusqlite::Row) -> rusqlite::Result<TicketDetail> {
    let support_files_json: Option<String> = row.get(24)?;
    let report_files_json: Option<String> = row.get(25)?;
    Ok(TicketDetail {
        id: row.get(0)?,
        description: row.get(1)?,
        department_target_id: row.get(2)?,
        department_target_name: row.get(3)?,
        ticket_priority: row.get(4)?,
        version: row.get(5)?,
        job_id: row.get(6)?,
        job_priority: row.get(7)?,
        job_version: row.get(8)?,
        physical_location_name: row.get(9)?,
        specified_location_name: row.get(10)?,
        created_at: row.get(11)?,
        ticket_age_days: row.get(12)?,
        deadline: row.get(13)?,
        days_remaining: row.get(14)?,
        requestor_npk: row.get(15)?,
        requestor_name: row.get(16)?,
        requestor_department: row.get(17)?,
        pic_npk: row.get(18)?,
        pic_name: row.get(19)?,
        pic_area_name: row.get(20)?,
        current_status: row.get(21)?,
        current_status_hex_code: row.get(22)?,
        current_section_name: row.get(23)?,
        support_files: support_files_json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default(),
        report_files: report_files_json
            .and_then(|j| serde_json::from_str(&j).ok())
            .unwrap_or_default(),
        spending_amount: row.get(26)?,
    })
}
