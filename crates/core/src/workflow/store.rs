//! Queries over the workflow reference tables. Functions take a connection so
//! services can compose them inside transactions.

use rusqlite::{params, Connection, OptionalExtension};

use super::types::{Section, Status, Workflow, WorkflowStep};
use crate::db::now_rfc3339;
use crate::error::{Error, Result};

// Sections

pub fn insert_section(conn: &Connection, name: &str, sequence: i64) -> Result<Section> {
    conn.execute(
        "INSERT INTO section_status_ticket (name, sequence, is_active) VALUES (?, ?, 1)",
        params![name, sequence],
    )
    .map_err(unique_to_conflict("section name already exists"))?;
    let id = conn.last_insert_rowid();
    Ok(Section {
        id,
        name: name.to_string(),
        sequence,
        is_active: true,
    })
}

pub fn find_section(conn: &Connection, id: i64) -> Result<Option<Section>> {
    let section = conn
        .query_row(
            "SELECT id, name, sequence, is_active FROM section_status_ticket WHERE id = ?",
            params![id],
            row_to_section,
        )
        .optional()?;
    Ok(section)
}

pub fn list_sections(conn: &Connection) -> Result<Vec<Section>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, sequence, is_active FROM section_status_ticket ORDER BY sequence ASC",
    )?;
    let sections = stmt
        .query_map([], row_to_section)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(sections)
}

pub fn count_sections(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM section_status_ticket", [], |row| row.get(0))?)
}

pub fn count_active_sections(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM section_status_ticket WHERE is_active = 1",
        [],
        |row| row.get(0),
    )?)
}

pub fn section_name_taken(conn: &Connection, name: &str, current_id: i64) -> Result<bool> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM section_status_ticket WHERE name = ? AND id != ?",
            params![name, current_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(exists.is_some())
}

pub fn rename_section(conn: &Connection, id: i64, name: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE section_status_ticket SET name = ? WHERE id = ?",
        params![name, id],
    )?;
    if updated == 0 {
        return Err(Error::not_found("section not found"));
    }
    Ok(())
}

pub fn set_section_active(conn: &Connection, id: i64, is_active: bool) -> Result<()> {
    let updated = conn.execute(
        "UPDATE section_status_ticket SET is_active = ? WHERE id = ?",
        params![is_active, id],
    )?;
    if updated == 0 {
        return Err(Error::not_found("section not found"));
    }
    Ok(())
}

pub fn update_section_sequence(conn: &Connection, id: i64, sequence: i64) -> Result<()> {
    conn.execute(
        "UPDATE section_status_ticket SET sequence = ? WHERE id = ?",
        params![sequence, id],
    )?;
    Ok(())
}

pub fn delete_section(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn.execute("DELETE FROM section_status_ticket WHERE id = ?", params![id])?;
    if deleted == 0 {
        return Err(Error::not_found("section not found"));
    }
    Ok(())
}

// Statuses

pub fn insert_status(
    conn: &Connection,
    name: &str,
    sequence: i64,
    section_id: i64,
    hex_color: Option<&str>,
) -> Result<Status> {
    let now = now_rfc3339();
    conn.execute(
        r#"
        INSERT INTO status_ticket (name, sequence, is_active, section_id, hex_color,
                                   created_at, updated_at)
        VALUES (?, ?, 1, ?, ?, ?, ?)"#,
        params![name, sequence, section_id, hex_color, now, now],
    )
    .map_err(unique_to_conflict("status name already exists"))?;
    Ok(Status {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        sequence,
        is_active: true,
        section_id,
        hex_color: hex_color.map(String::from),
    })
}

pub fn find_status(conn: &Connection, id: i64) -> Result<Option<Status>> {
    let status = conn
        .query_row(
            &format!("SELECT {STATUS_COLUMNS} FROM status_ticket WHERE id = ?"),
            params![id],
            row_to_status,
        )
        .optional()?;
    Ok(status)
}

pub fn find_status_by_name(conn: &Connection, name: &str) -> Result<Option<Status>> {
    let status = conn
        .query_row(
            &format!("SELECT {STATUS_COLUMNS} FROM status_ticket WHERE name = ?"),
            params![name],
            row_to_status,
        )
        .optional()?;
    Ok(status)
}

/// All statuses grouped by section, preserving intra-section order. Feeds the
/// global renumbering during a section reorder.
pub fn statuses_ordered_by_section(conn: &Connection) -> Result<Vec<Status>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {STATUS_COLUMNS} FROM status_ticket ORDER BY section_id, sequence ASC"
    ))?;
    let statuses = stmt
        .query_map([], row_to_status)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(statuses)
}

pub fn list_statuses(
    conn: &Connection,
    section_id: Option<i64>,
    is_active: Option<bool>,
) -> Result<Vec<Status>> {
    let mut sql = format!("SELECT {STATUS_COLUMNS} FROM status_ticket");
    let mut conditions = Vec::new();
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(section_id) = section_id {
        conditions.push("section_id = ?");
        args.push(Box::new(section_id));
    }
    if let Some(is_active) = is_active {
        conditions.push("is_active = ?");
        args.push(Box::new(is_active));
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    sql.push_str(" ORDER BY sequence ASC");

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|p| p.as_ref()).collect();
    let statuses = stmt
        .query_map(refs.as_slice(), row_to_status)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(statuses)
}

pub fn set_status_active(conn: &Connection, id: i64, is_active: bool) -> Result<()> {
    let updated = conn.execute(
        "UPDATE status_ticket SET is_active = ?, updated_at = ? WHERE id = ?",
        params![is_active, now_rfc3339(), id],
    )?;
    if updated == 0 {
        return Err(Error::not_found("status not found"));
    }
    Ok(())
}

/// Section-wide deactivation cascades to every owned status.
pub fn set_statuses_active_by_section(
    conn: &Connection,
    section_id: i64,
    is_active: bool,
) -> Result<()> {
    conn.execute(
        "UPDATE status_ticket SET is_active = ?, updated_at = ? WHERE section_id = ?",
        params![is_active, now_rfc3339(), section_id],
    )?;
    Ok(())
}

pub fn update_status_sequence(conn: &Connection, id: i64, sequence: i64) -> Result<()> {
    conn.execute(
        "UPDATE status_ticket SET sequence = ?, updated_at = ? WHERE id = ?",
        params![sequence, now_rfc3339(), id],
    )?;
    Ok(())
}

pub fn delete_status(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn.execute("DELETE FROM status_ticket WHERE id = ?", params![id])?;
    if deleted == 0 {
        return Err(Error::not_found("status not found"));
    }
    Ok(())
}

/// Deterministic fallback for tickets stranded by a section deactivation:
/// the most recent status in the greatest active section strictly below the
/// deactivated section's sequence.
pub fn dynamic_fallback_status_id(
    conn: &Connection,
    deactivated_section_sequence: i64,
) -> Result<Option<i64>> {
    let id: Option<i64> = conn
        .query_row(
            r#"
            SELECT st.id
            FROM status_ticket st
            JOIN section_status_ticket sst ON st.section_id = sst.id
            WHERE sst.is_active = 1
              AND sst.sequence < ?
            ORDER BY sst.sequence DESC, st.sequence DESC
            LIMIT 1"#,
            params![deactivated_section_sequence],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

// Workflows

pub fn insert_workflow(conn: &Connection, name: &str) -> Result<Workflow> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO workflow (name, is_active, created_at, updated_at) VALUES (?, 0, ?, ?)",
        params![name, now, now],
    )
    .map_err(unique_to_conflict("workflow name already exists"))?;
    Ok(Workflow {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        is_active: false,
    })
}

pub fn find_workflow(conn: &Connection, id: i64) -> Result<Option<Workflow>> {
    let workflow = conn
        .query_row(
            "SELECT id, name, is_active FROM workflow WHERE id = ?",
            params![id],
            row_to_workflow,
        )
        .optional()?;
    Ok(workflow)
}

pub fn list_workflows(conn: &Connection) -> Result<Vec<Workflow>> {
    let mut stmt = conn.prepare("SELECT id, name, is_active FROM workflow ORDER BY id ASC")?;
    let workflows = stmt
        .query_map([], row_to_workflow)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(workflows)
}

pub fn rename_workflow(conn: &Connection, id: i64, name: &str) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE workflow SET name = ?, updated_at = ? WHERE id = ?",
            params![name, now_rfc3339(), id],
        )
        .map_err(unique_to_conflict("workflow name already exists"))?;
    if updated == 0 {
        return Err(Error::not_found("workflow not found"));
    }
    Ok(())
}

pub fn set_workflow_active(conn: &Connection, id: i64, is_active: bool) -> Result<()> {
    let updated = conn.execute(
        "UPDATE workflow SET is_active = ?, updated_at = ? WHERE id = ?",
        params![is_active, now_rfc3339(), id],
    )?;
    if updated == 0 {
        return Err(Error::not_found("workflow not found"));
    }
    Ok(())
}

pub fn delete_workflow(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn.execute("DELETE FROM workflow WHERE id = ?", params![id])?;
    if deleted == 0 {
        return Err(Error::not_found("workflow not found"));
    }
    Ok(())
}

/// Replace a workflow's steps with the given ordered status ids. Sequences
/// are always rewritten as 0..k, which keeps the uniqueness invariant by
/// construction.
pub fn replace_workflow_steps(
    conn: &Connection,
    workflow_id: i64,
    ordered_status_ids: &[i64],
) -> Result<()> {
    conn.execute("DELETE FROM workflow_step WHERE workflow_id = ?", params![workflow_id])?;
    let mut stmt = conn.prepare(
        "INSERT INTO workflow_step (workflow_id, status_ticket_id, step_sequence) VALUES (?, ?, ?)",
    )?;
    for (sequence, status_id) in ordered_status_ids.iter().enumerate() {
        stmt.execute(params![workflow_id, status_id, sequence as i64])?;
    }
    Ok(())
}

pub fn workflow_steps(conn: &Connection, workflow_id: i64) -> Result<Vec<WorkflowStep>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT workflow_id, status_ticket_id, step_sequence
        FROM workflow_step
        WHERE workflow_id = ?
        ORDER BY step_sequence ASC"#,
    )?;
    let steps = stmt
        .query_map(params![workflow_id], |row| {
            Ok(WorkflowStep {
                workflow_id: row.get(0)?,
                status_ticket_id: row.get(1)?,
                step_sequence: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(steps)
}

/// Bind a position to the workflow that seeds its tickets' initial status.
pub fn map_position_to_workflow(conn: &Connection, position_id: i64, workflow_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO position_to_workflow_mapping (employee_position_id, workflow_id) VALUES (?, ?) \
         ON CONFLICT (employee_position_id) DO UPDATE SET workflow_id = excluded.workflow_id",
        params![position_id, workflow_id],
    )?;
    Ok(())
}

/// Initial status for tickets created by users of this position: the first
/// step of the position's workflow.
pub fn initial_status_for_position(conn: &Connection, position_id: i64) -> Result<Option<i64>> {
    let status_id: Option<i64> = conn
        .query_row(
            r#"
            SELECT ws.status_ticket_id
            FROM workflow_step ws
            JOIN position_to_workflow_mapping ptwm ON ws.workflow_id = ptwm.workflow_id
            WHERE ptwm.employee_position_id = ?
            ORDER BY ws.step_sequence ASC
            LIMIT 1"#,
            params![position_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(status_id)
}

/// Next step after the given status within its workflow; `None` on the final
/// step.
pub fn next_workflow_step(conn: &Connection, current_status_id: i64) -> Result<Option<i64>> {
    let next: Option<i64> = conn
        .query_row(
            r#"
            WITH current_step AS (
                SELECT workflow_id, step_sequence
                FROM workflow_step
                WHERE status_ticket_id = ?
            )
            SELECT ws.status_ticket_id
            FROM workflow_step ws
            WHERE ws.workflow_id = (SELECT workflow_id FROM current_step)
              AND ws.step_sequence = (SELECT step_sequence FROM current_step) + 1
            LIMIT 1"#,
            params![current_status_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(next)
}

// Actions, roles, mappings, transitions

pub fn insert_action(conn: &Connection, name: &str, hex_code: Option<&str>) -> Result<i64> {
    conn.execute(
        "INSERT INTO action (name, hex_code, is_active) VALUES (?, ?, 1)",
        params![name, hex_code],
    )
    .map_err(unique_to_conflict("action name already exists"))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_actor_role(conn: &Connection, name: &str) -> Result<i64> {
    conn.execute("INSERT INTO actor_role (name) VALUES (?)", params![name])
        .map_err(unique_to_conflict("actor role name already exists"))?;
    Ok(conn.last_insert_rowid())
}

pub fn role_ids_by_names(conn: &Connection, names: &[&str]) -> Result<Vec<i64>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; names.len()].join(",");
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM actor_role WHERE name IN ({placeholders})"
    ))?;
    let args: Vec<&dyn rusqlite::ToSql> = names.iter().map(|n| n as &dyn rusqlite::ToSql).collect();
    let ids = stmt
        .query_map(args.as_slice(), |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

pub fn insert_actor_role_mapping(
    conn: &Connection,
    position_id: i64,
    context: &str,
    actor_role_id: i64,
) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO actor_role_mapping (employee_position_id, context, actor_role_id) \
         VALUES (?, ?, ?)",
        params![position_id, context, actor_role_id],
    )?;
    Ok(())
}

/// Role ids granted to a position for the given contexts.
pub fn role_ids_for_contexts(
    conn: &Connection,
    position_id: i64,
    contexts: &[&str],
) -> Result<Vec<i64>> {
    if contexts.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; contexts.len()].join(",");
    let sql = format!(
        "SELECT actor_role_id FROM actor_role_mapping \
         WHERE employee_position_id = ? AND context IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut args: Vec<&dyn rusqlite::ToSql> = vec![&position_id];
    args.extend(contexts.iter().map(|c| c as &dyn rusqlite::ToSql));
    let ids = stmt
        .query_map(args.as_slice(), |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

#[allow(clippy::too_many_arguments)]
pub fn insert_transition(
    conn: &Connection,
    from_status_id: i64,
    to_status_id: i64,
    action_id: i64,
    actor_role_id: i64,
    require_reason: bool,
    reason_label: Option<&str>,
    require_file: bool,
) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO status_transition
            (from_status_id, to_status_id, action_id, actor_role_id,
             require_reason, reason_label, require_file, is_active)
        VALUES (?, ?, ?, ?, ?, ?, ?, 1)"#,
        params![
            from_status_id,
            to_status_id,
            action_id,
            actor_role_id,
            require_reason,
            reason_label,
            require_file
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// Row mappers

const STATUS_COLUMNS: &str = "id, name, sequence, is_active, section_id, hex_color";

fn row_to_section(row: &rusqlite::Row) -> rusqlite::Result<Section> {
    Ok(Section {
        id: row.get(0)?,
        name: row.get(1)?,
        sequence: row.get(2)?,
        is_active: row.get(3)?,
    })
}

fn row_to_status(row: &rusqlite::Row) -> rusqlite::Result<Status> {
    Ok(Status {
        id: row.get(0)?,
        name: row.get(1)?,
        sequence: row.get(2)?,
        is_active: row.get(3)?,
        section_id: row.get(4)?,
        hex_color: row.get(5)?,
    })
}

fn row_to_workflow(row: &rusqlite::Row) -> rusqlite::Result<Workflow> {
    Ok(Workflow {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
    })
}

fn unique_to_conflict(message: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| match &e {
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::conflict(message)
        }
        _ => Error::from(e),
    }
}
