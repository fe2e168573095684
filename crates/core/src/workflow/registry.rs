//! Read operations over the transition relation.

use std::collections::HashSet;

use rusqlite::{params, Connection};

use super::types::AvailableAction;
use crate::error::{Error, Result};

/// Resolve `(from_status, action_name)` to the unique destination status and
/// the set of actor roles permitted to perform it.
///
/// Several rows may share `(from_status, action)` differing only in actor
/// role; they must all agree on the destination. Returns `None` when no
/// active row matches.
pub fn find_valid_transition(
    conn: &Connection,
    from_status_id: i64,
    action_name: &str,
) -> Result<Option<(i64, Vec<i64>)>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT st.to_status_id, st.actor_role_id
        FROM status_transition st
        JOIN action a ON st.action_id = a.id
        WHERE st.from_status_id = ? AND a.name = ? AND st.is_active = 1"#,
    )?;

    let mut rows = stmt.query(params![from_status_id, action_name])?;
    let mut to_status_id: Option<i64> = None;
    let mut allowed_role_ids = Vec::new();

    while let Some(row) = rows.next()? {
        let current_to: i64 = row.get(0)?;
        let role_id: i64 = row.get(1)?;

        match to_status_id {
            None => to_status_id = Some(current_to),
            Some(existing) if existing != current_to => {
                return Err(Error::conflict(format!(
                    "data inconsistency: action '{action_name}' from status {from_status_id} \
                     leads to multiple different to_statuses"
                )));
            }
            Some(_) => {}
        }
        allowed_role_ids.push(role_id);
    }

    Ok(to_status_id.map(|to| (to, allowed_role_ids)))
}

/// Actions available from `from_status` to a caller holding `role_ids`,
/// deduplicated on action name. The empty role set can do nothing.
pub fn available_actions(
    conn: &Connection,
    from_status_id: i64,
    role_ids: &[i64],
) -> Result<Vec<AvailableAction>> {
    if role_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; role_ids.len()].join(",");
    let sql = format!(
        r#"
        SELECT a.name, a.id, st.to_status_id, a.hex_code,
               st.require_reason, st.reason_label, st.require_file
        FROM status_transition st
        JOIN action a ON st.action_id = a.id
        WHERE st.from_status_id = ?
          AND st.actor_role_id IN ({placeholders})
          AND st.is_active = 1
          AND a.is_active = 1
        ORDER BY a.id"#
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut args: Vec<&dyn rusqlite::ToSql> = vec![&from_status_id];
    args.extend(role_ids.iter().map(|id| id as &dyn rusqlite::ToSql));

    let rows = stmt.query_map(args.as_slice(), |row| {
        Ok(AvailableAction {
            action_name: row.get(0)?,
            action_id: row.get(1)?,
            to_status_id: row.get(2)?,
            hex_code: row.get(3)?,
            require_reason: row.get(4)?,
            reason_label: row.get(5)?,
            require_file: row.get(6)?,
        })
    })?;

    let mut seen = HashSet::new();
    let mut actions = Vec::new();
    for row in rows {
        let action = row?;
        if seen.insert(action.action_name.clone()) {
            actions.push(action);
        }
    }
    Ok(actions)
}
