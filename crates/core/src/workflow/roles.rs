//! Contextual role resolution.
//!
//! A user holds roles per ticket, not globally: the contexts below are pure
//! relational checks computed at action time, then mapped to role ids through
//! the position's actor-role mapping.

use rusqlite::Connection;

use super::store::{role_ids_by_names, role_ids_for_contexts};
use super::types::{
    CONTEXT_ASSIGNED, CONTEXT_REQUESTOR_DEPT, CONTEXT_SELF, CONTEXT_TARGET_DEPT, ROLE_ASSIGNED_PIC,
};
use crate::directory::Employee;
use crate::error::Result;

/// Relationship facts the resolver needs about one ticket.
#[derive(Debug, Clone, Copy)]
pub struct TicketRelations<'a> {
    pub requestor_npk: &'a str,
    pub department_target_id: i64,
    /// The companion job's assigned worker, if any.
    pub pic_npk: Option<&'a str>,
}

/// Compute the contexts a user holds for a specific ticket.
pub fn determine_contexts<'a>(
    user: &Employee,
    relations: TicketRelations<'a>,
    requestor: &Employee,
) -> Vec<&'static str> {
    let mut contexts = Vec::new();
    if user.npk == relations.requestor_npk {
        contexts.push(CONTEXT_SELF);
    }
    if user.department_id == requestor.department_id {
        contexts.push(CONTEXT_REQUESTOR_DEPT);
    }
    if user.department_id == relations.department_target_id {
        contexts.push(CONTEXT_TARGET_DEPT);
    }
    if relations.pic_npk == Some(user.npk.as_str()) {
        contexts.push(CONTEXT_ASSIGNED);
    }
    contexts
}

/// Resolve the full role-id set for authorization checks.
///
/// Contexts go through the actor-role mapping; the assigned-PIC relationship
/// is additionally resolved through the well-known role name and unioned in.
/// The empty result denies every gated operation.
pub fn resolve_role_ids(
    conn: &Connection,
    user: &Employee,
    relations: TicketRelations<'_>,
    requestor: &Employee,
) -> Result<Vec<i64>> {
    let contexts = determine_contexts(user, relations, requestor);
    let mut role_ids = role_ids_for_contexts(conn, user.position.id, &contexts)?;

    if relations.pic_npk == Some(user.npk.as_str()) {
        role_ids.extend(role_ids_by_names(conn, &[ROLE_ASSIGNED_PIC])?);
    }

    role_ids.sort_unstable();
    role_ids.dedup();
    Ok(role_ids)
}
