//! Workflow reference data: sections, statuses, workflows, actions, roles
//! and the transition relation.

use serde::{Deserialize, Serialize};

/// A band of statuses representing a life-cycle phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub id: i64,
    pub name: String,
    pub sequence: i64,
    pub is_active: bool,
}

/// A named state a ticket occupies.
///
/// Status sequences are signed and partition the statuses into three bands:
/// `<= -100` deleted, `-99..=-1` approval, `>= 0` actual work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub id: i64,
    pub name: String,
    pub sequence: i64,
    pub is_active: bool,
    pub section_id: i64,
    pub hex_color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub workflow_id: i64,
    pub status_ticket_id: i64,
    pub step_sequence: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: i64,
    pub name: String,
    pub hex_code: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorRole {
    pub id: i64,
    pub name: String,
}

/// One row of the (from, action, actor-role) -> to relation.
#[derive(Debug, Clone)]
pub struct Transition {
    pub id: i64,
    pub from_status_id: i64,
    pub to_status_id: i64,
    pub action_id: i64,
    pub actor_role_id: i64,
    pub require_reason: bool,
    pub reason_label: Option<String>,
    pub require_file: bool,
    pub is_active: bool,
}

/// An action the caller may take right now, as surfaced to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableAction {
    pub action_name: String,
    pub action_id: i64,
    pub to_status_id: i64,
    pub hex_code: Option<String>,
    pub require_reason: bool,
    pub reason_label: Option<String>,
    pub require_file: bool,
}

/// Contextual relationship between a user and a ticket, computed at action
/// time. The assigned-PIC relationship bypasses the mapping table and is
/// resolved through the well-known `ASSIGNED_PIC` role instead.
pub const CONTEXT_SELF: &str = "SELF";
pub const CONTEXT_REQUESTOR_DEPT: &str = "REQUESTOR_DEPT";
pub const CONTEXT_TARGET_DEPT: &str = "TARGET_DEPT";
pub const CONTEXT_ASSIGNED: &str = "ASSIGNED";

/// Role name unioned in for the job's assigned worker.
pub const ROLE_ASSIGNED_PIC: &str = "ASSIGNED_PIC";

/// Action whose destination is re-resolved from the caller's workflow.
pub const ACTION_REVISE: &str = "Revisi";

/// Action that also captures job completion artifacts.
pub const ACTION_COMPLETE_JOB: &str = "Selesaikan Job";

/// Statuses counted as open work by the schedulers.
pub const OPEN_WORK_STATUSES: [&str; 2] = ["Menunggu Job", "Dikerjakan"];

/// Status a ticket lands in when a rejection record is filed.
pub const STATUS_REJECTED: &str = "Ditolak";
