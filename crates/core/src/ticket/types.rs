//! Core ticket and job data types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::files::FileMetadata;

/// A work request filed by a requestor against a target department.
///
/// `ticket_priority` is 1-based within the target department; the values for
/// one department always form a permutation of 1..N after renumbering.
/// Tickets are never deleted; retention is by status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub requestor: String,
    pub department_target_id: i64,
    pub physical_location_id: Option<i64>,
    pub specified_location_id: Option<i64>,
    pub description: String,
    pub ticket_priority: i64,
    /// Optimistic concurrency counter, bumped by every write.
    pub version: i64,
    pub deadline: Option<NaiveDate>,
    pub support_files: Vec<FileMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The execution-side twin of a ticket, created on submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    pub ticket_id: i64,
    /// Assigned worker, if any.
    pub pic_job: Option<String>,
    pub job_priority: i64,
    pub report_files: Vec<FileMetadata>,
    pub spending_amount: Option<i64>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the append-only status ledger. At any instant exactly one row
/// per ticket has `finish_date = NULL`; that row is the current status.
#[derive(Debug, Clone)]
pub struct TrackStatusRow {
    pub id: i64,
    pub ticket_id: i64,
    pub status_ticket_id: i64,
    pub start_date: DateTime<Utc>,
    pub finish_date: Option<DateTime<Utc>>,
}

/// Audit record of one executed workflow action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: i64,
    pub ticket_id: i64,
    pub action_id: i64,
    pub performed_by_npk: String,
    pub details_text: Option<String>,
    pub file_paths: Vec<String>,
    pub from_status_id: Option<i64>,
    pub to_status_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Feedback record created when a reject action fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedTicket {
    pub id: i64,
    pub ticket_id: i64,
    pub rejected_by_npk: String,
    pub feedback: String,
    pub already_seen: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a ticket.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub requestor: String,
    pub department_target_id: i64,
    pub physical_location_id: Option<i64>,
    pub specified_location_id: Option<i64>,
    pub description: String,
    pub ticket_priority: i64,
    pub deadline: Option<NaiveDate>,
    pub support_files: Vec<FileMetadata>,
}

/// Rehydrated ticket view broadcast with events and served by the query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    pub id: i64,
    pub description: String,
    pub department_target_id: i64,
    pub department_target_name: Option<String>,
    pub ticket_priority: i64,
    pub version: i64,
    pub job_id: Option<i64>,
    pub job_priority: Option<i64>,
    pub job_version: Option<i64>,
    pub physical_location_name: Option<String>,
    pub specified_location_name: Option<String>,
    pub created_at: String,
    pub ticket_age_days: i64,
    pub deadline: Option<String>,
    pub days_remaining: Option<i64>,
    pub requestor_npk: String,
    pub requestor_name: Option<String>,
    pub requestor_department: Option<String>,
    pub pic_npk: Option<String>,
    pub pic_name: Option<String>,
    pub pic_area_name: Option<String>,
    pub current_status: Option<String>,
    pub current_status_hex_code: Option<String>,
    pub current_section_name: Option<String>,
    pub support_files: Vec<FileMetadata>,
    pub report_files: Vec<FileMetadata>,
    pub spending_amount: Option<i64>,
}

/// Filter for the ticket list query.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub section_id: Option<i64>,
    pub status_ids: Vec<i64>,
    pub department_target_id: Option<i64>,
    pub requestor_department_ids: Vec<i64>,
    pub requestors: Vec<String>,
    pub pic_npks: Vec<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub search: Option<String>,
    /// Comma-separated `column_direction` pairs, e.g. `priority_asc,age_desc`.
    pub sort_by: Option<String>,
}

/// Optimistic update payload for a ticket.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTicketRequest {
    pub department_target_id: i64,
    pub description: String,
    pub physical_location_id: Option<i64>,
    pub specified_location_name: Option<String>,
    /// `YYYY-MM-DD`
    pub deadline: Option<String>,
    pub version: i64,
}

/// Scheduler input rows: the open ticket subset per department.
#[derive(Debug, Clone)]
pub struct OpenTicket {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub ticket_priority: i64,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct OpenJob {
    pub id: i64,
    pub job_priority: i64,
    pub ticket: OpenTicket,
}
