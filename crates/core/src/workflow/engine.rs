//! The workflow engine: validates and executes actions against the
//! data-driven transition relation, updating the ledger, the action log and
//! job completion artifacts atomically.

use serde::Deserialize;

use super::registry;
use super::roles::{self, TicketRelations};
use super::store as workflow_store;
use super::types::{AvailableAction, ACTION_COMPLETE_JOB, ACTION_REVISE};
use crate::db::Database;
use crate::directory::store as directory;
use crate::error::{Error, Result};
use crate::files::{self, FileMetadata};
use crate::hub::{HubHandle, WsEvent};
use crate::ticket::action_log::{self, NewActionLogEntry};
use crate::ticket::{job, query, store as ticket_store, track};

#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteActionRequest {
    pub action_name: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub spending_amount: Option<i64>,
}

pub struct WorkflowEngine {
    db: Database,
    hub: HubHandle,
}

impl WorkflowEngine {
    pub fn new(db: Database, hub: HubHandle) -> Self {
        Self { db, hub }
    }

    /// Actions the caller may take on this ticket right now, given the roles
    /// they hold for it.
    pub fn available_actions(&self, ticket_id: i64, user_npk: &str) -> Result<Vec<AvailableAction>> {
        let conn = self.db.conn();

        let user = directory::find_employee_by_npk(&conn, user_npk)?
            .ok_or_else(|| Error::not_found("user employee not found"))?;
        let ticket = ticket_store::find_ticket(&conn, ticket_id)?
            .ok_or_else(|| Error::not_found("ticket not found"))?;
        let requestor = directory::find_employee_by_npk(&conn, &ticket.requestor)?
            .ok_or_else(|| Error::not_found("requestor employee not found"))?;
        let the_job = job::find_job_by_ticket(&conn, ticket_id)?;

        let role_ids = roles::resolve_role_ids(
            &conn,
            &user,
            TicketRelations {
                requestor_npk: &ticket.requestor,
                department_target_id: ticket.department_target_id,
                pic_npk: the_job.as_ref().and_then(|j| j.pic_job.as_deref()),
            },
            &requestor,
        )?;

        let (current_status_id, _) = track::current_status(&conn, ticket_id)?
            .ok_or_else(|| Error::not_found("current status not found"))?;

        registry::available_actions(&conn, current_status_id, &role_ids)
    }

    /// Execute a workflow action.
    ///
    /// `files` must already be stored; on error the caller owns removing
    /// them. Replaced report files are deleted from the store only after the
    /// transaction commits.
    pub fn execute_action(
        &self,
        ticket_id: i64,
        user_npk: &str,
        req: &ExecuteActionRequest,
        files: Vec<FileMetadata>,
    ) -> Result<()> {
        let available = self.available_actions(ticket_id, user_npk)?;
        let selected = available
            .into_iter()
            .find(|a| a.action_name == req.action_name)
            .ok_or_else(|| {
                Error::forbidden(
                    "user does not have the required role or action is not allowed from the \
                     current status",
                )
            })?;

        let reason = req.reason.as_deref().unwrap_or("");
        if selected.require_reason && reason.is_empty() {
            let message = match &selected.reason_label {
                Some(label) => format!("{label} is required"),
                None => "reason is required for this action".to_string(),
            };
            return Err(Error::bad_request(message));
        }
        if selected.require_file && files.is_empty() {
            return Err(Error::bad_request("file upload is required for this action"));
        }

        let detail = {
            let mut conn = self.db.conn();

            // The revise action re-enters the caller's own pipeline: its
            // destination is the initial status of the caller's position's
            // workflow, not the row's to_status.
            let destination_status_id = if req.action_name == ACTION_REVISE {
                let user = directory::find_employee_by_npk(&conn, user_npk)?
                    .ok_or_else(|| Error::not_found("user not found"))?;
                workflow_store::initial_status_for_position(&conn, user.position.id)?
                    .ok_or_else(|| {
                        Error::not_found("no workflow defined for this user's position")
                    })?
            } else {
                selected.to_status_id
            };

            let completes_job =
                req.action_name == ACTION_COMPLETE_JOB && (!files.is_empty() || req.spending_amount.is_some());

            // Replaced report files are captured up front and deleted from
            // the store only after commit.
            let old_report_files: Vec<FileMetadata> = if completes_job && !files.is_empty() {
                job::find_job_by_ticket(&conn, ticket_id)?
                    .map(|j| j.report_files)
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            let tx = conn.transaction()?;

            if completes_job {
                job::update_completion_details(&tx, ticket_id, &files, req.spending_amount)?;
            }

            let (current_status_id, _) = track::current_status(&tx, ticket_id)?
                .ok_or_else(|| Error::not_found("current status not found"))?;

            action_log::insert(
                &tx,
                &NewActionLogEntry {
                    ticket_id,
                    action_id: selected.action_id,
                    performed_by_npk: user_npk.to_string(),
                    details_text: (!reason.is_empty()).then(|| reason.to_string()),
                    file_paths: files.iter().map(|f| f.file_path.clone()).collect(),
                    from_status_id: Some(current_status_id),
                    to_status_id: destination_status_id,
                },
            )?;

            track::change_status(&tx, ticket_id, destination_status_id)?;

            tx.commit()?;

            if !old_report_files.is_empty() {
                files::remove_files(old_report_files.iter().map(|f| f.file_path.clone()));
            }

            query::ticket_detail(&conn, ticket_id)?
        };

        match detail {
            Some(detail) => {
                self.hub
                    .try_broadcast(WsEvent::TicketStatusChanged(Box::new(detail)));
            }
            None => {
                tracing::error!(
                    "Failed to fetch updated ticket {} for broadcast after action",
                    ticket_id
                );
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WorkflowWorld;
    use crate::ticket::track::open_row_count;

    fn execute(
        world: &WorkflowWorld,
        ticket_id: i64,
        npk: &str,
        action: &str,
    ) -> Result<()> {
        world.engine().execute_action(
            ticket_id,
            npk,
            &ExecuteActionRequest {
                action_name: action.to_string(),
                reason: None,
                spending_amount: None,
            },
            Vec::new(),
        )
    }

    #[tokio::test]
    async fn test_available_actions_for_approver() {
        let world = WorkflowWorld::new().await;
        let ticket = world.create_ticket("R1");

        // The requestor-department approver sees the approve and reject
        // actions at the initial status.
        let actions = world.engine().available_actions(ticket, "A1").unwrap();
        let names: Vec<&str> = actions.iter().map(|a| a.action_name.as_str()).collect();
        assert!(names.contains(&"Setujui"));
        assert!(names.contains(&"Tolak"));

        // An unrelated worker sees nothing.
        let actions = world.engine().available_actions(ticket, "W1").unwrap();
        assert!(actions.is_empty());
    }

    #[tokio::test]
    async fn test_execute_happy_path_moves_status_and_logs() {
        let world = WorkflowWorld::new().await;
        let ticket = world.create_ticket("R1");

        execute(&world, ticket, "A1", "Setujui").unwrap();

        let conn = world.db.conn();
        let (status_id, name) = track::current_status(&conn, ticket).unwrap().unwrap();
        assert_eq!(status_id, world.status_approved);
        assert_eq!(name, "Disetujui");
        assert_eq!(open_row_count(&conn, ticket).unwrap(), 1);

        let log = action_log::list_by_ticket(&conn, ticket).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].from_status_id, Some(world.status_new));
        assert_eq!(log[0].to_status_id, world.status_approved);
        assert_eq!(log[0].performed_by_npk, "A1");
    }

    #[tokio::test]
    async fn test_execute_emits_status_changed_event() {
        let world = WorkflowWorld::new().await;
        let mut rx = world.attach_client("c1", 99).await;
        let ticket = world.create_ticket("R1");
        // Drain the TICKET_CREATED event.
        let created = world.recv_event(&mut rx).await;
        assert!(created.contains("TICKET_CREATED"));

        execute(&world, ticket, "A1", "Setujui").unwrap();
        let seen = world.recv_event(&mut rx).await;
        assert!(seen.contains("TICKET_STATUS_CHANGED"));
        assert!(seen.contains("Disetujui"));
    }

    #[tokio::test]
    async fn test_unauthorized_actor_is_rejected() {
        let world = WorkflowWorld::new().await;
        let ticket = world.create_ticket("R1");

        let err = execute(&world, ticket, "W1", "Setujui").unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));

        // Nothing changed.
        let conn = world.db.conn();
        assert_eq!(
            track::current_status(&conn, ticket).unwrap().unwrap().0,
            world.status_new
        );
        assert!(action_log::list_by_ticket(&conn, ticket).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reason_requirement_uses_label() {
        let world = WorkflowWorld::new().await;
        let ticket = world.create_ticket("R1");

        let err = execute(&world, ticket, "A1", "Tolak").unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(err.to_string(), "rejection reason is required");

        world
            .engine()
            .execute_action(
                ticket,
                "A1",
                &ExecuteActionRequest {
                    action_name: "Tolak".to_string(),
                    reason: Some("incomplete".to_string()),
                    spending_amount: None,
                },
                Vec::new(),
            )
            .unwrap();

        let conn = world.db.conn();
        let log = action_log::list_by_ticket(&conn, ticket).unwrap();
        assert_eq!(log[0].details_text.as_deref(), Some("incomplete"));
    }

    #[tokio::test]
    async fn test_file_requirement_enforced() {
        let world = WorkflowWorld::new().await;
        let ticket = world.create_ticket("R1");
        world.drive_to_in_progress(ticket);

        let err = execute(&world, ticket, "W1", "Selesaikan Job").unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(err.to_string(), "file upload is required for this action");
    }

    #[tokio::test]
    async fn test_complete_job_replaces_report_files() {
        let world = WorkflowWorld::new().await;
        let ticket = world.create_ticket("R1");
        world.drive_to_in_progress(ticket);

        let report = vec![FileMetadata {
            file_name: "report.pdf".to_string(),
            file_path: "/nonexistent/report.pdf".to_string(),
            content_type: None,
            size: 4,
        }];
        world
            .engine()
            .execute_action(
                ticket,
                "W1",
                &ExecuteActionRequest {
                    action_name: "Selesaikan Job".to_string(),
                    reason: None,
                    spending_amount: Some(250_000),
                },
                report,
            )
            .unwrap();

        let conn = world.db.conn();
        let the_job = job::find_job_by_ticket(&conn, ticket).unwrap().unwrap();
        assert_eq!(the_job.report_files.len(), 1);
        assert_eq!(the_job.spending_amount, Some(250_000));
        assert_eq!(
            track::current_status(&conn, ticket).unwrap().unwrap().1,
            "Selesai"
        );
    }

    #[tokio::test]
    async fn test_revise_reroutes_to_callers_initial_status() {
        let world = WorkflowWorld::new().await;
        let ticket = world.create_ticket("R1");
        execute(&world, ticket, "A1", "Setujui").unwrap();

        // The raw transition row points elsewhere, but revise must land on
        // the first step of the caller's position's workflow.
        execute(&world, ticket, "R1", "Revisi").unwrap();

        let conn = world.db.conn();
        assert_eq!(
            track::current_status(&conn, ticket).unwrap().unwrap().0,
            world.status_new
        );
    }

    #[tokio::test]
    async fn test_ledger_keeps_single_open_row_across_actions() {
        let world = WorkflowWorld::new().await;
        let ticket = world.create_ticket("R1");

        execute(&world, ticket, "A1", "Setujui").unwrap();
        execute(&world, ticket, "R1", "Revisi").unwrap();
        execute(&world, ticket, "A1", "Setujui").unwrap();

        let conn = world.db.conn();
        assert_eq!(open_row_count(&conn, ticket).unwrap(), 1);
        assert_eq!(track::history(&conn, ticket).unwrap().len(), 4);

        let log = action_log::list_by_ticket(&conn, ticket).unwrap();
        assert_eq!(log.len(), 3);
        // Every log row's (from, to) pair chains through the ledger.
        assert_eq!(log[0].from_status_id, Some(world.status_new));
        assert_eq!(log[1].from_status_id, Some(world.status_approved));
        assert_eq!(log[1].to_status_id, world.status_new);
    }
}
