//! Ticket lifecycle coordinator: create, update, attach/detach files, assign
//! the job's PIC. Mutations publish events through the hub strictly after
//! commit.

use rusqlite::Connection;
use serde::Deserialize;

use super::types::{NewTicket, Ticket, TicketDetail, TicketFilter, UpdateTicketRequest};
use super::{job, query, store, track};
use crate::db::{parse_deadline, Database};
use crate::directory::store as directory;
use crate::error::{Error, Result};
use crate::files::{self, FileMetadata};
use crate::hub::{HubHandle, WsEvent};
use crate::workflow::registry;
use crate::workflow::roles::{self, TicketRelations};
use crate::workflow::store as workflow_store;
use crate::workflow::types::ACTION_REVISE;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    pub department_target_id: i64,
    pub description: String,
    pub physical_location_id: Option<i64>,
    pub specified_location_name: Option<String>,
    /// `YYYY-MM-DD`
    pub deadline: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignPicRequest {
    pub pic_npk: String,
}

pub struct TicketService {
    db: Database,
    hub: HubHandle,
}

impl TicketService {
    pub fn new(db: Database, hub: HubHandle) -> Self {
        Self { db, hub }
    }

    /// Create a ticket, its companion job and the initial ledger row in one
    /// transaction. The initial status comes from the requestor's position's
    /// workflow.
    ///
    /// `files` must already be stored; on error the caller owns removing them.
    pub fn create_ticket(
        &self,
        req: &CreateTicketRequest,
        requestor_npk: &str,
        files: Vec<FileMetadata>,
    ) -> Result<TicketDetail> {
        let detail = {
            let mut conn = self.db.conn();

            let department = directory::find_department(&conn, req.department_target_id)?
                .filter(|d| d.is_active)
                .ok_or_else(|| Error::not_found("department not found or is not active"))?;
            if !department.receive_job {
                return Err(Error::bad_request(
                    "selected target department cannot receive jobs",
                ));
            }

            let requestor = directory::find_employee_by_npk(&conn, requestor_npk)?
                .ok_or_else(|| Error::not_found("requestor not found"))?;

            let initial_status_id =
                workflow_store::initial_status_for_position(&conn, requestor.position.id)?
                    .ok_or_else(|| {
                        Error::not_found("no workflow defined for this user's position")
                    })?;

            let deadline = parse_deadline(req.deadline.as_deref())?;

            let tx = conn.transaction()?;

            let specified_location_id = match (&req.specified_location_name, req.physical_location_id)
            {
                (Some(name), Some(physical_id)) => Some(
                    directory::find_or_create_specified_location(&tx, name, physical_id)?,
                ),
                _ => None,
            };

            let priority = store::last_priority(&tx, req.department_target_id)?;

            let ticket = store::insert_ticket(
                &tx,
                NewTicket {
                    requestor: requestor_npk.to_string(),
                    department_target_id: req.department_target_id,
                    physical_location_id: req.physical_location_id,
                    specified_location_id,
                    description: req.description.clone(),
                    ticket_priority: priority,
                    deadline,
                    support_files: files,
                },
            )?;
            job::insert_job(&tx, ticket.id, ticket.ticket_priority)?;
            track::create_initial_status(&tx, ticket.id, initial_status_id)?;

            tx.commit()?;

            query::ticket_detail(&conn, ticket.id)?
                .ok_or_else(|| Error::Database("ticket vanished after create".into()))?
        };

        self.hub
            .try_broadcast(WsEvent::TicketCreated(Box::new(detail.clone())));
        Ok(detail)
    }

    /// Update a ticket. Permitted only while the revise transition is
    /// available to the caller from the current status; optimistic on the
    /// ticket version.
    pub fn update_ticket(
        &self,
        ticket_id: i64,
        req: &UpdateTicketRequest,
        user_npk: &str,
    ) -> Result<TicketDetail> {
        let detail = {
            let mut conn = self.db.conn();

            let ticket = store::find_ticket(&conn, ticket_id)?
                .ok_or_else(|| Error::not_found("ticket not found"))?;
            self.authorize_revise(&conn, &ticket, user_npk)?;

            let tx = conn.transaction()?;

            let specified_location_id = match (&req.specified_location_name, req.physical_location_id)
            {
                (Some(name), Some(physical_id)) => Some(
                    directory::find_or_create_specified_location(&tx, name, physical_id)?,
                ),
                _ => None,
            };

            let updated = store::update_ticket(&tx, ticket_id, req, specified_location_id)?;
            if updated == 0 {
                return Err(Error::conflict(
                    "data conflict: ticket has been modified by another user, please refresh",
                ));
            }

            tx.commit()?;

            query::ticket_detail(&conn, ticket_id)?
                .ok_or_else(|| Error::not_found("ticket not found"))?
        };

        self.hub
            .try_broadcast(WsEvent::TicketUpdated(Box::new(detail.clone())));
        Ok(detail)
    }

    /// Append support files. Same authorization as update. `files` must
    /// already be stored; on error the caller owns removing them.
    pub fn add_support_files(
        &self,
        ticket_id: i64,
        user_npk: &str,
        files: Vec<FileMetadata>,
    ) -> Result<TicketDetail> {
        if files.is_empty() {
            return self.get_ticket(ticket_id);
        }

        let detail = {
            let conn = self.db.conn();
            let ticket = store::find_ticket(&conn, ticket_id)?
                .ok_or_else(|| Error::not_found("ticket not found"))?;
            self.authorize_revise(&conn, &ticket, user_npk)?;

            store::add_support_files(&conn, ticket_id, &files)?;

            query::ticket_detail(&conn, ticket_id)?
                .ok_or_else(|| Error::not_found("ticket not found"))?
        };

        self.hub
            .try_broadcast(WsEvent::TicketUpdated(Box::new(detail.clone())));
        Ok(detail)
    }

    /// Detach support files by path, then best-effort delete them from the
    /// store. Same authorization as update.
    pub fn remove_support_files(
        &self,
        ticket_id: i64,
        user_npk: &str,
        paths: Vec<String>,
    ) -> Result<TicketDetail> {
        let detail = {
            let conn = self.db.conn();
            let ticket = store::find_ticket(&conn, ticket_id)?
                .ok_or_else(|| Error::not_found("ticket not found"))?;
            self.authorize_revise(&conn, &ticket, user_npk)?;

            store::remove_support_files(&conn, ticket_id, &paths)?;

            query::ticket_detail(&conn, ticket_id)?
                .ok_or_else(|| Error::not_found("ticket not found"))?
        };

        files::remove_files(&paths);

        self.hub
            .try_broadcast(WsEvent::TicketUpdated(Box::new(detail.clone())));
        Ok(detail)
    }

    /// Assign the job's PIC. Both the caller and the new PIC must belong to
    /// the job's target department.
    pub fn assign_pic(&self, job_id: i64, req: &AssignPicRequest, user_npk: &str) -> Result<TicketDetail> {
        let detail = {
            let conn = self.db.conn();

            let user = directory::find_employee_by_npk(&conn, user_npk)?
                .ok_or_else(|| Error::not_found("action performer not found"))?;
            let the_job = job::find_job(&conn, job_id)?
                .ok_or_else(|| Error::not_found("job not found"))?;
            let new_pic = directory::find_employee_by_npk(&conn, &req.pic_npk)?
                .ok_or_else(|| Error::not_found("new PIC employee data not found"))?;
            let department = job::job_department(&conn, job_id)?
                .ok_or_else(|| Error::not_found("job not found"))?;

            if user.department_id != department {
                return Err(Error::forbidden(
                    "user is not authorized to assign PIC for this job's department",
                ));
            }
            if new_pic.department_id != department {
                return Err(Error::forbidden(
                    "new PIC must be from the same department as the job",
                ));
            }

            job::assign_pic(&conn, job_id, &req.pic_npk)?;

            query::ticket_detail(&conn, the_job.ticket_id)?
                .ok_or_else(|| Error::not_found("ticket not found"))?
        };

        self.hub
            .try_broadcast(WsEvent::TicketUpdated(Box::new(detail.clone())));
        Ok(detail)
    }

    pub fn get_ticket(&self, ticket_id: i64) -> Result<TicketDetail> {
        let conn = self.db.conn();
        query::ticket_detail(&conn, ticket_id)?.ok_or_else(|| Error::not_found("ticket not found"))
    }

    pub fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<TicketDetail>> {
        let conn = self.db.conn();
        query::list_tickets(&conn, filter)
    }

    pub fn list_jobs(&self, filter: &TicketFilter) -> Result<Vec<TicketDetail>> {
        let conn = self.db.conn();
        query::list_jobs(&conn, filter)
    }

    /// The caller may edit a ticket iff the revise action is currently
    /// available to them, resolved the same way the engine resolves actions.
    fn authorize_revise(&self, conn: &Connection, ticket: &Ticket, user_npk: &str) -> Result<()> {
        let user = directory::find_employee_by_npk(conn, user_npk)?
            .ok_or_else(|| Error::not_found("user not found"))?;
        let requestor = directory::find_employee_by_npk(conn, &ticket.requestor)?
            .ok_or_else(|| Error::not_found("original requestor not found"))?;
        let (current_status_id, _) = track::current_status(conn, ticket.id)?
            .ok_or_else(|| Error::conflict("could not retrieve current ticket status"))?;

        let role_ids = roles::resolve_role_ids(
            conn,
            &user,
            TicketRelations {
                requestor_npk: &ticket.requestor,
                department_target_id: ticket.department_target_id,
                pic_npk: None,
            },
            &requestor,
        )?;

        let Some((_, allowed_role_ids)) =
            registry::find_valid_transition(conn, current_status_id, ACTION_REVISE)?
        else {
            return Err(Error::conflict("ticket cannot be edited in its current state"));
        };

        let authorized = role_ids.iter().any(|id| allowed_role_ids.contains(id));
        if !authorized {
            return Err(Error::forbidden("user is not authorized to edit this ticket"));
        }
        Ok(())
    }
}
