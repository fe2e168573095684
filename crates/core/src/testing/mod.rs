//! Test fixtures: a fully seeded workflow world with two departments, a
//! position-bound workflow and the standard transition set. Used by unit
//! tests here and the server's integration tests.

use tokio::sync::mpsc::Receiver;

use crate::auth::password::{generate_salt, hash_password};
use crate::db::Database;
use crate::directory::store as directory;
use crate::hub::{create_hub, Client, HubHandle, CLIENT_BUFFER};
use crate::ticket::{CreateTicketRequest, TicketService};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::store as wf;
use crate::workflow::types::{
    CONTEXT_REQUESTOR_DEPT, CONTEXT_SELF, CONTEXT_TARGET_DEPT, ROLE_ASSIGNED_PIC, STATUS_REJECTED,
};

/// Password shared by every seeded login account.
pub const TEST_PASSWORD: &str = "rahasia123";

/// A seeded world:
///
/// - departments: `GA` (requestor side), `Maintenance` (target, receives jobs)
/// - employees: `R1` staff @GA, `A1` head @GA, `M1` head @Maintenance,
///   `W1` worker @Maintenance; login accounts for each plus a master `admin`
/// - workflow `Alur Staff` bound to the staff position with steps
///   Baru → Disetujui → Menunggu Job → Dikerjakan → Selesai
/// - transitions: Setujui, Tolak (reason), Revisi, Teruskan, Kerjakan,
///   Selesaikan Job (file)
pub struct WorkflowWorld {
    pub db: Database,
    pub hub: HubHandle,
    pub dept_requestor: i64,
    pub dept_target: i64,
    pub position_staff: i64,
    pub position_head: i64,
    pub position_worker: i64,
    pub section_approval: i64,
    pub section_work: i64,
    pub status_new: i64,
    pub status_approved: i64,
    pub status_waiting: i64,
    pub status_in_progress: i64,
    pub status_done: i64,
    pub status_rejected: i64,
    pub workflow_id: i64,
}

impl WorkflowWorld {
    pub async fn new() -> Self {
        let db = Database::in_memory().unwrap();
        let (hub, hub_task) = create_hub();
        tokio::spawn(hub_task.run());
        Self::seed(db, hub)
    }

    fn seed(db: Database, hub: HubHandle) -> Self {
        let world = {
            let conn = db.conn();

            let dept_requestor = directory::insert_department(&conn, "GA", true, false).unwrap();
            let dept_target =
                directory::insert_department(&conn, "Maintenance", true, true).unwrap();
            let area = directory::insert_area(&conn, "Plant 1").unwrap();

            let position_staff = directory::insert_position(&conn, "Staff").unwrap();
            let position_head = directory::insert_position(&conn, "Head of Department").unwrap();
            let position_worker = directory::insert_position(&conn, "Teknisi").unwrap();
            let position_admin = directory::insert_position(&conn, "System Admin").unwrap();

            directory::insert_employee(&conn, "R1", "Rina", dept_requestor, Some(area), position_staff).unwrap();
            directory::insert_employee(&conn, "A1", "Agus", dept_requestor, None, position_head).unwrap();
            directory::insert_employee(&conn, "M1", "Maman", dept_target, None, position_head).unwrap();
            directory::insert_employee(&conn, "W1", "Wawan", dept_target, Some(area), position_worker).unwrap();

            for (username, npk, position, user_type) in [
                ("rina", Some("R1"), position_staff, "regular"),
                ("agus", Some("A1"), position_head, "regular"),
                ("maman", Some("M1"), position_head, "regular"),
                ("wawan", Some("W1"), position_worker, "regular"),
                ("admin", None, position_admin, "master"),
            ] {
                let salt = generate_salt();
                let hash = hash_password(TEST_PASSWORD, &salt);
                directory::insert_app_user(&conn, username, &hash, &salt, user_type, npk, position)
                    .unwrap();
            }

            let section_approval = wf::insert_section(&conn, "Persetujuan", 1).unwrap().id;
            let section_work = wf::insert_section(&conn, "Pengerjaan", 2).unwrap().id;

            let status_rejected =
                wf::insert_status(&conn, STATUS_REJECTED, -100, section_approval, Some("#9e9e9e"))
                    .unwrap()
                    .id;
            let status_new =
                wf::insert_status(&conn, "Baru", -2, section_approval, Some("#2196f3")).unwrap().id;
            let status_approved =
                wf::insert_status(&conn, "Disetujui", -1, section_approval, Some("#4caf50"))
                    .unwrap()
                    .id;
            let status_waiting =
                wf::insert_status(&conn, "Menunggu Job", 0, section_work, Some("#ff9800"))
                    .unwrap()
                    .id;
            let status_in_progress =
                wf::insert_status(&conn, "Dikerjakan", 1, section_work, Some("#ffc107"))
                    .unwrap()
                    .id;
            let status_done =
                wf::insert_status(&conn, "Selesai", 2, section_work, Some("#8bc34a")).unwrap().id;

            let workflow_id = wf::insert_workflow(&conn, "Alur Staff").unwrap().id;
            wf::replace_workflow_steps(
                &conn,
                workflow_id,
                &[status_new, status_approved, status_waiting, status_in_progress, status_done],
            )
            .unwrap();
            wf::set_workflow_active(&conn, workflow_id, true).unwrap();
            wf::map_position_to_workflow(&conn, position_staff, workflow_id).unwrap();

            let role_owner = wf::insert_actor_role(&conn, "TICKET_OWNER").unwrap();
            let role_req_approver = wf::insert_actor_role(&conn, "REQUESTOR_DEPT_APPROVER").unwrap();
            let role_target_head = wf::insert_actor_role(&conn, "TARGET_DEPT_HEAD").unwrap();
            let role_pic = wf::insert_actor_role(&conn, ROLE_ASSIGNED_PIC).unwrap();

            wf::insert_actor_role_mapping(&conn, position_staff, CONTEXT_SELF, role_owner).unwrap();
            wf::insert_actor_role_mapping(&conn, position_head, CONTEXT_REQUESTOR_DEPT, role_req_approver).unwrap();
            wf::insert_actor_role_mapping(&conn, position_head, CONTEXT_TARGET_DEPT, role_target_head).unwrap();

            let act_approve = wf::insert_action(&conn, "Setujui", Some("#4caf50")).unwrap();
            let act_reject = wf::insert_action(&conn, "Tolak", Some("#f44336")).unwrap();
            let act_revise = wf::insert_action(&conn, "Revisi", Some("#03a9f4")).unwrap();
            let act_forward = wf::insert_action(&conn, "Teruskan", Some("#673ab7")).unwrap();
            let act_work = wf::insert_action(&conn, "Kerjakan", Some("#ff9800")).unwrap();
            let act_complete = wf::insert_action(&conn, "Selesaikan Job", Some("#8bc34a")).unwrap();

            wf::insert_transition(&conn, status_new, status_approved, act_approve, role_req_approver, false, None, false).unwrap();
            wf::insert_transition(&conn, status_new, status_rejected, act_reject, role_req_approver, true, Some("rejection reason"), false).unwrap();
            wf::insert_transition(&conn, status_new, status_new, act_revise, role_owner, false, None, false).unwrap();
            wf::insert_transition(&conn, status_approved, status_new, act_revise, role_owner, false, None, false).unwrap();
            wf::insert_transition(&conn, status_approved, status_waiting, act_forward, role_target_head, false, None, false).unwrap();
            wf::insert_transition(&conn, status_waiting, status_in_progress, act_work, role_pic, false, None, false).unwrap();
            wf::insert_transition(&conn, status_in_progress, status_done, act_complete, role_pic, false, None, true).unwrap();

            WorkflowWorld {
                db: db.clone(),
                hub,
                dept_requestor,
                dept_target,
                position_staff,
                position_head,
                position_worker,
                section_approval,
                section_work,
                status_new,
                status_approved,
                status_waiting,
                status_in_progress,
                status_done,
                status_rejected,
                workflow_id,
            }
        };
        world
    }

    pub fn engine(&self) -> WorkflowEngine {
        WorkflowEngine::new(self.db.clone(), self.hub.clone())
    }

    pub fn ticket_service(&self) -> TicketService {
        TicketService::new(self.db.clone(), self.hub.clone())
    }

    /// Create a ticket through the full lifecycle coordinator.
    pub fn create_ticket(&self, requestor_npk: &str) -> i64 {
        self.create_ticket_with_deadline(requestor_npk, None)
    }

    pub fn create_ticket_with_deadline(
        &self,
        requestor_npk: &str,
        deadline: Option<&str>,
    ) -> i64 {
        self.ticket_service()
            .create_ticket(
                &CreateTicketRequest {
                    department_target_id: self.dept_target,
                    description: format!("work requested by {requestor_npk}"),
                    physical_location_id: None,
                    specified_location_name: None,
                    deadline: deadline.map(String::from),
                },
                requestor_npk,
                Vec::new(),
            )
            .unwrap()
            .id
    }

    /// Rewrite a ticket's creation time to `days` days ago. The schedulers
    /// score by age, so tests backdate instead of sleeping.
    pub fn backdate_ticket(&self, ticket_id: i64, days: i64) {
        let created = chrono::Utc::now() - chrono::Duration::days(days);
        self.db
            .conn()
            .execute(
                "UPDATE ticket SET created_at = ? WHERE id = ?",
                rusqlite::params![created.to_rfc3339(), ticket_id],
            )
            .unwrap();
    }

    /// Approve, forward, assign `W1` and start work on a ticket, leaving it
    /// in the in-progress status.
    pub fn drive_to_in_progress(&self, ticket_id: i64) {
        use crate::workflow::engine::ExecuteActionRequest;

        let engine = self.engine();
        for (npk, action) in [("A1", "Setujui"), ("M1", "Teruskan")] {
            engine
                .execute_action(
                    ticket_id,
                    npk,
                    &ExecuteActionRequest {
                        action_name: action.to_string(),
                        reason: None,
                        spending_amount: None,
                    },
                    Vec::new(),
                )
                .unwrap();
        }

        {
            let conn = self.db.conn();
            let the_job = crate::ticket::job::find_job_by_ticket(&conn, ticket_id)
                .unwrap()
                .unwrap();
            crate::ticket::job::assign_pic(&conn, the_job.id, "W1").unwrap();
        }

        engine
            .execute_action(
                ticket_id,
                "W1",
                &ExecuteActionRequest {
                    action_name: "Kerjakan".to_string(),
                    reason: None,
                    spending_amount: None,
                },
                Vec::new(),
            )
            .unwrap();
    }

    /// Drive a ticket into the waiting-for-job status (open work).
    pub fn drive_to_waiting(&self, ticket_id: i64) {
        use crate::workflow::engine::ExecuteActionRequest;

        let engine = self.engine();
        for (npk, action) in [("A1", "Setujui"), ("M1", "Teruskan")] {
            engine
                .execute_action(
                    ticket_id,
                    npk,
                    &ExecuteActionRequest {
                        action_name: action.to_string(),
                        reason: None,
                        spending_amount: None,
                    },
                    Vec::new(),
                )
                .unwrap();
        }
    }

    /// Connect a hub client and return its receive side.
    pub async fn attach_client(&self, id: &str, user_id: i64) -> Receiver<String> {
        let (tx, rx) = tokio::sync::mpsc::channel(CLIENT_BUFFER);
        self.hub
            .register(Client {
                id: id.to_string(),
                user_id,
                tx,
            })
            .await;
        rx
    }

    /// Receive one hub message or panic after a second.
    pub async fn recv_event(&self, rx: &mut Receiver<String>) -> String {
        tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for hub event")
            .expect("hub closed the client channel")
    }
}
