//! Manual drag-and-drop reorder with optimistic concurrency.
//!
//! All-or-nothing: any stale version aborts the whole transaction and the
//! client is told to refresh.

use serde::Deserialize;

use crate::db::Database;
use crate::directory::store as directory;
use crate::error::{Error, Result};
use crate::hub::{HubHandle, WsEvent};
use crate::ticket::{job, store as ticket_store};

#[derive(Debug, Clone, Deserialize)]
pub struct ReorderItem {
    pub id: i64,
    pub version: i64,
}

/// Items in the desired order; index i receives priority i+1.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    pub department_target_id: i64,
    pub items: Vec<ReorderItem>,
}

pub struct PriorityService {
    db: Database,
    hub: HubHandle,
}

impl PriorityService {
    pub fn new(db: Database, hub: HubHandle) -> Self {
        Self { db, hub }
    }

    pub fn reorder_tickets(&self, req: &ReorderRequest, user_npk: &str) -> Result<()> {
        {
            let mut conn = self.db.conn();

            let user = directory::find_employee_by_npk(&conn, user_npk)?
                .ok_or_else(|| Error::not_found("action performer not found"))?;
            if user.department_id != req.department_target_id {
                return Err(Error::forbidden(
                    "user can only reorder tickets within their own department",
                ));
            }

            let ids: Vec<i64> = req.items.iter().map(|i| i.id).collect();
            let in_dept =
                ticket_store::count_tickets_in_department(&conn, &ids, req.department_target_id)?;
            if in_dept != req.items.len() as i64 {
                return Err(Error::bad_request(
                    "one or more ticket IDs do not belong to the specified department",
                ));
            }

            let tx = conn.transaction()?;
            for (index, item) in req.items.iter().enumerate() {
                let updated =
                    ticket_store::update_priority(&tx, item.id, item.version, index as i64 + 1)?;
                if updated == 0 {
                    return Err(Error::conflict(
                        "data conflict: one or more tickets have been modified by another user, \
                         please refresh",
                    ));
                }
            }
            tx.commit()?;
        }

        self.hub.try_broadcast(WsEvent::TicketPriorityUpdated {
            department_target_id: req.department_target_id,
            message: "Ticket priorities have been updated.".to_string(),
        });
        Ok(())
    }

    pub fn reorder_jobs(&self, req: &ReorderRequest, user_npk: &str) -> Result<()> {
        {
            let mut conn = self.db.conn();

            let user = directory::find_employee_by_npk(&conn, user_npk)?
                .ok_or_else(|| Error::not_found("action performer not found"))?;
            if user.department_id != req.department_target_id {
                return Err(Error::forbidden(
                    "user can only reorder jobs within their own department",
                ));
            }

            let ids: Vec<i64> = req.items.iter().map(|i| i.id).collect();
            let in_dept = job::count_jobs_in_department(&conn, &ids, req.department_target_id)?;
            if in_dept != req.items.len() as i64 {
                return Err(Error::bad_request(
                    "one or more job IDs do not belong to the specified department",
                ));
            }

            let tx = conn.transaction()?;
            for (index, item) in req.items.iter().enumerate() {
                let updated = job::update_priority(&tx, item.id, item.version, index as i64 + 1)?;
                if updated == 0 {
                    return Err(Error::conflict(
                        "data conflict: job has been modified by another user, please refresh",
                    ));
                }
            }
            tx.commit()?;
        }

        self.hub.try_broadcast(WsEvent::JobPriorityUpdated {
            department_target_id: req.department_target_id,
            message: "Job priorities have been updated.".to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::WorkflowWorld;

    fn service(world: &WorkflowWorld) -> PriorityService {
        PriorityService::new(world.db.clone(), world.hub.clone())
    }

    fn ticket_state(world: &WorkflowWorld, id: i64) -> (i64, i64) {
        let conn = world.db.conn();
        let t = ticket_store::find_ticket(&conn, id).unwrap().unwrap();
        (t.ticket_priority, t.version)
    }

    #[tokio::test]
    async fn test_reorder_renumbers_in_request_order() {
        let world = WorkflowWorld::new().await;
        let t1 = world.create_ticket("R1");
        let t2 = world.create_ticket("R1");
        let t3 = world.create_ticket("R1");

        service(&world)
            .reorder_tickets(
                &ReorderRequest {
                    department_target_id: world.dept_target,
                    items: vec![
                        ReorderItem { id: t3, version: 1 },
                        ReorderItem { id: t1, version: 1 },
                        ReorderItem { id: t2, version: 1 },
                    ],
                },
                "M1",
            )
            .unwrap();

        assert_eq!(ticket_state(&world, t3).0, 1);
        assert_eq!(ticket_state(&world, t1).0, 2);
        assert_eq!(ticket_state(&world, t2).0, 3);
    }

    #[tokio::test]
    async fn test_stale_version_aborts_whole_reorder() {
        let world = WorkflowWorld::new().await;
        let t1 = world.create_ticket("R1");
        let t2 = world.create_ticket("R1");
        let svc = service(&world);

        let req = ReorderRequest {
            department_target_id: world.dept_target,
            items: vec![
                ReorderItem { id: t2, version: 1 },
                ReorderItem { id: t1, version: 1 },
            ],
        };
        svc.reorder_tickets(&req, "M1").unwrap();

        // Same versions again: every item is stale now.
        let err = svc.reorder_tickets(&req, "M1").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(err.to_string().contains("data conflict"));

        // First reorder's result is untouched by the failed second.
        assert_eq!(ticket_state(&world, t2), (1, 2));
        assert_eq!(ticket_state(&world, t1), (2, 2));
    }

    #[tokio::test]
    async fn test_identity_reorder_keeps_order_and_bumps_versions() {
        let world = WorkflowWorld::new().await;
        let t1 = world.create_ticket("R1");
        let t2 = world.create_ticket("R1");
        let svc = service(&world);

        svc.reorder_tickets(
            &ReorderRequest {
                department_target_id: world.dept_target,
                items: vec![
                    ReorderItem { id: t1, version: 1 },
                    ReorderItem { id: t2, version: 1 },
                ],
            },
            "M1",
        )
        .unwrap();

        assert_eq!(ticket_state(&world, t1), (1, 2));
        assert_eq!(ticket_state(&world, t2), (2, 2));
    }

    #[tokio::test]
    async fn test_caller_must_own_target_department() {
        let world = WorkflowWorld::new().await;
        let t1 = world.create_ticket("R1");
        let err = service(&world)
            .reorder_tickets(
                &ReorderRequest {
                    department_target_id: world.dept_target,
                    items: vec![ReorderItem { id: t1, version: 1 }],
                },
                "A1", // requestor-side head, not the target department
            )
            .unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_foreign_ticket_rejected() {
        let world = WorkflowWorld::new().await;
        let t1 = world.create_ticket("R1");
        let foreign = {
            let conn = world.db.conn();
            // A ticket targeting the requestor department instead.
            crate::ticket::store::insert_ticket(
                &conn,
                crate::ticket::NewTicket {
                    requestor: "R1".to_string(),
                    department_target_id: world.dept_requestor,
                    physical_location_id: None,
                    specified_location_id: None,
                    description: "elsewhere".to_string(),
                    ticket_priority: 1,
                    deadline: None,
                    support_files: Vec::new(),
                },
            )
            .unwrap()
            .id
        };

        let err = service(&world)
            .reorder_tickets(
                &ReorderRequest {
                    department_target_id: world.dept_target,
                    items: vec![
                        ReorderItem { id: t1, version: 1 },
                        ReorderItem { id: foreign, version: 1 },
                    ],
                },
                "M1",
            )
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_job_reorder_cas_conflict() {
        let world = WorkflowWorld::new().await;
        let t1 = world.create_ticket("R1");
        let t2 = world.create_ticket("R1");
        let (j1, j2) = {
            let conn = world.db.conn();
            (
                job::find_job_by_ticket(&conn, t1).unwrap().unwrap().id,
                job::find_job_by_ticket(&conn, t2).unwrap().unwrap().id,
            )
        };
        let svc = service(&world);

        let req = ReorderRequest {
            department_target_id: world.dept_target,
            items: vec![
                ReorderItem { id: j2, version: 1 },
                ReorderItem { id: j1, version: 1 },
            ],
        };
        svc.reorder_jobs(&req, "M1").unwrap();
        let err = svc.reorder_jobs(&req, "M1").unwrap_err();
        assert!(err.to_string().contains("data conflict"));
    }

    #[tokio::test]
    async fn test_reorder_publishes_event() {
        let world = WorkflowWorld::new().await;
        let t1 = world.create_ticket("R1");
        let mut rx = world.attach_client("c1", 42).await;

        service(&world)
            .reorder_tickets(
                &ReorderRequest {
                    department_target_id: world.dept_target,
                    items: vec![ReorderItem { id: t1, version: 1 }],
                },
                "M1",
            )
            .unwrap();

        let seen = world.recv_event(&mut rx).await;
        assert!(seen.contains("TICKET_PRIORITY_UPDATED"));
    }
}
