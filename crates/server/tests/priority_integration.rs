//! Reorder and recalculation scenarios over the HTTP surface.

mod common;

use axum::http::StatusCode;
use common::{TestFixture, API};
use jobdesk_core::PriorityScheduler;
use serde_json::json;

// Two clients reorder with the same versions: first wins, second conflicts
// and none of its updates persist.
#[tokio::test]
async fn test_optimistic_reorder_conflict() {
    let fixture = TestFixture::new().await;
    let requestor = fixture.login("rina").await;
    let maintenance = fixture.login("maman").await;

    let t1 = fixture.create_ticket_http(&requestor, "first").await;
    let t2 = fixture.create_ticket_http(&requestor, "second").await;

    let body = json!({
        "department_target_id": fixture.world.dept_target,
        "items": [
            {"id": t2, "version": 1},
            {"id": t1, "version": 1}
        ]
    });

    let first = fixture
        .put_json(&format!("{API}/tickets/reorder"), Some(&maintenance), body.clone())
        .await;
    assert_eq!(first.status, StatusCode::OK, "{:?}", first.body);

    let second = fixture
        .put_json(&format!("{API}/tickets/reorder"), Some(&maintenance), body)
        .await;
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert!(second.errors().contains("data conflict"));

    // The first reorder's result stands.
    let detail = fixture
        .get(&format!("{API}/tickets/{t2}"), Some(&maintenance))
        .await;
    assert_eq!(detail.data()["ticket_priority"], 1);
}

#[tokio::test]
async fn test_reorder_requires_department_ownership() {
    let fixture = TestFixture::new().await;
    let requestor = fixture.login("rina").await;
    let approver = fixture.login("agus").await;
    let t1 = fixture.create_ticket_http(&requestor, "only one").await;

    let response = fixture
        .put_json(
            &format!("{API}/tickets/reorder"),
            Some(&approver),
            json!({
                "department_target_id": fixture.world.dept_target,
                "items": [{"id": t1, "version": 1}]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_job_reorder_round_trip() {
    let fixture = TestFixture::new().await;
    let requestor = fixture.login("rina").await;
    let maintenance = fixture.login("maman").await;

    let t1 = fixture.create_ticket_http(&requestor, "job one").await;
    let t2 = fixture.create_ticket_http(&requestor, "job two").await;

    let j1 = fixture
        .get(&format!("{API}/tickets/{t1}"), Some(&maintenance))
        .await
        .data()["job_id"]
        .as_i64()
        .unwrap();
    let j2 = fixture
        .get(&format!("{API}/tickets/{t2}"), Some(&maintenance))
        .await
        .data()["job_id"]
        .as_i64()
        .unwrap();

    let response = fixture
        .put_json(
            &format!("{API}/jobs/reorder"),
            Some(&maintenance),
            json!({
                "department_target_id": fixture.world.dept_target,
                "items": [
                    {"id": j2, "version": 1},
                    {"id": j1, "version": 1}
                ]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{:?}", response.body);

    let jobs = fixture.get(&format!("{API}/jobs"), Some(&maintenance)).await;
    let listed: Vec<i64> = jobs
        .data()
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["job_id"].as_i64().unwrap())
        .collect();
    assert_eq!(listed, vec![j2, j1]);
}

// The scheduled rescore orders open tickets by age when priorities and
// deadlines are equal, and renumbers 1..N.
#[tokio::test]
async fn test_scheduled_rescore_orders_by_age() {
    let fixture = TestFixture::new().await;
    let requestor = fixture.login("rina").await;

    let mut by_age = Vec::new();
    for age in [3_i64, 10, 20, 40] {
        let id = fixture
            .create_ticket_http(&requestor, &format!("aged {age} days"))
            .await;
        fixture.world.drive_to_waiting(id);
        fixture.world.backdate_ticket(id, age);
        by_age.push((age, id));
    }
    {
        let conn = fixture.world.db.conn();
        conn.execute("UPDATE ticket SET ticket_priority = 5", []).unwrap();
    }

    let scheduler =
        PriorityScheduler::new(fixture.world.db.clone(), fixture.world.hub.clone());
    scheduler.recalculate_tickets_once().unwrap();

    let priorities: Vec<(i64, i64)> = {
        let conn = fixture.world.db.conn();
        by_age
            .iter()
            .map(|(age, id)| {
                let p: i64 = conn
                    .query_row(
                        "SELECT ticket_priority FROM ticket WHERE id = ?",
                        [id],
                        |row| row.get(0),
                    )
                    .unwrap();
                (*age, p)
            })
            .collect()
    };

    assert_eq!(priorities, vec![(3, 4), (10, 3), (20, 2), (40, 1)]);
}

#[tokio::test]
async fn test_rescore_emits_event_to_connected_clients() {
    let fixture = TestFixture::new().await;
    let mut rx = fixture.world.attach_client("observer", 7).await;

    let scheduler =
        PriorityScheduler::new(fixture.world.db.clone(), fixture.world.hub.clone());
    scheduler.recalculate_tickets_once().unwrap();

    let event = fixture.world.recv_event(&mut rx).await;
    assert!(event.contains("TICKET_PRIORITY_RECALCULATED"));
}
