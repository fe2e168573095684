//! The system-wide edit-mode gate.

mod common;

use axum::http::StatusCode;
use common::{TestFixture, API};
use serde_json::json;

#[tokio::test]
async fn test_edit_mode_gates_non_master_mutations() {
    let fixture = TestFixture::new().await;
    let master = fixture.login("admin").await;
    let requestor = fixture.login("rina").await;
    let mut rx = fixture.world.attach_client("observer", 50).await;

    // Master switches the gate on; every client is notified.
    let response = fixture
        .post_json(
            &format!("{API}/system/edit-mode"),
            Some(&master),
            json!({"is_editing": true}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let event = fixture.world.recv_event(&mut rx).await;
    assert!(event.contains("SYSTEM_EDIT_MODE_CHANGED"));
    assert!(event.contains("\"is_editing\":true"));

    // Non-master mutations fail fast with 503.
    let dept = fixture.world.dept_target.to_string();
    let blocked = fixture
        .post_multipart(
            &format!("{API}/tickets"),
            Some(&requestor),
            &[
                ("department_target_id", dept.as_str()),
                ("description", "blocked during maintenance"),
            ],
            &[],
        )
        .await;
    assert_eq!(blocked.status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(blocked.errors().contains("System is currently in edit mode"));

    // Reads still work for everyone.
    let reads = fixture.get(&format!("{API}/tickets"), Some(&requestor)).await;
    assert_eq!(reads.status, StatusCode::OK);

    // Master users bypass the gate for mutations.
    let master_mutation = fixture
        .put_json(
            &format!("{API}/sections/reorder"),
            Some(&master),
            json!({
                "ordered_section_ids": [
                    fixture.world.section_approval,
                    fixture.world.section_work
                ]
            }),
        )
        .await;
    assert_eq!(master_mutation.status, StatusCode::OK);

    // Gate off again: the same mutation succeeds and a second event fires.
    let response = fixture
        .post_json(
            &format!("{API}/system/edit-mode"),
            Some(&master),
            json!({"is_editing": false}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    let event = fixture.world.recv_event(&mut rx).await;
    assert!(event.contains("\"is_editing\":false"));

    let allowed = fixture
        .post_multipart(
            &format!("{API}/tickets"),
            Some(&requestor),
            &[
                ("department_target_id", dept.as_str()),
                ("description", "maintenance is over"),
            ],
            &[],
        )
        .await;
    assert_eq!(allowed.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_only_master_may_toggle_edit_mode() {
    let fixture = TestFixture::new().await;
    let requestor = fixture.login("rina").await;

    let response = fixture
        .post_json(
            &format!("{API}/system/edit-mode"),
            Some(&requestor),
            json!({"is_editing": true}),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_edit_mode_readable_by_all_authenticated_users() {
    let fixture = TestFixture::new().await;
    let requestor = fixture.login("rina").await;

    let response = fixture
        .get(&format!("{API}/system/edit-mode"), Some(&requestor))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.data()["is_editing"], false);
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_prometheus_text() {
    let fixture = TestFixture::new().await;
    // Pull once so the counters exist.
    let _ = fixture.get("/health", None).await;

    let response = fixture.get("/metrics", None).await;
    assert_eq!(response.status, StatusCode::OK);
}
