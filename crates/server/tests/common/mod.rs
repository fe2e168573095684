//! Common test utilities: an in-process server over a fully seeded world.

// Each integration test binary compiles this module and uses its own subset.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use jobdesk_core::testing::{WorkflowWorld, TEST_PASSWORD};
use jobdesk_core::Config;
use jobdesk_server::api::create_router;
use jobdesk_server::state::AppState;

pub const API: &str = "/api/e-memo-job-reservation";

/// In-process server wired to the seeded [`WorkflowWorld`].
pub struct TestFixture {
    pub router: Router,
    pub world: WorkflowWorld,
    /// Storage root for uploads; dropped with the fixture.
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    /// `data` field of the response envelope.
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn errors(&self) -> String {
        self.body["errors"].as_str().unwrap_or_default().to_string()
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        let world = WorkflowWorld::new().await;
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.auth.jwt_secret_key = "test-access-secret".to_string();
        config.auth.jwt_refresh_secret_key = "test-refresh-secret".to_string();
        config.storage.path = temp_dir.path().to_path_buf();

        let state = Arc::new(AppState::new(config, world.db.clone(), world.hub.clone()));
        let router = create_router(state);

        Self {
            router,
            world,
            temp_dir,
        }
    }

    /// Log in a seeded account and return its access token.
    pub async fn login(&self, username: &str) -> String {
        let response = self
            .post_json(
                &format!("{API}/login"),
                None,
                json!({"username": username, "password": TEST_PASSWORD}),
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::OK,
            "login failed: {:?}",
            response.body
        );
        response.data()["access_token"]
            .as_str()
            .expect("missing access token")
            .to_string()
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> TestResponse {
        self.request("GET", path, token, None, Body::empty()).await
    }

    pub async fn post_json(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(
            "POST",
            path,
            token,
            Some("application/json"),
            Body::from(body.to_string()),
        )
        .await
    }

    pub async fn put_json(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(
            "PUT",
            path,
            token,
            Some("application/json"),
            Body::from(body.to_string()),
        )
        .await
    }

    pub async fn delete_json(&self, path: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(
            "DELETE",
            path,
            token,
            Some("application/json"),
            Body::from(body.to_string()),
        )
        .await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        token: Option<&str>,
        fields: &[(&str, &str)],
        files: &[(&str, &[u8])],
    ) -> TestResponse {
        let (content_type, body) = multipart_body(fields, files);
        self.request("POST", path, token, Some(&content_type), Body::from(body))
            .await
    }

    /// A WS handshake against a real loopback listener: axum's upgrade
    /// extractor needs hyper's live-connection `OnUpgrade` extension, which
    /// a bare `tower::ServiceExt::oneshot` call never provides.
    pub async fn ws_handshake(&self, path: &str) -> TestResponse {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let addr = listener.local_addr().expect("failed to read local addr");
        let router = self.router.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, router).await.expect("test server failed");
        });

        let url = format!("ws://{addr}{path}");
        let result = tokio_tungstenite::connect_async(url).await;
        server.abort();

        let (status, body) = match result {
            Ok(_) => (StatusCode::SWITCHING_PROTOCOLS, Value::Null),
            Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
                let status = response.status();
                let body = response
                    .body()
                    .as_ref()
                    .and_then(|bytes| serde_json::from_slice(bytes).ok())
                    .unwrap_or(Value::Null);
                (status, body)
            }
            Err(e) => panic!("unexpected websocket handshake error: {e}"),
        };

        TestResponse { status, body }
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        token: Option<&str>,
        content_type: Option<&str>,
        body: Body,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }

    /// Create a ticket over HTTP as the given user; returns its id.
    pub async fn create_ticket_http(&self, token: &str, description: &str) -> i64 {
        let dept = self.world.dept_target.to_string();
        let response = self
            .post_multipart(
                &format!("{API}/tickets"),
                Some(token),
                &[
                    ("department_target_id", dept.as_str()),
                    ("description", description),
                ],
                &[],
            )
            .await;
        assert_eq!(
            response.status,
            StatusCode::CREATED,
            "create ticket failed: {:?}",
            response.body
        );
        response.data()["id"].as_i64().expect("missing ticket id")
    }
}

/// Build a multipart body; every file part is named `files`.
pub fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "test-boundary-7MA4YWxkTrZu0gW";
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (file_name, data) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; \
                 filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={boundary}"), body)
}
