//! Authentication, edit-mode gating and metrics middleware.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, Method, Request},
    middleware::Next,
    response::Response,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use jobdesk_core::auth::{tokens, validate_token};
use jobdesk_core::system::get_edit_mode;

use super::response::ApiError;
use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// The authenticated caller, inserted into request extensions by the auth
/// middleware.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub user_type: String,
    pub npk: Option<String>,
    pub position_id: i64,
    pub department_id: Option<i64>,
    /// Raw bearer token, kept so logout can blacklist it.
    pub token: String,
}

impl CurrentUser {
    pub fn is_master(&self) -> bool {
        self.user_type == "master"
    }

    /// The employee key, required by every workflow-facing operation.
    pub fn require_npk(&self) -> Result<&str, ApiError> {
        self.npk
            .as_deref()
            .ok_or_else(|| ApiError::forbidden("user has no employee record"))
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let user = parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("missing authentication"));
        std::future::ready(user)
    }
}

/// Validate the bearer token, reject blacklisted ids and stash the caller in
/// request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or_else(|| {
        AUTH_FAILURES_TOTAL
            .with_label_values(&["missing_bearer"])
            .inc();
        ApiError::unauthorized("missing or malformed authorization header")
    })?;

    let claims = validate_token(&state.config().auth, &token, false).map_err(|e| {
        AUTH_FAILURES_TOTAL
            .with_label_values(&["invalid_token"])
            .inc();
        ApiError::from(e)
    })?;

    let blacklisted = {
        let conn = state.db().conn();
        tokens::is_token_blacklisted(&conn, &claims.token_id).map_err(ApiError::from)?
    };
    if blacklisted {
        AUTH_FAILURES_TOTAL
            .with_label_values(&["blacklisted_token"])
            .inc();
        return Err(ApiError::unauthorized("token has been revoked"));
    }

    request.extensions_mut().insert(CurrentUser {
        user_id: claims.user_id,
        user_type: claims.user_type,
        npk: claims.employee_npk,
        position_id: claims.employee_position_id,
        department_id: claims.department_id,
        token,
    });

    Ok(next.run(request).await)
}

/// While the system-wide edit-mode flag is on, mutating operations fail fast
/// for everyone but master users. Reads pass through. Must run after
/// `auth_middleware`.
pub async fn edit_mode_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return Ok(next.run(request).await);
    }

    let is_master = request
        .extensions()
        .get::<CurrentUser>()
        .is_some_and(CurrentUser::is_master);

    if !is_master {
        let is_editing = {
            let conn = state.db().conn();
            get_edit_mode(&conn).map_err(ApiError::from)?
        };
        if is_editing {
            return Err(ApiError::service_unavailable(
                "System is currently in edit mode. Please try again later.",
            ));
        }
    }

    Ok(next.run(request).await)
}

/// Request duration, count and in-flight gauges.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();
    let response = next.run(request).await;
    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

fn bearer_token(request: &Request<Body>) -> Option<String> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(String::from)
}

/// Reject non-master callers. Used for the edit-mode toggle.
pub fn require_master(user: &CurrentUser) -> Result<(), ApiError> {
    if user.is_master() {
        Ok(())
    } else {
        Err(ApiError::forbidden("master access required"))
    }
}
