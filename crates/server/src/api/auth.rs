//! Login, token rotation, logout and WS ticket issuance.

use axum::{extract::State, http::StatusCode, response::Response, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use jobdesk_core::LoginRequest;

use super::middleware::CurrentUser;
use super::response::{success, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct WsTicketResponse {
    pub ticket: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    let response = state.auth().login(&body)?;
    Ok(success(StatusCode::OK, "login successful", response))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Response, ApiError> {
    let response = state.auth().refresh(&body.refresh_token)?;
    Ok(success(StatusCode::OK, "token refreshed", response))
}

/// Blacklists the presented access token until its expiry and deletes all of
/// the user's refresh tokens.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Response, ApiError> {
    state.auth().logout(&user.token)?;
    Ok(success(
        StatusCode::OK,
        "logout successful",
        serde_json::Value::Null,
    ))
}

/// One-shot WS ticket for the authenticated caller.
pub async fn ws_ticket(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Response, ApiError> {
    let ticket = state.auth().issue_ws_ticket(user.user_id)?;
    Ok(success(
        StatusCode::OK,
        "websocket ticket issued",
        WsTicketResponse { ticket },
    ))
}

/// One-shot WS ticket for an anonymous client.
pub async fn ws_public_ticket(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let ticket = state.auth().issue_public_ws_ticket()?;
    Ok(success(
        StatusCode::OK,
        "websocket ticket issued",
        WsTicketResponse { ticket },
    ))
}
