//! System-wide edit-mode gate endpoints and health.

use axum::{extract::State, http::StatusCode, response::Response, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::middleware::{require_master, CurrentUser};
use super::response::{success, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateEditModeRequest {
    pub is_editing: bool,
}

#[derive(Debug, Serialize)]
pub struct EditModeResponse {
    pub is_editing: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

pub async fn get_edit_mode(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> Result<Response, ApiError> {
    let is_editing = state.system().edit_mode()?;
    Ok(success(
        StatusCode::OK,
        "edit mode retrieved",
        EditModeResponse { is_editing },
    ))
}

/// Master-only: flip the system-wide edit gate. Broadcasts
/// `SYSTEM_EDIT_MODE_CHANGED` to every connected client.
pub async fn set_edit_mode(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(body): Json<UpdateEditModeRequest>,
) -> Result<Response, ApiError> {
    require_master(&user)?;
    state.system().update_edit_mode(body.is_editing)?;
    Ok(success(
        StatusCode::OK,
        "edit mode updated",
        EditModeResponse {
            is_editing: body.is_editing,
        },
    ))
}
