//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use std::sync::Arc;

use jobdesk_core::ticket::AssignPicRequest;
use jobdesk_core::ReorderRequest;

use super::middleware::CurrentUser;
use super::response::{success, success_message, ApiError};
use super::tickets::ListTicketsParams;
use crate::state::AppState;

pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Query(params): Query<ListTicketsParams>,
) -> Result<Response, ApiError> {
    let filter = params.into_filter()?;
    let jobs = state.tickets().list_jobs(&filter)?;
    Ok(success(StatusCode::OK, "jobs retrieved", jobs))
}

/// Set the job's PIC. The caller and the new PIC must both belong to the
/// job's department.
pub async fn assign_pic(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<AssignPicRequest>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    let detail = state.tickets().assign_pic(id, &body, npk)?;
    Ok(success(StatusCode::OK, "PIC assigned", detail))
}

/// Optimistic bulk reorder within the caller's department.
pub async fn reorder_jobs(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(body): Json<ReorderRequest>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    state.priority().reorder_jobs(&body, npk)?;
    Ok(success_message(StatusCode::OK, "job priorities updated"))
}
