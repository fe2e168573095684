//! Section and status administration handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use jobdesk_core::workflow::{store as workflow_store, ReorderStatusBandsRequest};

use super::middleware::CurrentUser;
use super::response::{success, success_message, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReorderSectionsRequest {
    pub ordered_section_ids: Vec<i64>,
}

pub async fn list_sections(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> Result<Response, ApiError> {
    let sections = {
        let conn = state.db().conn();
        workflow_store::list_sections(&conn)?
    };
    Ok(success(StatusCode::OK, "sections retrieved", sections))
}

pub async fn list_statuses(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> Result<Response, ApiError> {
    let statuses = {
        let conn = state.db().conn();
        workflow_store::list_statuses(&conn, None, None)?
    };
    Ok(success(StatusCode::OK, "statuses retrieved", statuses))
}

/// Deactivating a section migrates every stranded ticket to the dynamic
/// fallback status in the same transaction.
pub async fn set_section_active(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Response, ApiError> {
    state.sections().set_section_active(id, body.is_active)?;
    Ok(success_message(StatusCode::OK, "section updated"))
}

pub async fn delete_section(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    state.sections().delete_section(id)?;
    Ok(success_message(StatusCode::OK, "section deleted"))
}

pub async fn reorder_sections(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Json(body): Json<ReorderSectionsRequest>,
) -> Result<Response, ApiError> {
    state.sections().reorder_sections(&body.ordered_section_ids)?;
    Ok(success_message(StatusCode::OK, "sections reordered"))
}

/// Rewrite status sequences into the three signed bands
/// (delete / approval / actual).
pub async fn reorder_status_bands(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Json(body): Json<ReorderStatusBandsRequest>,
) -> Result<Response, ApiError> {
    state.sections().reorder_status_bands(&body)?;
    Ok(success_message(StatusCode::OK, "statuses reordered"))
}
