//! Ticket API handlers.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use jobdesk_core::ticket::{CreateTicketRequest, NewRejection, UpdateTicketRequest};
use jobdesk_core::workflow::ExecuteActionRequest;
use jobdesk_core::{files, FileMetadata, ReorderRequest, TicketFilter};

use super::middleware::CurrentUser;
use super::response::{success, success_message, ApiError};
use crate::state::AppState;

/// Query parameters for listing tickets. List-valued filters are
/// comma-separated.
#[derive(Debug, Deserialize)]
pub struct ListTicketsParams {
    pub section_id: Option<i64>,
    pub status_ids: Option<String>,
    pub department_target_id: Option<i64>,
    pub requestor_department_ids: Option<String>,
    pub requestors: Option<String>,
    pub pic_npks: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
}

impl ListTicketsParams {
    pub fn into_filter(self) -> Result<TicketFilter, ApiError> {
        Ok(TicketFilter {
            section_id: self.section_id,
            status_ids: csv_i64(self.status_ids.as_deref())?,
            department_target_id: self.department_target_id,
            requestor_department_ids: csv_i64(self.requestor_department_ids.as_deref())?,
            requestors: csv_string(self.requestors.as_deref()),
            pic_npks: csv_string(self.pic_npks.as_deref()),
            year: self.year,
            month: self.month,
            search: self.search,
            sort_by: self.sort_by,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteFilesRequest {
    pub file_paths_to_delete: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: String,
}

#[derive(Debug, Deserialize)]
pub struct AlreadySeenRequest {
    pub already_seen: bool,
}

/// Create a ticket. Multipart: form fields plus any number of `files` parts.
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?.to_string();
    let (fields, saved_files) = read_multipart(&state, multipart).await?;

    let request = CreateTicketRequest {
        department_target_id: require_i64(&fields, "department_target_id")?,
        description: require_text(&fields, "description")?,
        physical_location_id: optional_i64(&fields, "physical_location_id")?,
        specified_location_name: fields.get("specified_location_name").cloned(),
        deadline: fields.get("deadline").cloned(),
    };

    match state.tickets().create_ticket(&request, &npk, saved_files.clone()) {
        Ok(detail) => Ok(success(StatusCode::CREATED, "ticket created", detail)),
        Err(e) => {
            // The ticket never landed: drop the files saved for it.
            files::remove_files(saved_files.iter().map(|f| f.file_path.clone()));
            Err(e.into())
        }
    }
}

pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Query(params): Query<ListTicketsParams>,
) -> Result<Response, ApiError> {
    let filter = params.into_filter()?;
    let tickets = state.tickets().list_tickets(&filter)?;
    Ok(success(StatusCode::OK, "tickets retrieved", tickets))
}

pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let detail = state.tickets().get_ticket(id)?;
    Ok(success(StatusCode::OK, "ticket retrieved", detail))
}

pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTicketRequest>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    let detail = state.tickets().update_ticket(id, &body, npk)?;
    Ok(success(StatusCode::OK, "ticket updated", detail))
}

/// Execute a workflow action. Multipart: `action_name`, optional `reason`,
/// optional `spending_amount`, plus `files` parts.
pub async fn execute_action(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?.to_string();
    let (fields, saved_files) = read_multipart(&state, multipart).await?;

    let request = ExecuteActionRequest {
        action_name: require_text(&fields, "action_name")?,
        reason: fields.get("reason").cloned(),
        spending_amount: optional_i64(&fields, "spending_amount")?,
    };

    match state
        .engine()
        .execute_action(id, &npk, &request, saved_files.clone())
    {
        Ok(()) => Ok(success_message(StatusCode::OK, "action executed")),
        Err(e) => {
            files::remove_files(saved_files.iter().map(|f| f.file_path.clone()));
            Err(e.into())
        }
    }
}

pub async fn available_actions(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    let actions = state.engine().available_actions(id, npk)?;
    Ok(success(StatusCode::OK, "available actions retrieved", actions))
}

pub async fn reorder_tickets(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(body): Json<ReorderRequest>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    state.priority().reorder_tickets(&body, npk)?;
    Ok(success_message(StatusCode::OK, "ticket priorities updated"))
}

/// Attach support files. Multipart: `files` parts only.
pub async fn add_files(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?.to_string();
    let (_, saved_files) = read_multipart(&state, multipart).await?;

    match state.tickets().add_support_files(id, &npk, saved_files.clone()) {
        Ok(detail) => Ok(success(StatusCode::OK, "files attached", detail)),
        Err(e) => {
            files::remove_files(saved_files.iter().map(|f| f.file_path.clone()));
            Err(e.into())
        }
    }
}

pub async fn remove_files_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<DeleteFilesRequest>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    let detail = state
        .tickets()
        .remove_support_files(id, npk, body.file_paths_to_delete)?;
    Ok(success(StatusCode::OK, "files removed", detail))
}

// Rejection records

pub async fn create_rejection(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(body): Json<NewRejection>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    let rejection = state.rejections().create(&body, npk)?;
    Ok(success(StatusCode::CREATED, "rejection recorded", rejection))
}

pub async fn list_rejections(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let rejections = state.rejections().list_by_ticket(id)?;
    Ok(success(StatusCode::OK, "rejections retrieved", rejections))
}

pub async fn update_rejection_feedback(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<FeedbackRequest>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    let rejection = state.rejections().update_feedback(id, &body.feedback, npk)?;
    Ok(success(StatusCode::OK, "feedback updated", rejection))
}

pub async fn update_rejection_seen(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<AlreadySeenRequest>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    state
        .rejections()
        .update_already_seen(id, body.already_seen, npk)?;
    Ok(success_message(StatusCode::OK, "rejection updated"))
}

pub async fn delete_rejection(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let npk = user.require_npk()?;
    state.rejections().delete(id, npk)?;
    Ok(success_message(StatusCode::OK, "rejection deleted"))
}

// Multipart plumbing

/// Read a multipart body into text fields and stored files. Every part named
/// `files` is written to the storage root immediately; callers must remove
/// the stored files if the operation fails afterwards.
pub async fn read_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> Result<(HashMap<String, String>, Vec<FileMetadata>), ApiError> {
    let mut fields = HashMap::new();
    let mut saved = Vec::new();

    let result = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "files" {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(String::from);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file part: {e}")))?;
                let meta = files::save_file(
                    &state.config().storage.path,
                    &file_name,
                    content_type,
                    &data,
                )?;
                saved.push(meta);
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read field: {e}")))?;
                fields.insert(name, value);
            }
        }
        Ok::<(), ApiError>(())
    }
    .await;

    if let Err(e) = result {
        // Partial file set from a broken upload: roll it back.
        files::remove_files(saved.iter().map(|f| f.file_path.clone()));
        return Err(e);
    }

    Ok((fields, saved))
}

fn require_text(fields: &HashMap<String, String>, name: &str) -> Result<String, ApiError> {
    fields
        .get(name)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| ApiError::bad_request(format!("missing required field '{name}'")))
}

fn require_i64(fields: &HashMap<String, String>, name: &str) -> Result<i64, ApiError> {
    require_text(fields, name)?
        .parse()
        .map_err(|_| ApiError::bad_request(format!("field '{name}' must be an integer")))
}

fn optional_i64(fields: &HashMap<String, String>, name: &str) -> Result<Option<i64>, ApiError> {
    match fields.get(name) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("field '{name}' must be an integer"))),
    }
}

fn csv_i64(raw: Option<&str>) -> Result<Vec<i64>, ApiError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| ApiError::bad_request(format!("invalid id '{s}' in list parameter")))
        })
        .collect()
}

fn csv_string(raw: Option<&str>) -> Vec<String> {
    raw.map(|r| {
        r.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_parsers() {
        assert_eq!(csv_i64(Some("1, 2,3")).unwrap(), vec![1, 2, 3]);
        assert!(csv_i64(Some("1,x")).is_err());
        assert!(csv_i64(None).unwrap().is_empty());
        assert_eq!(csv_string(Some("E1, E2")), vec!["E1", "E2"]);
    }

    #[test]
    fn test_field_helpers() {
        let mut fields = HashMap::new();
        fields.insert("n".to_string(), "12".to_string());
        fields.insert("empty".to_string(), String::new());

        assert_eq!(require_i64(&fields, "n").unwrap(), 12);
        assert!(require_text(&fields, "missing").is_err());
        assert!(require_text(&fields, "empty").is_err());
        assert_eq!(optional_i64(&fields, "empty").unwrap(), None);
        assert_eq!(optional_i64(&fields, "missing").unwrap(), None);
        assert_eq!(optional_i64(&fields, "n").unwrap(), Some(12));
    }
}
