//! Response envelope: `{status: {code, message}, data | errors}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct StatusInfo {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub status: StatusInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

/// Success envelope with data.
pub fn success<T: Serialize>(code: StatusCode, message: &str, data: T) -> Response {
    (
        code,
        Json(Envelope {
            status: StatusInfo {
                code: code.as_u16(),
                message: message.to_string(),
            },
            data: Some(data),
            errors: None,
        }),
    )
        .into_response()
}

/// Success envelope without data.
pub fn success_message(code: StatusCode, message: &str) -> Response {
    success(code, message, serde_json::Value::Null)
}

/// Typed core error carried to the edge and rendered as an envelope.
#[derive(Debug)]
pub struct ApiError {
    pub code: StatusCode,
    pub message: String,
    pub detail: String,
}

impl ApiError {
    pub fn new(code: StatusCode, message: &str, detail: impl Into<String>) -> Self {
        Self {
            code,
            message: message.to_string(),
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad Request", detail)
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", detail)
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "Forbidden", detail)
    }

    pub fn service_unavailable(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable", detail)
    }
}

impl From<jobdesk_core::Error> for ApiError {
    fn from(e: jobdesk_core::Error) -> Self {
        use jobdesk_core::Error;
        let detail = e.to_string();
        match e {
            Error::BadRequest(_) => Self::new(StatusCode::BAD_REQUEST, "Bad Request", detail),
            Error::Unauthenticated(_) => {
                Self::new(StatusCode::UNAUTHORIZED, "Unauthorized", detail)
            }
            Error::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, "Forbidden", detail),
            Error::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "Not Found", detail),
            Error::Conflict(_) => Self::new(StatusCode::CONFLICT, "Conflict", detail),
            Error::ServiceUnavailable(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "Service Unavailable", detail)
            }
            Error::Database(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                detail,
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.code,
            Json(Envelope::<serde_json::Value> {
                status: StatusInfo {
                    code: self.code.as_u16(),
                    message: self.message,
                },
                data: None,
                errors: Some(json!(self.detail)),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let err: ApiError = jobdesk_core::Error::conflict("data conflict: please refresh").into();
        assert_eq!(err.code, StatusCode::CONFLICT);
        assert_eq!(err.detail, "data conflict: please refresh");

        let err: ApiError = jobdesk_core::Error::Database("boom".into()).into();
        assert_eq!(err.code, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
