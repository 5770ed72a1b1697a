use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::{
    db::StoreError,
    response::{Envelope, API_VERSION},
    rooms::model::RoomStatus,
};

/// Field-level problem reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    pub code: &'static str,
}

impl FieldError {
    pub fn new(field: &str, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            message: message.into(),
            code,
        }
    }

    pub(crate) fn general(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
            code,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{message}")]
    Conflict { field: &'static str, message: String },

    #[error("cannot move room from {from} to {attempted}")]
    InvalidTransition {
        from: RoomStatus,
        attempted: RoomStatus,
    },

    #[error("invalid credentials")]
    AuthenticationFailed,

    #[error("token expired")]
    TokenExpired,

    #[error("token invalid")]
    TokenInvalid,

    #[error("unable to generate a unique room code")]
    CodeGenerationExhausted,

    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid(field: &str, code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, code, message)])
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict { .. } | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::AuthenticationFailed | Self::TokenExpired | Self::TokenInvalid => {
                StatusCode::UNAUTHORIZED
            }
            Self::CodeGenerationExhausted | Self::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    errors: Vec<FieldError>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, errors) = match self {
            Self::Validation(errors) => ("Validation failed".to_string(), errors),
            Self::NotFound(what) => {
                let msg = format!("{what} not found");
                (msg.clone(), vec![FieldError::general("NOT_FOUND", msg)])
            }
            Self::Forbidden(msg) => (msg.clone(), vec![FieldError::general("FORBIDDEN", msg)]),
            Self::Conflict { field, message } => (
                message.clone(),
                vec![FieldError::new(field, "CONFLICT", message)],
            ),
            e @ Self::InvalidTransition { .. } => {
                let msg = e.to_string();
                (
                    msg.clone(),
                    vec![FieldError::new("status", "INVALID_TRANSITION", msg)],
                )
            }
            Self::AuthenticationFailed => (
                "Invalid credentials".to_string(),
                vec![FieldError::general("INVALID_CREDENTIALS", "Invalid credentials")],
            ),
            // Expired and invalid tokens look the same from the outside.
            Self::TokenExpired | Self::TokenInvalid => (
                "Not authorized, invalid or expired token".to_string(),
                vec![FieldError::general(
                    "UNAUTHORIZED",
                    "Not authorized, invalid or expired token",
                )],
            ),
            Self::CodeGenerationExhausted => {
                error!("room code generation exhausted its retry budget");
                server_error()
            }
            Self::Server(e) => {
                error!(error = ?e, "internal server error");
                server_error()
            }
        };

        let body = Envelope {
            api_version: API_VERSION,
            data: ErrorBody {
                success: false,
                message,
                errors,
            },
        };
        (status, Json(body)).into_response()
    }
}

fn server_error() -> (String, Vec<FieldError>) {
    (
        "Internal server error".to_string(),
        vec![FieldError::general("SERVER_ERROR", "Internal server error")],
    )
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(key) => Self::Conflict {
                field: key.field(),
                message: format!("{} already exists", key.field()),
            },
            StoreError::Stale => Self::Conflict {
                field: "status",
                message: "room was modified concurrently, reload and retry".to_string(),
            },
            StoreError::NotFound => Self::NotFound("record"),
            StoreError::Backend(e) => Self::Server(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UniqueKey;
    use http_body_util::BodyExt;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_keep_field_detail() {
        let (status, json) = body_json(AppError::invalid(
            "quantity",
            "OUT_OF_RANGE",
            "quantity must be at least 1",
        ))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["apiVersion"], "0.1.0");
        assert_eq!(json["data"]["success"], false);
        assert_eq!(json["data"]["errors"][0]["field"], "quantity");
        assert_eq!(json["data"]["errors"][0]["code"], "OUT_OF_RANGE");
    }

    #[tokio::test]
    async fn server_errors_do_not_leak_detail() {
        let (status, json) =
            body_json(AppError::Server(anyhow::anyhow!("connection refused on 10.0.0.3"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let text = json.to_string();
        assert!(!text.contains("10.0.0.3"));
        assert_eq!(json["data"]["message"], "Internal server error");
    }

    #[tokio::test]
    async fn expired_and_invalid_tokens_render_identically() {
        let (s1, j1) = body_json(AppError::TokenExpired).await;
        let (s2, j2) = body_json(AppError::TokenInvalid).await;
        assert_eq!(s1, StatusCode::UNAUTHORIZED);
        assert_eq!(s1, s2);
        assert_eq!(j1, j2);
    }

    #[tokio::test]
    async fn store_conflicts_become_conflict_with_field() {
        let err: AppError = StoreError::Conflict(UniqueKey::Email).into();
        let (status, json) = body_json(err).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["data"]["errors"][0]["field"], "email");
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = AppError::InvalidTransition {
            from: RoomStatus::Completed,
            attempted: RoomStatus::Shipped,
        };
        assert_eq!(err.to_string(), "cannot move room from COMPLETED to SHIPPED");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }
}
