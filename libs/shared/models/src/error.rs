use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// A single field-level validation problem reported back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        issues: Vec<FieldIssue>,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid status transition: {from} → {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Payment already completed: {0}")]
    AlreadyPaid(String),

    #[error("Invalid appointment status: {0}")]
    InvalidAppointmentStatus(String),

    #[error("Gateway signature invalid")]
    GatewaySignatureInvalid,

    #[error("Database error: {0}")]
    Database(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            issues: Vec::new(),
        }
    }

    pub fn field(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        AppError::Validation {
            issues: vec![FieldIssue::new(field, message.clone())],
            message,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Conflict(_) => "CONFLICT",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::AlreadyPaid(_) => "ALREADY_PAID",
            AppError::InvalidAppointmentStatus(_) => "INVALID_APPOINTMENT_STATUS",
            AppError::GatewaySignatureInvalid => "GATEWAY_SIGNATURE_INVALID",
            AppError::Database(_) | AppError::ExternalService(_) => "BAD_GATEWAY",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } | AppError::GatewaySignatureInvalid => StatusCode::BAD_REQUEST,
            AppError::Conflict(_)
            | AppError::InvalidTransition { .. }
            | AppError::AlreadyPaid(_)
            | AppError::InvalidAppointmentStatus(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to clients. Backend failures are not echoed verbatim.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Auth(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::AlreadyPaid(msg)
            | AppError::InvalidAppointmentStatus(msg) => msg.clone(),
            AppError::Validation { message, .. } => message.clone(),
            AppError::InvalidTransition { from, to } => {
                format!("Cannot change appointment status: {} → {}", from, to)
            }
            AppError::GatewaySignatureInvalid => "Invalid payment gateway signature".to_string(),
            AppError::Database(_) | AppError::ExternalService(_) => {
                "Upstream service unavailable".to_string()
            }
            AppError::Internal(_) => "Internal server error".to_string(),
        }
    }

    pub fn to_body(&self) -> serde_json::Value {
        let mut error = json!({
            "code": self.code(),
            "message": self.public_message(),
        });
        if let AppError::Validation { issues, .. } = self {
            error["issues"] = json!(issues);
        }
        json!({ "error": error })
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, self);
        } else {
            tracing::warn!("Request rejected: {}: {}", status, self);
        }

        (status, Json(self.to_body())).into_response()
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::field("query", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::field("path", rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_code_and_message() {
        let body = AppError::Conflict("Doctor already has an appointment at this time".into()).to_body();
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert_eq!(body["error"]["message"], "Doctor already has an appointment at this time");
        assert!(body["error"].get("issues").is_none());
    }

    #[test]
    fn validation_envelope_lists_field_issues() {
        let err = AppError::field("end_time", "end_time must be after start_time");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let body = err.to_body();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["issues"][0]["field"], "end_time");
    }

    #[test]
    fn invalid_transition_reports_pair() {
        let err = AppError::InvalidTransition {
            from: "COMPLETED".into(),
            to: "CANCELLED".into(),
        };
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert!(err.public_message().contains("COMPLETED → CANCELLED"));
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = AppError::Internal("connection pool exhausted at 10.0.0.3".into());
        let body = err.to_body();
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "Internal server error");
    }
}
