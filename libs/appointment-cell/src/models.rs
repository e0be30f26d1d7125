// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use shared_database::DbError;
use shared_models::error::AppError;
use shared_models::time::hhmm;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub schedule_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    /// Statuses that occupy the doctor's and the patient's calendar.
    pub const ACTIVE: [AppointmentStatus; 3] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Entering one of these gives the schedule slot back.
    pub fn releases_slot(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "PENDING",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::InProgress => "IN_PROGRESS",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::NoShow => "NO_SHOW",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentType {
    Online,
    Offline,
}

// ==============================================================================
// SCHEDULE SLOTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: ScheduleStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleStatus {
    Available,
    Busy,
}

// ==============================================================================
// READ-ONLY COLLABORATORS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub user_id: String,
    pub full_name: String,
    pub specialty: Option<String>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: Uuid,
    pub user_id: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Clinic {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    #[serde(with = "hhmm")]
    pub opening_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub closing_time: NaiveTime,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClinicDoctor {
    pub clinic_id: Uuid,
    pub doctor_id: Uuid,
}

/// `clinic_doctors` row with its clinic embedded (`select=clinic_id,clinics(...)`).
#[derive(Debug, Clone, Deserialize)]
pub struct DoctorClinicLink {
    pub clinic_id: Uuid,
    pub clinics: Option<Clinic>,
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub appointment_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(rename = "type")]
    pub appointment_type: AppointmentType,
    #[validate(length(max = 2000, message = "symptoms must be at most 2000 characters"))]
    pub symptoms: Option<String>,
    #[validate(length(max = 2000, message = "notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateAppointmentRequest {
    pub status: Option<AppointmentStatus>,
    #[validate(length(max = 2000, message = "symptoms must be at most 2000 characters"))]
    pub symptoms: Option<String>,
    #[validate(length(max = 2000, message = "notes must be at most 2000 characters"))]
    pub notes: Option<String>,
}

impl UpdateAppointmentRequest {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.symptoms.is_none() && self.notes.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CancelAppointmentRequest {
    #[validate(length(max = 500, message = "reason must be at most 500 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableSlotsQuery {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub clinic_id: Uuid,
    pub clinic_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AppointmentSearchQuery {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Clinic not found")]
    ClinicNotFound,

    #[error("Doctor is not accepting appointments")]
    DoctorUnavailable,

    #[error("Doctor does not work at this clinic")]
    DoctorNotInClinic,

    #[error("Doctor already has an appointment at this time")]
    DoctorConflict,

    #[error("Patient already has an appointment at this time")]
    PatientConflict,

    #[error("This time slot has already been booked")]
    SlotTaken,

    #[error("Invalid appointment time: {0}")]
    InvalidTime(String),

    #[error("Invalid status transition: {from} → {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment was modified by another request")]
    StaleWrite,

    #[error("Appointment can no longer be edited in status {0}")]
    Locked(AppointmentStatus),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound
            | AppointmentError::DoctorNotFound
            | AppointmentError::PatientNotFound
            | AppointmentError::ClinicNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::DoctorUnavailable
            | AppointmentError::DoctorNotInClinic
            | AppointmentError::Locked(_)
            | AppointmentError::Validation(_) => AppError::validation(err.to_string()),
            AppointmentError::InvalidTime(ref message) => AppError::field("end_time", message.clone()),
            AppointmentError::DoctorConflict
            | AppointmentError::PatientConflict
            | AppointmentError::SlotTaken
            | AppointmentError::StaleWrite => AppError::Conflict(err.to_string()),
            AppointmentError::InvalidStatusTransition { from, to } => AppError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            AppointmentError::Forbidden(message) => AppError::Forbidden(message),
            AppointmentError::Database(e) => AppError::Database(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn statuses_serialize_screaming_snake_case() {
        assert_eq!(serde_json::to_value(AppointmentStatus::InProgress).unwrap(), json!("IN_PROGRESS"));
        assert_eq!(serde_json::to_value(AppointmentStatus::NoShow).unwrap(), json!("NO_SHOW"));
        assert_eq!(AppointmentStatus::NoShow.to_string(), "NO_SHOW");
    }

    #[test]
    fn only_pending_confirmed_and_in_progress_are_active() {
        let active: Vec<_> = [
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ]
        .into_iter()
        .filter(AppointmentStatus::is_active)
        .collect();

        assert_eq!(active, AppointmentStatus::ACTIVE.to_vec());
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(!AppointmentStatus::InProgress.is_terminal());
    }

    #[test]
    fn create_request_accepts_postgres_time_format() {
        let request: CreateAppointmentRequest = serde_json::from_value(json!({
            "patient_id": Uuid::nil(),
            "doctor_id": Uuid::nil(),
            "appointment_date": "2025-03-10",
            "start_time": "09:00:00",
            "end_time": "09:30",
            "type": "ONLINE"
        }))
        .unwrap();

        assert_eq!(request.start_time, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(request.appointment_type, AppointmentType::Online);
        assert!(request.clinic_id.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn overlong_symptoms_fail_validation() {
        let request = UpdateAppointmentRequest {
            symptoms: Some("x".repeat(2001)),
            ..Default::default()
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("symptoms"));
    }

    #[test]
    fn errors_map_onto_the_shared_taxonomy() {
        assert_eq!(AppError::from(AppointmentError::DoctorConflict).code(), "CONFLICT");
        assert_eq!(AppError::from(AppointmentError::DoctorNotInClinic).code(), "VALIDATION_ERROR");
        assert_eq!(AppError::from(AppointmentError::PatientNotFound).code(), "NOT_FOUND");

        let err = AppError::from(AppointmentError::InvalidStatusTransition {
            from: AppointmentStatus::Completed,
            to: AppointmentStatus::Cancelled,
        });
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert!(err.public_message().contains("COMPLETED → CANCELLED"));
    }

    #[test]
    fn search_limit_is_clamped() {
        let query = AppointmentSearchQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(query.limit(), 1);
        assert_eq!(AppointmentSearchQuery::default().limit(), 20);
    }
}
