// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::{extract::WithRejection, TypedHeader};
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::validation::ValidatedJson;

use crate::models::{
    AppointmentSearchQuery, AvailableSlotsQuery, CancelAppointmentRequest, CreateAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::router::AppointmentState;

type AppointmentPath = WithRejection<Path<Uuid>, AppError>;

pub async fn create_appointment(
    State(state): State<AppointmentState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    ValidatedJson(request): ValidatedJson<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = state
        .booking
        .create_appointment(request, &user, auth.token())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": "Appointment booked and awaiting confirmation"
        })),
    ))
}

pub async fn search_appointments(
    State(state): State<AppointmentState>,
    WithRejection(Query(query), _): WithRejection<Query<AppointmentSearchQuery>, AppError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointments = state
        .booking
        .search_appointments(&query, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "count": appointments.len(),
        "limit": query.limit(),
        "offset": query.offset()
    })))
}

pub async fn get_available_slots(
    State(state): State<AppointmentState>,
    WithRejection(Query(query), _): WithRejection<Query<AvailableSlotsQuery>, AppError>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    let slots = state
        .slots
        .get_available_slots(query.doctor_id, query.date, auth.token())
        .await?;

    Ok(Json(json!({
        "doctor_id": query.doctor_id,
        "date": query.date,
        "slots": slots,
        "total": slots.len()
    })))
}

pub async fn get_appointment(
    State(state): State<AppointmentState>,
    WithRejection(Path(appointment_id), _): AppointmentPath,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking
        .get_appointment_for(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!({ "appointment": appointment })))
}

pub async fn update_appointment(
    State(state): State<AppointmentState>,
    WithRejection(Path(appointment_id), _): AppointmentPath,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    ValidatedJson(request): ValidatedJson<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking
        .update_appointment(appointment_id, request, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated"
    })))
}

pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    WithRejection(Path(appointment_id), _): AppointmentPath,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    ValidatedJson(request): ValidatedJson<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking
        .cancel_appointment(appointment_id, request.reason, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled"
    })))
}

pub async fn confirm_appointment(
    State(state): State<AppointmentState>,
    WithRejection(Path(appointment_id), _): AppointmentPath,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state
        .booking
        .confirm_appointment(appointment_id, &user, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment confirmed"
    })))
}
