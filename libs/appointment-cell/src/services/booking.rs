// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use notification_cell::{NewNotification, NotificationDispatcher, NotificationType};
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_models::auth::User;
use shared_models::time::format_hhmm;

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, CreateAppointmentRequest, Doctor,
    Patient, UpdateAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::directory::DirectoryService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::schedule::ScheduleService;

/// The patient and doctor behind an appointment.
#[derive(Debug, Clone)]
pub struct Participants {
    pub patient: Patient,
    pub doctor: Doctor,
}

impl Participants {
    pub fn user_ids(&self) -> Vec<String> {
        vec![self.patient.user_id.clone(), self.doctor.user_id.clone()]
    }

    fn is_patient(&self, user: &User) -> bool {
        self.patient.user_id == user.id
    }

    fn is_doctor(&self, user: &User) -> bool {
        self.doctor.user_id == user.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    /// Read, cancel, edit symptoms or notes.
    Participant,
    /// Change status or confirm.
    Doctor,
}

fn authorize(participants: &Participants, user: &User, access: Access) -> Result<(), AppointmentError> {
    if user.is_admin() || participants.is_doctor(user) {
        return Ok(());
    }

    match access {
        Access::Participant if participants.is_patient(user) => Ok(()),
        Access::Participant => Err(AppointmentError::Forbidden(
            "You do not have access to this appointment".to_string(),
        )),
        Access::Doctor => Err(AppointmentError::Forbidden(
            "Only the appointment's doctor or an admin can do this".to_string(),
        )),
    }
}

fn append_cancellation_reason(notes: Option<&str>, reason: &str) -> String {
    match notes {
        Some(existing) if !existing.trim().is_empty() => {
            format!("{}\nCancellation reason: {}", existing, reason)
        }
        _ => format!("Cancellation reason: {}", reason),
    }
}

/// Notifications sent to both participants when an appointment is created or changes status.
pub fn compose_notifications(
    appointment: &Appointment,
    participants: &Participants,
    kind: NotificationType,
) -> Vec<NewNotification> {
    let when = format!(
        "{} at {}",
        appointment.appointment_date,
        format_hhmm(&appointment.start_time)
    );
    let data = json!({
        "appointment_id": appointment.id,
        "status": appointment.status,
    });

    let (patient_title, patient_message, doctor_title, doctor_message) = match kind {
        NotificationType::AppointmentCreated => (
            "Appointment booked".to_string(),
            format!(
                "Your appointment with {} on {} is awaiting confirmation",
                participants.doctor.full_name, when
            ),
            "New appointment request".to_string(),
            format!("{} booked an appointment on {}", participants.patient.full_name, when),
        ),
        NotificationType::AppointmentConfirmed => (
            "Appointment confirmed".to_string(),
            format!("Your appointment with {} on {} is confirmed", participants.doctor.full_name, when),
            "Appointment confirmed".to_string(),
            format!("Appointment with {} on {} is confirmed", participants.patient.full_name, when),
        ),
        NotificationType::AppointmentCancelled => (
            "Appointment cancelled".to_string(),
            format!("Your appointment with {} on {} was cancelled", participants.doctor.full_name, when),
            "Appointment cancelled".to_string(),
            format!("Appointment with {} on {} was cancelled", participants.patient.full_name, when),
        ),
        _ => {
            let message = format!("Appointment on {} is now {}", when, appointment.status);
            ("Appointment updated".to_string(), message.clone(), "Appointment updated".to_string(), message)
        }
    };

    vec![
        NewNotification::new(&participants.patient.user_id, kind.clone(), patient_title, patient_message)
            .with_data(data.clone()),
        NewNotification::new(&participants.doctor.user_id, kind, doctor_title, doctor_message).with_data(data),
    ]
}

fn notification_kind_for(status: AppointmentStatus) -> NotificationType {
    match status {
        AppointmentStatus::Confirmed => NotificationType::AppointmentConfirmed,
        AppointmentStatus::Cancelled => NotificationType::AppointmentCancelled,
        _ => NotificationType::AppointmentUpdated,
    }
}

pub struct AppointmentBookingService {
    supabase: Arc<SupabaseClient>,
    directory: DirectoryService,
    conflict_service: ConflictDetectionService,
    schedule_service: ScheduleService,
    lifecycle_service: AppointmentLifecycleService,
    notifier: NotificationDispatcher,
    service_token: String,
}

impl AppointmentBookingService {
    pub fn new(config: &AppConfig, notifier: NotificationDispatcher) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            directory: DirectoryService::new(Arc::clone(&supabase)),
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            schedule_service: ScheduleService::new(Arc::clone(&supabase), config.service_token()),
            lifecycle_service: AppointmentLifecycleService::new(),
            notifier,
            service_token: config.service_token().to_string(),
            supabase,
        }
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        requested_by: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Booking doctor {} for patient {} on {} {}-{}",
            request.doctor_id, request.patient_id, request.appointment_date, request.start_time, request.end_time
        );

        if request.start_time >= request.end_time {
            return Err(AppointmentError::InvalidTime(
                "end_time must be after start_time".to_string(),
            ));
        }

        let doctor = self.directory.get_doctor(request.doctor_id, auth_token).await?;
        if !doctor.is_available {
            return Err(AppointmentError::DoctorUnavailable);
        }

        let patient = self.directory.get_patient(request.patient_id, auth_token).await?;
        if !requested_by.is_admin() && !requested_by.is_doctor() && patient.user_id != requested_by.id {
            return Err(AppointmentError::Forbidden(
                "Patients can only book appointments for themselves".to_string(),
            ));
        }

        if let Some(clinic_id) = request.clinic_id {
            self.directory.get_clinic(clinic_id, auth_token).await?;
            if !self.directory.doctor_works_at(clinic_id, doctor.id, auth_token).await? {
                return Err(AppointmentError::DoctorNotInClinic);
            }
        }

        self.conflict_service
            .check_booking_conflicts(
                doctor.id,
                patient.id,
                request.appointment_date,
                request.start_time,
                request.end_time,
                None,
                auth_token,
            )
            .await?;

        let schedule = self
            .schedule_service
            .reserve(doctor.id, request.appointment_date, request.start_time, request.end_time)
            .await?;

        let row = json!({
            "patient_id": patient.id,
            "doctor_id": doctor.id,
            "clinic_id": request.clinic_id,
            "schedule_id": schedule.id,
            "appointment_date": request.appointment_date,
            "start_time": format_hhmm(&request.start_time),
            "end_time": format_hhmm(&request.end_time),
            "type": request.appointment_type,
            "status": AppointmentStatus::Pending,
            "symptoms": request.symptoms,
            "notes": request.notes,
        });

        let appointment: Appointment = match self.supabase.insert("appointments", row, Some(auth_token)).await {
            Ok(appointment) => appointment,
            Err(e) => {
                error!("Appointment insert failed, releasing slot {}: {}", schedule.id, e);
                if let Err(release_err) = self.schedule_service.release(schedule.id).await {
                    error!("Failed to release slot {}: {}", schedule.id, release_err);
                }
                return Err(e.into());
            }
        };

        info!(
            "Appointment {} booked for patient {} with doctor {} (slot {})",
            appointment.id, patient.id, doctor.id, schedule.id
        );

        let participants = Participants { patient, doctor };
        self.announce(&appointment, &participants, NotificationType::AppointmentCreated)
            .await;

        Ok(appointment)
    }

    // ==============================================================================
    // READS
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        self.supabase
            .select_one(&path, Some(auth_token))
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    /// Fetches an appointment the caller is allowed to see.
    pub async fn get_appointment_for(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, auth_token).await?;
        if !user.is_admin() {
            let participants = self.participants(&appointment, auth_token).await?;
            authorize(&participants, user, Access::Participant)?;
        }
        Ok(appointment)
    }

    pub async fn participants(&self, appointment: &Appointment, auth_token: &str) -> Result<Participants, AppointmentError> {
        let patient = self.directory.get_patient(appointment.patient_id, auth_token).await?;
        let doctor = self.directory.get_doctor(appointment.doctor_id, auth_token).await?;
        Ok(Participants { patient, doctor })
    }

    pub async fn patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient, AppointmentError> {
        self.directory.get_patient(patient_id, auth_token).await
    }

    /// Patients only ever see their own appointments and doctors only theirs, whatever
    /// filters they pass.
    pub async fn search_appointments(
        &self,
        query: &AppointmentSearchQuery,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut patient_id = query.patient_id;
        let mut doctor_id = query.doctor_id;

        if !user.is_admin() {
            if user.is_doctor() {
                match self.directory.doctor_for_user(&user.id, auth_token).await? {
                    Some(doctor) => doctor_id = Some(doctor.id),
                    None => return Ok(Vec::new()),
                }
            } else {
                match self.directory.patient_for_user(&user.id, auth_token).await? {
                    Some(patient) => patient_id = Some(patient.id),
                    None => return Ok(Vec::new()),
                }
            }
        }

        let mut path = format!(
            "/rest/v1/appointments?order=appointment_date.asc,start_time.asc&limit={}&offset={}",
            query.limit(),
            query.offset()
        );
        if let Some(id) = patient_id {
            path.push_str(&format!("&patient_id=eq.{}", id));
        }
        if let Some(id) = doctor_id {
            path.push_str(&format!("&doctor_id=eq.{}", id));
        }
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        if let Some(date) = query.date {
            path.push_str(&format!("&appointment_date=eq.{}", date));
        }
        if let Some(from) = query.from_date {
            path.push_str(&format!("&appointment_date=gte.{}", from));
        }
        if let Some(to) = query.to_date {
            path.push_str(&format!("&appointment_date=lte.{}", to));
        }

        Ok(self.supabase.select(&path, Some(auth_token)).await?)
    }

    // ==============================================================================
    // CHANGES
    // ==============================================================================

    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if request.is_empty() {
            return Err(AppointmentError::Validation("Nothing to update".to_string()));
        }

        let current = self.get_appointment(appointment_id, auth_token).await?;
        let participants = self.participants(&current, auth_token).await?;
        authorize(&participants, user, Access::Participant)?;
        if request.status.is_some() {
            authorize(&participants, user, Access::Doctor)?;
        }

        let mut changes = Map::new();
        if request.symptoms.is_some() || request.notes.is_some() {
            if current.status.is_terminal() {
                return Err(AppointmentError::Locked(current.status));
            }
            if let Some(symptoms) = request.symptoms {
                changes.insert("symptoms".to_string(), Value::String(symptoms));
            }
            if let Some(notes) = request.notes {
                changes.insert("notes".to_string(), Value::String(notes));
            }
        }

        let updated = self.commit(&current, request.status, changes, auth_token).await?;

        let kind = match request.status {
            Some(status) => notification_kind_for(status),
            None => NotificationType::AppointmentUpdated,
        };
        self.announce(&updated, &participants, kind).await;

        Ok(updated)
    }

    pub async fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        reason: Option<String>,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;
        let participants = self.participants(&current, auth_token).await?;
        authorize(&participants, user, Access::Participant)?;

        let mut changes = Map::new();
        if let Some(reason) = reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            changes.insert(
                "notes".to_string(),
                Value::String(append_cancellation_reason(current.notes.as_deref(), reason)),
            );
        }

        let cancelled = self
            .commit(&current, Some(AppointmentStatus::Cancelled), changes, auth_token)
            .await?;

        info!("Appointment {} cancelled by user {}", appointment_id, user.id);
        self.announce(&cancelled, &participants, NotificationType::AppointmentCancelled)
            .await;

        Ok(cancelled)
    }

    pub async fn confirm_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id, auth_token).await?;
        let participants = self.participants(&current, auth_token).await?;
        authorize(&participants, user, Access::Doctor)?;

        let confirmed = self
            .commit(&current, Some(AppointmentStatus::Confirmed), Map::new(), auth_token)
            .await?;

        self.announce(&confirmed, &participants, NotificationType::AppointmentConfirmed)
            .await;

        Ok(confirmed)
    }

    /// Moves a PENDING appointment to CONFIRMED once its payment clears. Runs with the
    /// service token since the gateway, not a user, triggers it. Returns `None` when the
    /// appointment was not PENDING.
    pub async fn confirm_after_payment(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        let current = self.get_appointment(appointment_id, &self.service_token).await?;
        if current.status != AppointmentStatus::Pending {
            debug!("Appointment {} is {}, payment does not change it", appointment_id, current.status);
            return Ok(None);
        }

        let participants = self.participants(&current, &self.service_token).await?;
        let confirmed = self
            .commit(&current, Some(AppointmentStatus::Confirmed), Map::new(), &self.service_token)
            .await?;

        info!("Appointment {} confirmed after payment", appointment_id);
        self.announce(&confirmed, &participants, NotificationType::AppointmentConfirmed)
            .await;

        Ok(Some(confirmed))
    }

    /// Applies `changes` (and an optional status change) guarded by the status the caller
    /// read, so a concurrent transition makes this write match zero rows.
    async fn commit(
        &self,
        current: &Appointment,
        target: Option<AppointmentStatus>,
        mut changes: Map<String, Value>,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if let Some(to) = target {
            self.lifecycle_service.validate_status_transition(current.status, to)?;
            changes.insert("status".to_string(), json!(to));
        }
        changes.insert("updated_at".to_string(), json!(Utc::now()));

        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            current.id, current.status
        );
        let rows: Vec<Appointment> = self
            .supabase
            .update(&path, Value::Object(changes), Some(auth_token))
            .await?;

        let updated = match rows.into_iter().next() {
            Some(updated) => updated,
            None => {
                let latest = self.get_appointment(current.id, auth_token).await?;
                warn!(
                    "Appointment {} moved from {} to {} during update",
                    current.id, current.status, latest.status
                );
                return Err(match target {
                    Some(to) => AppointmentError::InvalidStatusTransition {
                        from: latest.status,
                        to,
                    },
                    None => AppointmentError::StaleWrite,
                });
            }
        };

        if let Some(to) = target {
            info!("Appointment {} status {} -> {}", current.id, current.status, to);
            if to.releases_slot() {
                if let Some(schedule_id) = updated.schedule_id {
                    if let Err(e) = self.schedule_service.release(schedule_id).await {
                        error!("Failed to release slot {} for appointment {}: {}", schedule_id, current.id, e);
                    }
                }
            }
        }

        Ok(updated)
    }

    async fn announce(&self, appointment: &Appointment, participants: &Participants, kind: NotificationType) {
        self.notifier
            .dispatch_in_background(compose_notifications(appointment, participants, kind));

        match serde_json::to_value(appointment) {
            Ok(payload) => {
                self.notifier
                    .emit_appointment_updated(&participants.user_ids(), payload)
                    .await
            }
            Err(e) => warn!("Failed to serialize appointment {} for socket push: {}", appointment.id, e),
        }
    }
}
