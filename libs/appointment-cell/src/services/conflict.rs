use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};

/// Three-case overlap test on half-open `[start, end)` ranges: the new range starts
/// inside the existing one, ends inside it, or fully contains it.
pub fn intervals_overlap(
    new_start: NaiveTime,
    new_end: NaiveTime,
    existing_start: NaiveTime,
    existing_end: NaiveTime,
) -> bool {
    let starts_inside = new_start >= existing_start && new_start < existing_end;
    let ends_inside = new_end > existing_start && new_end <= existing_end;
    let contains = new_start <= existing_start && new_end >= existing_end;

    starts_inside || ends_inside || contains
}

/// Active appointments in `existing` that overlap `[start, end)`.
pub fn find_conflicts<'a>(
    existing: &'a [Appointment],
    start: NaiveTime,
    end: NaiveTime,
    exclude_appointment_id: Option<Uuid>,
) -> Vec<&'a Appointment> {
    existing
        .iter()
        .filter(|a| a.status.is_active())
        .filter(|a| Some(a.id) != exclude_appointment_id)
        .filter(|a| intervals_overlap(start, end, a.start_time, a.end_time))
        .collect()
}

fn active_status_filter() -> String {
    let statuses: Vec<&str> = AppointmentStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
    format!("in.({})", statuses.join(","))
}

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Active appointments of a doctor on one date, earliest first.
    pub async fn doctor_appointments_on(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.active_appointments_on("doctor_id", doctor_id, date, auth_token).await
    }

    pub async fn patient_appointments_on(
        &self,
        patient_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.active_appointments_on("patient_id", patient_id, date, auth_token).await
    }

    async fn active_appointments_on(
        &self,
        column: &str,
        id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?{}=eq.{}&appointment_date=eq.{}&status={}&order=start_time.asc",
            column,
            id,
            date,
            active_status_filter()
        );

        Ok(self.supabase.select(&path, Some(auth_token)).await?)
    }

    /// Fails with the doctor or patient conflict when either calendar already holds an
    /// active appointment overlapping the requested range.
    #[allow(clippy::too_many_arguments)]
    pub async fn check_booking_conflicts(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        exclude_appointment_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        debug!("Checking conflicts for doctor {} / patient {} on {} {}-{}", doctor_id, patient_id, date, start, end);

        let doctor_appointments = self.doctor_appointments_on(doctor_id, date, auth_token).await?;
        let clashes = find_conflicts(&doctor_appointments, start, end, exclude_appointment_id);
        if !clashes.is_empty() {
            warn!("Conflict detected for doctor {} - {} overlapping appointments", doctor_id, clashes.len());
            return Err(AppointmentError::DoctorConflict);
        }

        let patient_appointments = self.patient_appointments_on(patient_id, date, auth_token).await?;
        let clashes = find_conflicts(&patient_appointments, start, end, exclude_appointment_id);
        if !clashes.is_empty() {
            warn!("Conflict detected for patient {} - {} overlapping appointments", patient_id, clashes.len());
            return Err(AppointmentError::PatientConflict);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentType;
    use chrono::Utc;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn appointment(start: NaiveTime, end: NaiveTime, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            clinic_id: None,
            schedule_id: None,
            appointment_date: NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
            start_time: start,
            end_time: end,
            appointment_type: AppointmentType::Offline,
            status,
            symptoms: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn overlap_covers_all_three_cases() {
        // starts inside
        assert!(intervals_overlap(t(9, 15), t(9, 45), t(9, 0), t(9, 30)));
        // ends inside
        assert!(intervals_overlap(t(8, 45), t(9, 15), t(9, 0), t(9, 30)));
        // contains
        assert!(intervals_overlap(t(8, 0), t(10, 0), t(9, 0), t(9, 30)));
        // identical
        assert!(intervals_overlap(t(9, 0), t(9, 30), t(9, 0), t(9, 30)));
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        assert!(!intervals_overlap(t(9, 30), t(10, 0), t(9, 0), t(9, 30)));
        assert!(!intervals_overlap(t(8, 30), t(9, 0), t(9, 0), t(9, 30)));
    }

    #[test]
    fn inactive_and_excluded_appointments_never_conflict() {
        let cancelled = appointment(t(9, 0), t(9, 30), AppointmentStatus::Cancelled);
        let completed = appointment(t(9, 0), t(9, 30), AppointmentStatus::Completed);
        let pending = appointment(t(9, 0), t(9, 30), AppointmentStatus::Pending);
        let pending_id = pending.id;
        let existing = vec![cancelled, completed, pending];

        assert_eq!(find_conflicts(&existing, t(9, 0), t(9, 30), None).len(), 1);
        assert!(find_conflicts(&existing, t(9, 0), t(9, 30), Some(pending_id)).is_empty());
    }

    #[test]
    fn status_filter_lists_active_statuses() {
        assert_eq!(active_status_filter(), "in.(PENDING,CONFIRMED,IN_PROGRESS)");
    }
}
