use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{DbError, SupabaseClient};
use shared_models::time::format_hhmm;

use crate::models::{AppointmentError, Schedule, ScheduleStatus};

/// Reserves and releases `schedules` rows.
///
/// Slots are system-managed, so every write goes out with the service token. The
/// `(doctor_id, date, start_time, end_time)` uniqueness constraint is what arbitrates
/// two bookings racing for a slot that does not exist yet.
pub struct ScheduleService {
    supabase: Arc<SupabaseClient>,
    service_token: String,
}

impl ScheduleService {
    pub fn new(supabase: Arc<SupabaseClient>, service_token: impl Into<String>) -> Self {
        Self {
            supabase,
            service_token: service_token.into(),
        }
    }

    pub async fn find_slot(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Option<Schedule>, AppointmentError> {
        let path = format!(
            "/rest/v1/schedules?doctor_id=eq.{}&date=eq.{}&start_time=eq.{}&end_time=eq.{}",
            doctor_id,
            date,
            format_hhmm(&start),
            format_hhmm(&end)
        );

        Ok(self.supabase.select_one(&path, Some(&self.service_token)).await?)
    }

    /// Returns a BUSY slot owned by the caller, or `SlotTaken`.
    pub async fn reserve(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<Schedule, AppointmentError> {
        if let Some(existing) = self.find_slot(doctor_id, date, start, end).await? {
            return self.claim(existing).await;
        }

        let row = json!({
            "doctor_id": doctor_id,
            "date": date,
            "start_time": format_hhmm(&start),
            "end_time": format_hhmm(&end),
            "status": ScheduleStatus::Busy,
        });

        match self.supabase.insert::<Schedule>("schedules", row, Some(&self.service_token)).await {
            Ok(schedule) => {
                info!("Created busy slot {} for doctor {} on {} {}", schedule.id, doctor_id, date, start);
                Ok(schedule)
            }
            Err(DbError::UniqueViolation(_)) => {
                warn!("Slot for doctor {} on {} {} was created concurrently, re-fetching", doctor_id, date, start);
                let existing = self
                    .find_slot(doctor_id, date, start, end)
                    .await?
                    .ok_or(AppointmentError::SlotTaken)?;
                self.claim(existing).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Conditional AVAILABLE → BUSY flip; zero updated rows means someone else won.
    async fn claim(&self, schedule: Schedule) -> Result<Schedule, AppointmentError> {
        if schedule.status == ScheduleStatus::Busy {
            debug!("Slot {} is already busy", schedule.id);
            return Err(AppointmentError::SlotTaken);
        }

        let path = format!("/rest/v1/schedules?id=eq.{}&status=eq.AVAILABLE", schedule.id);
        let claimed: Vec<Schedule> = self
            .supabase
            .update(&path, json!({ "status": ScheduleStatus::Busy }), Some(&self.service_token))
            .await?;

        claimed.into_iter().next().ok_or(AppointmentError::SlotTaken)
    }

    pub async fn release(&self, schedule_id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("/rest/v1/schedules?id=eq.{}", schedule_id);
        let _: Vec<Value> = self
            .supabase
            .update(&path, json!({ "status": ScheduleStatus::Available }), Some(&self.service_token))
            .await?;

        info!("Released slot {}", schedule_id);
        Ok(())
    }
}
