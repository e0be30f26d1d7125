use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;
use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{AppointmentError, AvailableSlot, DoctorClinicLink};
use crate::services::conflict::{intervals_overlap, ConflictDetectionService};

pub const SLOT_MINUTES: i64 = 30;

/// One clinic's working hours for a doctor.
#[derive(Debug, Clone, PartialEq)]
pub struct ClinicWindow {
    pub clinic_id: Uuid,
    pub clinic_name: String,
    pub opening: NaiveTime,
    pub closing: NaiveTime,
}

/// Walks each window in `slot_minutes` steps from opening time, keeping candidates that
/// end by closing time and overlap none of the `booked` ranges.
pub fn generate_slots(
    windows: &[ClinicWindow],
    booked: &[(NaiveTime, NaiveTime)],
    slot_minutes: i64,
) -> Vec<AvailableSlot> {
    let step = Duration::minutes(slot_minutes);
    let mut slots = Vec::new();

    for window in windows {
        let mut start = window.opening;
        loop {
            let (end, wrapped) = start.overflowing_add_signed(step);
            if wrapped != 0 || end > window.closing {
                break;
            }

            let taken = booked
                .iter()
                .any(|(booked_start, booked_end)| intervals_overlap(start, end, *booked_start, *booked_end));
            if !taken {
                slots.push(AvailableSlot {
                    start_time: start,
                    end_time: end,
                    clinic_id: window.clinic_id,
                    clinic_name: window.clinic_name.clone(),
                });
            }
            start = end;
        }
    }

    slots
}

pub struct SlotGeneratorService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
}

impl SlotGeneratorService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    /// Working hours at every active clinic the doctor is linked to.
    pub async fn clinic_windows(&self, doctor_id: Uuid, auth_token: &str) -> Result<Vec<ClinicWindow>, AppointmentError> {
        let path = format!(
            "/rest/v1/clinic_doctors?doctor_id=eq.{}&select=clinic_id,clinics(id,name,address,opening_time,closing_time,is_active)",
            doctor_id
        );
        let links: Vec<DoctorClinicLink> = self.supabase.select(&path, Some(auth_token)).await?;

        Ok(links
            .into_iter()
            .filter_map(|link| link.clinics)
            .filter(|clinic| clinic.is_active)
            .map(|clinic| ClinicWindow {
                clinic_id: clinic.id,
                clinic_name: clinic.name,
                opening: clinic.opening_time,
                closing: clinic.closing_time,
            })
            .collect())
    }

    pub async fn get_available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        auth_token: &str,
    ) -> Result<Vec<AvailableSlot>, AppointmentError> {
        let windows = self.clinic_windows(doctor_id, auth_token).await?;
        let booked: Vec<(NaiveTime, NaiveTime)> = self
            .conflict_service
            .doctor_appointments_on(doctor_id, date, auth_token)
            .await?
            .into_iter()
            .filter(|a| a.status.is_active())
            .map(|a| (a.start_time, a.end_time))
            .collect();

        let slots = generate_slots(&windows, &booked, SLOT_MINUTES);
        debug!(
            "Doctor {} on {}: {} windows, {} booked, {} free slots",
            doctor_id,
            date,
            windows.len(),
            booked.len(),
            slots.len()
        );

        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn window(opening: NaiveTime, closing: NaiveTime) -> ClinicWindow {
        ClinicWindow {
            clinic_id: Uuid::nil(),
            clinic_name: "Central".to_string(),
            opening,
            closing,
        }
    }

    #[test]
    fn empty_day_yields_every_half_hour() {
        let slots = generate_slots(&[window(t(8, 0), t(12, 0))], &[], SLOT_MINUTES);
        assert_eq!(slots.len(), 8);
        assert_eq!(slots[0].start_time, t(8, 0));
        assert_eq!(slots[7].end_time, t(12, 0));
    }

    #[test]
    fn partial_trailing_slot_is_dropped() {
        let slots = generate_slots(&[window(t(8, 0), t(9, 45))], &[], SLOT_MINUTES);
        assert_eq!(slots.len(), 3);
        assert_eq!(slots.last().unwrap().end_time, t(9, 30));
    }

    #[test]
    fn booked_ranges_remove_overlapping_candidates() {
        let booked = [(t(9, 0), t(9, 30)), (t(10, 15), t(10, 45))];
        let slots = generate_slots(&[window(t(9, 0), t(11, 0))], &booked, SLOT_MINUTES);
        let starts: Vec<_> = slots.iter().map(|s| s.start_time).collect();
        // 10:15-10:45 knocks out both 10:00 and 10:30
        assert_eq!(starts, vec![t(9, 30)]);
    }

    #[test]
    fn closing_before_opening_yields_nothing() {
        assert!(generate_slots(&[window(t(18, 0), t(8, 0))], &[], SLOT_MINUTES).is_empty());
        assert!(generate_slots(&[window(t(23, 45), t(23, 59))], &[], SLOT_MINUTES).is_empty());
    }

    #[test]
    fn every_window_contributes_tagged_slots() {
        let mut afternoon = window(t(14, 0), t(15, 0));
        afternoon.clinic_name = "Riverside".to_string();
        let slots = generate_slots(&[window(t(8, 0), t(9, 0)), afternoon], &[], SLOT_MINUTES);

        assert_eq!(slots.len(), 4);
        assert_eq!(slots[2].clinic_name, "Riverside");
        assert_eq!(slots[2].start_time, t(14, 0));
    }
}
