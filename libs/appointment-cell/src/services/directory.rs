use std::sync::Arc;

use uuid::Uuid;

use shared_database::SupabaseClient;

use crate::models::{AppointmentError, Clinic, ClinicDoctor, Doctor, Patient};

/// Lookups of the doctors, patients and clinics a booking refers to.
pub struct DirectoryService {
    supabase: Arc<SupabaseClient>,
}

impl DirectoryService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, AppointmentError> {
        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        self.supabase
            .select_one(&path, Some(auth_token))
            .await?
            .ok_or(AppointmentError::DoctorNotFound)
    }

    pub async fn get_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient, AppointmentError> {
        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        self.supabase
            .select_one(&path, Some(auth_token))
            .await?
            .ok_or(AppointmentError::PatientNotFound)
    }

    pub async fn get_clinic(&self, clinic_id: Uuid, auth_token: &str) -> Result<Clinic, AppointmentError> {
        let path = format!("/rest/v1/clinics?id=eq.{}", clinic_id);
        self.supabase
            .select_one(&path, Some(auth_token))
            .await?
            .ok_or(AppointmentError::ClinicNotFound)
    }

    pub async fn doctor_works_at(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/clinic_doctors?clinic_id=eq.{}&doctor_id=eq.{}",
            clinic_id, doctor_id
        );
        let link: Option<ClinicDoctor> = self.supabase.select_one(&path, Some(auth_token)).await?;
        Ok(link.is_some())
    }

    /// Patient profile belonging to an authenticated user, if any.
    pub async fn patient_for_user(&self, user_id: &str, auth_token: &str) -> Result<Option<Patient>, AppointmentError> {
        let path = format!("/rest/v1/patients?user_id=eq.{}", user_id);
        Ok(self.supabase.select_one(&path, Some(auth_token)).await?)
    }

    pub async fn doctor_for_user(&self, user_id: &str, auth_token: &str) -> Result<Option<Doctor>, AppointmentError> {
        let path = format!("/rest/v1/doctors?user_id=eq.{}", user_id);
        Ok(self.supabase.select_one(&path, Some(auth_token)).await?)
    }
}
