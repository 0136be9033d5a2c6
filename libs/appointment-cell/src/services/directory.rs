// libs/appointment-cell/src/services/directory.rs
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{AppointmentError, ClinicSettings};
use crate::services::shadow_ban::normalize_phone;

const CLINIC_COLUMNS: &str =
    "id,owner_id,slug,name,prevent_conflicts,min_gap_minutes,utc_offset_minutes,working_hours";

/// Lookups against the clinic and patient collaborators.
pub struct ClinicDirectory {
    supabase: Arc<SupabaseClient>,
}

/// A patient matched or created for a public booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatientMatch {
    Existing(Uuid),
    Created(Uuid),
}

impl PatientMatch {
    pub fn id(&self) -> Uuid {
        match self {
            PatientMatch::Existing(id) | PatientMatch::Created(id) => *id,
        }
    }
}

impl ClinicDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Resolve a clinic from the booking page URL: a UUID or a slug.
    pub async fn clinic_by_ref(&self, clinic_ref: &str, auth_token: &str) -> Result<ClinicSettings, AppointmentError> {
        let filter = match Uuid::parse_str(clinic_ref) {
            Ok(id) => format!("id=eq.{}", id),
            Err(_) => format!("slug=eq.{}", urlencoding::encode(clinic_ref)),
        };
        self.fetch_clinic(&filter, auth_token).await
    }

    pub async fn clinic_by_id(&self, clinic_id: Uuid, auth_token: &str) -> Result<ClinicSettings, AppointmentError> {
        self.fetch_clinic(&format!("id=eq.{}", clinic_id), auth_token).await
    }

    async fn fetch_clinic(&self, filter: &str, auth_token: &str) -> Result<ClinicSettings, AppointmentError> {
        let rows: Vec<ClinicSettings> = self.supabase
            .request(
                Method::GET,
                &format!("/rest/v1/clinics?{}&select={}&limit=1", filter, CLINIC_COLUMNS),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(AppointmentError::ClinicNotFound)
    }

    pub async fn find_patient_by_phone(
        &self,
        clinic_id: Uuid,
        phone: &str,
        auth_token: &str,
    ) -> Result<Option<Uuid>, AppointmentError> {
        let rows: Vec<Value> = self.supabase
            .request(
                Method::GET,
                &format!(
                    "/rest/v1/patients?clinic_id=eq.{}&phone=eq.{}&select=id&limit=1",
                    clinic_id,
                    normalize_phone(phone)
                ),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(rows
            .first()
            .and_then(|row| row["id"].as_str())
            .and_then(|id| Uuid::parse_str(id).ok()))
    }

    pub async fn create_patient(
        &self,
        clinic_id: Uuid,
        name: &str,
        phone: &str,
        email: Option<&str>,
        auth_token: &str,
    ) -> Result<Uuid, AppointmentError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/patients",
                Some(auth_token),
                Some(json!({
                    "clinic_id": clinic_id,
                    "name": name.trim(),
                    "phone": normalize_phone(phone),
                    "email": email,
                })),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let id = rows
            .first()
            .and_then(|row| row["id"].as_str())
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| AppointmentError::DatabaseError("Patient insert returned no id".to_string()))?;

        info!("Patient {} created from public booking at clinic {}", id, clinic_id);
        Ok(id)
    }

    pub async fn patient_belongs_to(&self, patient_id: Uuid, clinic_id: Uuid, auth_token: &str) -> Result<bool, AppointmentError> {
        let rows: Vec<Value> = self.supabase
            .request(
                Method::GET,
                &format!("/rest/v1/patients?id=eq.{}&clinic_id=eq.{}&select=id&limit=1", patient_id, clinic_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        debug!("Patient {} in clinic {}: {}", patient_id, clinic_id, !rows.is_empty());
        Ok(!rows.is_empty())
    }
}
