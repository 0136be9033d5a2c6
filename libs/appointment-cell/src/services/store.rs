// libs/appointment-cell/src/services/store.rs
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use realtime_cell::{ChangeEvent, ChangeFeed};
use shared_database::supabase::SupabaseClient;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AppointmentStatus, NewAppointment,
};

/// Sole writer of `appointments`. Every successful write is published to the
/// change feed after the store confirms it.
pub struct AppointmentStore {
    supabase: Arc<SupabaseClient>,
    feed: ChangeFeed,
}

fn representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

impl AppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, feed: ChangeFeed) -> Self {
        Self { supabase, feed }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub async fn insert(&self, new: &NewAppointment, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(new).map_err(|e| AppointmentError::ValidationError(e.to_string()))?;

        let rows: Vec<Appointment> = self.supabase
            .request_with_headers(Method::POST, "/rest/v1/appointments", Some(auth_token), Some(body), Some(representation()))
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let appointment = rows
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Insert returned no row".to_string()))?;

        info!("Appointment {} created for clinic {} ({})", appointment.id, appointment.clinic_id, appointment.source);
        self.feed.publish(ChangeEvent::Insert(appointment.clone()));

        Ok(appointment)
    }

    pub async fn get(&self, appointment_id: Uuid, auth_token: &str) -> Result<Appointment, AppointmentError> {
        let rows: Vec<Appointment> = self.supabase
            .request(
                Method::GET,
                &format!("/rest/v1/appointments?id=eq.{}&limit=1", appointment_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        rows.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    /// Fetch a row the caller's clinic owns. Rows of other clinics are
    /// reported as missing.
    pub async fn get_for_clinic(
        &self,
        appointment_id: Uuid,
        clinic_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get(appointment_id, auth_token).await?;
        if appointment.clinic_id != clinic_id {
            debug!("Appointment {} does not belong to clinic {}", appointment_id, clinic_id);
            return Err(AppointmentError::NotFound);
        }
        Ok(appointment)
    }

    pub async fn list_for_clinic(
        &self,
        clinic_id: Uuid,
        query: &AppointmentListQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut path = format!("/rest/v1/appointments?clinic_id=eq.{}", clinic_id);
        if let Some(source) = query.source {
            path.push_str(&format!("&source=eq.{}", source));
        }
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        path.push_str(&format!(
            "&order=appointment_date.desc&offset={}&limit={}",
            query.offset.unwrap_or(0),
            query.limit.unwrap_or(50).min(200)
        ));

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    /// Write a new status. The update only applies if the row still has the
    /// status it was read with.
    pub async fn update_status(
        &self,
        current: &Appointment,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}",
            current.id, current.status
        );

        let rows: Vec<Appointment> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(json!({ "status": status })),
                Some(representation()),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let updated = rows.into_iter().next().ok_or_else(|| {
            AppointmentError::ValidationError(format!(
                "Appointment {} changed while it was being updated",
                current.id
            ))
        })?;

        info!("Appointment {} moved {} -> {}", updated.id, current.status, updated.status);
        self.feed.publish(ChangeEvent::Update {
            old: current.clone(),
            new: updated.clone(),
        });

        Ok(updated)
    }

    pub async fn delete_row(&self, appointment: &Appointment, auth_token: &str) -> Result<(), AppointmentError> {
        self.supabase
            .execute(
                Method::DELETE,
                &format!("/rest/v1/appointments?id=eq.{}", appointment.id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        self.feed.publish(ChangeEvent::Delete(appointment.clone()));
        Ok(())
    }
}
