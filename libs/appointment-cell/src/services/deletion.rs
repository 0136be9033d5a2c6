// libs/appointment-cell/src/services/deletion.rs
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError, DeletionReport, CASCADE_TABLES};
use crate::services::store::AppointmentStore;

/// Rows one step removed, kept so the step can be undone.
struct CompletedStep {
    table: &'static str,
    rows: Vec<Value>,
}

/// Deletes an appointment and its dependents as a sequence of reversible
/// steps. If a later step fails, the rows removed so far are re-inserted in
/// reverse order.
pub struct AppointmentDeletionService {
    supabase: Arc<SupabaseClient>,
    store: Arc<AppointmentStore>,
}

impl AppointmentDeletionService {
    pub fn new(supabase: Arc<SupabaseClient>, store: Arc<AppointmentStore>) -> Self {
        Self { supabase, store }
    }

    pub async fn delete(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<DeletionReport, AppointmentError> {
        let mut completed: Vec<CompletedStep> = Vec::with_capacity(CASCADE_TABLES.len());

        for table in CASCADE_TABLES {
            match self.remove_dependents(table, appointment.id, auth_token).await {
                Ok(rows) => completed.push(CompletedStep { table, rows }),
                Err(e) => {
                    warn!("Removing {} for appointment {} failed: {}", table, appointment.id, e);
                    return Err(self.compensate(appointment.id, completed, e, auth_token).await);
                }
            }
        }

        if let Err(e) = self.store.delete_row(appointment, auth_token).await {
            warn!("Removing appointment {} failed: {}", appointment.id, e);
            return Err(self.compensate(appointment.id, completed, e, auth_token).await);
        }

        let removed = completed
            .into_iter()
            .map(|step| (step.table.to_string(), step.rows.len()))
            .collect();

        info!("Appointment {} deleted with its dependents", appointment.id);
        Ok(DeletionReport {
            appointment_id: appointment.id,
            removed,
        })
    }

    /// Delete every row of `table` pointing at the appointment and return
    /// what was deleted.
    async fn remove_dependents(
        &self,
        table: &'static str,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<Value>, AppointmentError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.supabase
            .request_with_headers(
                Method::DELETE,
                &format!("/rest/v1/{}?appointment_id=eq.{}", table, appointment_id),
                Some(auth_token),
                None,
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))
    }

    async fn compensate(
        &self,
        appointment_id: Uuid,
        completed: Vec<CompletedStep>,
        cause: AppointmentError,
        auth_token: &str,
    ) -> AppointmentError {
        for step in completed.into_iter().rev() {
            if step.rows.is_empty() {
                continue;
            }

            let restored = self.supabase
                .execute(
                    Method::POST,
                    &format!("/rest/v1/{}", step.table),
                    Some(auth_token),
                    Some(Value::Array(step.rows)),
                )
                .await;

            if let Err(e) = restored {
                error!("Could not restore {} for appointment {}: {}", step.table, appointment_id, e);
                return AppointmentError::PartialCascadeFailure {
                    appointment_id,
                    message: format!("{}; restoring {} failed: {}", cause, step.table, e),
                };
            }
        }

        warn!("Deletion of appointment {} rolled back: {}", appointment_id, cause);
        cause
    }
}
