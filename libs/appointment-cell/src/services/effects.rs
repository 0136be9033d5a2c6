// libs/appointment-cell/src/services/effects.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentStatus};

/// Follow-up work after a status change, handed to external collaborators.
/// Runs in the background; failures are logged and never reach the caller.
pub struct StatusEffects {
    supabase: Arc<SupabaseClient>,
}

impl StatusEffects {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub fn after_transition(&self, appointment: &Appointment, auth_token: &str) {
        let supabase = Arc::clone(&self.supabase);
        let appointment = appointment.clone();
        let token = auth_token.to_string();

        tokio::spawn(async move {
            match appointment.status {
                AppointmentStatus::Completed => {
                    record_income(&supabase, &appointment, &token).await;
                    if let Some(plan_id) = appointment.patient_plan_id {
                        advance_patient_plan(&supabase, plan_id, &token).await;
                    }
                }
                AppointmentStatus::Confirmed
                | AppointmentStatus::Rejected
                | AppointmentStatus::Cancelled => {
                    queue_notification(&supabase, &appointment, &token).await;
                }
                AppointmentStatus::Pending | AppointmentStatus::InProgress => {}
            }
        });
    }
}

async fn record_income(supabase: &SupabaseClient, appointment: &Appointment, token: &str) {
    let Some(amount) = appointment.price.filter(|p| *p > 0.0) else {
        debug!("Appointment {} has no price, no income recorded", appointment.id);
        return;
    };

    let body = json!({
        "clinic_id": appointment.clinic_id,
        "appointment_id": appointment.id,
        "patient_id": appointment.patient_id,
        "type": "income",
        "amount": amount,
        "description": "Appointment",
        "date": appointment.appointment_date.date_naive(),
    });

    match supabase.execute(Method::POST, "/rest/v1/financial_records", Some(token), Some(body)).await {
        Ok(()) => info!("Income of {} recorded for appointment {}", amount, appointment.id),
        Err(e) => warn!("Income record for appointment {} failed: {}", appointment.id, e),
    }
}

/// One more completed session on the treatment package; the package is
/// completed once its target is reached.
async fn advance_patient_plan(supabase: &SupabaseClient, plan_id: Uuid, token: &str) {
    let rows: Vec<Value> = match supabase
        .request(
            Method::GET,
            &format!("/rest/v1/patient_plans?id=eq.{}&select=id,completed_sessions,total_sessions,status&limit=1", plan_id),
            Some(token),
            None,
        )
        .await
    {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Patient plan {} lookup failed: {}", plan_id, e);
            return;
        }
    };

    let Some(plan) = rows.first() else {
        warn!("Patient plan {} not found", plan_id);
        return;
    };

    let completed = plan["completed_sessions"].as_i64().unwrap_or(0) + 1;
    let total = plan["total_sessions"].as_i64();

    let mut body = json!({ "completed_sessions": completed });
    if total.is_some_and(|total| completed >= total) {
        body["status"] = json!("completed");
    }

    match supabase
        .execute(Method::PATCH, &format!("/rest/v1/patient_plans?id=eq.{}", plan_id), Some(token), Some(body))
        .await
    {
        Ok(()) => info!("Patient plan {} at {} sessions", plan_id, completed),
        Err(e) => warn!("Patient plan {} update failed: {}", plan_id, e),
    }
}

async fn queue_notification(supabase: &SupabaseClient, appointment: &Appointment, token: &str) {
    let body = json!({
        "clinic_id": appointment.clinic_id,
        "appointment_id": appointment.id,
        "patient_id": appointment.patient_id,
        "type": format!("appointment_{}", appointment.status),
        "status": "queued",
    });

    if let Err(e) = supabase.execute(Method::POST, "/rest/v1/notifications", Some(token), Some(body)).await {
        warn!("Notification for appointment {} not queued: {}", appointment.id, e);
    }
}
