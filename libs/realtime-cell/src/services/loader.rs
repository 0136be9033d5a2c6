// libs/realtime-cell/src/services/loader.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

use shared_database::supabase::SupabaseClient;

use crate::models::{RealtimeError, ViewQuery};
use crate::services::cache::ViewLoader;

/// Loads dashboard pages from `appointments`, joined with the patient's
/// name, newest first.
pub struct SupabaseViewLoader {
    supabase: Arc<SupabaseClient>,
    auth_token: String,
}

impl SupabaseViewLoader {
    pub fn new(supabase: Arc<SupabaseClient>, auth_token: impl Into<String>) -> Self {
        Self {
            supabase,
            auth_token: auth_token.into(),
        }
    }

    pub fn path_for(query: &ViewQuery) -> String {
        let mut path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&select=*,patients(name,phone)",
            query.clinic_id
        );
        if let Some(source) = query.source {
            path.push_str(&format!("&source=eq.{}", source));
        }
        if let Some(status) = query.status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        path.push_str(&format!(
            "&order=appointment_date.desc&offset={}&limit={}",
            query.offset, query.limit
        ));
        path
    }
}

#[async_trait]
impl ViewLoader for SupabaseViewLoader {
    async fn load(&self, query: &ViewQuery) -> Result<Vec<Value>, RealtimeError> {
        self.supabase
            .request(Method::GET, &Self::path_for(query), Some(&self.auth_token), None)
            .await
            .map_err(|e| RealtimeError::LoadFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_models::appointment::{AppointmentSource, AppointmentStatus};
    use uuid::Uuid;

    #[test]
    fn path_carries_filters_and_page() {
        let clinic_id = Uuid::new_v4();
        let mut query = ViewQuery::first_page(clinic_id, 25);
        query.source = Some(AppointmentSource::Booking);
        query.status = Some(AppointmentStatus::Pending);
        query.offset = 50;

        let path = SupabaseViewLoader::path_for(&query);
        assert!(path.contains(&format!("clinic_id=eq.{}", clinic_id)));
        assert!(path.contains("source=eq.booking"));
        assert!(path.contains("status=eq.pending"));
        assert!(path.ends_with("offset=50&limit=25"));
    }
}
