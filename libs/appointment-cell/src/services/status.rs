// libs/appointment-cell/src/services/status.rs
use std::sync::Arc;

use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::effects::StatusEffects;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::AppointmentStore;

/// Staff-driven status transitions: validate, write, then hand follow-ups
/// to the background.
pub struct StatusChangeService {
    store: Arc<AppointmentStore>,
    lifecycle: AppointmentLifecycleService,
    effects: StatusEffects,
}

impl StatusChangeService {
    pub fn new(store: Arc<AppointmentStore>, lifecycle: AppointmentLifecycleService, effects: StatusEffects) -> Self {
        Self { store, lifecycle, effects }
    }

    pub async fn change_status(
        &self,
        appointment_id: Uuid,
        clinic_id: Uuid,
        status: AppointmentStatus,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.store.get_for_clinic(appointment_id, clinic_id, auth_token).await?;
        self.lifecycle.validate_status_transition(current.status, status)?;

        let updated = self.store.update_status(&current, status, auth_token).await?;
        self.effects.after_transition(&updated, auth_token);

        Ok(updated)
    }
}
