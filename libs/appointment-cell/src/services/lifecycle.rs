// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use crate::models::{AppointmentError, AppointmentStatus};

/// What to do with a request to leave a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Terminal statuses have no way out.
    #[default]
    Strict,
    /// Leaving a terminal status is allowed and logged as a warning.
    Permissive,
}

impl TransitionPolicy {
    pub fn from_flag(permissive: bool) -> Self {
        if permissive {
            TransitionPolicy::Permissive
        } else {
            TransitionPolicy::Strict
        }
    }
}

pub struct AppointmentLifecycleService {
    policy: TransitionPolicy,
}

impl AppointmentLifecycleService {
    pub fn new(policy: TransitionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![
                AppointmentStatus::Confirmed,
                AppointmentStatus::Rejected,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::InProgress,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::InProgress => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::Rejected => vec![],
        }
    }

    /// Validate that a status transition is allowed
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if self.get_valid_transitions(current_status).contains(&new_status) {
            return Ok(());
        }

        if current_status.is_terminal()
            && current_status != new_status
            && self.policy == TransitionPolicy::Permissive
        {
            warn!("Leaving terminal status {} for {} under permissive policy", current_status, new_status);
            return Ok(());
        }

        warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
        Err(AppointmentError::InvalidStatusTransition {
            from: current_status,
            to: new_status,
        })
    }
}
