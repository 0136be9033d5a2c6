// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Method;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentError};

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

/// Window around `at` in which another appointment conflicts with a
/// minimum gap of `gap_minutes`: `[at - (g-1), at + (g-1)]`. A gap below one
/// minute still forbids the exact same instant.
pub fn conflict_window(at: DateTime<Utc>, gap_minutes: i32) -> (DateTime<Utc>, DateTime<Utc>) {
    let reach = Duration::minutes((gap_minutes.max(1) - 1) as i64);
    (at - reach, at + reach)
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Non-cancelled appointments of the clinic too close to `at`.
    pub async fn find_conflicts(
        &self,
        clinic_id: Uuid,
        at: DateTime<Utc>,
        gap_minutes: i32,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let (start, end) = conflict_window(at, gap_minutes);
        debug!("Checking conflicts for clinic {} between {} and {}", clinic_id, start, end);

        let path = format!(
            "/rest/v1/appointments?clinic_id=eq.{}&status=neq.cancelled&appointment_date=gte.{}&appointment_date=lte.{}&order=appointment_date.asc",
            clinic_id,
            urlencoding::encode(&start.to_rfc3339()),
            urlencoding::encode(&end.to_rfc3339()),
        );

        let conflicts: Vec<Appointment> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        if !conflicts.is_empty() {
            warn!("Conflict detected for clinic {} at {} - {} appointments within {} minutes",
                  clinic_id, at, conflicts.len(), gap_minutes);
        }

        Ok(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_reaches_gap_minus_one_each_side() {
        let at = Utc.with_ymd_and_hms(2030, 5, 6, 10, 15, 0).unwrap();
        let (start, end) = conflict_window(at, 30);

        assert_eq!(start, Utc.with_ymd_and_hms(2030, 5, 6, 9, 46, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2030, 5, 6, 10, 44, 0).unwrap());

        let existing = Utc.with_ymd_and_hms(2030, 5, 6, 10, 0, 0).unwrap();
        assert!(existing >= start && existing <= end);
    }

    #[test]
    fn zero_gap_still_blocks_the_same_instant() {
        let at = Utc.with_ymd_and_hms(2030, 5, 6, 10, 0, 0).unwrap();
        assert_eq!(conflict_window(at, 0), (at, at));
        assert_eq!(conflict_window(at, 1), (at, at));
    }
}
