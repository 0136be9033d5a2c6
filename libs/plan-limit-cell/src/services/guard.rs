// libs/plan-limit-cell/src/services/guard.rs
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::Locale;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    quota_message, LimitDecision, PlanLimitError, ResourceKind, SubscriptionLimits,
};

pub struct PlanLimitGuard {
    supabase: Arc<SupabaseClient>,
    locale: Locale,
}

impl PlanLimitGuard {
    pub fn new(supabase: Arc<SupabaseClient>, locale: Locale) -> Self {
        Self { supabase, locale }
    }

    /// Check whether the clinic may create one more `kind` row right now.
    pub async fn check(
        &self,
        clinic_id: Uuid,
        kind: ResourceKind,
        auth_token: &str,
    ) -> Result<LimitDecision, PlanLimitError> {
        self.check_at(clinic_id, kind, Utc::now(), auth_token).await
    }

    pub async fn check_at(
        &self,
        clinic_id: Uuid,
        kind: ResourceKind,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<LimitDecision, PlanLimitError> {
        let limits = self.load_limits(clinic_id, auth_token).await?;
        let ceiling = limits.ceiling(kind);

        match ceiling {
            Some(-1) => {
                debug!("Clinic {} has unlimited {}", clinic_id, kind);
                return Ok(LimitDecision::Unlimited);
            }
            Some(c) if c > 0 => {}
            _ => {
                info!("Clinic {} plan does not include {}", clinic_id, kind);
                return Err(self.exceeded(kind, ceiling));
            }
        }

        let used = self.count_rows(clinic_id, kind, now, auth_token).await?;
        evaluate(kind, ceiling, used, self.locale)
    }

    /// Active subscription's ceilings. No active subscription means every
    /// ceiling is absent.
    pub async fn load_limits(
        &self,
        clinic_id: Uuid,
        auth_token: &str,
    ) -> Result<SubscriptionLimits, PlanLimitError> {
        let path = format!(
            "/rest/v1/subscriptions?clinic_id=eq.{}&status=eq.active&select=*,plans(*)&limit=1",
            clinic_id
        );

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PlanLimitError::DatabaseError(e.to_string()))?;

        let Some(subscription) = rows.first() else {
            warn!("Clinic {} has no active subscription", clinic_id);
            return Ok(SubscriptionLimits::default());
        };

        let plan = &subscription["plans"];
        let ceilings = plan["limits"]
            .as_object()
            .map(|limits| {
                limits
                    .iter()
                    .filter_map(|(key, value)| value.as_i64().map(|v| (key.clone(), v)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(SubscriptionLimits {
            plan_name: plan["name"].as_str().map(str::to_string),
            ceilings,
        })
    }

    async fn count_rows(
        &self,
        clinic_id: Uuid,
        kind: ResourceKind,
        now: DateTime<Utc>,
        auth_token: &str,
    ) -> Result<i64, PlanLimitError> {
        let mut path = format!("/rest/v1/{}?clinic_id=eq.{}&select=id", kind.table(), clinic_id);

        if let Some((start, end)) = kind.window().bounds(now) {
            path.push_str(&format!(
                "&created_at=gte.{}&created_at=lt.{}",
                urlencoding::encode(&start.to_rfc3339()),
                urlencoding::encode(&end.to_rfc3339()),
            ));
        }

        self.supabase
            .count(&path, Some(auth_token))
            .await
            .map_err(|e| PlanLimitError::DatabaseError(e.to_string()))
    }

    fn exceeded(&self, kind: ResourceKind, ceiling: Option<i64>) -> PlanLimitError {
        PlanLimitError::QuotaExceeded {
            resource: kind,
            message: quota_message(kind, ceiling, self.locale),
        }
    }
}

/// Pure decision once the ceiling and current count are known.
pub fn evaluate(
    kind: ResourceKind,
    ceiling: Option<i64>,
    used: i64,
    locale: Locale,
) -> Result<LimitDecision, PlanLimitError> {
    match ceiling {
        Some(-1) => Ok(LimitDecision::Unlimited),
        Some(c) if c > 0 && used < c => Ok(LimitDecision::WithinLimit { used, ceiling: c }),
        _ => Err(PlanLimitError::QuotaExceeded {
            resource: kind,
            message: quota_message(kind, ceiling, locale),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_ceiling_never_rejects() {
        for used in [0, 5, 10_000] {
            assert_eq!(
                evaluate(ResourceKind::Patients, Some(-1), used, Locale::En).unwrap(),
                LimitDecision::Unlimited
            );
        }
    }

    #[test]
    fn count_at_ceiling_is_rejected() {
        assert!(evaluate(ResourceKind::Patients, Some(5), 4, Locale::En).is_ok());
        assert!(matches!(
            evaluate(ResourceKind::Patients, Some(5), 5, Locale::En),
            Err(PlanLimitError::QuotaExceeded { resource: ResourceKind::Patients, .. })
        ));
    }

    #[test]
    fn zero_or_missing_ceiling_forbids() {
        assert!(evaluate(ResourceKind::Secretaries, Some(0), 0, Locale::En).is_err());
        assert!(evaluate(ResourceKind::Secretaries, None, 0, Locale::En).is_err());
    }
}
