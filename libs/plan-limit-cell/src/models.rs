// libs/plan-limit-cell/src/models.rs
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use shared_config::Locale;

// ==============================================================================
// RESOURCE KINDS
// ==============================================================================

/// Resources whose creation is capped by the clinic's plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Appointments,
    Patients,
    Secretaries,
}

/// Which rows count against a ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountWindow {
    /// Rows created in the current UTC calendar month.
    CalendarMonth,
    /// Every row the clinic has.
    Unbounded,
}

impl ResourceKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "appointments" => Some(ResourceKind::Appointments),
            "patients" => Some(ResourceKind::Patients),
            "secretaries" => Some(ResourceKind::Secretaries),
            _ => None,
        }
    }

    pub fn window(&self) -> CountWindow {
        match self {
            ResourceKind::Appointments | ResourceKind::Patients => CountWindow::CalendarMonth,
            ResourceKind::Secretaries => CountWindow::Unbounded,
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            ResourceKind::Appointments => "appointments",
            ResourceKind::Patients => "patients",
            ResourceKind::Secretaries => "secretaries",
        }
    }

    /// Key of the ceiling inside the plan's `limits` object.
    pub fn limit_key(&self) -> &'static str {
        match self {
            ResourceKind::Appointments => "max_appointments_per_month",
            ResourceKind::Patients => "max_patients_per_month",
            ResourceKind::Secretaries => "max_secretaries",
        }
    }

    pub fn label(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (ResourceKind::Appointments, Locale::En) => "appointments",
            (ResourceKind::Patients, Locale::En) => "patients",
            (ResourceKind::Secretaries, Locale::En) => "secretaries",
            (ResourceKind::Appointments, Locale::PtBr) => "agendamentos",
            (ResourceKind::Patients, Locale::PtBr) => "pacientes",
            (ResourceKind::Secretaries, Locale::PtBr) => "secretárias",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

impl CountWindow {
    /// `[start, end)` bounds for the window containing `now`, if bounded.
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            CountWindow::Unbounded => None,
            CountWindow::CalendarMonth => {
                let start = Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0).single()?;
                let (next_year, next_month) = if now.month() == 12 {
                    (now.year() + 1, 1)
                } else {
                    (now.year(), now.month() + 1)
                };
                let end = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).single()?;
                Some((start, end))
            }
        }
    }
}

// ==============================================================================
// PLAN SNAPSHOT
// ==============================================================================

/// Ceilings of the clinic's active plan. `-1` is unlimited; a missing key or
/// `0` forbids the resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionLimits {
    pub plan_name: Option<String>,
    pub ceilings: HashMap<String, i64>,
}

impl SubscriptionLimits {
    pub fn ceiling(&self, kind: ResourceKind) -> Option<i64> {
        self.ceilings.get(kind.limit_key()).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimitDecision {
    Unlimited,
    WithinLimit { used: i64, ceiling: i64 },
}

/// Which creation paths consult the guard. Appointment creation is not gated
/// unless explicitly turned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatingPolicy {
    pub gate_appointments: bool,
    pub gate_patients: bool,
    pub gate_secretaries: bool,
}

impl Default for GatingPolicy {
    fn default() -> Self {
        Self {
            gate_appointments: false,
            gate_patients: true,
            gate_secretaries: true,
        }
    }
}

impl GatingPolicy {
    pub fn is_gated(&self, kind: ResourceKind) -> bool {
        match kind {
            ResourceKind::Appointments => self.gate_appointments,
            ResourceKind::Patients => self.gate_patients,
            ResourceKind::Secretaries => self.gate_secretaries,
        }
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanLimitError {
    #[error("{message}")]
    QuotaExceeded { resource: ResourceKind, message: String },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

pub fn quota_message(kind: ResourceKind, ceiling: Option<i64>, locale: Locale) -> String {
    let label = kind.label(locale);
    match (ceiling, locale) {
        (Some(c), Locale::En) if c > 0 => format!(
            "Your plan allows {} {}. Upgrade your plan to add more.", c, label
        ),
        (Some(c), Locale::PtBr) if c > 0 => format!(
            "Seu plano permite {} {}. Faça upgrade para adicionar mais.", c, label
        ),
        (_, Locale::En) => format!("Your plan does not include {}.", label),
        (_, Locale::PtBr) => format!("Seu plano não inclui {}.", label),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_window_wraps_december() {
        let now = Utc.with_ymd_and_hms(2030, 12, 31, 23, 59, 0).unwrap();
        let (start, end) = CountWindow::CalendarMonth.bounds(now).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2030, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap());
        assert!(CountWindow::Unbounded.bounds(now).is_none());
    }

    #[test]
    fn message_names_the_resource() {
        let msg = quota_message(ResourceKind::Patients, Some(5), Locale::En);
        assert!(msg.contains("patients"));
        assert!(msg.contains('5'));

        let msg = quota_message(ResourceKind::Secretaries, None, Locale::PtBr);
        assert!(msg.contains("secretárias"));
    }
}
