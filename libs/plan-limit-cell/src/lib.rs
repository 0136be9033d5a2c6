//! Plan limit guard: per-clinic creation ceilings taken from the active
//! subscription. Appointment, patient and secretary creation ask it before
//! writing; `-1` means unlimited, a missing or zero ceiling forbids.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::PlanLimitState;
pub use models::*;
pub use router::plan_limit_routes;
pub use services::*;
