//! Realtime change propagation for appointment rows.
//!
//! The appointment store publishes a [`ChangeEvent`] for every write to a
//! per-clinic [`ChangeFeed`]. Dashboard sessions subscribe over SSE and keep
//! their cached list views current: updates are merged field by field,
//! inserts and deletes trigger a refetch of every view of the clinic.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::{RealtimeState, SessionStartHook};
pub use models::*;
pub use router::realtime_routes;
pub use services::*;
