//! Booking page funnel analytics: view events, debounced draft autosave,
//! conversions and shadow-banned attempts.

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::FunnelState;
pub use models::*;
pub use router::funnel_routes;
pub use services::{FunnelStore, FunnelTracker, SupabaseFunnelStore, ANONYMOUS_VISITOR};
