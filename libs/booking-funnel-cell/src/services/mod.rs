// libs/booking-funnel-cell/src/services/mod.rs

pub mod autosave;
pub mod store;
pub mod tracker;

pub use autosave::DraftAutosaver;
pub use store::{FunnelStore, SupabaseFunnelStore};
pub use tracker::{FunnelTracker, ANONYMOUS_VISITOR};
