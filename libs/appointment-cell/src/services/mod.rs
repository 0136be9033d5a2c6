// libs/appointment-cell/src/services/mod.rs

pub mod conflict;
pub mod deletion;
pub mod directory;
pub mod effects;
pub mod intake;
pub mod lifecycle;
pub mod schedule;
pub mod shadow_ban;
pub mod status;
pub mod store;

pub use conflict::ConflictDetectionService;
pub use deletion::AppointmentDeletionService;
pub use directory::ClinicDirectory;
pub use effects::StatusEffects;
pub use intake::BookingIntakeService;
pub use lifecycle::{AppointmentLifecycleService, TransitionPolicy};
pub use shadow_ban::ShadowBanService;
pub use status::StatusChangeService;
pub use store::AppointmentStore;
