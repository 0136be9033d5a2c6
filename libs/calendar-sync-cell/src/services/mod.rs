// libs/calendar-sync-cell/src/services/mod.rs

pub mod google;
pub mod sync;
pub mod token;

pub use google::GoogleCalendarClient;
pub use sync::CalendarSynchronizer;
pub use token::TokenManager;
