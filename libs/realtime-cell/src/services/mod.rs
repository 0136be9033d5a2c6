// libs/realtime-cell/src/services/mod.rs

pub mod cache;
pub mod feed;
pub mod loader;

pub use cache::{DashboardSession, ViewCache, ViewLoader};
pub use feed::{ChangeFeed, ListenerHandle, Subscription};
pub use loader::SupabaseViewLoader;
