//! The store, scraper, health checker and player-config resolver: the
//! subsystems that feed the catalog the HTTP front and proxy serve.

pub mod health;
pub mod models;
pub mod player_config;
pub mod scraper;
pub mod store;

pub use health::HealthChecker;
pub use player_config::{PlayerConfig, PlayerConfigResolver, StreamType};
pub use scraper::Scraper;
pub use store::Store;
