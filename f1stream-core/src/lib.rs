//! Shared domain types for the f1-stream gateway: the error taxonomy,
//! structured logging bootstrap, and layered runtime configuration.

pub mod config;
pub mod error;
pub mod logging;

pub use config::Settings;
pub use error::{Error, Result};
