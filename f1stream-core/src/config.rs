//! Layered runtime configuration.
//!
//! A typed `Settings` struct with serde defaults, built through the
//! `config` crate from (in ascending priority) an optional config file,
//! then the process environment. A thin `clap` surface in the
//! `f1stream` binary overlays a handful of the same knobs as CLI flags.
//! The environment always wins over the config file.

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Process-wide settings, one field group per subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub listen_addr: String,
    pub data_dir: String,
    pub static_dir: String,

    pub scrape_interval_secs: u64,
    pub scraper_validate_timeout_secs: u64,
    pub scraper_max_retries: u32,

    pub health_check_interval_secs: u64,
    pub health_check_timeout_secs: u64,

    pub admin_username: String,
    pub session_ttl_secs: u64,

    pub headless_extract_enabled: bool,
    pub max_concurrent_sessions: usize,

    pub webauthn_rpid: String,
    pub webauthn_origin: String,
    pub webauthn_display_name: String,

    pub turn_url: String,
    pub turn_shared_secret: String,
    pub turn_internal_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
            static_dir: "./static".to_string(),

            scrape_interval_secs: 15 * 60,
            scraper_validate_timeout_secs: 15,
            scraper_max_retries: 5,

            health_check_interval_secs: 5 * 60,
            health_check_timeout_secs: 10,

            admin_username: String::new(),
            session_ttl_secs: 7 * 24 * 60 * 60,

            headless_extract_enabled: false,
            max_concurrent_sessions: 10,

            webauthn_rpid: "localhost".to_string(),
            webauthn_origin: "http://localhost:8080".to_string(),
            webauthn_display_name: "F1 Stream".to_string(),

            turn_url: String::new(),
            turn_shared_secret: String::new(),
            turn_internal_url: String::new(),
        }
    }
}

impl Settings {
    /// Build settings from an optional config file overlaid with the
    /// `F1STREAM_` environment namespace, then a set of bare variable
    /// names kept for drop-in compatibility with earlier deployments.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder().add_source(
            config::Config::try_from(&Settings::default())?,
        );

        if let Some(path) = config_path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder
            .add_source(Environment::with_prefix("F1STREAM").separator("__"))
            .add_source(bare_env_source());

        builder.build()?.try_deserialize()
    }

    pub fn scrape_interval(&self) -> Duration {
        Duration::from_secs(self.scrape_interval_secs)
    }

    pub fn scraper_validate_timeout(&self) -> Duration {
        Duration::from_secs(self.scraper_validate_timeout_secs)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn turn_configured(&self) -> bool {
        !self.turn_url.is_empty() && !self.turn_shared_secret.is_empty()
    }
}

/// Maps bare, unprefixed environment-variable names onto `Settings`
/// fields, for deployments that set them without the `F1STREAM__` prefix.
fn bare_env_source() -> Environment {
    Environment::default()
        .try_parsing(true)
        .source(Some(
            [
                ("LISTEN_ADDR", "listen_addr"),
                ("DATA_DIR", "data_dir"),
                ("STATIC_DIR", "static_dir"),
                ("SCRAPE_INTERVAL", "scrape_interval_secs"),
                ("SCRAPER_VALIDATE_TIMEOUT", "scraper_validate_timeout_secs"),
                ("HEALTH_CHECK_INTERVAL", "health_check_interval_secs"),
                ("HEALTH_CHECK_TIMEOUT", "health_check_timeout_secs"),
                ("ADMIN_USERNAME", "admin_username"),
                ("SESSION_TTL", "session_ttl_secs"),
                ("HEADLESS_EXTRACT_ENABLED", "headless_extract_enabled"),
                ("WEBAUTHN_RPID", "webauthn_rpid"),
                ("WEBAUTHN_ORIGIN", "webauthn_origin"),
                ("WEBAUTHN_DISPLAY_NAME", "webauthn_display_name"),
                ("TURN_URL", "turn_url"),
                ("TURN_SHARED_SECRET", "turn_shared_secret"),
                ("TURN_INTERNAL_URL", "turn_internal_url"),
            ]
            .into_iter()
            .filter_map(|(env_name, field)| {
                std::env::var(env_name).ok().map(|v| (field.to_string(), v))
            })
            .collect::<std::collections::HashMap<String, String>>(),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = Settings::default();
        assert_eq!(s.listen_addr, "0.0.0.0:8080");
        assert_eq!(s.health_check_interval_secs, 300);
        assert_eq!(s.scrape_interval_secs, 900);
        assert_eq!(s.max_concurrent_sessions, 10);
        assert!(!s.turn_configured());
    }

    #[test]
    fn turn_configured_requires_both_fields() {
        let mut s = Settings::default();
        s.turn_url = "turn:example.com:3478".to_string();
        assert!(!s.turn_configured());
        s.turn_shared_secret = "secret".to_string();
        assert!(s.turn_configured());
    }
}
