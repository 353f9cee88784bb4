//! Persisted and cached entity shapes for the catalog, scraper and health
//! checker. These are the JSON row types the store reads and writes
//! verbatim — one array per file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog entry: either user-submitted, scraper-published, or seeded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stream {
    pub id: String,
    pub url: String,
    pub title: String,
    pub submitted_by: String,
    pub published: bool,
    pub source: StreamSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    User,
    Scraped,
    Seed,
}

/// A link extracted by the scraper from the community listing. Carried
/// separately from `Stream` until an operator (or the scraper itself)
/// promotes it into the catalog via `publish_scraped_stream`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapedLink {
    pub id: String,
    pub url: String,
    pub title: String,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedLink {
    pub const STALE_AFTER_DAYS: i64 = 7;

    /// `stale` is derived, never persisted — recomputed on every read.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.scraped_at) > chrono::Duration::days(Self::STALE_AFTER_DAYS)
    }
}

/// Consecutive-failure tracking for one URL, persisted by the health
/// checker and consumed (read-only) by catalog filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthState {
    pub url: String,
    pub consecutive_failures: u32,
    pub last_check_time: DateTime<Utc>,
    pub healthy: bool,
}

impl HealthState {
    pub const UNHEALTHY_THRESHOLD: u32 = 5;

    pub fn fresh(url: String, now: DateTime<Utc>) -> Self {
        Self {
            url,
            consecutive_failures: 0,
            last_check_time: now,
            healthy: true,
        }
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.last_check_time = now;
        if self.consecutive_failures >= Self::UNHEALTHY_THRESHOLD {
            self.healthy = false;
        }
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.healthy = true;
        self.last_check_time = now;
    }
}

/// A registered WebAuthn relying-party user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
    #[serde(default)]
    pub credentials: Vec<webauthn_rs::prelude::Passkey>,
    pub created_at: DateTime<Utc>,
}

/// A server-side session row; the cookie carries only `token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
