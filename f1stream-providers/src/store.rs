//! Persistent JSON store.
//!
//! Each entity family lives in its own file under `data_dir`, guarded by
//! its own `RwLock`. Writes go through a temp-file + rename so a reader
//! never observes a partially written file; a missing file reads back as
//! an empty collection rather than an error. `health_map` is the one
//! deliberate exception to "always take the lock": it is invoked from
//! under other locks (the scraper holds the streams lock while consulting
//! health to decide what counts as active), so it reads the file directly
//! with `std::fs::read` instead of acquiring `health` — see DESIGN.md.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use f1stream_core::{Error, Result};

use crate::models::{HealthState, ScrapedLink, Session, Stream, StreamSource, User};

#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    data_dir: PathBuf,
    streams: RwLock<()>,
    scraped_links: RwLock<()>,
    health_state: RwLock<()>,
    users: RwLock<()>,
    sessions: RwLock<()>,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(Self {
            inner: Arc::new(StoreInner {
                data_dir,
                streams: RwLock::new(()),
                scraped_links: RwLock::new(()),
                health_state: RwLock::new(()),
                users: RwLock::new(()),
                sessions: RwLock::new(()),
            }),
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.inner.data_dir.join(name)
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        match std::fs::read(path) {
            Ok(bytes) if bytes.is_empty() => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic replace: serialize to `<name>.tmp` in the same directory,
    /// then rename over `<name>`. A crash between the two steps leaves
    /// the original file untouched.
    fn write_json<T: serde::Serialize>(path: &Path, rows: &[T]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(rows)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    // ---- streams ----------------------------------------------------

    pub fn list_streams(&self) -> Result<Vec<Stream>> {
        let _g = self.inner.streams.read();
        Self::read_json(&self.path("streams.json"))
    }

    pub fn get_stream(&self, id: &str) -> Result<Option<Stream>> {
        Ok(self.list_streams()?.into_iter().find(|s| s.id == id))
    }

    pub fn insert_stream(&self, mut stream: Stream) -> Result<Stream> {
        let _g = self.inner.streams.write();
        let path = self.path("streams.json");
        let mut rows: Vec<Stream> = Self::read_json(&path)?;
        if stream.id.is_empty() {
            stream.id = Uuid::new_v4().to_string();
        }
        rows.push(stream.clone());
        Self::write_json(&path, &rows)?;
        Ok(stream)
    }

    /// Idempotent insert used by the scraper: a row with
    /// `(source=Scraped, url)` already present is a no-op.
    pub fn publish_scraped_stream(&self, url: &str, title: &str) -> Result<Option<Stream>> {
        let _g = self.inner.streams.write();
        let path = self.path("streams.json");
        let mut rows: Vec<Stream> = Self::read_json(&path)?;
        let normalized = normalize_for_dedup(url);
        let exists = rows
            .iter()
            .any(|s| s.source == StreamSource::Scraped && normalize_for_dedup(&s.url) == normalized);
        if exists {
            return Ok(None);
        }
        let stream = Stream {
            id: Uuid::new_v4().to_string(),
            url: url.to_string(),
            title: title.to_string(),
            submitted_by: "scraper".to_string(),
            published: true,
            source: StreamSource::Scraped,
            created_at: Utc::now(),
        };
        rows.push(stream.clone());
        Self::write_json(&path, &rows)?;
        Ok(Some(stream))
    }

    pub fn set_published(&self, id: &str, published: bool) -> Result<Stream> {
        let _g = self.inner.streams.write();
        let path = self.path("streams.json");
        let mut rows: Vec<Stream> = Self::read_json(&path)?;
        let row = rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("stream {id}")))?;
        row.published = published;
        let updated = row.clone();
        Self::write_json(&path, &rows)?;
        Ok(updated)
    }

    pub fn delete_stream(&self, id: &str, requester: &str, is_admin: bool) -> Result<()> {
        let _g = self.inner.streams.write();
        let path = self.path("streams.json");
        let mut rows: Vec<Stream> = Self::read_json(&path)?;
        let idx = rows
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("stream {id}")))?;
        if !is_admin && rows[idx].submitted_by != requester {
            return Err(Error::Forbidden("not the owner of this stream".to_string()));
        }
        rows.remove(idx);
        Self::write_json(&path, &rows)
    }

    /// Public, health-filtered catalog: `published && !unhealthy`.
    pub fn public_streams(&self) -> Result<Vec<Stream>> {
        let health = self.health_map()?;
        Ok(self
            .list_streams()?
            .into_iter()
            .filter(|s| s.published && health.get(&s.url).map(|h| h.healthy).unwrap_or(true))
            .collect())
    }

    // ---- scraped links ------------------------------------------------

    pub fn list_scraped_links(&self) -> Result<Vec<ScrapedLink>> {
        let _g = self.inner.scraped_links.read();
        Self::read_json(&self.path("scraped_links.json"))
    }

    pub fn replace_scraped_links(&self, rows: Vec<ScrapedLink>) -> Result<()> {
        let _g = self.inner.scraped_links.write();
        Self::write_json(&self.path("scraped_links.json"), &rows)
    }

    /// Active = not stale and healthy, mirroring `public_streams`.
    pub fn active_scraped_links(&self) -> Result<Vec<ScrapedLink>> {
        let now = Utc::now();
        let health = self.health_map()?;
        Ok(self
            .list_scraped_links()?
            .into_iter()
            .filter(|l| !l.is_stale(now))
            .filter(|l| health.get(&l.url).map(|h| h.healthy).unwrap_or(true))
            .collect())
    }

    pub fn get_scraped_link(&self, id: &str) -> Result<Option<ScrapedLink>> {
        Ok(self.list_scraped_links()?.into_iter().find(|l| l.id == id))
    }

    // ---- health state --------------------------------------------------

    pub fn health_states(&self) -> Result<Vec<HealthState>> {
        let _g = self.inner.health_state.read();
        Self::read_json(&self.path("health_state.json"))
    }

    pub fn replace_health_states(&self, rows: Vec<HealthState>) -> Result<()> {
        let _g = self.inner.health_state.write();
        Self::write_json(&self.path("health_state.json"), &rows)
    }

    /// Lock-free by design: called from under the `streams`/`scraped_links`
    /// locks by the catalog filters above, so it must not itself acquire
    /// `health_state`. Staleness is acceptable because health flips are
    /// idempotent — a stale read only ever lags a true flip by one cycle.
    pub fn health_map(&self) -> Result<std::collections::HashMap<String, HealthState>> {
        let rows: Vec<HealthState> = Self::read_json(&self.path("health_state.json"))?;
        Ok(rows.into_iter().map(|h| (h.url.clone(), h)).collect())
    }

    // ---- users & sessions ----------------------------------------------

    pub fn list_users(&self) -> Result<Vec<User>> {
        let _g = self.inner.users.read();
        Self::read_json(&self.path("users.json"))
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.list_users()?.into_iter().find(|u| u.id == id))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .list_users()?
            .into_iter()
            .find(|u| u.username.eq_ignore_ascii_case(username)))
    }

    pub fn insert_user(&self, user: User) -> Result<User> {
        let _g = self.inner.users.write();
        let path = self.path("users.json");
        let mut rows: Vec<User> = Self::read_json(&path)?;
        if rows.iter().any(|u| u.username.eq_ignore_ascii_case(&user.username)) {
            return Err(Error::Conflict(format!("username {} taken", user.username)));
        }
        rows.push(user.clone());
        Self::write_json(&path, &rows)?;
        Ok(user)
    }

    pub fn update_user(&self, user: User) -> Result<User> {
        let _g = self.inner.users.write();
        let path = self.path("users.json");
        let mut rows: Vec<User> = Self::read_json(&path)?;
        let row = rows
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or_else(|| Error::NotFound(format!("user {}", user.id)))?;
        *row = user.clone();
        Self::write_json(&path, &rows)?;
        Ok(user)
    }

    pub fn user_count(&self) -> Result<usize> {
        Ok(self.list_users()?.len())
    }

    pub fn insert_session(&self, session: Session) -> Result<Session> {
        let _g = self.inner.sessions.write();
        let path = self.path("sessions.json");
        let mut rows: Vec<Session> = Self::read_json(&path)?;
        rows.retain(|s| s.token != session.token);
        rows.push(session.clone());
        Self::write_json(&path, &rows)?;
        Ok(session)
    }

    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let _g = self.inner.sessions.read();
        let rows: Vec<Session> = Self::read_json(&self.path("sessions.json"))?;
        Ok(rows.into_iter().find(|s| s.token == token))
    }

    pub fn delete_session(&self, token: &str) -> Result<()> {
        let _g = self.inner.sessions.write();
        let path = self.path("sessions.json");
        let mut rows: Vec<Session> = Self::read_json(&path)?;
        rows.retain(|s| s.token != token);
        Self::write_json(&path, &rows)
    }
}

/// Dedup key: host lowercased, trailing path slashes trimmed.
fn normalize_for_dedup(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut u) => {
            let _ = u.set_host(u.host_str().map(str::to_lowercase).as_deref());
            let path = u.path().trim_end_matches('/').to_string();
            format!("{}://{}{}", u.scheme(), u.host_str().unwrap_or(""), path)
        }
        Err(_) => url.trim_end_matches('/').to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        assert!(store.list_streams().unwrap().is_empty());
    }

    #[test]
    fn publish_scraped_stream_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let first = store.publish_scraped_stream("https://example.com/a", "Race").unwrap();
        assert!(first.is_some());
        let second = store.publish_scraped_stream("https://example.com/a", "Race").unwrap();
        assert!(second.is_none());
        assert_eq!(store.list_streams().unwrap().len(), 1);
    }

    #[test]
    fn atomic_write_survives_missing_tmp_rename() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        store.publish_scraped_stream("https://example.com/a", "Race").unwrap();
        // Simulate a crash right after the .tmp write by leaving a stray
        // .tmp file around; the final file must still be intact.
        let tmp = dir.path().join("streams.tmp");
        std::fs::write(&tmp, b"corrupt").unwrap();
        let rows = store.list_streams().unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn delete_requires_ownership_unless_admin() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let stream = store
            .insert_stream(Stream {
                id: String::new(),
                url: "https://example.com".to_string(),
                title: "t".to_string(),
                submitted_by: "alice".to_string(),
                published: false,
                source: StreamSource::User,
                created_at: Utc::now(),
            })
            .unwrap();
        assert!(store.delete_stream(&stream.id, "bob", false).is_err());
        assert!(store.delete_stream(&stream.id, "bob", true).is_ok());
    }
}
