//! Periodic URL health checking.
//!
//! Walks every URL referenced by the streams file or the scraped-links
//! file, GETs it with a timeout, and tracks consecutive failures. Five in
//! a row flips a URL unhealthy; a single success resets it. State for
//! URLs no longer referenced by either source is pruned on each pass.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use reqwest::redirect::Policy;
use tracing::{info, warn};

use f1stream_core::Result;

use crate::models::HealthState;
use crate::store::Store;

pub struct HealthChecker {
    store: Store,
    client: reqwest::Client,
    interval: Duration,
}

impl HealthChecker {
    pub fn new(store: Store, timeout: Duration, interval: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(3))
            .build()
            .expect("health checker http client");
        Self { store, client, interval }
    }

    /// Runs until cancelled, sleeping `interval` between passes.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if let Err(e) = self.check_once().await {
                warn!(error = %e, "health check pass failed");
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("health checker shutting down");
                        return;
                    }
                }
            }
        }
    }

    pub async fn check_once(&self) -> Result<()> {
        let mut urls: HashSet<String> = self
            .store
            .list_streams()?
            .into_iter()
            .map(|s| s.url)
            .collect();
        urls.extend(self.store.list_scraped_links()?.into_iter().map(|l| l.url));

        let mut states: std::collections::HashMap<String, HealthState> = self
            .store
            .health_states()?
            .into_iter()
            .map(|h| (h.url.clone(), h))
            .collect();

        // prune state for URLs no longer referenced anywhere
        states.retain(|url, _| urls.contains(url));

        let mut flipped = 0usize;
        let mut recovered = 0usize;
        for url in &urls {
            let now = Utc::now();
            let healthy_before = states.get(url).map(|h| h.healthy).unwrap_or(true);
            let ok = self.probe(url).await;

            let state = states
                .entry(url.clone())
                .or_insert_with(|| HealthState::fresh(url.clone(), now));
            if ok {
                state.record_success(now);
            } else {
                state.record_failure(now);
            }
            if healthy_before && !state.healthy {
                flipped += 1;
            } else if !healthy_before && state.healthy {
                recovered += 1;
            }
        }

        self.store
            .replace_health_states(states.into_values().collect())?;
        info!(checked = urls.len(), flipped, recovered, "health check pass complete");
        Ok(())
    }

    async fn probe(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(resp) => (200..400).contains(&resp.status().as_u16()),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store(dir: &tempfile::TempDir) -> Store {
        Store::new(dir.path()).unwrap()
    }

    #[tokio::test]
    async fn fourth_failure_stays_healthy_fifth_flips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.publish_scraped_stream("https://dead.example", "x").unwrap();
        let checker = HealthChecker::new(store.clone(), Duration::from_millis(50), Duration::from_secs(1));

        for _ in 0..4 {
            checker.check_once().await.unwrap();
        }
        let map = store.health_map().unwrap();
        assert!(map.get("https://dead.example").unwrap().healthy);

        checker.check_once().await.unwrap();
        let map = store.health_map().unwrap();
        assert!(!map.get("https://dead.example").unwrap().healthy);
    }

    #[tokio::test]
    async fn single_success_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock)
            .await;

        let store = store(&dir);
        let url = mock.uri();
        store.publish_scraped_stream(&url, "x").unwrap();
        // seed 5 failures directly
        store
            .replace_health_states(vec![{
                let mut h = HealthState::fresh(url.clone(), Utc::now());
                for _ in 0..5 {
                    h.record_failure(Utc::now());
                }
                h
            }])
            .unwrap();
        assert!(!store.health_map().unwrap().get(&url).unwrap().healthy);

        let checker = HealthChecker::new(store.clone(), Duration::from_secs(5), Duration::from_secs(60));
        checker.check_once().await.unwrap();
        let state = store.health_map().unwrap().remove(&url).unwrap();
        assert!(state.healthy);
        assert_eq!(state.consecutive_failures, 0);
    }
}
