//! Shared application state handed to every HTTP handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use webauthn_rs::prelude::{PasskeyAuthentication, PasskeyRegistration, Webauthn, WebauthnBuilder};

use f1stream_capture::DisplayAllocator;
use f1stream_core::{Error, Result, Settings};
use f1stream_providers::{HealthChecker, PlayerConfigResolver, Scraper, Store};
use f1stream_proxy::{HlsProxy, ReverseProxy};

const CEREMONY_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Store,
    pub health_checker: Arc<HealthChecker>,
    pub scraper: Arc<Scraper>,
    pub player_config: Arc<PlayerConfigResolver>,
    pub hls_proxy: Arc<HlsProxy>,
    pub reverse_proxy: Arc<ReverseProxy>,
    pub webauthn: Arc<Webauthn>,
    pub display_allocator: Arc<DisplayAllocator>,
    /// Width `max_concurrent_sessions`; a browser session holds one
    /// permit for its whole lifetime.
    session_capacity: Arc<Semaphore>,
    reg_ceremonies: moka::sync::Cache<String, PasskeyRegistration>,
    auth_ceremonies: moka::sync::Cache<String, PasskeyAuthentication>,
}

impl AppState {
    pub fn new(settings: Settings, store: Store) -> Result<Self> {
        let settings = Arc::new(settings);

        let rp_origin = url::Url::parse(&settings.webauthn_origin)
            .map_err(|e| Error::Internal(format!("invalid WEBAUTHN_ORIGIN: {e}")))?;
        let webauthn = WebauthnBuilder::new(&settings.webauthn_rpid, &rp_origin)
            .map_err(|e| Error::Internal(format!("webauthn init: {e}")))?
            .rp_name(&settings.webauthn_display_name)
            .build()
            .map_err(|e| Error::Internal(format!("webauthn build: {e}")))?;

        let health_checker = Arc::new(HealthChecker::new(
            store.clone(),
            settings.health_check_timeout(),
            settings.health_check_interval(),
        ));
        let scraper = Arc::new(Scraper::new(
            store.clone(),
            "https://www.reddit.com/r/formula1/new.json",
            settings.scraper_validate_timeout(),
            settings.scrape_interval(),
            settings.scraper_max_retries,
        ));
        let player_config = Arc::new(PlayerConfigResolver::new(settings.scraper_validate_timeout()));
        let hls_proxy = Arc::new(HlsProxy::new(Duration::from_secs(30)));
        let reverse_proxy = Arc::new(ReverseProxy::new(Duration::from_secs(30)));

        Ok(Self {
            session_capacity: Arc::new(Semaphore::new(settings.max_concurrent_sessions)),
            settings,
            store,
            health_checker,
            scraper,
            player_config,
            hls_proxy,
            reverse_proxy,
            webauthn: Arc::new(webauthn),
            display_allocator: Arc::new(DisplayAllocator::new()),
            reg_ceremonies: moka::sync::Cache::builder().time_to_live(CEREMONY_TTL).build(),
            auth_ceremonies: moka::sync::Cache::builder().time_to_live(CEREMONY_TTL).build(),
        })
    }

    pub fn stash_registration(&self, username: &str, state: PasskeyRegistration) {
        self.reg_ceremonies.insert(username.to_string(), state);
    }

    pub fn pop_registration(&self, username: &str) -> Option<PasskeyRegistration> {
        let state = self.reg_ceremonies.get(username);
        self.reg_ceremonies.invalidate(username);
        state
    }

    pub fn stash_authentication(&self, username: &str, state: PasskeyAuthentication) {
        self.auth_ceremonies.insert(username.to_string(), state);
    }

    pub fn pop_authentication(&self, username: &str) -> Option<PasskeyAuthentication> {
        let state = self.auth_ceremonies.get(username);
        self.auth_ceremonies.invalidate(username);
        state
    }

    pub fn turn_credentials(&self) -> Option<f1stream_media::DualTurnCredentials> {
        if !self.settings.turn_configured() {
            return None;
        }
        let now = chrono::Utc::now().timestamp();
        let internal_url = if self.settings.turn_internal_url.is_empty() {
            self.settings.turn_url.as_str()
        } else {
            self.settings.turn_internal_url.as_str()
        };
        Some(f1stream_media::generate_dual_credentials(
            internal_url,
            &self.settings.turn_url,
            &self.settings.turn_shared_secret,
            now,
        ))
    }

    /// `None` means the cap (`max_concurrent_sessions`) is exceeded; the
    /// caller should answer with 503. The returned permit releases the
    /// slot automatically when the browser session ends.
    pub fn try_acquire_session_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.session_capacity.clone().try_acquire_owned().ok()
    }
}
