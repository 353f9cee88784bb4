//! HTTP surface: route tables grouped by subsystem, assembled into one
//! router with the global middleware stack layered on top.

pub mod admin;
pub mod auth;
pub mod browse;
pub mod error;
pub mod health;
pub mod hls;
pub mod middleware;
pub mod proxy;
pub mod scraped;
pub mod streams;

pub use error::{AppError, AppResult};

use axum::http::{HeaderValue, Method};
use axum::middleware as axum_middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

fn register_auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register/begin", post(auth::begin_register))
        .route("/api/auth/register/finish", post(auth::finish_register))
        .route("/api/auth/login/begin", post(auth::begin_login))
        .route("/api/auth/login/finish", post(auth::finish_login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
}

fn register_stream_routes() -> Router<AppState> {
    Router::new()
        .route("/api/streams/public", get(streams::public_streams))
        .route("/api/streams", post(streams::create_stream))
        .route("/api/streams/mine", get(streams::list_my_streams))
        .route("/api/streams/{id}", axum::routing::delete(streams::delete_stream))
        .route("/api/streams/{id}/publish", axum::routing::put(streams::admin_publish_stream))
        .route("/api/streams/{id}/player-config", get(streams::player_config))
        .route("/api/streams/{id}/browse", get(browse::browse))
}

fn register_scraped_routes() -> Router<AppState> {
    Router::new()
        .route("/api/scraped", get(scraped::list_active))
        .route("/api/scraped/{id}/import", post(scraped::import))
        .route("/api/scraped/refresh", post(scraped::refresh))
}

fn register_admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/admin/streams", get(admin::list_all_streams))
        .route("/api/admin/scrape", post(admin::trigger_scrape))
        .route("/api/admin/player-config/cache", axum::routing::delete(admin::bust_player_config_cache))
}

fn register_proxy_routes() -> Router<AppState> {
    proxy::router().route("/hls/{payload}", get(hls::proxy_hls))
}

pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.settings.webauthn_origin);
    let index_file = format!("{}/index.html", state.settings.static_dir);
    let static_files = ServeDir::new(&state.settings.static_dir).not_found_service(ServeFile::new(index_file));

    let router = Router::new()
        .route("/api/health", get(health::liveness))
        .merge(register_auth_routes())
        .merge(register_stream_routes())
        .merge(register_scraped_routes())
        .merge(register_admin_routes())
        .merge(register_proxy_routes())
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), middleware::origin_check))
        .fallback_service(static_files);

    router
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(webauthn_origin: &str) -> CorsLayer {
    match webauthn_origin.parse::<HeaderValue>() {
        Ok(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
            .allow_credentials(true),
        Err(_) => {
            tracing::warn!(origin = %webauthn_origin, "webauthn_origin is not a valid header value, CORS disabled");
            CorsLayer::new()
        }
    }
}
