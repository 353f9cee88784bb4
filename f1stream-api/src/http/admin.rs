//! Admin-only catalog visibility and scrape trigger.

use axum::extract::State;
use axum::Json;

use f1stream_providers::models::Stream;

use super::error::AppResult;
use super::middleware::AdminUser;
use super::scraped::ScrapeResult;
use crate::state::AppState;

pub async fn list_all_streams(State(state): State<AppState>, AdminUser(_admin): AdminUser) -> AppResult<Json<Vec<Stream>>> {
    Ok(Json(state.store.list_streams()?))
}

pub async fn trigger_scrape(State(state): State<AppState>, AdminUser(_admin): AdminUser) -> AppResult<Json<ScrapeResult>> {
    let imported = state.scraper.scrape().await?;
    Ok(Json(ScrapeResult { imported }))
}

/// Drops every cached player-config result (success or error) plus the
/// shared channel index, for operators running against live upstreams
/// that changed out from under a cached failure.
pub async fn bust_player_config_cache(AdminUser(_admin): AdminUser, State(state): State<AppState>) -> AppResult<axum::http::StatusCode> {
    state.player_config.invalidate_all().await;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
