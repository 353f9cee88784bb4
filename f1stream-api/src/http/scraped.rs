//! Scraped-link listing, import, and manual refresh trigger.

use axum::extract::{Path, State};
use axum::Json;

use f1stream_providers::models::ScrapedLink;

use super::error::{AppError, AppResult};
use super::middleware::AuthUser;
use crate::state::AppState;

pub async fn list_active(State(state): State<AppState>) -> AppResult<Json<Vec<ScrapedLink>>> {
    Ok(Json(state.store.active_scraped_links()?))
}

pub async fn import(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<f1stream_providers::models::Stream>> {
    let link = state
        .store
        .get_scraped_link(&id)?
        .ok_or_else(|| AppError::not_found(format!("scraped link {id}")))?;

    let stream = state
        .store
        .publish_scraped_stream(&link.url, &link.title)?
        .ok_or_else(|| AppError::conflict("this link has already been imported"))?;
    tracing::info!(user = %user.id, url = %link.url, "scraped link imported");
    Ok(Json(stream))
}

pub async fn refresh(State(state): State<AppState>, _user: AuthUser) -> AppResult<Json<ScrapeResult>> {
    let imported = state.scraper.scrape().await?;
    Ok(Json(ScrapeResult { imported }))
}

#[derive(serde::Serialize)]
pub struct ScrapeResult {
    pub imported: usize,
}
