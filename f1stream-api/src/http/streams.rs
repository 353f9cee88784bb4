//! Stream catalog: public listing, user CRUD, player-config lookup,
//! admin publish.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use f1stream_providers::models::{Stream, StreamSource};
use f1stream_providers::PlayerConfig;

use super::error::{AppError, AppResult};
use super::middleware::{AdminUser, AuthUser};
use crate::state::AppState;

pub async fn public_streams(State(state): State<AppState>) -> AppResult<Json<Vec<Stream>>> {
    Ok(Json(state.store.public_streams()?))
}

#[derive(Deserialize)]
pub struct CreateStreamRequest {
    pub url: String,
    pub title: String,
}

pub async fn create_stream(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateStreamRequest>,
) -> AppResult<Json<Stream>> {
    if url::Url::parse(&req.url).is_err() {
        return Err(AppError::bad_request("invalid stream url"));
    }
    let stream = Stream {
        id: String::new(),
        url: req.url,
        title: req.title,
        submitted_by: user.id,
        published: false,
        source: StreamSource::User,
        created_at: chrono::Utc::now(),
    };
    Ok(Json(state.store.insert_stream(stream)?))
}

pub async fn list_my_streams(State(state): State<AppState>, AuthUser(user): AuthUser) -> AppResult<Json<Vec<Stream>>> {
    let mine = state
        .store
        .list_streams()?
        .into_iter()
        .filter(|s| s.submitted_by == user.id)
        .collect();
    Ok(Json(mine))
}

pub async fn delete_stream(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> AppResult<()> {
    state.store.delete_stream(&id, &user.id, user.is_admin)?;
    Ok(())
}

#[derive(Deserialize)]
pub struct PublishRequest {
    pub published: bool,
}

pub async fn admin_publish_stream(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<PublishRequest>,
) -> AppResult<Json<Stream>> {
    Ok(Json(state.store.set_published(&id, req.published)?))
}

pub async fn player_config(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<PlayerConfig>> {
    let stream = state
        .store
        .get_stream(&id)?
        .ok_or_else(|| AppError::not_found(format!("stream {id}")))?;
    let config = state.player_config.resolve(&stream.url).await;
    Ok(Json(config))
}
