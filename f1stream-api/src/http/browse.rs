//! WebSocket upgrade for the embedded-browser viewport. Capacity is
//! checked before the upgrade so an over-capacity client gets a 503
//! instead of a socket that closes immediately after opening.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::Response;

use crate::browser::session;
use crate::state::AppState;

use super::error::{AppError, AppResult};

pub async fn browse(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    if !state.settings.headless_extract_enabled {
        return Err(AppError::not_found("browser sessions not available"));
    }

    let stream = state
        .store
        .get_stream(&id)?
        .ok_or_else(|| AppError::not_found(format!("stream {id}")))?;

    let slot = state
        .try_acquire_session_slot()
        .ok_or_else(|| AppError::service_unavailable("no browser session capacity available"))?;

    Ok(ws.on_upgrade(move |socket| async move {
        session::run(state, socket, stream.url, slot).await;
    }))
}
