//! Thin route wiring over `f1stream_proxy::HlsProxy`.

use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;

use crate::state::AppState;

pub async fn proxy_hls(
    State(state): State<AppState>,
    Path(payload): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    state.hls_proxy.handle(&payload, query.as_deref().unwrap_or(""), &headers).await
}
