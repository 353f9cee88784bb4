//! Thin route wiring over `f1stream_proxy::ReverseProxy`.

use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/proxy/{encoded_origin}", axum::routing::any(proxy_root))
        .route("/proxy/{encoded_origin}/{*rest}", axum::routing::any(proxy_path))
}

async fn proxy_root(
    State(state): State<AppState>,
    method: axum::http::Method,
    Path(encoded_origin): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    state.reverse_proxy.handle(method, &encoded_origin, "/", query.as_deref(), &headers).await
}

async fn proxy_path(
    State(state): State<AppState>,
    method: axum::http::Method,
    Path((encoded_origin, rest)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let path = format!("/{rest}");
    state.reverse_proxy.handle(method, &encoded_origin, &path, query.as_deref(), &headers).await
}
