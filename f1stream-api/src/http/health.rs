//! Liveness endpoint. There is no external database to probe, so there
//! is no separate readiness check.

use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

pub async fn liveness() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}
