//! Middleware chain: recover (panic → 500, via `tower_http::catch_panic`
//! layered globally) → log (`TraceLayer`, layered globally) →
//! origin-check → session lookup. The latter two are ordinary axum
//! extractors so individual handlers opt in by taking `AuthUser` /
//! `AdminUser` as a parameter.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::{request::Parts, Method};
use axum::middleware::Next;
use axum::response::Response;

use f1stream_providers::models::User;

use super::error::AppError;
use crate::session;
use crate::state::AppState;

/// Rejects state-changing requests whose `Origin` header is present but
/// does not match the configured gateway origin. Safe methods are
/// exempt since they carry no side effects to forge.
pub async fn origin_check(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, AppError> {
    let is_safe = matches!(*request.method(), Method::GET | Method::HEAD | Method::OPTIONS);
    if !is_safe {
        if let Some(origin) = request.headers().get(axum::http::header::ORIGIN) {
            let origin = origin.to_str().unwrap_or("");
            if !origin.is_empty() && origin != state.settings.webauthn_origin {
                return Err(AppError::forbidden("origin not allowed"));
            }
        }
    }
    Ok(next.run(request).await)
}

/// An authenticated user, resolved from the `session` cookie against the
/// store's session table.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: axum::extract::FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let token = session::extract_token(&parts.headers).ok_or_else(|| AppError::unauthorized("not signed in"))?;

        let row = app_state
            .store
            .get_session(&token)
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::unauthorized("session not found"))?;
        if row.is_expired(chrono::Utc::now()) {
            return Err(AppError::unauthorized("session expired"));
        }

        let user = app_state
            .store
            .get_user(&row.user_id)
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::unauthorized("user not found"))?;
        Ok(AuthUser(user))
    }
}

/// Like `AuthUser` but additionally requires `is_admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

impl<S> FromRequestParts<S> for AdminUser
where
    AppState: axum::extract::FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::forbidden("admin only"));
        }
        Ok(AdminUser(user))
    }
}
