//! WebAuthn registration/login ceremonies, each a begin/finish pair, plus
//! logout and `/api/auth/me`.

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use webauthn_rs::prelude::{CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential, RequestChallengeResponse};

use f1stream_providers::models::{Session, User};

use super::error::{AppError, AppResult};
use super::middleware::AuthUser;
use crate::session;
use crate::state::AppState;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,30}$").unwrap());

#[derive(Deserialize)]
pub struct BeginRegistrationRequest {
    pub username: String,
}

pub async fn begin_register(
    State(state): State<AppState>,
    Json(req): Json<BeginRegistrationRequest>,
) -> AppResult<Json<CreationChallengeResponse>> {
    if !USERNAME_RE.is_match(&req.username) {
        return Err(AppError::bad_request("username must be 3-30 alphanumeric/underscore characters"));
    }
    if state.store.get_user_by_username(&req.username)?.is_some() {
        return Err(AppError::conflict("username already taken"));
    }

    let is_first_user = state.store.user_count()? == 0;
    let is_admin = if state.settings.admin_username.is_empty() {
        is_first_user
    } else {
        req.username == state.settings.admin_username
    };

    let user_id = uuid::Uuid::new_v4();
    let user = User {
        id: user_id.to_string(),
        username: req.username.clone(),
        is_admin,
        credentials: Vec::new(),
        created_at: chrono::Utc::now(),
    };
    state.store.insert_user(user)?;

    let (challenge, reg_state) = state
        .webauthn
        .start_passkey_registration(user_id, &req.username, &req.username, None)
        .map_err(|e| AppError::internal(format!("webauthn registration start: {e}")))?;

    state.stash_registration(&req.username, reg_state);
    Ok(Json(challenge))
}

#[derive(Deserialize)]
pub struct FinishRegistrationRequest {
    pub username: String,
    pub credential: RegisterPublicKeyCredential,
}

pub async fn finish_register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FinishRegistrationRequest>,
) -> AppResult<Response> {
    let reg_state = state
        .pop_registration(&req.username)
        .ok_or_else(|| AppError::bad_request("no registration in progress for this username"))?;

    let passkey = state
        .webauthn
        .finish_passkey_registration(&req.credential, &reg_state)
        .map_err(|e| AppError::bad_request(format!("registration failed: {e}")))?;

    let mut user = state
        .store
        .get_user_by_username(&req.username)?
        .ok_or_else(|| AppError::internal("user row missing after eager creation"))?;
    user.credentials.push(passkey);
    let user = state.store.update_user(user)?;

    issue_session(&state, &user, session::is_https(&headers))
}

#[derive(Deserialize)]
pub struct BeginLoginRequest {
    pub username: String,
}

pub async fn begin_login(State(state): State<AppState>, Json(req): Json<BeginLoginRequest>) -> AppResult<Json<RequestChallengeResponse>> {
    let user = state
        .store
        .get_user_by_username(&req.username)?
        .ok_or_else(|| AppError::unauthorized("invalid username or no passkey registered"))?;
    if user.credentials.is_empty() {
        return Err(AppError::unauthorized("invalid username or no passkey registered"));
    }

    let (challenge, auth_state) = state
        .webauthn
        .start_passkey_authentication(&user.credentials)
        .map_err(|e| AppError::internal(format!("webauthn authentication start: {e}")))?;

    state.stash_authentication(&req.username, auth_state);
    Ok(Json(challenge))
}

#[derive(Deserialize)]
pub struct FinishLoginRequest {
    pub username: String,
    pub credential: PublicKeyCredential,
}

pub async fn finish_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FinishLoginRequest>,
) -> AppResult<Response> {
    let auth_state = state
        .pop_authentication(&req.username)
        .ok_or_else(|| AppError::bad_request("no login in progress for this username"))?;

    let result = state
        .webauthn
        .finish_passkey_authentication(&req.credential, &auth_state)
        .map_err(|e| AppError::unauthorized(format!("login failed: {e}")))?;

    let mut user = state
        .store
        .get_user_by_username(&req.username)?
        .ok_or_else(|| AppError::unauthorized("user not found"))?;
    for cred in &mut user.credentials {
        let _ = cred.update_credential(&result);
    }
    let user = state.store.update_user(user)?;

    issue_session(&state, &user, session::is_https(&headers))
}

fn issue_session(state: &AppState, user: &User, secure: bool) -> AppResult<Response> {
    let token = session::generate_token();
    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(state.settings.session_ttl_secs as i64);
    state.store.insert_session(Session { token: token.clone(), user_id: user.id.clone(), expires_at })?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        session::set_cookie_header(&token, state.settings.session_ttl_secs, secure),
    );
    Ok((response_headers, Json(MeResponse::from(user))).into_response())
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = session::extract_token(&headers) {
        state.store.delete_session(&token)?;
    }
    let mut response_headers = HeaderMap::new();
    response_headers.insert(header::SET_COOKIE, session::clear_cookie_header(session::is_https(&headers)));
    Ok((response_headers, ()).into_response())
}

#[derive(Serialize)]
pub struct MeResponse {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
}

impl From<&User> for MeResponse {
    fn from(user: &User) -> Self {
        Self { id: user.id.clone(), username: user.username.clone(), is_admin: user.is_admin }
    }
}

pub async fn me(AuthUser(user): AuthUser) -> Json<MeResponse> {
    Json(MeResponse::from(&user))
}
