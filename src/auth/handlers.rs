use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, Span};

use crate::{
    auth::{
        dto::{LoginRequest, LoginResponse, MessageResponse, PublicUser, RegisterRequest},
        errors::AuthError,
        extractors::CurrentUser,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/me", get(get_me))
        .route("/auth/logout", post(logout))
}

#[instrument(skip(state, payload), fields(username = tracing::field::Empty))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Json(payload) = payload?;
    Span::current().record("username", payload.username.as_str());
    let payload = payload.validate()?;
    Ok(Json(state.auth.register(payload).await?))
}

#[instrument(skip(state, payload), fields(username = tracing::field::Empty))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AuthError> {
    let Json(payload) = payload?;
    Span::current().record("username", payload.username.as_str());
    let payload = payload.validate()?;
    Ok(Json(state.auth.login(payload).await?))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(PublicUser::from(user))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Json<MessageResponse> {
    Json(state.auth.logout(&user))
}
