use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use tracing::warn;

use super::{errors::AuthError, repo_types::User};
use crate::state::AppState;

/// Something a bearer credential can be read from.
pub trait BearerSource {
    fn bearer_token(&self) -> Option<&str>;
}

impl BearerSource for HeaderMap {
    fn bearer_token(&self) -> Option<&str> {
        let auth = self.get(AUTHORIZATION)?.to_str().ok()?;
        let (scheme, token) = auth.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }
}

/// The user behind the request's bearer token.
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = parts.headers.bearer_token() else {
            warn!("missing or malformed Authorization header");
            return Err(AuthError::Unauthorized);
        };
        let user = state.auth.current_user(token).await?;
        Ok(CurrentUser(user))
    }
}
