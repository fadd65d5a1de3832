use std::sync::Arc;

use anyhow::Context;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};

use crate::auth::{
    dto::{LoginRequest, LoginResponse, MessageResponse, PublicUser, RegisterRequest},
    errors::AuthError,
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::{RepoError, UserRepository},
    repo_types::{NewUser, User},
};

/// Registration, login and token-to-user resolution.
///
/// Holds no mutable state of its own; everything durable lives in the
/// repository.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    keys: Arc<JwtKeys>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, keys: JwtKeys) -> Self {
        Self {
            users,
            keys: Arc::new(keys),
        }
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    /// Expects a request that already passed `RegisterRequest::validate`.
    pub async fn register(&self, req: RegisterRequest) -> Result<MessageResponse, AuthError> {
        let existing = self
            .users
            .find_by_username_or_email(&req.username, &req.email)
            .await?;
        if let Some(existing) = existing {
            // username wins when both collide
            if existing.username == req.username {
                warn!(username = %req.username, "username already registered");
                return Err(AuthError::DuplicateUsername);
            }
            warn!(email = %req.email, "email already registered");
            return Err(AuthError::DuplicateEmail);
        }

        let password = req.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .context("hashing task panicked")??;

        let new_user = NewUser {
            username: req.username,
            email: req.email,
            full_name: req.full_name,
            password_hash,
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        };

        let user = match self.users.insert(new_user).await {
            Ok(u) => u,
            Err(RepoError::Conflict(field)) => {
                // lost a race with a concurrent registration
                error!(?field, "unique constraint hit after pre-check");
                return Err(AuthError::Internal(anyhow::anyhow!(
                    "failed to create user: duplicate {field:?}"
                )));
            }
            Err(RepoError::Other(e)) => {
                return Err(AuthError::Internal(e.context("failed to create user")));
            }
        };

        info!(user_id = %user.id, username = %user.username, "user registered");
        Ok(MessageResponse::ok(format!(
            "User {} registered successfully",
            user.username
        )))
    }

    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AuthError> {
        let Some(user) = self.users.find_by_username(&req.username).await? else {
            warn!(username = %req.username, "login unknown username");
            return Err(AuthError::InvalidCredentials);
        };

        let password = req.password;
        let stored = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
            .await
            .context("verify task panicked")?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            warn!(user_id = %user.id, "login for inactive account");
            return Err(AuthError::InactiveAccount);
        }

        let access_token = self.keys.issue_access(&user.username)?;

        info!(user_id = %user.id, username = %user.username, "user logged in");
        Ok(LoginResponse {
            access_token,
            token_type: "bearer".into(),
            user: PublicUser::from(user),
        })
    }

    /// Resolve a bearer credential to its user. Every failure is `Unauthorized`.
    pub async fn current_user(&self, token: &str) -> Result<User, AuthError> {
        let claims = self
            .keys
            .verify(token)
            .map_err(|_| AuthError::Unauthorized)?;

        match self.users.find_by_username(&claims.sub).await? {
            Some(user) => Ok(user),
            None => {
                debug!(subject = %claims.sub, "token subject no longer exists");
                Err(AuthError::Unauthorized)
            }
        }
    }

    /// Nothing is revoked server-side; the client drops the token.
    pub fn logout(&self, user: &User) -> MessageResponse {
        info!(user_id = %user.id, "user logged out");
        MessageResponse::ok("Successfully logged out")
    }
}
