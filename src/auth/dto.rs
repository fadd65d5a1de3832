use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{errors::AuthError, repo_types::User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response returned after a successful login.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: PublicUser,
}

/// Public part of the user returned to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            full_name: u.full_name,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub success: bool,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), AuthError> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(AuthError::Validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

impl RegisterRequest {
    /// Normalizes the email and enforces the schema limits.
    pub fn validate(mut self) -> Result<Self, AuthError> {
        self.email = self.email.trim().to_lowercase();
        check_len("username", &self.username, 3, 50)?;
        if !is_valid_email(&self.email) {
            return Err(AuthError::Validation("Invalid email".into()));
        }
        check_len("full_name", &self.full_name, 2, 100)?;
        check_len("password", &self.password, 6, 100)?;
        Ok(self)
    }
}

impl LoginRequest {
    pub fn validate(self) -> Result<Self, AuthError> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(AuthError::Validation(
                "username and password are required".into(),
            ));
        }
        Ok(self)
    }
}
