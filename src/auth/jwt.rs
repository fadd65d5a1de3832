use anyhow::Context;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration, OffsetDateTime};
use tracing::debug;

use super::{claims::Claims, errors::AuthError};
use crate::config::JwtConfig;

/// Why a token was rejected. Only ever logged; callers answer every variant
/// with the same `Unauthorized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidToken {
    Malformed,
    BadSignature,
    Expired,
}

/// Signing and verification keys, built once at startup.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    access_ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&cfg.audience));
        validation.set_issuer(std::slice::from_ref(&cfg.issuer));
        // jsonwebtoken rejects only when `exp < now`, so a token is still
        // accepted during the second it expires.
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            validation,
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::seconds(cfg.ttl_minutes.saturating_mul(60)),
        }
    }

    pub fn issue(&self, subject: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc();
        let exp = now
            .checked_add(ttl)
            .ok_or_else(|| anyhow::anyhow!("token expiry out of range (ttl {ttl})"))?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("jwt encode")?;
        debug!(subject, "jwt signed");
        Ok(token)
    }

    pub fn issue_access(&self, subject: &str) -> Result<String, AuthError> {
        self.issue(subject, self.access_ttl)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, InvalidToken> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => {
                debug!(subject = %data.claims.sub, "jwt verified");
                Ok(data.claims)
            }
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => InvalidToken::Expired,
                    ErrorKind::InvalidSignature => InvalidToken::BadSignature,
                    _ => InvalidToken::Malformed,
                };
                debug!(?reason, error = %e, "jwt rejected");
                Err(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
        })
    }

    #[test]
    fn issue_and_verify_access_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.issue_access("alice").expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue("alice", Duration::seconds(-5)).unwrap();
        assert_eq!(keys.verify(&token).unwrap_err(), InvalidToken::Expired);
    }

    #[tokio::test]
    async fn token_expires_after_ttl() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue("alice", Duration::seconds(1)).unwrap();
        assert!(keys.verify(&token).is_ok());
        tokio::time::sleep(std::time::Duration::from_millis(2100)).await;
        assert_eq!(keys.verify(&token).unwrap_err(), InvalidToken::Expired);
    }

    #[test]
    fn token_is_accepted_in_its_expiry_second() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let token = keys.issue("alice", Duration::ZERO).unwrap();
        assert_eq!(keys.verify(&token).unwrap().sub, "alice");
    }

    #[test]
    fn huge_ttl_is_an_error_not_a_panic() {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 10_000_000_000,
        });
        assert!(matches!(
            keys.issue_access("alice"),
            Err(AuthError::Internal(_))
        ));
        assert!(matches!(
            keys.issue("alice", Duration::MAX),
            Err(AuthError::Internal(_))
        ));

        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: i64::MAX,
        });
        assert!(keys.issue_access("alice").is_err());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let ours = make_keys("our-secret", "iss", "aud");
        let theirs = make_keys("their-secret", "iss", "aud");
        let token = theirs.issue_access("alice").unwrap();
        assert_eq!(ours.verify(&token).unwrap_err(), InvalidToken::BadSignature);
    }

    #[test]
    fn garbage_is_malformed() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert_eq!(
            keys.verify("garbage-token").unwrap_err(),
            InvalidToken::Malformed
        );
        assert_eq!(keys.verify("").unwrap_err(), InvalidToken::Malformed);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys("same-secret", "good-iss", "good-aud");
        let bad = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good.issue_access("alice").unwrap();
        assert!(bad.verify(&token).is_err());
    }
}
