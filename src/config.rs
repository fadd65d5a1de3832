use anyhow::{bail, Context};

/// Upper bound for `JWT_TTL_MINUTES`: one year.
pub const MAX_TTL_MINUTES: i64 = 525_600;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Which backend holds user records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserStore {
    Postgres { database_url: String, max_connections: u32 },
    Memory,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub store: UserStore,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
    /// Empty means any origin is allowed.
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = match std::env::var("USER_STORE")
            .unwrap_or_else(|_| "postgres".into())
            .to_lowercase()
            .as_str()
        {
            "postgres" => UserStore::Postgres {
                database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(10),
            },
            "memory" => UserStore::Memory,
            other => bail!("unknown USER_STORE `{other}`, expected `postgres` or `memory`"),
        };

        let secret = std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        if secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        let jwt = JwtConfig {
            secret,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "hospital-auth".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "hospital-auth-users".into()),
            ttl_minutes: parse_ttl_minutes(std::env::var("JWT_TTL_MINUTES").ok().as_deref())?,
        };

        let port = std::env::var("APP_PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse::<u16>()
            .context("APP_PORT must be a port number")?;

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            store,
            jwt,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            cors_allowed_origins,
        })
    }

    /// Config used by tests and local tooling: in-memory store, fixed secret.
    pub fn for_tests() -> Self {
        Self {
            store: UserStore::Memory,
            jwt: JwtConfig {
                secret: "test-secret".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            host: "127.0.0.1".into(),
            port: 0,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// `JWT_TTL_MINUTES`, defaulting to 30. Must lie in `1..=MAX_TTL_MINUTES`.
fn parse_ttl_minutes(raw: Option<&str>) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(30);
    };
    let ttl = raw
        .trim()
        .parse::<i64>()
        .with_context(|| format!("JWT_TTL_MINUTES `{raw}` is not a number"))?;
    if !(1..=MAX_TTL_MINUTES).contains(&ttl) {
        bail!("JWT_TTL_MINUTES must be between 1 and {MAX_TTL_MINUTES}, got {ttl}");
    }
    Ok(ttl)
}
