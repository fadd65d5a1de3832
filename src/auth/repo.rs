use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tracing::info;

use crate::auth::repo_types::{NewUser, User};

/// Field a uniqueness constraint fired on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("unique constraint violated on {0:?}")]
    Conflict(UniqueField),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Durable user storage.
///
/// Implementations must enforce username and email uniqueness atomically on
/// `insert`; callers only pre-check to fail early.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// First user whose username OR email matches.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;

    async fn insert(&self, user: NewUser) -> Result<User, RepoError>;

    async fn ping(&self) -> anyhow::Result<()>;

    async fn close(&self);
}

/// Postgres-backed repository. Uniqueness comes from the indexes created by
/// the migrations in `./migrations`.
#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run migrations")?;

        let repo = Self { db };
        repo.ping().await?;
        info!(max_connections, "connected to postgres user store");
        Ok(repo)
    }
}

fn map_insert_error(e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some(c) if c.contains("email") => RepoError::Conflict(UniqueField::Email),
                _ => RepoError::Conflict(UniqueField::Username),
            };
        }
    }
    RepoError::Other(anyhow::Error::new(e).context("insert user"))
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, password_hash, is_active, created_at
            FROM users
            WHERE username = $1 OR email = $2
            ORDER BY (username = $1) DESC
            LIMIT 1
            "#,
        )
        .bind(username)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by username or email")?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, full_name, password_hash, is_active, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await
        .context("find user by username")?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, RepoError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, full_name, password_hash, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, username, email, full_name, password_hash, is_active, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(user.is_active)
        .bind(user.created_at)
        .fetch_one(&self.db)
        .await
        .map_err(map_insert_error)?;
        Ok(user)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.db)
            .await
            .context("ping database")?;
        Ok(())
    }

    async fn close(&self) {
        self.db.close().await;
        info!("disconnected from postgres user store");
    }
}
