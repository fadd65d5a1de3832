use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    repo::{RepoError, UniqueField, UserRepository},
    repo_types::{NewUser, User},
};

/// Process-local user store for development and tests.
///
/// The uniqueness check and the insert happen under one write lock, so it
/// gives the same guarantee as the Postgres unique indexes.
#[derive(Default)]
pub struct MemoryUserRepository {
    users: RwLock<Vec<User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        let found = users
            .iter()
            .find(|u| u.username == username)
            .or_else(|| users.iter().find(|u| u.email == email))
            .cloned();
        Ok(found)
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let users = self.users.read().await;
        Ok(users.iter().find(|u| u.username == username).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, RepoError> {
        let mut users = self.users.write().await;
        if users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict(UniqueField::Username));
        }
        if users.iter().any(|u| u.email == user.email) {
            return Err(RepoError::Conflict(UniqueField::Email));
        }
        let user = user.into_user(Uuid::new_v4());
        users.push(user.clone());
        Ok(user)
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn close(&self) {}
}
