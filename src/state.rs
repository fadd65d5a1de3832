use crate::auth::{
    jwt::JwtKeys,
    repo::{PgUserRepository, UserRepository},
    repo_memory::MemoryUserRepository,
    AuthService,
};
use crate::config::{AppConfig, UserStore};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepository>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let users: Arc<dyn UserRepository> = match &config.store {
            UserStore::Postgres {
                database_url,
                max_connections,
            } => Arc::new(PgUserRepository::connect(database_url, *max_connections).await?),
            UserStore::Memory => {
                tracing::warn!("using in-memory user store; accounts are lost on restart");
                Arc::new(MemoryUserRepository::new())
            }
        };
        users.ping().await?;

        Ok(Self::from_parts(Arc::new(config), users))
    }

    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserRepository>) -> Self {
        let keys = JwtKeys::from_config(&config.jwt);
        let auth = Arc::new(AuthService::new(users.clone(), keys));
        Self {
            config,
            users,
            auth,
        }
    }

    /// In-memory state with the fixed test config.
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryUserRepository::new()),
        )
    }
}
