use crate::config::AppConfig;
use crate::users::{MemoryUserRepository, PgUserRepository, UserRepository};
use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepository>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<(Self, Option<PgPool>)> {
        Self::from_config(AppConfig::from_env()?).await
    }

    /// Connects to Postgres when a database URL is configured and returns the
    /// pool so the caller can migrate; otherwise falls back to memory.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<(Self, Option<PgPool>)> {
        let config = Arc::new(config);

        let Some(url) = config.database_url.as_deref() else {
            warn!("DATABASE_URL not set; users are kept in memory only");
            let users = Arc::new(MemoryUserRepository::new()) as Arc<dyn UserRepository>;
            return Ok((Self::from_parts(users, config), None));
        };

        let db = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .context("connect to database")?;

        let users = Arc::new(PgUserRepository::new(db.clone())) as Arc<dyn UserRepository>;
        Ok((Self::from_parts(users, config), Some(db)))
    }

    pub fn from_parts(users: Arc<dyn UserRepository>, config: Arc<AppConfig>) -> Self {
        Self { users, config }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let users = Arc::new(MemoryUserRepository::new()) as Arc<dyn UserRepository>;
        Self::from_parts(users, Arc::new(test_config()))
    }
}

#[cfg(test)]
fn test_config() -> AppConfig {
    AppConfig {
        database_url: None,
        host: "127.0.0.1".into(),
        port: 0,
        max_connections: 1,
    }
}
