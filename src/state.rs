use std::sync::Arc;

use crate::config::{AppConfig, StoreKind};
use crate::db;
use crate::users::{memory::MemoryUserStore, repo::PgUserStore, repo::UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let users = match (&config.store, &config.db) {
            (StoreKind::Postgres, Some(db_config)) => {
                let pool = db::connect(db_config).await?;
                db::migrate(&pool).await;
                Arc::new(PgUserStore::new(pool)) as Arc<dyn UserStore>
            }
            (StoreKind::Postgres, None) => {
                anyhow::bail!("postgres store selected without DATABASE_URL")
            }
            (StoreKind::Memory, _) => {
                tracing::warn!("using in-memory user store; data is lost on restart");
                Arc::new(MemoryUserStore::new()) as Arc<dyn UserStore>
            }
        };

        Ok(Self::from_parts(Arc::new(config), users))
    }

    pub fn from_parts(config: Arc<AppConfig>, users: Arc<dyn UserStore>) -> Self {
        Self { config, users }
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            store: StoreKind::Memory,
            db: None,
            host: "127.0.0.1".into(),
            port: 0,
        });
        Self::from_parts(config, Arc::new(MemoryUserStore::new()))
    }
}
