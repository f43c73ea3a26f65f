use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::Store;

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    /// Pack table, built once from config. Read-only at runtime.
    pub catalog: Catalog,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let catalog = Catalog::from_config(&config.packs);

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            store,
            catalog,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
