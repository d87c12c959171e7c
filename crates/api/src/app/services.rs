//! Service wiring: one store shared by the order and account services.

use std::sync::Arc;

use tracing::info;

use stockroom_infra::{
    AccountCascadeCoordinator, AppConfig, InMemoryStore, OrderService, PostgresStore, Store,
    StoreError,
};

pub type SharedStore = Arc<dyn Store>;

pub struct AppServices {
    pub store: SharedStore,
    pub orders: OrderService<SharedStore>,
    pub accounts: AccountCascadeCoordinator<SharedStore>,
}

impl AppServices {
    pub fn new(store: SharedStore) -> Self {
        Self {
            orders: OrderService::new(store.clone()),
            accounts: AccountCascadeCoordinator::new(store.clone()),
            store,
        }
    }

    /// Postgres when `DATABASE_URL` is configured, in-memory otherwise.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        let store: SharedStore = match &config.database_url {
            Some(url) => {
                let pg = PostgresStore::connect(url, config.database_max_connections).await?;
                pg.ensure_schema().await?;
                info!(max_connections = config.database_max_connections, "using postgres store");
                Arc::new(pg)
            }
            None => {
                info!("DATABASE_URL not set; using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        };
        Ok(Self::new(store))
    }
}
