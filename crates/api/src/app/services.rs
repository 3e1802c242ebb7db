use std::sync::Arc;

use sqlx::PgPool;

use eshop_infra::db;
use eshop_infra::order_store::{
    InMemoryOrderStore, OrderStore, PostgresOrderStore, ProductCatalog, StoreError,
};

use crate::config::ApiConfig;

/// Stores the handlers talk to, plus the pool they share (if any).
#[derive(Clone)]
pub struct AppServices {
    orders: Arc<dyn OrderStore>,
    catalog: Arc<dyn ProductCatalog>,
    pool: Option<PgPool>,
}

impl AppServices {
    /// Wire a store that serves both orders and catalog lookups.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: OrderStore + ProductCatalog + 'static,
    {
        Self {
            orders: store.clone(),
            catalog: store,
            pool: None,
        }
    }

    pub fn in_memory(store: Arc<InMemoryOrderStore>) -> Self {
        Self::from_store(store)
    }

    pub fn persistent(store: PostgresOrderStore) -> Self {
        let pool = store.pool().clone();
        let mut services = Self::from_store(Arc::new(store));
        services.pool = Some(pool);
        services
    }

    pub fn orders(&self) -> &dyn OrderStore {
        self.orders.as_ref()
    }

    pub fn catalog(&self) -> &dyn ProductCatalog {
        self.catalog.as_ref()
    }

    /// Release pooled connections. In-memory services have nothing to release.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            db::close(pool).await;
        }
    }
}

/// Build services from configuration: Postgres when `DATABASE_URL` is set,
/// otherwise an empty in-memory store (dev only).
pub async fn build_services(config: &ApiConfig) -> Result<AppServices, StoreError> {
    let Some(db_config) = &config.database else {
        tracing::warn!("DATABASE_URL not set; using in-memory store (data is lost on restart)");
        let store = InMemoryOrderStore::with_policy(config.placement);
        return Ok(AppServices::in_memory(Arc::new(store)));
    };

    let pool = db::connect(db_config).await?;
    if config.apply_schema {
        db::apply_schema(&pool).await?;
    }

    Ok(AppServices::persistent(PostgresOrderStore::with_policy(
        pool,
        config.placement,
    )))
}
