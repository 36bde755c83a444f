use std::sync::Arc;

use stockbook_infra::{
    Config, InMemoryInventoryStore, InventoryLedger, InventoryStore, PostgresInventoryStore, StoreError,
};
use stockbook_inventory::StockPolicy;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub ledger: InventoryLedger,
}

impl AppServices {
    pub fn new(store: Arc<dyn InventoryStore>, policy: StockPolicy) -> Self {
        Self {
            ledger: InventoryLedger::new(store, policy),
        }
    }

    /// In-memory ledger (dev mode and tests).
    pub fn in_memory(policy: StockPolicy) -> Self {
        Self::new(Arc::new(InMemoryInventoryStore::new()), policy)
    }
}

/// Pick the store from configuration: Postgres when `DATABASE_URL` is set.
pub async fn build_services(config: &Config) -> Result<AppServices, StoreError> {
    let policy = config.ledger.policy;
    match &config.database {
        Some(db) => {
            let store = PostgresInventoryStore::connect(&db.url, db.max_connections, config.ledger.max_retries).await?;
            tracing::info!(max_connections = db.max_connections, "using postgres inventory store");
            Ok(AppServices::new(Arc::new(store), policy))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory inventory store");
            Ok(AppServices::in_memory(policy))
        }
    }
}
