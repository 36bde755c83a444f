//! Inventory ledger storage boundary.
//!
//! A store persists what the domain decides. Every write goes through
//! [`InventoryRecord::handle`] (or `with_thresholds`) inside the store's own
//! atomic unit (a write lock, or a database transaction), so the record update
//! and its movement row are committed together or not at all.
//!
//! [`InventoryRecord::handle`]: stockbook_inventory::InventoryRecord::handle

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockbook_core::{DomainError, InventoryId, ProductId, SiteId, TransferId};
use stockbook_inventory::{
    InventoryMovement, InventoryQuery, InventoryRecord, InventoryView, LowStockFilter, ProductRef,
    SiteRef, StockChange, StockCommand, StockPolicy, StockThresholds, TransferStock,
};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryInventoryStore;
pub use postgres::PostgresInventoryStore;

/// Store operation error.
///
/// Domain failures decided inside the store's atomic unit are passed through
/// unchanged; everything else is an infrastructure concern.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A concurrent writer won (serialization failure, deadlock, stale version).
    #[error("concurrent update detected: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Request to start stocking a product at a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRecord {
    pub product_id: ProductId,
    pub site_id: SiteId,
    /// Applied only when the record is created.
    pub thresholds: StockThresholds,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedRecord {
    pub view: InventoryView,
    /// `false` when the pair was already stocked and the existing row was returned.
    pub created: bool,
}

/// Both legs of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    pub reference_id: TransferId,
    pub source: InventoryRecord,
    pub destination: InventoryRecord,
    pub outbound: InventoryMovement,
    pub inbound: InventoryMovement,
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn upsert_product(&self, product: ProductRef) -> Result<ProductRef, StoreError>;

    async fn upsert_site(&self, site: SiteRef) -> Result<SiteRef, StoreError>;

    /// Get-or-create the record for a (product, site) pair.
    async fn open_record(&self, request: OpenRecord) -> Result<OpenedRecord, StoreError>;

    async fn update_thresholds(
        &self,
        id: InventoryId,
        thresholds: StockThresholds,
        now: DateTime<Utc>,
    ) -> Result<InventoryView, StoreError>;

    async fn get(&self, id: InventoryId) -> Result<Option<InventoryView>, StoreError>;

    /// Decide and commit one stock command atomically.
    async fn apply(&self, command: StockCommand, policy: StockPolicy) -> Result<StockChange, StoreError>;

    /// Move stock between two sites in one atomic unit.
    async fn transfer(&self, command: TransferStock, policy: StockPolicy) -> Result<TransferOutcome, StoreError>;

    async fn list(&self, query: &InventoryQuery) -> Result<Vec<InventoryView>, StoreError>;

    async fn list_low_stock(&self, filter: &LowStockFilter) -> Result<Vec<InventoryView>, StoreError>;

    /// Movements of one record, in creation order.
    async fn movements(&self, id: InventoryId) -> Result<Vec<InventoryMovement>, StoreError>;
}
