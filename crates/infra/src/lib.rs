//! Infrastructure layer: configuration, ledger storage, and the ledger service.

pub mod config;
pub mod ledger;
pub mod store;

pub use config::{Config, ConfigError};
pub use ledger::{InventoryLedger, LedgerError, MovementNote, Reconciliation, TransferRequest};
pub use store::{InMemoryInventoryStore, InventoryStore, PostgresInventoryStore, StoreError};
