//! Inventory stock ledger domain.
//!
//! This crate contains the business rules for per-site stock levels and their
//! movement log, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage). Stores persist what this crate decides.

pub mod catalog;
pub mod command;
pub mod movement;
pub mod record;
pub mod stock_level;

pub use catalog::{InventoryView, ProductRef, SiteRef};
pub use command::{
    AdjustStock, RecountStock, ReleaseStock, ReserveStock, StockChange, StockCommand, StockPolicy,
    TransferStock,
};
pub use movement::{Direction, InventoryMovement, MovementType, ledger_total};
pub use record::{InventoryRecord, RecordParts, StockThresholds};
pub use stock_level::{InventoryQuery, LowStockFilter, StockStatus};
