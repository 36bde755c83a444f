//! Inventory ledger service (application-level orchestration).
//!
//! Every ledger operation enters here:
//!
//! ```text
//! request
//!   ↓
//! 1. build the domain command (timestamp, actor, trimmed notes)
//!   ↓
//! 2. store.apply / store.transfer (decide + persist atomically)
//!   ↓
//! 3. map domain/store failures into `LedgerError`
//! ```
//!
//! Authorization happens before this layer, at the HTTP boundary.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use stockbook_core::{DomainError, InventoryId, ProductId, SiteId, UserId};
use stockbook_inventory::{
    AdjustStock, InventoryMovement, InventoryQuery, InventoryView, LowStockFilter, MovementType,
    ProductRef, RecountStock, ReleaseStock, ReserveStock, SiteRef, StockChange, StockCommand,
    StockPolicy, StockThresholds, TransferStock, ledger_total,
};

use crate::store::{InventoryStore, OpenRecord, OpenedRecord, StoreError, TransferOutcome};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    InvariantViolation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Store(String),
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::InvalidArgument(msg),
            DomainError::InvalidId(msg) => LedgerError::InvalidArgument(msg),
            DomainError::InvariantViolation(msg) => LedgerError::InvariantViolation(msg),
            DomainError::NotFound(what) => LedgerError::NotFound(what),
            DomainError::Conflict(msg) => LedgerError::Conflict(msg),
            DomainError::Unauthorized => LedgerError::Unauthorized,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Domain(e) => e.into(),
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            StoreError::Backend(msg) => LedgerError::Store(msg),
        }
    }
}

/// Free-text annotations carried onto a movement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MovementNote {
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl MovementNote {
    fn cleaned(self) -> Self {
        Self {
            reason: clean(self.reason),
            notes: clean(self.notes),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub from_site: SiteId,
    pub to_site: SiteId,
    pub quantity: Decimal,
    pub note: MovementNote,
}

/// Replay of a record's movement log against its stored quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub inventory_id: InventoryId,
    pub quantity: Decimal,
    pub ledger_total: Decimal,
    pub movement_count: usize,
    pub consistent: bool,
}

#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
    policy: StockPolicy,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn InventoryStore>, policy: StockPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> StockPolicy {
        self.policy
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    pub async fn register_product(&self, product: ProductRef) -> Result<ProductRef, LedgerError> {
        let unit = match product.unit.trim() {
            "" => "pcs".to_string(),
            unit => unit.to_string(),
        };
        let product = ProductRef {
            id: product.id,
            sku: required("sku", product.sku)?,
            name: required("name", product.name)?,
            unit,
        };
        Ok(self.store.upsert_product(product).await?)
    }

    #[instrument(skip(self, site), fields(site_id = %site.id), err)]
    pub async fn register_site(&self, site: SiteRef) -> Result<SiteRef, LedgerError> {
        let site = SiteRef {
            code: required("code", site.code)?,
            name: required("name", site.name)?,
            ..site
        };
        Ok(self.store.upsert_site(site).await?)
    }

    #[instrument(skip(self, thresholds), fields(product_id = %product_id, site_id = %site_id), err)]
    pub async fn open_record(
        &self,
        product_id: ProductId,
        site_id: SiteId,
        thresholds: StockThresholds,
    ) -> Result<OpenedRecord, LedgerError> {
        let opened = self
            .store
            .open_record(OpenRecord {
                product_id,
                site_id,
                thresholds,
                opened_at: Utc::now(),
            })
            .await?;
        if opened.created {
            info!(inventory_id = %opened.view.record.id_typed(), "inventory record opened");
        }
        Ok(opened)
    }

    #[instrument(skip(self, thresholds), fields(inventory_id = %id), err)]
    pub async fn set_thresholds(
        &self,
        id: InventoryId,
        thresholds: StockThresholds,
    ) -> Result<InventoryView, LedgerError> {
        Ok(self.store.update_thresholds(id, thresholds, Utc::now()).await?)
    }

    #[instrument(
        skip(self, note),
        fields(inventory_id = %id, movement_type = %movement_type, quantity_change = %quantity_change, actor = %actor),
        err
    )]
    pub async fn adjust_stock(
        &self,
        id: InventoryId,
        quantity_change: Decimal,
        movement_type: MovementType,
        note: MovementNote,
        actor: UserId,
    ) -> Result<StockChange, LedgerError> {
        let note = note.cleaned();
        let command = StockCommand::Adjust(AdjustStock {
            inventory_id: id,
            quantity_change,
            movement_type,
            reason: note.reason,
            notes: note.notes,
            reference_id: None,
            actor,
            occurred_at: Utc::now(),
        });
        self.execute(command).await
    }

    #[instrument(skip(self), fields(inventory_id = %id, actor = %actor), err)]
    pub async fn reserve_stock(
        &self,
        id: InventoryId,
        quantity: Decimal,
        actor: UserId,
    ) -> Result<StockChange, LedgerError> {
        self.execute(StockCommand::Reserve(ReserveStock {
            inventory_id: id,
            quantity,
            actor,
            occurred_at: Utc::now(),
        }))
        .await
    }

    #[instrument(skip(self), fields(inventory_id = %id, actor = %actor), err)]
    pub async fn release_stock(
        &self,
        id: InventoryId,
        quantity: Decimal,
        actor: UserId,
    ) -> Result<StockChange, LedgerError> {
        self.execute(StockCommand::Release(ReleaseStock {
            inventory_id: id,
            quantity,
            actor,
            occurred_at: Utc::now(),
        }))
        .await
    }

    #[instrument(skip(self, note), fields(inventory_id = %id, counted = %counted_quantity, actor = %actor), err)]
    pub async fn recount_stock(
        &self,
        id: InventoryId,
        counted_quantity: Decimal,
        note: MovementNote,
        actor: UserId,
    ) -> Result<StockChange, LedgerError> {
        let note = note.cleaned();
        self.execute(StockCommand::Recount(RecountStock {
            inventory_id: id,
            counted_quantity,
            reason: note.reason,
            notes: note.notes,
            actor,
            occurred_at: Utc::now(),
        }))
        .await
    }

    #[instrument(
        skip(self, request),
        fields(product_id = %request.product_id, from_site = %request.from_site, to_site = %request.to_site, actor = %actor),
        err
    )]
    pub async fn transfer_stock(
        &self,
        request: TransferRequest,
        actor: UserId,
    ) -> Result<TransferOutcome, LedgerError> {
        let note = request.note.cleaned();
        let command = TransferStock {
            product_id: request.product_id,
            from_site: request.from_site,
            to_site: request.to_site,
            quantity: request.quantity,
            reason: note.reason,
            notes: note.notes,
            actor,
            occurred_at: Utc::now(),
        };
        let outcome = self.store.transfer(command, self.policy).await?;
        info!(reference_id = %outcome.reference_id, quantity = %request.quantity, "stock transferred");
        Ok(outcome)
    }

    pub async fn get_record(&self, id: InventoryId) -> Result<InventoryView, LedgerError> {
        self.store
            .get(id)
            .await?
            .ok_or(LedgerError::NotFound("inventory record"))
    }

    pub async fn list_inventory(&self, query: &InventoryQuery) -> Result<Vec<InventoryView>, LedgerError> {
        Ok(self.store.list(query).await?)
    }

    pub async fn list_low_stock(&self, filter: &LowStockFilter) -> Result<Vec<InventoryView>, LedgerError> {
        Ok(self.store.list_low_stock(filter).await?)
    }

    pub async fn movement_history(&self, id: InventoryId) -> Result<Vec<InventoryMovement>, LedgerError> {
        // Distinguish "no movements yet" from "no such record".
        self.get_record(id).await?;
        Ok(self.store.movements(id).await?)
    }

    #[instrument(skip(self), fields(inventory_id = %id), err)]
    pub async fn reconcile(&self, id: InventoryId) -> Result<Reconciliation, LedgerError> {
        let view = self.get_record(id).await?;
        let movements = self.store.movements(id).await?;
        let total = ledger_total(&movements);
        let quantity = view.record.quantity();

        let report = Reconciliation {
            inventory_id: id,
            quantity,
            ledger_total: total,
            movement_count: movements.len(),
            consistent: total == quantity,
        };
        if !report.consistent {
            tracing::warn!(%quantity, ledger_total = %total, "inventory record disagrees with its movement log");
        }
        Ok(report)
    }

    async fn execute(&self, command: StockCommand) -> Result<StockChange, LedgerError> {
        let name = command.name();
        let change = self.store.apply(command, self.policy).await?;
        info!(
            command = name,
            quantity = %change.record.quantity(),
            reserved_qty = %change.record.reserved_qty(),
            available_qty = %change.record.available_qty(),
            "stock command committed"
        );
        Ok(change)
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(field: &'static str, value: String) -> Result<String, LedgerError> {
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(LedgerError::InvalidArgument(format!("{field} is required")));
    }
    Ok(value)
}
