use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{AggregateRoot, DomainError, DomainResult, InventoryId, MovementId, ProductId, SiteId};

use crate::command::{
    AdjustStock, RecountStock, ReleaseStock, ReserveStock, StockChange, StockCommand, StockPolicy,
    check_quantity, is_positive,
};
use crate::movement::{InventoryMovement, MovementType};
use crate::stock_level::{self, StockStatus};

/// Alerting thresholds for one record. Never enforced on writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub min_stock_level: Option<Decimal>,
    pub max_stock_level: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
}

impl StockThresholds {
    pub fn validate(&self) -> DomainResult<()> {
        let fields = [
            ("min_stock_level", self.min_stock_level),
            ("max_stock_level", self.max_stock_level),
            ("reorder_point", self.reorder_point),
        ];
        for (name, value) in fields {
            if let Some(v) = value {
                if v.is_sign_negative() && !v.is_zero() {
                    return Err(DomainError::validation(format!("{name} cannot be negative")));
                }
                check_quantity(name, v)?;
            }
        }
        if let (Some(min), Some(max)) = (self.min_stock_level, self.max_stock_level) {
            if min > max {
                return Err(DomainError::validation(
                    "min_stock_level cannot exceed max_stock_level",
                ));
            }
        }
        Ok(())
    }
}

/// Persisted columns of a record, used by stores to rebuild it.
///
/// `available_qty` is deliberately absent: it is always recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordParts {
    pub id: InventoryId,
    pub product_id: ProductId,
    pub site_id: SiteId,
    pub quantity: Decimal,
    pub reserved_qty: Decimal,
    pub thresholds: StockThresholds,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate root: stock levels of one product at one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventoryRecord {
    id: InventoryId,
    product_id: ProductId,
    site_id: SiteId,
    quantity: Decimal,
    reserved_qty: Decimal,
    available_qty: Decimal,
    #[serde(flatten)]
    thresholds: StockThresholds,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// First stocking of a product at a site: everything starts at zero.
    pub fn open(
        id: InventoryId,
        product_id: ProductId,
        site_id: SiteId,
        thresholds: StockThresholds,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        thresholds.validate()?;
        Ok(Self {
            id,
            product_id,
            site_id,
            quantity: Decimal::ZERO,
            reserved_qty: Decimal::ZERO,
            available_qty: Decimal::ZERO,
            thresholds,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn restore(parts: RecordParts) -> Self {
        Self {
            id: parts.id,
            product_id: parts.product_id,
            site_id: parts.site_id,
            quantity: parts.quantity,
            reserved_qty: parts.reserved_qty,
            available_qty: parts.quantity - parts.reserved_qty,
            thresholds: parts.thresholds,
            version: parts.version,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        }
    }

    pub fn id_typed(&self) -> InventoryId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn reserved_qty(&self) -> Decimal {
        self.reserved_qty
    }

    pub fn available_qty(&self) -> Decimal {
        self.available_qty
    }

    pub fn thresholds(&self) -> &StockThresholds {
        &self.thresholds
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn status(&self) -> StockStatus {
        stock_level::classify(self.available_qty, self.thresholds.min_stock_level)
    }

    pub fn needs_reorder(&self) -> bool {
        self.thresholds
            .reorder_point
            .is_some_and(|point| self.available_qty <= point)
    }

    pub fn is_overstocked(&self) -> bool {
        self.thresholds
            .max_stock_level
            .is_some_and(|max| self.quantity > max)
    }

    /// Replace the alerting thresholds. Quantities are untouched.
    pub fn with_thresholds(&self, thresholds: StockThresholds, now: DateTime<Utc>) -> DomainResult<Self> {
        thresholds.validate()?;
        let mut next = self.with_levels(self.quantity, self.reserved_qty, now)?;
        next.thresholds = thresholds;
        Ok(next)
    }

    /// Decide the next state for a stock command.
    ///
    /// Pure: the current record is not mutated. Stores persist the returned
    /// record and movement together.
    pub fn handle(&self, command: &StockCommand, policy: StockPolicy) -> DomainResult<StockChange> {
        if command.inventory_id() != self.id {
            return Err(DomainError::invariant("inventory_id mismatch"));
        }
        match command {
            StockCommand::Adjust(cmd) => self.handle_adjust(cmd, policy),
            StockCommand::Reserve(cmd) => self.handle_reserve(cmd, policy),
            StockCommand::Release(cmd) => self.handle_release(cmd),
            StockCommand::Recount(cmd) => self.handle_recount(cmd, policy),
        }
    }

    fn handle_adjust(&self, cmd: &AdjustStock, policy: StockPolicy) -> DomainResult<StockChange> {
        if cmd.quantity_change.is_zero() {
            return Err(DomainError::validation("quantity change cannot be zero"));
        }
        check_quantity("quantity change", cmd.quantity_change)?;
        cmd.movement_type.check_change(cmd.quantity_change)?;

        let quantity = self
            .quantity
            .checked_add(cmd.quantity_change)
            .ok_or_else(|| DomainError::validation("quantity change is out of range"))?;
        policy.check_on_hand(quantity, self.reserved_qty)?;

        let record = self.with_levels(quantity, self.reserved_qty, cmd.occurred_at)?;
        let movement = InventoryMovement {
            id: MovementId::new(),
            inventory_id: self.id,
            movement_type: cmd.movement_type,
            quantity_change: cmd.quantity_change,
            quantity_after: quantity,
            reason: cmd.reason.clone(),
            notes: cmd.notes.clone(),
            reference_id: cmd.reference_id,
            created_at: cmd.occurred_at,
            created_by: cmd.actor,
        };

        Ok(StockChange {
            record,
            movement: Some(movement),
        })
    }

    fn handle_recount(&self, cmd: &RecountStock, policy: StockPolicy) -> DomainResult<StockChange> {
        if cmd.counted_quantity.is_sign_negative() && !cmd.counted_quantity.is_zero() {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }
        check_quantity("counted quantity", cmd.counted_quantity)?;
        let change = cmd
            .counted_quantity
            .checked_sub(self.quantity)
            .ok_or_else(|| DomainError::validation("counted quantity is out of range"))?;
        if change.is_zero() {
            return Err(DomainError::validation(
                "counted quantity equals on-hand quantity; nothing to adjust",
            ));
        }
        self.handle_adjust(
            &AdjustStock {
                inventory_id: cmd.inventory_id,
                quantity_change: change,
                movement_type: MovementType::Recount,
                reason: cmd.reason.clone(),
                notes: cmd.notes.clone(),
                reference_id: None,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
            policy,
        )
    }

    fn handle_reserve(&self, cmd: &ReserveStock, policy: StockPolicy) -> DomainResult<StockChange> {
        if !is_positive(cmd.quantity) {
            return Err(DomainError::validation("reserve quantity must be positive"));
        }
        check_quantity("reserve quantity", cmd.quantity)?;
        let reserved = self
            .reserved_qty
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("reserve quantity is out of range"))?;
        if policy == StockPolicy::Strict && reserved > self.quantity {
            return Err(DomainError::invariant(format!(
                "cannot reserve {}: only {} available",
                cmd.quantity, self.available_qty
            )));
        }
        Ok(StockChange {
            record: self.with_levels(self.quantity, reserved, cmd.occurred_at)?,
            movement: None,
        })
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> DomainResult<StockChange> {
        if !is_positive(cmd.quantity) {
            return Err(DomainError::validation("release quantity must be positive"));
        }
        check_quantity("release quantity", cmd.quantity)?;
        if cmd.quantity > self.reserved_qty {
            return Err(DomainError::invariant(format!(
                "cannot release {}: only {} reserved",
                cmd.quantity, self.reserved_qty
            )));
        }
        let reserved = self
            .reserved_qty
            .checked_sub(cmd.quantity)
            .ok_or_else(|| DomainError::validation("release quantity is out of range"))?;
        Ok(StockChange {
            record: self.with_levels(self.quantity, reserved, cmd.occurred_at)?,
            movement: None,
        })
    }

    // The one place `available_qty` is derived on a write. Every level must
    // stay storable, backorders included.
    fn with_levels(&self, quantity: Decimal, reserved_qty: Decimal, now: DateTime<Utc>) -> DomainResult<Self> {
        let available_qty = quantity
            .checked_sub(reserved_qty)
            .ok_or_else(|| DomainError::validation("available quantity is out of range"))?;
        check_quantity("on-hand quantity", quantity)?;
        check_quantity("reserved quantity", reserved_qty)?;
        check_quantity("available quantity", available_qty)?;
        Ok(Self {
            quantity,
            reserved_qty,
            available_qty,
            version: self.version + 1,
            updated_at: now,
            thresholds: self.thresholds.clone(),
            ..*self
        })
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = InventoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
