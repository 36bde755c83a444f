use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, DomainResult, InventoryId, ProductId, SiteId, TransferId, UserId};

use crate::movement::{InventoryMovement, MovementType};
use crate::record::InventoryRecord;

/// How the ledger treats changes that would leave stock negative or below
/// what is reserved.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockPolicy {
    /// `quantity >= 0` and `reserved_qty <= quantity` after every write.
    #[default]
    Strict,
    /// Backorder mode: on-hand and available may go negative.
    AllowNegative,
}

impl StockPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockPolicy::Strict => "strict",
            StockPolicy::AllowNegative => "allow_negative",
        }
    }

    pub(crate) fn check_on_hand(self, quantity: Decimal, reserved: Decimal) -> DomainResult<()> {
        if self == StockPolicy::AllowNegative {
            return Ok(());
        }
        if quantity.is_sign_negative() && !quantity.is_zero() {
            return Err(DomainError::invariant(format!(
                "insufficient stock: on-hand quantity would drop to {quantity}"
            )));
        }
        if quantity < reserved {
            return Err(DomainError::invariant(format!(
                "insufficient stock: {reserved} reserved but only {quantity} would remain on hand"
            )));
        }
        Ok(())
    }
}

impl FromStr for StockPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(StockPolicy::Strict),
            "allow_negative" | "allow-negative" | "backorder" => Ok(StockPolicy::AllowNegative),
            other => Err(DomainError::validation(format!("unknown stock policy '{other}'"))),
        }
    }
}

/// Command: AdjustStock (signed change to on-hand quantity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub inventory_id: InventoryId,
    pub quantity_change: Decimal,
    pub movement_type: MovementType,
    pub reason: Option<String>,
    pub notes: Option<String>,
    /// Set only on transfer legs.
    pub reference_id: Option<TransferId>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock (earmark on-hand stock for an unfulfilled order).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub inventory_id: InventoryId,
    pub quantity: Decimal,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock (return a reservation to available stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub inventory_id: InventoryId,
    pub quantity: Decimal,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecountStock (set on-hand quantity to a physically counted value).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecountStock {
    pub inventory_id: InventoryId,
    pub counted_quantity: Decimal,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockCommand {
    Adjust(AdjustStock),
    Reserve(ReserveStock),
    Release(ReleaseStock),
    Recount(RecountStock),
}

impl StockCommand {
    pub fn inventory_id(&self) -> InventoryId {
        match self {
            StockCommand::Adjust(c) => c.inventory_id,
            StockCommand::Reserve(c) => c.inventory_id,
            StockCommand::Release(c) => c.inventory_id,
            StockCommand::Recount(c) => c.inventory_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StockCommand::Adjust(_) => "adjust",
            StockCommand::Reserve(_) => "reserve",
            StockCommand::Release(_) => "release",
            StockCommand::Recount(_) => "recount",
        }
    }
}

/// Command: TransferStock (move stock of one product between two sites).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub product_id: ProductId,
    pub from_site: SiteId,
    pub to_site: SiteId,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl TransferStock {
    pub fn validate(&self) -> DomainResult<()> {
        if self.from_site == self.to_site {
            return Err(DomainError::validation("transfer source and destination sites must differ"));
        }
        if !is_positive(self.quantity) {
            return Err(DomainError::validation("transfer quantity must be positive"));
        }
        check_quantity("transfer quantity", self.quantity)
    }

    /// The outbound leg, applied to the source record.
    pub fn outbound_leg(&self, source: InventoryId, reference: TransferId) -> AdjustStock {
        self.leg(source, -self.quantity, MovementType::TransferOut, reference)
    }

    /// The inbound leg, applied to the destination record.
    pub fn inbound_leg(&self, destination: InventoryId, reference: TransferId) -> AdjustStock {
        self.leg(destination, self.quantity, MovementType::TransferIn, reference)
    }

    fn leg(
        &self,
        inventory_id: InventoryId,
        quantity_change: Decimal,
        movement_type: MovementType,
        reference: TransferId,
    ) -> AdjustStock {
        AdjustStock {
            inventory_id,
            quantity_change,
            movement_type,
            reason: self.reason.clone(),
            notes: self.notes.clone(),
            reference_id: Some(reference),
            actor: self.actor,
            occurred_at: self.occurred_at,
        }
    }
}

/// Outcome of a stock command: the next record state and, when on-hand
/// quantity changed, the movement to append alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub record: InventoryRecord,
    pub movement: Option<InventoryMovement>,
}

pub(crate) fn is_positive(q: Decimal) -> bool {
    q.is_sign_positive() && !q.is_zero()
}

/// Decimal places kept by the persisted quantity columns.
pub(crate) const QUANTITY_SCALE: u32 = 4;

/// Integer digits kept by the persisted quantity columns (`NUMERIC(18, 4)`).
const QUANTITY_INTEGER_DIGITS: u32 = 14;

/// Reject a quantity the ledger could not store exactly: more than
/// [`QUANTITY_SCALE`] decimal places, or a magnitude of `10^14` or more.
pub(crate) fn check_quantity(field: &str, q: Decimal) -> DomainResult<()> {
    if q.normalize().scale() > QUANTITY_SCALE {
        return Err(DomainError::validation(format!(
            "{field} allows at most {QUANTITY_SCALE} decimal places"
        )));
    }
    let limit = Decimal::from(10_i64.pow(QUANTITY_INTEGER_DIGITS));
    if q.abs() >= limit {
        return Err(DomainError::validation(format!("{field} is out of range")));
    }
    Ok(())
}
