use core::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::{DomainError, InventoryId, MovementId, TransferId, UserId};

/// Typed cause of a stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    StockIn,
    StockOut,
    Adjustment,
    Damage,
    ReturnIn,
    Recount,
    TransferIn,
    TransferOut,
}

/// Sign a movement type's quantity change must have.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
    Either,
}

impl MovementType {
    pub const ALL: [MovementType; 8] = [
        MovementType::StockIn,
        MovementType::StockOut,
        MovementType::Adjustment,
        MovementType::Damage,
        MovementType::ReturnIn,
        MovementType::Recount,
        MovementType::TransferIn,
        MovementType::TransferOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::StockIn => "STOCK_IN",
            MovementType::StockOut => "STOCK_OUT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Damage => "DAMAGE",
            MovementType::ReturnIn => "RETURN_IN",
            MovementType::Recount => "RECOUNT",
            MovementType::TransferIn => "TRANSFER_IN",
            MovementType::TransferOut => "TRANSFER_OUT",
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            MovementType::StockIn | MovementType::ReturnIn | MovementType::TransferIn => {
                Direction::Inbound
            }
            MovementType::StockOut | MovementType::Damage | MovementType::TransferOut => {
                Direction::Outbound
            }
            MovementType::Adjustment | MovementType::Recount => Direction::Either,
        }
    }

    /// Reject a quantity change whose sign contradicts this movement type.
    pub fn check_change(&self, change: Decimal) -> Result<(), DomainError> {
        let ok = match self.direction() {
            Direction::Inbound => change.is_sign_positive() && !change.is_zero(),
            Direction::Outbound => change.is_sign_negative() && !change.is_zero(),
            Direction::Either => true,
        };
        if ok {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "{} requires a {} quantity change, got {change}",
                self.as_str(),
                if self.direction() == Direction::Inbound { "positive" } else { "negative" },
            )))
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| DomainError::validation(format!("unknown movement type '{s}'")))
    }
}

/// Immutable audit record of one change to on-hand quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    pub inventory_id: InventoryId,
    pub movement_type: MovementType,
    /// Signed delta applied to the record's `quantity`.
    pub quantity_change: Decimal,
    /// On-hand quantity right after this movement was applied.
    pub quantity_after: Decimal,
    pub reason: Option<String>,
    pub notes: Option<String>,
    pub reference_id: Option<TransferId>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
}

/// Replay a movement log from a zero baseline.
pub fn ledger_total<'a>(movements: impl IntoIterator<Item = &'a InventoryMovement>) -> Decimal {
    movements
        .into_iter()
        .fold(Decimal::ZERO, |acc, m| acc + m.quantity_change)
}
