use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value, json};

use stockbook_core::{AggregateRoot, ProductId, SiteId};
use stockbook_infra::ledger::MovementNote;
use stockbook_infra::store::TransferOutcome;
use stockbook_inventory::{InventoryView, StockThresholds};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct OpenRecordRequest {
    pub product_id: ProductId,
    pub site_id: SiteId,
    #[serde(flatten)]
    pub thresholds: ThresholdsRequest,
}

#[derive(Debug, Default, Deserialize)]
pub struct ThresholdsRequest {
    pub min_stock_level: Option<Decimal>,
    pub max_stock_level: Option<Decimal>,
    pub reorder_point: Option<Decimal>,
}

impl From<ThresholdsRequest> for StockThresholds {
    fn from(value: ThresholdsRequest) -> Self {
        StockThresholds {
            min_stock_level: value.min_stock_level,
            max_stock_level: value.max_stock_level,
            reorder_point: value.reorder_point,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub quantity_change: Decimal,
    /// Parsed by the handler so unknown types answer `invalid_argument`.
    pub movement_type: String,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RecountRequest {
    pub counted_quantity: Decimal,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub product_id: ProductId,
    pub from_site_id: SiteId,
    pub to_site_id: SiteId,
    pub quantity: Decimal,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Deserialize)]
pub struct UpsertSiteRequest {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct InventoryListParams {
    pub site_id: Option<String>,
    #[serde(default)]
    pub low_stock: bool,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LowStockParams {
    pub site_id: Option<String>,
    #[serde(default)]
    pub critical: bool,
}

pub fn note(reason: Option<String>, notes: Option<String>) -> MovementNote {
    MovementNote { reason, notes }
}

// -------------------------
// Response mapping
// -------------------------

pub fn inventory_view_to_json(view: &InventoryView) -> Value {
    let record = &view.record;
    let thresholds = record.thresholds();
    json!({
        "id": record.id_typed().to_string(),
        "product": {
            "id": view.product.id.to_string(),
            "sku": view.product.sku,
            "name": view.product.name,
            "unit": view.product.unit,
        },
        "site": {
            "id": view.site.id.to_string(),
            "code": view.site.code,
            "name": view.site.name,
        },
        "quantity": record.quantity(),
        "reserved_qty": record.reserved_qty(),
        "available_qty": record.available_qty(),
        "min_stock_level": thresholds.min_stock_level,
        "max_stock_level": thresholds.max_stock_level,
        "reorder_point": thresholds.reorder_point,
        "status": record.status(),
        "needs_reorder": record.needs_reorder(),
        "overstocked": record.is_overstocked(),
        "version": record.version(),
        "created_at": record.created_at().to_rfc3339(),
        "updated_at": record.updated_at().to_rfc3339(),
    })
}

pub fn transfer_to_json(outcome: &TransferOutcome) -> Value {
    json!({
        "reference_id": outcome.reference_id.to_string(),
        "source": {
            "id": outcome.source.id_typed().to_string(),
            "quantity": outcome.source.quantity(),
            "available_qty": outcome.source.available_qty(),
        },
        "destination": {
            "id": outcome.destination.id_typed().to_string(),
            "quantity": outcome.destination.quantity(),
            "available_qty": outcome.destination.available_qty(),
        },
        "movements": [outcome.outbound, outcome.inbound],
    })
}
