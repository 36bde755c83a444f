//! Product and site metadata joined onto ledger rows for display.

use serde::{Deserialize, Serialize};

use stockbook_core::{ProductId, SiteId};

use crate::record::InventoryRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    /// Base unit of measure quantities are expressed in.
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRef {
    pub id: SiteId,
    pub code: String,
    pub name: String,
}

/// A ledger row joined with its product and site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryView {
    pub record: InventoryRecord,
    pub product: ProductRef,
    pub site: SiteRef,
}
