//! Low-stock classification and the read-side filters over ledger rows.
//!
//! Stores that push filtering into SQL must agree with these predicates; the
//! in-memory store uses them directly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockbook_core::SiteId;

use crate::catalog::InventoryView;

/// `available <= min * CRITICAL_RATIO` is critical.
pub const CRITICAL_RATIO: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Ok,
    Low,
    Critical,
}

/// Classify available stock against an optional minimum level (inclusive).
pub fn classify(available: Decimal, min_stock_level: Option<Decimal>) -> StockStatus {
    match min_stock_level {
        Some(min) if available <= min * CRITICAL_RATIO => StockStatus::Critical,
        Some(min) if available <= min => StockStatus::Low,
        _ => StockStatus::Ok,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LowStockFilter {
    pub site_id: Option<SiteId>,
    pub critical_only: bool,
}

impl LowStockFilter {
    pub fn matches(&self, view: &InventoryView) -> bool {
        if self.site_id.is_some_and(|s| s != view.record.site_id()) {
            return false;
        }
        match view.record.status() {
            StockStatus::Critical => true,
            StockStatus::Low => !self.critical_only,
            StockStatus::Ok => false,
        }
    }

    /// Filter and order: available ascending, then product name ascending.
    pub fn select(&self, views: impl IntoIterator<Item = InventoryView>) -> Vec<InventoryView> {
        let mut out: Vec<_> = views.into_iter().filter(|v| self.matches(v)).collect();
        out.sort_by(|a, b| {
            a.record
                .available_qty()
                .cmp(&b.record.available_qty())
                .then_with(|| a.product.name.cmp(&b.product.name))
        });
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryQuery {
    pub site_id: Option<SiteId>,
    pub low_stock: bool,
    /// Case-insensitive substring of product name or SKU.
    pub search: Option<String>,
}

impl InventoryQuery {
    pub fn matches(&self, view: &InventoryView) -> bool {
        if self.site_id.is_some_and(|s| s != view.record.site_id()) {
            return false;
        }
        if self.low_stock && view.record.status() == StockStatus::Ok {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                view.product.name.to_lowercase().contains(&needle)
                    || view.product.sku.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }

    /// Filter and order: product name, then site name.
    pub fn select(&self, views: impl IntoIterator<Item = InventoryView>) -> Vec<InventoryView> {
        let mut out: Vec<_> = views.into_iter().filter(|v| self.matches(v)).collect();
        out.sort_by(|a, b| {
            a.product
                .name
                .cmp(&b.product.name)
                .then_with(|| a.site.name.cmp(&b.site.name))
        });
        out
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use stockbook_core::{InventoryId, ProductId, UserId};

    use super::*;
    use crate::catalog::{ProductRef, SiteRef};
    use crate::command::{AdjustStock, StockCommand, StockPolicy};
    use crate::movement::MovementType;
    use crate::record::{InventoryRecord, StockThresholds};

    fn view(name: &str, site: SiteId, available: i64, min: Option<i64>) -> InventoryView {
        let product = ProductRef {
            id: ProductId::new(),
            sku: format!("SKU-{}", name.to_uppercase()),
            name: name.to_string(),
            unit: "pcs".to_string(),
        };
        let thresholds = StockThresholds {
            min_stock_level: min.map(Decimal::from),
            ..StockThresholds::default()
        };
        let mut record =
            InventoryRecord::open(InventoryId::new(), product.id, site, thresholds, Utc::now()).unwrap();
        if available != 0 {
            let cmd = StockCommand::Adjust(AdjustStock {
                inventory_id: record.id_typed(),
                quantity_change: Decimal::from(available),
                movement_type: MovementType::StockIn,
                reason: None,
                notes: None,
                reference_id: None,
                actor: UserId::new(),
                occurred_at: Utc::now(),
            });
            record = record.handle(&cmd, StockPolicy::Strict).unwrap().record;
        }
        InventoryView {
            record,
            product,
            site: SiteRef {
                id: site,
                code: "MAIN".to_string(),
                name: "Main".to_string(),
            },
        }
    }

    #[test]
    fn classification_boundaries_are_inclusive() {
        let min = Some(Decimal::from(10));
        assert_eq!(classify(Decimal::from(11), min), StockStatus::Ok);
        assert_eq!(classify(Decimal::from(10), min), StockStatus::Low);
        assert_eq!(classify(Decimal::from(6), min), StockStatus::Low);
        assert_eq!(classify(Decimal::from(5), min), StockStatus::Critical);
        assert_eq!(classify(Decimal::ZERO, None), StockStatus::Ok);
    }

    #[test]
    fn low_stock_includes_boundary_and_excludes_above() {
        let site = SiteId::new();
        let views = vec![view("at-min", site, 10, Some(10)), view("above", site, 11, Some(10))];
        let low = LowStockFilter::default().select(views);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].product.name, "at-min");
    }

    #[test]
    fn low_stock_orders_by_available_then_name_and_scopes_site() {
        let site = SiteId::new();
        let other = SiteId::new();
        let views = vec![
            view("bolts", site, 4, Some(10)),
            view("anchors", site, 4, Some(10)),
            view("clips", site, 1, Some(10)),
            view("no-threshold", site, 0, None),
            view("elsewhere", other, 0, Some(10)),
        ];

        let low = LowStockFilter {
            site_id: Some(site),
            critical_only: false,
        }
        .select(views.clone());
        let names: Vec<_> = low.iter().map(|v| v.product.name.as_str()).collect();
        assert_eq!(names, vec!["clips", "anchors", "bolts"]);

        let all_sites = LowStockFilter::default().select(views);
        assert_eq!(all_sites.first().map(|v| v.product.name.as_str()), Some("elsewhere"));
    }

    #[test]
    fn critical_filter_uses_half_the_minimum() {
        let site = SiteId::new();
        let views = vec![view("half", site, 5, Some(10)), view("low", site, 6, Some(10))];
        let critical = LowStockFilter {
            site_id: None,
            critical_only: true,
        }
        .select(views);
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].product.name, "half");
    }

    #[test]
    fn query_search_matches_name_or_sku_case_insensitively() {
        let site = SiteId::new();
        let views = vec![view("Widget", site, 3, None), view("Gadget", site, 3, None)];

        let q = InventoryQuery {
            search: Some("widg".to_string()),
            ..InventoryQuery::default()
        };
        assert_eq!(q.select(views.clone()).len(), 1);

        let by_sku = InventoryQuery {
            search: Some("sku-gadget".to_string()),
            ..InventoryQuery::default()
        };
        let hits = by_sku.select(views.clone());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].product.name, "Gadget");

        let sorted = InventoryQuery::default().select(views);
        assert_eq!(sorted[0].product.name, "Gadget");
    }
}
