use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockbook_core::{DomainError, InventoryId, ProductId, SiteId, TransferId};
use stockbook_inventory::{
    InventoryMovement, InventoryQuery, InventoryRecord, InventoryView, LowStockFilter, ProductRef,
    SiteRef, StockChange, StockCommand, StockPolicy, StockThresholds, TransferStock,
};

use super::{InventoryStore, OpenRecord, OpenedRecord, StoreError, TransferOutcome};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, ProductRef>,
    sites: HashMap<SiteId, SiteRef>,
    records: HashMap<InventoryId, InventoryRecord>,
    by_pair: HashMap<(ProductId, SiteId), InventoryId>,
    movements: HashMap<InventoryId, Vec<InventoryMovement>>,
}

impl State {
    fn view(&self, record: &InventoryRecord) -> Option<InventoryView> {
        Some(InventoryView {
            record: record.clone(),
            product: self.products.get(&record.product_id())?.clone(),
            site: self.sites.get(&record.site_id())?.clone(),
        })
    }

    fn views(&self) -> Vec<InventoryView> {
        self.records.values().filter_map(|r| self.view(r)).collect()
    }

    fn record(&self, id: InventoryId) -> Result<&InventoryRecord, DomainError> {
        self.records
            .get(&id)
            .ok_or(DomainError::not_found("inventory record"))
    }

    fn commit(&mut self, change: &StockChange) {
        let id = change.record.id_typed();
        self.by_pair
            .insert((change.record.product_id(), change.record.site_id()), id);
        self.records.insert(id, change.record.clone());
        if let Some(movement) = &change.movement {
            self.movements.entry(id).or_default().push(movement.clone());
        }
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. One write lock covers decide + record write +
/// movement append, so concurrent writers to the same record serialize.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    state: RwLock<State>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn view_of(state: &State, id: InventoryId) -> Result<InventoryView, StoreError> {
        let record = state.record(id)?;
        state
            .view(record)
            .ok_or_else(|| StoreError::Backend(format!("catalog refs missing for inventory record {id}")))
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn upsert_product(&self, product: ProductRef) -> Result<ProductRef, StoreError> {
        let mut state = self.write()?;
        if state
            .products
            .values()
            .any(|p| p.sku == product.sku && p.id != product.id)
        {
            return Err(StoreError::Conflict(format!("sku '{}' already in use", product.sku)));
        }
        state.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn upsert_site(&self, site: SiteRef) -> Result<SiteRef, StoreError> {
        let mut state = self.write()?;
        if state
            .sites
            .values()
            .any(|s| s.code == site.code && s.id != site.id)
        {
            return Err(StoreError::Conflict(format!("site code '{}' already in use", site.code)));
        }
        state.sites.insert(site.id, site.clone());
        Ok(site)
    }

    async fn open_record(&self, request: OpenRecord) -> Result<OpenedRecord, StoreError> {
        let mut state = self.write()?;
        if !state.products.contains_key(&request.product_id) {
            return Err(DomainError::not_found("product").into());
        }
        if !state.sites.contains_key(&request.site_id) {
            return Err(DomainError::not_found("site").into());
        }

        if let Some(id) = state.by_pair.get(&(request.product_id, request.site_id)).copied() {
            return Ok(OpenedRecord {
                view: Self::view_of(&state, id)?,
                created: false,
            });
        }

        let record = InventoryRecord::open(
            InventoryId::new(),
            request.product_id,
            request.site_id,
            request.thresholds,
            request.opened_at,
        )?;
        let id = record.id_typed();
        state.commit(&StockChange {
            record,
            movement: None,
        });

        Ok(OpenedRecord {
            view: Self::view_of(&state, id)?,
            created: true,
        })
    }

    async fn update_thresholds(
        &self,
        id: InventoryId,
        thresholds: StockThresholds,
        now: DateTime<Utc>,
    ) -> Result<InventoryView, StoreError> {
        let mut state = self.write()?;
        let record = state.record(id)?.with_thresholds(thresholds, now)?;
        state.commit(&StockChange {
            record,
            movement: None,
        });
        Self::view_of(&state, id)
    }

    async fn get(&self, id: InventoryId) -> Result<Option<InventoryView>, StoreError> {
        let state = self.read()?;
        Ok(state.records.get(&id).and_then(|r| state.view(r)))
    }

    async fn apply(&self, command: StockCommand, policy: StockPolicy) -> Result<StockChange, StoreError> {
        let mut state = self.write()?;
        let change = state.record(command.inventory_id())?.handle(&command, policy)?;
        state.commit(&change);
        Ok(change)
    }

    async fn transfer(&self, command: TransferStock, policy: StockPolicy) -> Result<TransferOutcome, StoreError> {
        command.validate()?;
        let mut state = self.write()?;

        let source_id = state
            .by_pair
            .get(&(command.product_id, command.from_site))
            .copied()
            .ok_or(DomainError::not_found("source inventory record"))?;
        if !state.sites.contains_key(&command.to_site) {
            return Err(DomainError::not_found("site").into());
        }

        let source = state.record(source_id)?.clone();
        let destination = match state.by_pair.get(&(command.product_id, command.to_site)) {
            Some(id) => state.record(*id)?.clone(),
            None => InventoryRecord::open(
                InventoryId::new(),
                command.product_id,
                command.to_site,
                StockThresholds::default(),
                command.occurred_at,
            )?,
        };

        // Decide both legs before writing either.
        let reference_id = TransferId::new();
        let out = source.handle(
            &StockCommand::Adjust(command.outbound_leg(source.id_typed(), reference_id)),
            policy,
        )?;
        let inn = destination.handle(
            &StockCommand::Adjust(command.inbound_leg(destination.id_typed(), reference_id)),
            policy,
        )?;

        state.commit(&out);
        state.commit(&inn);

        let (Some(outbound), Some(inbound)) = (out.movement, inn.movement) else {
            return Err(StoreError::Backend("transfer leg produced no movement".to_string()));
        };
        Ok(TransferOutcome {
            reference_id,
            source: out.record,
            destination: inn.record,
            outbound,
            inbound,
        })
    }

    async fn list(&self, query: &InventoryQuery) -> Result<Vec<InventoryView>, StoreError> {
        let state = self.read()?;
        Ok(query.select(state.views()))
    }

    async fn list_low_stock(&self, filter: &LowStockFilter) -> Result<Vec<InventoryView>, StoreError> {
        let state = self.read()?;
        Ok(filter.select(state.views()))
    }

    async fn movements(&self, id: InventoryId) -> Result<Vec<InventoryMovement>, StoreError> {
        let state = self.read()?;
        Ok(state.movements.get(&id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use stockbook_core::UserId;
    use stockbook_inventory::{AdjustStock, MovementType, ReserveStock, ledger_total};

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::from(n)
    }

    async fn seeded() -> (InMemoryInventoryStore, ProductRef, SiteRef, SiteRef) {
        let store = InMemoryInventoryStore::new();
        let product = store
            .upsert_product(ProductRef {
                id: ProductId::new(),
                sku: "SKU-1".to_string(),
                name: "Widget".to_string(),
                unit: "pcs".to_string(),
            })
            .await
            .unwrap();
        let main = store
            .upsert_site(SiteRef {
                id: SiteId::new(),
                code: "MAIN".to_string(),
                name: "Main".to_string(),
            })
            .await
            .unwrap();
        let annex = store
            .upsert_site(SiteRef {
                id: SiteId::new(),
                code: "ANNEX".to_string(),
                name: "Annex".to_string(),
            })
            .await
            .unwrap();
        (store, product, main, annex)
    }

    async fn open(store: &InMemoryInventoryStore, product: &ProductRef, site: &SiteRef) -> InventoryId {
        store
            .open_record(OpenRecord {
                product_id: product.id,
                site_id: site.id,
                thresholds: StockThresholds::default(),
                opened_at: Utc::now(),
            })
            .await
            .unwrap()
            .view
            .record
            .id_typed()
    }

    fn adjust(id: InventoryId, change: i64, movement_type: MovementType) -> StockCommand {
        StockCommand::Adjust(AdjustStock {
            inventory_id: id,
            quantity_change: dec(change),
            movement_type,
            reason: None,
            notes: None,
            reference_id: None,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn open_record_is_an_upsert() {
        let (store, product, main, _) = seeded().await;
        let first = open(&store, &product, &main).await;

        let again = store
            .open_record(OpenRecord {
                product_id: product.id,
                site_id: main.id,
                thresholds: StockThresholds::default(),
                opened_at: Utc::now(),
            })
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.view.record.id_typed(), first);
    }

    #[tokio::test]
    async fn open_record_requires_catalog_entries() {
        let (store, product, _, _) = seeded().await;
        let err = store
            .open_record(OpenRecord {
                product_id: product.id,
                site_id: SiteId::new(),
                thresholds: StockThresholds::default(),
                opened_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::NotFound("site"))));
    }

    #[tokio::test]
    async fn failed_command_leaves_no_trace() {
        let (store, product, main, _) = seeded().await;
        let id = open(&store, &product, &main).await;

        let err = store
            .apply(adjust(id, -1, MovementType::StockOut), StockPolicy::Strict)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::InvariantViolation(_))));
        assert!(store.movements(id).await.unwrap().is_empty());
        assert_eq!(store.get(id).await.unwrap().unwrap().record.quantity(), Decimal::ZERO);

        let missing = store
            .apply(adjust(InventoryId::new(), 1, MovementType::StockIn), StockPolicy::Strict)
            .await
            .unwrap_err();
        assert!(matches!(missing, StoreError::Domain(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn oversized_quantities_are_rejected_and_store_stays_usable() {
        let (store, product, main, _) = seeded().await;
        let id = open(&store, &product, &main).await;
        store
            .apply(adjust(id, 10, MovementType::StockIn), StockPolicy::AllowNegative)
            .await
            .unwrap();

        let huge_in = StockCommand::Adjust(AdjustStock {
            inventory_id: id,
            quantity_change: Decimal::MAX,
            movement_type: MovementType::StockIn,
            reason: None,
            notes: None,
            reference_id: None,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        });
        let huge_reserve = StockCommand::Reserve(ReserveStock {
            inventory_id: id,
            quantity: Decimal::MAX,
            actor: UserId::new(),
            occurred_at: Utc::now(),
        });
        for command in [huge_in, huge_reserve] {
            let err = store.apply(command, StockPolicy::AllowNegative).await.unwrap_err();
            assert!(matches!(err, StoreError::Domain(DomainError::Validation(_))));
        }

        store
            .apply(
                StockCommand::Reserve(ReserveStock {
                    inventory_id: id,
                    quantity: dec(1),
                    actor: UserId::new(),
                    occurred_at: Utc::now(),
                }),
                StockPolicy::AllowNegative,
            )
            .await
            .unwrap();
        let record = store.get(id).await.unwrap().unwrap().record;
        assert_eq!(record.quantity(), dec(10));
        assert_eq!(record.reserved_qty(), dec(1));
        assert_eq!(store.movements(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sku_clash_is_a_conflict() {
        let (store, _, _, _) = seeded().await;
        let err = store
            .upsert_product(ProductRef {
                id: ProductId::new(),
                sku: "SKU-1".to_string(),
                name: "Imposter".to_string(),
                unit: "pcs".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_adjustments_do_not_lose_updates() {
        let (store, product, main, _) = seeded().await;
        let store = Arc::new(store);
        let id = open(&store, &product, &main).await;
        store
            .apply(adjust(id, 50, MovementType::StockIn), StockPolicy::Strict)
            .await
            .unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.apply(adjust(id, 5, MovementType::StockIn), StockPolicy::Strict).await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.apply(adjust(id, -3, MovementType::StockOut), StockPolicy::Strict).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let record = store.get(id).await.unwrap().unwrap().record;
        assert_eq!(record.quantity(), dec(52));
        let movements = store.movements(id).await.unwrap();
        assert_eq!(movements.len(), 3);
        assert_eq!(ledger_total(&movements), record.quantity());
    }

    #[tokio::test]
    async fn transfer_moves_stock_and_opens_destination() {
        let (store, product, main, annex) = seeded().await;
        let source = open(&store, &product, &main).await;
        store
            .apply(adjust(source, 40, MovementType::StockIn), StockPolicy::Strict)
            .await
            .unwrap();

        let outcome = store
            .transfer(
                TransferStock {
                    product_id: product.id,
                    from_site: main.id,
                    to_site: annex.id,
                    quantity: dec(15),
                    reason: Some("rebalance".to_string()),
                    notes: None,
                    actor: UserId::new(),
                    occurred_at: Utc::now(),
                },
                StockPolicy::Strict,
            )
            .await
            .unwrap();

        assert_eq!(outcome.source.quantity(), dec(25));
        assert_eq!(outcome.destination.quantity(), dec(15));
        assert_eq!(outcome.destination.site_id(), annex.id);
        assert_eq!(outcome.outbound.movement_type, MovementType::TransferOut);
        assert_eq!(outcome.inbound.movement_type, MovementType::TransferIn);
        assert_eq!(outcome.outbound.reference_id, Some(outcome.reference_id));
        assert_eq!(outcome.inbound.reference_id, Some(outcome.reference_id));

        let dest_movements = store.movements(outcome.destination.id_typed()).await.unwrap();
        assert_eq!(ledger_total(&dest_movements), dec(15));
    }

    #[tokio::test]
    async fn failed_transfer_writes_neither_leg() {
        let (store, product, main, annex) = seeded().await;
        let source = open(&store, &product, &main).await;
        store
            .apply(adjust(source, 10, MovementType::StockIn), StockPolicy::Strict)
            .await
            .unwrap();
        store
            .apply(
                StockCommand::Reserve(ReserveStock {
                    inventory_id: source,
                    quantity: dec(8),
                    actor: UserId::new(),
                    occurred_at: Utc::now(),
                }),
                StockPolicy::Strict,
            )
            .await
            .unwrap();

        let err = store
            .transfer(
                TransferStock {
                    product_id: product.id,
                    from_site: main.id,
                    to_site: annex.id,
                    quantity: dec(5),
                    reason: None,
                    notes: None,
                    actor: UserId::new(),
                    occurred_at: Utc::now(),
                },
                StockPolicy::Strict,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Domain(DomainError::InvariantViolation(_))));

        assert_eq!(store.movements(source).await.unwrap().len(), 1);
        let all = store.list(&InventoryQuery::default()).await.unwrap();
        assert_eq!(all.len(), 1, "destination must not be opened by a failed transfer");
    }
}
