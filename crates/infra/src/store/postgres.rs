//! Postgres-backed inventory ledger store.
//!
//! Every stock write runs in one transaction:
//!
//! 1. `SELECT ... FOR UPDATE` the record row(s)
//! 2. let the domain decide the next state
//! 3. `UPDATE` the record guarded by its version
//! 4. `INSERT` the movement row
//! 5. `COMMIT`
//!
//! Transfers lock both rows ordered by id so two opposite transfers cannot
//! deadlock each other.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database | `40001`, `40P01` | `Conflict` | Serialization failure / deadlock (retried) |
//! | Database | `23505` | `Conflict` | Duplicate SKU / site code |
//! | Database | `23514`, `23000` | `Domain(InvariantViolation)` | Check constraint or append-only trigger |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | PoolClosed / Other | N/A | `Backend` | Connection failures etc. |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use stockbook_core::{AggregateRoot, DomainError, InventoryId, MovementId, ProductId, SiteId, TransferId, UserId};
use stockbook_inventory::{
    InventoryMovement, InventoryQuery, InventoryRecord, InventoryView, LowStockFilter, MovementType,
    ProductRef, RecordParts, SiteRef, StockChange, StockCommand, StockPolicy, StockThresholds, TransferStock,
    stock_level::CRITICAL_RATIO,
};

use super::{InventoryStore, OpenRecord, OpenedRecord, StoreError, TransferOutcome};

const RECORD_COLUMNS: &str = r#"
    r.id, r.product_id, r.site_id, r.quantity, r.reserved_qty,
    r.min_stock_level, r.max_stock_level, r.reorder_point,
    r.version, r.created_at, r.updated_at
"#;

const VIEW_FROM: &str = r#"
    FROM inventory_records r
    JOIN products p ON p.id = r.product_id
    JOIN sites s ON s.id = r.site_id
"#;

const MOVEMENT_COLUMNS: &str = r#"
    id, inventory_id, movement_type, quantity_change, quantity_after,
    reason, notes, reference_id, created_at, created_by
"#;

/// Postgres-backed ledger store.
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: Arc<PgPool>,
    max_retries: u32,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool, max_retries: u32) -> Self {
        Self {
            pool: Arc::new(pool),
            max_retries,
        }
    }

    /// Connect a pool and apply pending migrations.
    pub async fn connect(url: &str, max_connections: u32, max_retries: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failed: {e}")))?;

        Ok(Self::new(pool, max_retries))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn with_retry<T, F, Fut>(&self, operation: &'static str, unit: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        with_retry(self.max_retries, operation, unit).await
    }

    async fn apply_once(&self, command: &StockCommand, policy: StockPolicy) -> Result<StockChange, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let record = lock_record(&mut tx, command.inventory_id())
            .await?
            .ok_or(DomainError::not_found("inventory record"))?;

        // Dropping `tx` on a rejected command rolls it back.
        let change = record.handle(command, policy)?;
        write_record(&mut tx, &change.record, record.version()).await?;
        if let Some(movement) = &change.movement {
            insert_movement(&mut tx, movement).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(change)
    }

    async fn transfer_once(&self, command: &TransferStock, policy: StockPolicy) -> Result<TransferOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let source_exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM inventory_records WHERE product_id = $1 AND site_id = $2)",
        )
        .bind(command.product_id.as_uuid())
        .bind(command.from_site.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("transfer_source", e))?;
        if !source_exists {
            return Err(DomainError::not_found("source inventory record").into());
        }
        if !site_exists(&mut tx, command.to_site).await? {
            return Err(DomainError::not_found("site").into());
        }

        // First stocking at the destination opens its record inside this transaction.
        let opened = InventoryRecord::open(
            InventoryId::new(),
            command.product_id,
            command.to_site,
            StockThresholds::default(),
            command.occurred_at,
        )?;
        insert_record_if_absent(&mut tx, &opened).await?;

        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM inventory_records r \
             WHERE r.product_id = $1 AND r.site_id IN ($2, $3) \
             ORDER BY r.id \
             FOR UPDATE"
        ))
        .bind(command.product_id.as_uuid())
        .bind(command.from_site.as_uuid())
        .bind(command.to_site.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_transfer_records", e))?;

        let mut source = None;
        let mut destination = None;
        for row in &rows {
            let record = RecordRow::from_row(row)
                .map_err(|e| StoreError::Backend(format!("failed to decode inventory row: {e}")))?
                .into_record()?;
            if record.site_id() == command.from_site {
                source = Some(record);
            } else {
                destination = Some(record);
            }
        }
        let (Some(source), Some(destination)) = (source, destination) else {
            return Err(StoreError::Conflict("transfer rows vanished while locking".to_string()));
        };

        let reference_id = TransferId::new();
        let out = source.handle(
            &StockCommand::Adjust(command.outbound_leg(source.id_typed(), reference_id)),
            policy,
        )?;
        let inn = destination.handle(
            &StockCommand::Adjust(command.inbound_leg(destination.id_typed(), reference_id)),
            policy,
        )?;
        let (Some(outbound), Some(inbound)) = (out.movement, inn.movement) else {
            return Err(StoreError::Backend("transfer leg produced no movement".to_string()));
        };

        write_record(&mut tx, &out.record, source.version()).await?;
        write_record(&mut tx, &inn.record, destination.version()).await?;
        insert_movement(&mut tx, &outbound).await?;
        insert_movement(&mut tx, &inbound).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(TransferOutcome {
            reference_id,
            source: out.record,
            destination: inn.record,
            outbound,
            inbound,
        })
    }

    async fn update_thresholds_once(
        &self,
        id: InventoryId,
        thresholds: &StockThresholds,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let record = lock_record(&mut tx, id)
            .await?
            .ok_or(DomainError::not_found("inventory record"))?;
        let next = record.with_thresholds(thresholds.clone(), now)?;
        write_record(&mut tx, &next, record.version()).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn view_by_pair(&self, product_id: ProductId, site_id: SiteId) -> Result<Option<InventoryView>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS}, {} {VIEW_FROM} WHERE r.product_id = $1 AND r.site_id = $2",
            ViewRow::EXTRA_COLUMNS
        ))
        .bind(product_id.as_uuid())
        .bind(site_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("view_by_pair", e))?;

        row.as_ref().map(decode_view).transpose()
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    #[instrument(skip(self, product), fields(product_id = %product.id, sku = %product.sku), err)]
    async fn upsert_product(&self, product: ProductRef) -> Result<ProductRef, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, sku, name, unit)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                sku = EXCLUDED.sku,
                name = EXCLUDED.name,
                unit = EXCLUDED.unit,
                updated_at = NOW()
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.sku)
        .bind(&product.name)
        .bind(&product.unit)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;

        Ok(product)
    }

    #[instrument(skip(self, site), fields(site_id = %site.id, code = %site.code), err)]
    async fn upsert_site(&self, site: SiteRef) -> Result<SiteRef, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO sites (id, code, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                name = EXCLUDED.name,
                updated_at = NOW()
            "#,
        )
        .bind(site.id.as_uuid())
        .bind(&site.code)
        .bind(&site.name)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_site", e))?;

        Ok(site)
    }

    #[instrument(
        skip(self, request),
        fields(product_id = %request.product_id, site_id = %request.site_id),
        err
    )]
    async fn open_record(&self, request: OpenRecord) -> Result<OpenedRecord, StoreError> {
        let record = InventoryRecord::open(
            InventoryId::new(),
            request.product_id,
            request.site_id,
            request.thresholds,
            request.opened_at,
        )?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let product_exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)")
            .bind(request.product_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("product_exists", e))?;
        if !product_exists {
            return Err(DomainError::not_found("product").into());
        }
        if !site_exists(&mut tx, request.site_id).await? {
            return Err(DomainError::not_found("site").into());
        }

        let created = insert_record_if_absent(&mut tx, &record).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let view = self
            .view_by_pair(request.product_id, request.site_id)
            .await?
            .ok_or(DomainError::not_found("inventory record"))?;
        Ok(OpenedRecord { view, created })
    }

    #[instrument(skip(self, thresholds), fields(inventory_id = %id), err)]
    async fn update_thresholds(
        &self,
        id: InventoryId,
        thresholds: StockThresholds,
        now: DateTime<Utc>,
    ) -> Result<InventoryView, StoreError> {
        self.with_retry("update_thresholds", || self.update_thresholds_once(id, &thresholds, now))
            .await?;
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found("inventory record").into())
    }

    #[instrument(skip(self), fields(inventory_id = %id), err)]
    async fn get(&self, id: InventoryId) -> Result<Option<InventoryView>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS}, {} {VIEW_FROM} WHERE r.id = $1",
            ViewRow::EXTRA_COLUMNS
        ))
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_record", e))?;

        row.as_ref().map(decode_view).transpose()
    }

    #[instrument(
        skip(self, command),
        fields(inventory_id = %command.inventory_id(), command = command.name(), policy = policy.as_str()),
        err
    )]
    async fn apply(&self, command: StockCommand, policy: StockPolicy) -> Result<StockChange, StoreError> {
        self.with_retry("apply", || self.apply_once(&command, policy)).await
    }

    #[instrument(
        skip(self, command),
        fields(
            product_id = %command.product_id,
            from_site = %command.from_site,
            to_site = %command.to_site,
            quantity = %command.quantity
        ),
        err
    )]
    async fn transfer(&self, command: TransferStock, policy: StockPolicy) -> Result<TransferOutcome, StoreError> {
        command.validate()?;
        self.with_retry("transfer", || self.transfer_once(&command, policy)).await
    }

    #[instrument(skip(self), err)]
    async fn list(&self, query: &InventoryQuery) -> Result<Vec<InventoryView>, StoreError> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {RECORD_COLUMNS}, {} {VIEW_FROM}
            WHERE ($1::uuid IS NULL OR r.site_id = $1)
              AND (NOT $2 OR (r.min_stock_level IS NOT NULL AND r.available_qty <= r.min_stock_level))
              AND ($3::text IS NULL OR p.name ILIKE $3 ESCAPE '\' OR p.sku ILIKE $3 ESCAPE '\')
            ORDER BY p.name ASC, s.name ASC
            "#,
            ViewRow::EXTRA_COLUMNS
        ))
        .bind(query.site_id.map(|s| *s.as_uuid()))
        .bind(query.low_stock)
        .bind(search)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_inventory", e))?;

        rows.iter().map(decode_view).collect()
    }

    #[instrument(skip(self), err)]
    async fn list_low_stock(&self, filter: &LowStockFilter) -> Result<Vec<InventoryView>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RECORD_COLUMNS}, {} {VIEW_FROM}
            WHERE r.min_stock_level IS NOT NULL
              AND r.available_qty <= r.min_stock_level
              AND ($1::uuid IS NULL OR r.site_id = $1)
              AND (NOT $2 OR r.available_qty <= r.min_stock_level * $3)
            ORDER BY r.available_qty ASC, p.name ASC
            "#,
            ViewRow::EXTRA_COLUMNS
        ))
        .bind(filter.site_id.map(|s| *s.as_uuid()))
        .bind(filter.critical_only)
        .bind(CRITICAL_RATIO)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_low_stock", e))?;

        rows.iter().map(decode_view).collect()
    }

    #[instrument(skip(self), fields(inventory_id = %id), err)]
    async fn movements(&self, id: InventoryId) -> Result<Vec<InventoryMovement>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements WHERE inventory_id = $1 ORDER BY seq ASC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_movements", e))?;

        rows.iter()
            .map(|row| {
                MovementRow::from_row(row)
                    .map_err(|e| StoreError::Backend(format!("failed to decode movement row: {e}")))?
                    .try_into_movement()
            })
            .collect()
    }
}

async fn site_exists(tx: &mut Transaction<'_, Postgres>, site_id: SiteId) -> Result<bool, StoreError> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sites WHERE id = $1)")
        .bind(site_id.as_uuid())
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("site_exists", e))
}

async fn lock_record(
    tx: &mut Transaction<'_, Postgres>,
    id: InventoryId,
) -> Result<Option<InventoryRecord>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {RECORD_COLUMNS} FROM inventory_records r WHERE r.id = $1 FOR UPDATE"
    ))
    .bind(id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_record", e))?;

    row.map(|row| {
        RecordRow::from_row(&row)
            .map_err(|e| StoreError::Backend(format!("failed to decode inventory row: {e}")))?
            .into_record()
    })
    .transpose()
}

/// Returns `true` when a new row was inserted.
async fn insert_record_if_absent(
    tx: &mut Transaction<'_, Postgres>,
    record: &InventoryRecord,
) -> Result<bool, StoreError> {
    let thresholds = record.thresholds();
    let result = sqlx::query(
        r#"
        INSERT INTO inventory_records (
            id, product_id, site_id, quantity, reserved_qty, available_qty,
            min_stock_level, max_stock_level, reorder_point, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (product_id, site_id) DO NOTHING
        "#,
    )
    .bind(record.id_typed().as_uuid())
    .bind(record.product_id().as_uuid())
    .bind(record.site_id().as_uuid())
    .bind(record.quantity())
    .bind(record.reserved_qty())
    .bind(record.available_qty())
    .bind(thresholds.min_stock_level)
    .bind(thresholds.max_stock_level)
    .bind(thresholds.reorder_point)
    .bind(version_to_db(record.version())?)
    .bind(record.created_at())
    .bind(record.updated_at())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_record", e))?;

    Ok(result.rows_affected() == 1)
}

async fn write_record(
    tx: &mut Transaction<'_, Postgres>,
    record: &InventoryRecord,
    expected_version: u64,
) -> Result<(), StoreError> {
    let thresholds = record.thresholds();
    let result = sqlx::query(
        r#"
        UPDATE inventory_records SET
            quantity = $2,
            reserved_qty = $3,
            available_qty = $4,
            min_stock_level = $5,
            max_stock_level = $6,
            reorder_point = $7,
            version = $8,
            updated_at = $9
        WHERE id = $1 AND version = $10
        "#,
    )
    .bind(record.id_typed().as_uuid())
    .bind(record.quantity())
    .bind(record.reserved_qty())
    .bind(record.available_qty())
    .bind(thresholds.min_stock_level)
    .bind(thresholds.max_stock_level)
    .bind(thresholds.reorder_point)
    .bind(version_to_db(record.version())?)
    .bind(record.updated_at())
    .bind(version_to_db(expected_version)?)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_record", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Conflict(format!(
            "inventory record {} is no longer at version {expected_version}",
            record.id_typed()
        )));
    }
    Ok(())
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: &InventoryMovement,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO inventory_movements (
            id, inventory_id, movement_type, quantity_change, quantity_after,
            reason, notes, reference_id, created_at, created_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(movement.id.as_uuid())
    .bind(movement.inventory_id.as_uuid())
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity_change)
    .bind(movement.quantity_after)
    .bind(&movement.reason)
    .bind(&movement.notes)
    .bind(movement.reference_id.map(|r| *r.as_uuid()))
    .bind(movement.created_at)
    .bind(movement.created_by.as_uuid())
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_movement", e))?;

    Ok(())
}

/// Re-run a transactional unit while it loses to concurrent writers.
///
/// Only `Conflict` is retried, at most `max_retries` times; the last conflict
/// is returned once they are used up.
async fn with_retry<T, F, Fut>(max_retries: u32, operation: &'static str, mut unit: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match unit().await {
            Err(StoreError::Conflict(msg)) if attempt < max_retries => {
                attempt += 1;
                warn!(operation, attempt, error = %msg, "retrying after concurrent update");
                tokio::time::sleep(Duration::from_millis(10 * u64::from(attempt))).await;
            }
            other => return other,
        }
    }
}

fn version_to_db(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Backend(format!("version {version} out of range")))
}

/// Escape `%`, `_` and `\` so user input matches literally inside `ILIKE`.
fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

/// Database row for `inventory_records`.
#[derive(Debug)]
struct RecordRow {
    id: Uuid,
    product_id: Uuid,
    site_id: Uuid,
    quantity: Decimal,
    reserved_qty: Decimal,
    min_stock_level: Option<Decimal>,
    max_stock_level: Option<Decimal>,
    reorder_point: Option<Decimal>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FromRow<'_, PgRow> for RecordRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            product_id: row.try_get("product_id")?,
            site_id: row.try_get("site_id")?,
            quantity: row.try_get("quantity")?,
            reserved_qty: row.try_get("reserved_qty")?,
            min_stock_level: row.try_get("min_stock_level")?,
            max_stock_level: row.try_get("max_stock_level")?,
            reorder_point: row.try_get("reorder_point")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl RecordRow {
    // NUMERIC(18, 4) comes back with four decimal places; normalize for display.
    fn into_record(self) -> Result<InventoryRecord, StoreError> {
        let version = u64::try_from(self.version)
            .map_err(|_| StoreError::Backend(format!("inventory record {} has negative version {}", self.id, self.version)))?;
        Ok(InventoryRecord::restore(RecordParts {
            id: InventoryId::from_uuid(self.id),
            product_id: ProductId::from_uuid(self.product_id),
            site_id: SiteId::from_uuid(self.site_id),
            quantity: self.quantity.normalize(),
            reserved_qty: self.reserved_qty.normalize(),
            thresholds: StockThresholds {
                min_stock_level: self.min_stock_level.map(|d| d.normalize()),
                max_stock_level: self.max_stock_level.map(|d| d.normalize()),
                reorder_point: self.reorder_point.map(|d| d.normalize()),
            },
            version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }))
    }
}

/// Catalog columns joined onto a record row.
struct ViewRow {
    product: ProductRef,
    site: SiteRef,
}

impl ViewRow {
    const EXTRA_COLUMNS: &'static str = "p.sku AS product_sku, p.name AS product_name, p.unit AS product_unit, \
                                         s.code AS site_code, s.name AS site_name";
}

impl FromRow<'_, PgRow> for ViewRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            product: ProductRef {
                id: ProductId::from_uuid(row.try_get("product_id")?),
                sku: row.try_get("product_sku")?,
                name: row.try_get("product_name")?,
                unit: row.try_get("product_unit")?,
            },
            site: SiteRef {
                id: SiteId::from_uuid(row.try_get("site_id")?),
                code: row.try_get("site_code")?,
                name: row.try_get("site_name")?,
            },
        })
    }
}

fn decode_view(row: &PgRow) -> Result<InventoryView, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode inventory view: {e}"));
    let record = RecordRow::from_row(row).map_err(decode)?.into_record()?;
    let ViewRow { product, site } = ViewRow::from_row(row).map_err(decode)?;
    Ok(InventoryView { record, product, site })
}

/// Database row for `inventory_movements`.
#[derive(Debug)]
struct MovementRow {
    id: Uuid,
    inventory_id: Uuid,
    movement_type: String,
    quantity_change: Decimal,
    quantity_after: Decimal,
    reason: Option<String>,
    notes: Option<String>,
    reference_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    created_by: Uuid,
}

impl FromRow<'_, PgRow> for MovementRow {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            inventory_id: row.try_get("inventory_id")?,
            movement_type: row.try_get("movement_type")?,
            quantity_change: row.try_get("quantity_change")?,
            quantity_after: row.try_get("quantity_after")?,
            reason: row.try_get("reason")?,
            notes: row.try_get("notes")?,
            reference_id: row.try_get("reference_id")?,
            created_at: row.try_get("created_at")?,
            created_by: row.try_get("created_by")?,
        })
    }
}

impl MovementRow {
    fn try_into_movement(self) -> Result<InventoryMovement, StoreError> {
        let movement_type = self
            .movement_type
            .parse::<MovementType>()
            .map_err(|e: DomainError| StoreError::Backend(format!("corrupt movement row {}: {e}", self.id)))?;
        Ok(InventoryMovement {
            id: MovementId::from_uuid(self.id),
            inventory_id: InventoryId::from_uuid(self.inventory_id),
            movement_type,
            quantity_change: self.quantity_change.normalize(),
            quantity_after: self.quantity_after.normalize(),
            reason: self.reason,
            notes: self.notes,
            reference_id: self.reference_id.map(TransferId::from_uuid),
            created_at: self.created_at,
            created_by: UserId::from_uuid(self.created_by),
        })
    }
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Serialization failure / deadlock
                Some("40001") | Some("40P01") => StoreError::Conflict(msg),
                // Unique violation
                Some("23505") => StoreError::Conflict(msg),
                // Check constraint / append-only trigger
                Some("23514") | Some("23000") => StoreError::Domain(DomainError::invariant(msg)),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {}", operation)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
