//! SQLite persistence for inventory, orders, and import batches.
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! All multi-row writes are transactional. Uniqueness invariants live in the
//! schema: `orders.natural_key` is UNIQUE, and each item has at most one
//! listing-id column per channel.

use crate::models::{
    now_rfc3339, Channel, ImportBatch, InventoryItem, ItemFilter, ItemStatus, Order, OrderStatus,
    SourcingType,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::str::FromStr;

/// Result type for database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `inventory_items`: canonical stock records (never deleted)
/// - `orders`: the single transaction ledger, deduplicated on `natural_key`
/// - `import_batches`: import/sync job tracking
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS inventory_items (
            id                    TEXT NOT NULL PRIMARY KEY,
            sourcing_type         TEXT NOT NULL,
            status                TEXT NOT NULL,
            previous_status       TEXT,
            error_reason          TEXT,
            presale_flag          INTEGER NOT NULL DEFAULT 0,
            quantity              INTEGER NOT NULL CHECK (quantity >= 0),
            purchase_price        REAL,
            product_ref           TEXT NOT NULL,
            brand                 TEXT,
            size                  TEXT,
            listing_id_channel_a  TEXT,
            listing_id_channel_b  TEXT,
            ask_price             REAL,
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_items_status ON inventory_items(status);
        CREATE INDEX IF NOT EXISTS idx_items_product ON inventory_items(product_ref);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_items_listing_a
            ON inventory_items(listing_id_channel_a)
            WHERE listing_id_channel_a IS NOT NULL;
        CREATE UNIQUE INDEX IF NOT EXISTS idx_items_listing_b
            ON inventory_items(listing_id_channel_b)
            WHERE listing_id_channel_b IS NOT NULL;

        CREATE TABLE IF NOT EXISTS orders (
            id                 TEXT NOT NULL PRIMARY KEY,
            inventory_item_id  TEXT REFERENCES inventory_items(id),
            natural_key        TEXT NOT NULL UNIQUE,
            status             TEXT NOT NULL,
            amount             REAL,
            currency           TEXT NOT NULL DEFAULT 'EUR',
            sale_channel       TEXT,
            sku                TEXT,
            size               TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_orders_item ON orders(inventory_item_id);
        CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

        CREATE TABLE IF NOT EXISTS import_batches (
            id                 TEXT NOT NULL PRIMARY KEY,
            source_type        TEXT NOT NULL,
            status             TEXT NOT NULL,
            total_estimated    INTEGER,
            records_processed  INTEGER NOT NULL DEFAULT 0,
            records_failed     INTEGER NOT NULL DEFAULT 0,
            error              TEXT,
            created_at         TEXT NOT NULL,
            completed_at       TEXT
        );
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Map a stored enum string to its type, surfacing bad data as a column error
/// instead of a panic.
fn parse_col<T: FromStr>(row_idx: usize, value: String) -> rusqlite::Result<T> {
    value.parse::<T>().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            row_idx,
            Type::Text,
            format!("unrecognized enum value: {value:?}").into(),
        )
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<InventoryItem> {
    let previous_status: Option<String> = row.get(3)?;
    Ok(InventoryItem {
        id: row.get(0)?,
        sourcing_type: parse_col(1, row.get::<_, String>(1)?)?,
        status: parse_col(2, row.get::<_, String>(2)?)?,
        previous_status: previous_status.map(|s| parse_col(3, s)).transpose()?,
        error_reason: row.get(4)?,
        presale_flag: row.get(5)?,
        quantity: row.get(6)?,
        purchase_price: row.get(7)?,
        product_ref: row.get(8)?,
        brand: row.get(9)?,
        size: row.get(10)?,
        listing_id_channel_a: row.get(11)?,
        listing_id_channel_b: row.get(12)?,
        ask_price: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

const ITEM_COLUMNS: &str = "id, sourcing_type, status, previous_status, error_reason, \
     presale_flag, quantity, purchase_price, product_ref, brand, size, \
     listing_id_channel_a, listing_id_channel_b, ask_price, created_at, updated_at";

/// Insert a new inventory item.
pub fn insert_item(conn: &Connection, item: &InventoryItem) -> DbResult<()> {
    conn.execute(
        "INSERT INTO inventory_items
         (id, sourcing_type, status, previous_status, error_reason, presale_flag,
          quantity, purchase_price, product_ref, brand, size,
          listing_id_channel_a, listing_id_channel_b, ask_price, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            item.id,
            item.sourcing_type.as_str(),
            item.status.as_str(),
            item.previous_status.map(|s| s.as_str()),
            item.error_reason,
            item.presale_flag,
            item.quantity,
            item.purchase_price,
            item.product_ref,
            item.brand,
            item.size,
            item.listing_id_channel_a,
            item.listing_id_channel_b,
            item.ask_price,
            item.created_at,
            item.updated_at,
        ],
    )?;
    Ok(())
}

/// Write back every mutable field of an item. `updated_at` is refreshed here
/// so callers cannot forget it.
pub fn update_item(conn: &Connection, item: &InventoryItem) -> DbResult<()> {
    let updated = conn.execute(
        "UPDATE inventory_items SET
            sourcing_type = ?2, status = ?3, previous_status = ?4, error_reason = ?5,
            presale_flag = ?6, quantity = ?7, purchase_price = ?8, product_ref = ?9,
            brand = ?10, size = ?11, listing_id_channel_a = ?12,
            listing_id_channel_b = ?13, ask_price = ?14, updated_at = ?15
         WHERE id = ?1",
        params![
            item.id,
            item.sourcing_type.as_str(),
            item.status.as_str(),
            item.previous_status.map(|s| s.as_str()),
            item.error_reason,
            item.presale_flag,
            item.quantity,
            item.purchase_price,
            item.product_ref,
            item.brand,
            item.size,
            item.listing_id_channel_a,
            item.listing_id_channel_b,
            item.ask_price,
            now_rfc3339(),
        ],
    )?;
    if updated == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

pub fn get_item(conn: &Connection, id: &str) -> DbResult<Option<InventoryItem>> {
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = ?1"),
        params![id],
        item_from_row,
    )
    .optional()
}

/// Find the item currently holding `listing_id` on `channel`.
///
/// The partial unique indexes guarantee at most one row.
pub fn find_item_by_listing(
    conn: &Connection,
    channel: Channel,
    listing_id: &str,
) -> DbResult<Option<InventoryItem>> {
    let column = match channel {
        Channel::A => "listing_id_channel_a",
        Channel::B => "listing_id_channel_b",
    };
    conn.query_row(
        &format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE {column} = ?1"),
        params![listing_id],
        item_from_row,
    )
    .optional()
}

/// Oldest in-stock item for a product/size with no linked order, used by the
/// merge engine to attach historical sales to existing stock.
pub fn find_linkable_item(
    conn: &Connection,
    product_ref: &str,
    size: Option<&str>,
) -> DbResult<Option<InventoryItem>> {
    conn.query_row(
        &format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items i
             WHERE i.product_ref = ?1
               AND (?2 IS NULL OR i.size = ?2)
               AND i.status = 'in_stock'
               AND NOT EXISTS (SELECT 1 FROM orders o WHERE o.inventory_item_id = i.id)
             ORDER BY i.created_at ASC
             LIMIT 1"
        ),
        params![product_ref, size],
        item_from_row,
    )
    .optional()
}

/// List items matching `filter`, newest first.
pub fn list_items(conn: &Connection, filter: &ItemFilter) -> DbResult<Vec<InventoryItem>> {
    let listed_status = filter.channel.map(ItemStatus::Listed);
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ITEM_COLUMNS} FROM inventory_items
         WHERE (?1 IS NULL OR status = ?1)
           AND (?2 IS NULL OR sourcing_type = ?2)
           AND (?3 IS NULL OR status = ?3)
           AND (?4 IS NULL OR product_ref = ?4)
         ORDER BY created_at DESC"
    ))?;
    let rows = stmt.query_map(
        params![
            filter.status.map(|s| s.as_str()),
            filter.sourcing_type.map(|s| s.as_str()),
            listed_status.map(|s| s.as_str()),
            filter.product_ref,
        ],
        item_from_row,
    )?;
    rows.collect()
}

/// All items whose status claims a live listing on `channel`, including items
/// parked in `error` while their pre-error status was listed there.
pub fn items_listed_on(conn: &Connection, channel: Channel) -> DbResult<Vec<InventoryItem>> {
    let listed = ItemStatus::Listed(channel);
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {ITEM_COLUMNS} FROM inventory_items
         WHERE status = ?1 OR (status = 'error' AND previous_status = ?1)"
    ))?;
    let rows = stmt.query_map(params![listed.as_str()], item_from_row)?;
    rows.collect()
}

// ── Orders ────────────────────────────────────────────────────────────────

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    let sale_channel: Option<String> = row.get(6)?;
    Ok(Order {
        id: row.get(0)?,
        inventory_item_id: row.get(1)?,
        natural_key: row.get(2)?,
        status: parse_col(3, row.get::<_, String>(3)?)?,
        amount: row.get(4)?,
        currency: row.get(5)?,
        sale_channel: sale_channel.map(|s| parse_col(6, s)).transpose()?,
        sku: row.get(7)?,
        size: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

const ORDER_COLUMNS: &str = "id, inventory_item_id, natural_key, status, amount, currency, \
     sale_channel, sku, size, created_at, updated_at";

pub fn insert_order(conn: &Connection, order: &Order) -> DbResult<()> {
    conn.execute(
        "INSERT INTO orders
         (id, inventory_item_id, natural_key, status, amount, currency,
          sale_channel, sku, size, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            order.id,
            order.inventory_item_id,
            order.natural_key,
            order.status.as_str(),
            order.amount,
            order.currency,
            order.sale_channel.map(|c| c.as_str()),
            order.sku,
            order.size,
            order.created_at,
            order.updated_at,
        ],
    )?;
    Ok(())
}

pub fn update_order(conn: &Connection, order: &Order) -> DbResult<()> {
    let updated = conn.execute(
        "UPDATE orders SET
            inventory_item_id = ?2, status = ?3, amount = ?4, currency = ?5,
            sale_channel = ?6, sku = ?7, size = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            order.id,
            order.inventory_item_id,
            order.status.as_str(),
            order.amount,
            order.currency,
            order.sale_channel.map(|c| c.as_str()),
            order.sku,
            order.size,
            now_rfc3339(),
        ],
    )?;
    if updated == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

pub fn get_order_by_natural_key(conn: &Connection, natural_key: &str) -> DbResult<Option<Order>> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE natural_key = ?1"),
        params![natural_key],
        order_from_row,
    )
    .optional()
}

pub fn get_order_count(conn: &Connection) -> DbResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM orders", [], |row| row.get(0))
}

// ── Import batches ────────────────────────────────────────────────────────

fn batch_from_row(row: &Row<'_>) -> rusqlite::Result<ImportBatch> {
    Ok(ImportBatch {
        id: row.get(0)?,
        source_type: parse_col(1, row.get::<_, String>(1)?)?,
        status: parse_col(2, row.get::<_, String>(2)?)?,
        total_estimated: row.get(3)?,
        records_processed: row.get(4)?,
        records_failed: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

pub fn insert_batch(conn: &Connection, batch: &ImportBatch) -> DbResult<()> {
    conn.execute(
        "INSERT INTO import_batches
         (id, source_type, status, total_estimated, records_processed,
          records_failed, error, created_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            batch.id,
            batch.source_type.as_str(),
            batch.status.as_str(),
            batch.total_estimated,
            batch.records_processed,
            batch.records_failed,
            batch.error,
            batch.created_at,
            batch.completed_at,
        ],
    )?;
    Ok(())
}

pub fn update_batch(conn: &Connection, batch: &ImportBatch) -> DbResult<()> {
    let updated = conn.execute(
        "UPDATE import_batches SET
            status = ?2, total_estimated = ?3, records_processed = ?4,
            records_failed = ?5, error = ?6, completed_at = ?7
         WHERE id = ?1",
        params![
            batch.id,
            batch.status.as_str(),
            batch.total_estimated,
            batch.records_processed,
            batch.records_failed,
            batch.error,
            batch.completed_at,
        ],
    )?;
    if updated == 0 {
        return Err(rusqlite::Error::QueryReturnedNoRows);
    }
    Ok(())
}

pub fn get_batch(conn: &Connection, id: &str) -> DbResult<Option<ImportBatch>> {
    conn.query_row(
        "SELECT id, source_type, status, total_estimated, records_processed,
                records_failed, error, created_at, completed_at
         FROM import_batches WHERE id = ?1",
        params![id],
        batch_from_row,
    )
    .optional()
}

/// Build a fresh inventory item with sourcing-type-dependent initial status.
pub fn new_item(
    product_ref: &str,
    sourcing_type: SourcingType,
    purchase_price: Option<f64>,
    size: Option<String>,
    brand: Option<String>,
) -> InventoryItem {
    let now = now_rfc3339();
    InventoryItem {
        id: uuid::Uuid::new_v4().to_string(),
        sourcing_type,
        status: sourcing_type.initial_status(),
        previous_status: None,
        error_reason: None,
        presale_flag: false,
        quantity: 1,
        purchase_price,
        product_ref: product_ref.to_string(),
        brand,
        size,
        listing_id_channel_a: None,
        listing_id_channel_b: None,
        ask_price: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Build a fresh order row for `record`-shaped data.
pub fn new_order(natural_key: &str, status: OrderStatus) -> Order {
    let now = now_rfc3339();
    Order {
        id: uuid::Uuid::new_v4().to_string(),
        inventory_item_id: None,
        natural_key: natural_key.to_string(),
        status,
        amount: None,
        currency: "EUR".to_string(),
        sale_channel: None,
        sku: None,
        size: None,
        created_at: now.clone(),
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BatchStatus, SourceType};

    /// Create an in-memory database for testing
    pub fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    #[test]
    fn init_schema_creates_tables() {
        let conn = test_db();
        for table in ["inventory_items", "orders", "import_batches"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }

    #[test]
    fn item_round_trips() {
        let conn = test_db();
        let mut item = new_item(
            "SKU1",
            SourcingType::Physical,
            Some(80.0),
            Some("10".into()),
            Some("Acme".into()),
        );
        item.listing_id_channel_a = Some("L-1".into());
        item.status = ItemStatus::Listed(Channel::A);
        insert_item(&conn, &item).unwrap();

        let loaded = get_item(&conn, &item.id).unwrap().unwrap();
        assert_eq!(loaded.status, ItemStatus::Listed(Channel::A));
        assert_eq!(loaded.listing_id_channel_a.as_deref(), Some("L-1"));
        assert_eq!(loaded.purchase_price, Some(80.0));
        assert_eq!(loaded.sourcing_type, SourcingType::Physical);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("resale.db");

        let item = new_item("SKU1", SourcingType::Physical, Some(80.0), None, None);
        {
            let conn = Connection::open(&path).unwrap();
            init_schema(&conn).unwrap();
            insert_item(&conn, &item).unwrap();
        }

        let conn = Connection::open(&path).unwrap();
        init_schema(&conn).unwrap();
        let loaded = get_item(&conn, &item.id).unwrap().unwrap();
        assert_eq!(loaded.product_ref, "SKU1");
    }

    #[test]
    fn get_item_returns_none_for_unknown_id() {
        let conn = test_db();
        assert!(get_item(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn update_item_refreshes_fields() {
        let conn = test_db();
        let mut item = new_item("SKU1", SourcingType::Physical, Some(80.0), None, None);
        insert_item(&conn, &item).unwrap();

        item.status = ItemStatus::Reserved;
        item.quantity = 2;
        update_item(&conn, &item).unwrap();

        let loaded = get_item(&conn, &item.id).unwrap().unwrap();
        assert_eq!(loaded.status, ItemStatus::Reserved);
        assert_eq!(loaded.quantity, 2);
    }

    #[test]
    fn update_missing_item_errors() {
        let conn = test_db();
        let item = new_item("SKU1", SourcingType::Physical, None, None, None);
        assert!(matches!(
            update_item(&conn, &item),
            Err(rusqlite::Error::QueryReturnedNoRows)
        ));
    }

    #[test]
    fn natural_key_is_unique() {
        let conn = test_db();
        let order = new_order("channel_a:A-1", OrderStatus::Completed);
        insert_order(&conn, &order).unwrap();

        let dup = new_order("channel_a:A-1", OrderStatus::Completed);
        assert!(insert_order(&conn, &dup).is_err());
        assert_eq!(get_order_count(&conn).unwrap(), 1);
    }

    #[test]
    fn listing_id_is_unique_per_channel() {
        let conn = test_db();
        let mut first = new_item("SKU1", SourcingType::Physical, Some(1.0), None, None);
        first.listing_id_channel_a = Some("L-1".into());
        insert_item(&conn, &first).unwrap();

        let mut second = new_item("SKU2", SourcingType::Physical, Some(1.0), None, None);
        second.listing_id_channel_a = Some("L-1".into());
        assert!(insert_item(&conn, &second).is_err());

        // Same id on the other channel is fine
        second.listing_id_channel_a = None;
        second.listing_id_channel_b = Some("L-1".into());
        insert_item(&conn, &second).unwrap();
    }

    #[test]
    fn find_item_by_listing_matches_channel_column() {
        let conn = test_db();
        let mut item = new_item("SKU1", SourcingType::Physical, Some(1.0), None, None);
        item.listing_id_channel_b = Some("B-77".into());
        insert_item(&conn, &item).unwrap();

        assert!(find_item_by_listing(&conn, Channel::A, "B-77")
            .unwrap()
            .is_none());
        let found = find_item_by_listing(&conn, Channel::B, "B-77")
            .unwrap()
            .unwrap();
        assert_eq!(found.id, item.id);
    }

    #[test]
    fn find_linkable_item_skips_items_with_orders() {
        let conn = test_db();
        let taken = new_item("SKU1", SourcingType::Physical, Some(1.0), Some("10".into()), None);
        insert_item(&conn, &taken).unwrap();
        let mut order = new_order("row:x", OrderStatus::Completed);
        order.inventory_item_id = Some(taken.id.clone());
        insert_order(&conn, &order).unwrap();

        assert!(find_linkable_item(&conn, "SKU1", Some("10"))
            .unwrap()
            .is_none());

        let free = new_item("SKU1", SourcingType::Physical, Some(1.0), Some("10".into()), None);
        insert_item(&conn, &free).unwrap();
        let found = find_linkable_item(&conn, "SKU1", Some("10")).unwrap().unwrap();
        assert_eq!(found.id, free.id);
    }

    #[test]
    fn list_items_applies_filters() {
        let conn = test_db();
        let a = new_item("SKU1", SourcingType::Physical, Some(1.0), None, None);
        insert_item(&conn, &a).unwrap();
        let mut b = new_item("SKU2", SourcingType::Presale, None, None, None);
        b.status = ItemStatus::Listed(Channel::A);
        insert_item(&conn, &b).unwrap();

        let all = list_items(&conn, &ItemFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let listed = list_items(
            &conn,
            &ItemFilter {
                channel: Some(Channel::A),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, b.id);

        let physical = list_items(
            &conn,
            &ItemFilter {
                sourcing_type: Some(SourcingType::Physical),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(physical.len(), 1);
        assert_eq!(physical[0].id, a.id);
    }

    #[test]
    fn items_listed_on_includes_errored_listings() {
        let conn = test_db();
        let mut listed = new_item("SKU1", SourcingType::Physical, Some(1.0), None, None);
        listed.status = ItemStatus::Listed(Channel::A);
        listed.listing_id_channel_a = Some("L-1".into());
        insert_item(&conn, &listed).unwrap();

        let mut errored = new_item("SKU2", SourcingType::Physical, Some(1.0), None, None);
        errored.status = ItemStatus::Error;
        errored.previous_status = Some(ItemStatus::Listed(Channel::A));
        errored.listing_id_channel_a = Some("L-2".into());
        insert_item(&conn, &errored).unwrap();

        let mut other = new_item("SKU3", SourcingType::Physical, Some(1.0), None, None);
        other.status = ItemStatus::Listed(Channel::B);
        other.listing_id_channel_b = Some("L-3".into());
        insert_item(&conn, &other).unwrap();

        let on_a = items_listed_on(&conn, Channel::A).unwrap();
        assert_eq!(on_a.len(), 2);
    }

    #[test]
    fn batch_round_trips() {
        let conn = test_db();
        let mut batch = ImportBatch {
            id: uuid::Uuid::new_v4().to_string(),
            source_type: SourceType::Spreadsheet,
            status: BatchStatus::Pending,
            total_estimated: Some(10),
            records_processed: 0,
            records_failed: 0,
            error: None,
            created_at: now_rfc3339(),
            completed_at: None,
        };
        insert_batch(&conn, &batch).unwrap();

        batch.status = BatchStatus::Completed;
        batch.records_processed = 9;
        batch.records_failed = 1;
        batch.completed_at = Some(now_rfc3339());
        update_batch(&conn, &batch).unwrap();

        let loaded = get_batch(&conn, &batch.id).unwrap().unwrap();
        assert_eq!(loaded.status, BatchStatus::Completed);
        assert_eq!(loaded.records_processed, 9);
        assert_eq!(loaded.records_failed, 1);
        assert!(loaded.completed_at.is_some());
    }
}
