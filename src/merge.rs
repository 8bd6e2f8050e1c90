//! Deduplication & merge engine.
//!
//! Every import record lands here after normalization. Orders are looked up
//! by natural key and inserted or updated in place; re-running an identical
//! record is a no-op. Merges for the same key are serialized through
//! [`KeyLocks`], with the UNIQUE constraint on `orders.natural_key` as the
//! backstop. Nothing in this module ever deletes a row.

use crate::db;
use crate::error::Result;
use crate::keylock::KeyLocks;
use crate::models::{ImportRecord, ItemStatus, Order, OrderStatus, SourcingType};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// What `merge` did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Created,
    Updated,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub outcome: MergeOutcome,
    pub order_id: String,
    /// Item created or linked by this merge, if any
    pub inventory_item_id: Option<String>,
}

pub struct MergeEngine {
    db: Arc<Mutex<Connection>>,
    locks: KeyLocks,
}

impl MergeEngine {
    pub fn new(db: Arc<Mutex<Connection>>, locks: KeyLocks) -> Self {
        Self { db, locks }
    }

    /// Merge one normalized record into the ledger.
    ///
    /// Holds the per-key lock for the whole read-decide-write sequence, so
    /// concurrent imports of the same key serialize and produce exactly one
    /// order row.
    pub async fn merge(&self, record: &ImportRecord) -> Result<MergeResult> {
        let _guard = self
            .locks
            .acquire(&format!("order:{}", record.natural_key))
            .await;

        let mut conn = self.db.lock().unwrap();
        merge_record(&mut conn, record)
    }
}

/// Synchronous merge body. Separated from the async wrapper so the whole
/// decision runs inside one transaction while the connection lock is held.
fn merge_record(conn: &mut Connection, record: &ImportRecord) -> Result<MergeResult> {
    let tx = conn.transaction()?;

    let result = match db::get_order_by_natural_key(&tx, &record.natural_key)? {
        None => {
            let (order, item_id) = build_order(&tx, record)?;
            db::insert_order(&tx, &order)?;
            log::info!(
                "Order created: {} (key {}, item {:?})",
                order.id,
                order.natural_key,
                item_id
            );
            MergeResult {
                outcome: MergeOutcome::Created,
                order_id: order.id,
                inventory_item_id: item_id,
            }
        }
        Some(mut existing) => {
            if record_matches(&existing, record) {
                log::debug!("Order unchanged, skipping: {}", record.natural_key);
                MergeResult {
                    outcome: MergeOutcome::Skipped,
                    order_id: existing.id,
                    inventory_item_id: existing.inventory_item_id,
                }
            } else {
                apply_update(&tx, &mut existing, record)?;
                log::info!(
                    "Order updated: {} (key {})",
                    existing.id,
                    existing.natural_key
                );
                MergeResult {
                    outcome: MergeOutcome::Updated,
                    order_id: existing.id,
                    inventory_item_id: existing.inventory_item_id,
                }
            }
        }
    };

    tx.commit()?;
    Ok(result)
}

/// Build the order row for a fresh record, creating or linking an inventory
/// item when the record describes a physical unit.
fn build_order(
    conn: &Connection,
    record: &ImportRecord,
) -> Result<(Order, Option<String>)> {
    let mut order = db::new_order(&record.natural_key, record.status);
    order.amount = record.amount;
    order.currency = record.currency.clone();
    order.sale_channel = record.sale_channel;
    order.sku = Some(record.sku.clone());
    order.size = record.size.clone();

    // Only physical units get stock records out of an import; presale and
    // dropship promises have nothing on hand to track.
    let item_id = if record.sourcing_type == SourcingType::Physical {
        let item = match db::find_linkable_item(conn, &record.product_ref, record.size.as_deref())?
        {
            Some(mut existing) => {
                if record.status == OrderStatus::Completed {
                    existing.status = ItemStatus::Sold;
                    db::update_item(conn, &existing)?;
                }
                existing
            }
            None => {
                let mut item = db::new_item(
                    &record.product_ref,
                    SourcingType::Physical,
                    record.purchase_price,
                    record.size.clone(),
                    record.brand.clone(),
                );
                // A completed historical sale arrives already sold
                if record.status == OrderStatus::Completed {
                    item.status = ItemStatus::Sold;
                }
                db::insert_item(conn, &item)?;
                item
            }
        };
        Some(item.id)
    } else {
        None
    };

    order.inventory_item_id = item_id.clone();
    Ok((order, item_id))
}

/// Content comparison driving the skipped path. Field additions here must
/// stay in sync with `apply_update`.
fn record_matches(existing: &Order, record: &ImportRecord) -> bool {
    existing.status == record.status
        && amounts_equal(existing.amount, record.amount)
        && existing.currency == record.currency
}

fn amounts_equal(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() < 0.005,
        (None, None) => true,
        // A record without an amount never clobbers a known amount
        (Some(_), None) => true,
        (None, Some(_)) => false,
    }
}

fn apply_update(conn: &Connection, existing: &mut Order, record: &ImportRecord) -> Result<()> {
    // Status only advances; a stale pending feed must not regress a
    // completed order.
    let advanced = existing.status == OrderStatus::Pending && record.status == OrderStatus::Completed;
    if advanced {
        existing.status = OrderStatus::Completed;
    }
    if record.amount.is_some() {
        existing.amount = record.amount;
        existing.currency = record.currency.clone();
    }
    if existing.sale_channel.is_none() {
        existing.sale_channel = record.sale_channel;
    }
    db::update_order(conn, existing)?;

    // A sale that just completed consumes its linked stock
    if advanced {
        if let Some(item_id) = &existing.inventory_item_id {
            if let Some(mut item) = db::get_item(conn, item_id)? {
                if item.status == ItemStatus::InStock {
                    item.status = ItemStatus::Sold;
                    db::update_item(conn, &item)?;
                }
            }
        }
    }
    Ok(())
}
