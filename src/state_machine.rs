//! Inventory lifecycle state machine.
//!
//! The single authority allowed to mutate an item's `status` and listing ids.
//! Legality checking is a pure function over the transition table; the
//! effectful [`StateMachine::apply`] wraps it with per-item locking, channel
//! side effects, and persistence. A channel call and its status write either
//! both land or the item ends in `error`, never a silently stale `in_stock`
//! while a listing exists channel-side.

use crate::channel::{with_retry, ChannelAdapter};
use crate::db;
use crate::error::{Result, SyncError};
use crate::keylock::KeyLocks;
use crate::models::{
    Channel, InventoryItem, ItemStatus, OrderStatus,
};
use crate::normalize::channel_key;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A status-changing trigger.
#[derive(Debug, Clone)]
pub enum Transition {
    /// List the item on a channel at an ask price
    List { channel: Channel, ask_price: f64 },
    /// Flag the live listing as presale (status unchanged)
    MarkPresale(Channel),
    /// Clear the presale flag
    UnmarkPresale(Channel),
    /// The channel reports the listing as sold
    ChannelReportsSold {
        channel: Channel,
        order_number: Option<String>,
        amount: Option<f64>,
    },
    /// Hold the item back from listing
    Reserve,
    /// Undo a reservation
    Release,
    /// Operator override; bypasses channel side effects, audit-logged.
    /// `listing_id` supports manual linking of an unmatched channel listing.
    ManualSet {
        status: ItemStatus,
        listing_id: Option<String>,
    },
    /// Re-run the side effect that parked the item in `error`
    Retry,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::List { .. } => "list",
            Transition::MarkPresale(_) => "mark_presale",
            Transition::UnmarkPresale(_) => "unmark_presale",
            Transition::ChannelReportsSold { .. } => "channel_reports_sold",
            Transition::Reserve => "reserve",
            Transition::Release => "release",
            Transition::ManualSet { .. } => "manual_set",
            Transition::Retry => "retry",
        }
    }
}

/// Pure transition-table check: the status `item` would move to, or
/// `InvalidTransition` when the trigger is not legal from the current status.
/// No side effects, no I/O.
pub fn next_status(item: &InventoryItem, transition: &Transition) -> Result<ItemStatus> {
    let reject = || SyncError::InvalidTransition {
        item_id: item.id.clone(),
        status: item.status,
        trigger: transition.name().to_string(),
    };

    match transition {
        Transition::List { channel, .. } => {
            if item.status.is_listable() {
                Ok(ItemStatus::Listed(*channel))
            } else {
                Err(reject())
            }
        }
        Transition::MarkPresale(channel) | Transition::UnmarkPresale(channel) => {
            if item.status == ItemStatus::Listed(*channel) {
                Ok(item.status)
            } else {
                Err(reject())
            }
        }
        Transition::ChannelReportsSold { channel, .. } => {
            if item.status == ItemStatus::Listed(*channel) {
                Ok(ItemStatus::Sold)
            } else {
                Err(reject())
            }
        }
        Transition::Reserve => {
            if item.status == ItemStatus::InStock {
                Ok(ItemStatus::Reserved)
            } else {
                Err(reject())
            }
        }
        Transition::Release => {
            if item.status == ItemStatus::Reserved {
                Ok(ItemStatus::InStock)
            } else {
                Err(reject())
            }
        }
        Transition::ManualSet { status, listing_id } => {
            if item.status.is_terminal() {
                return Err(reject());
            }
            // Manually entering a listed status needs a listing id to honor
            // the status/external-id invariant.
            if let Some(channel) = status.listed_channel() {
                if listing_id.is_none() && item.listing_id(channel).is_none() {
                    return Err(reject());
                }
            }
            Ok(*status)
        }
        Transition::Retry => {
            if item.status == ItemStatus::Error {
                item.previous_status.ok_or_else(reject)
            } else {
                Err(reject())
            }
        }
    }
}

/// Effectful state machine over the shared database and channel adapters.
pub struct StateMachine {
    db: Arc<Mutex<Connection>>,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    locks: KeyLocks,
}

impl StateMachine {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
        locks: KeyLocks,
    ) -> Self {
        Self { db, adapters, locks }
    }

    fn adapter(&self, channel: Channel) -> Result<&Arc<dyn ChannelAdapter>> {
        self.adapters
            .get(&channel)
            .ok_or(SyncError::ChannelNotConfigured(channel))
    }

    fn load(&self, item_id: &str) -> Result<InventoryItem> {
        let conn = self.db.lock().unwrap();
        db::get_item(&conn, item_id)?.ok_or_else(|| SyncError::ItemNotFound(item_id.to_string()))
    }

    fn store(&self, item: &InventoryItem) -> Result<()> {
        let conn = self.db.lock().unwrap();
        db::update_item(&conn, item)?;
        Ok(())
    }

    /// Apply `transition` to the item, serialized per item id.
    ///
    /// Two concurrent calls on the same item run one after the other; the
    /// second sees the state the first produced and is legality-checked
    /// against it.
    pub async fn apply(&self, item_id: &str, transition: Transition) -> Result<InventoryItem> {
        let _guard = self.locks.acquire(&format!("item:{item_id}")).await;

        let mut item = self.load(item_id)?;
        let target = next_status(&item, &transition)?;

        match transition {
            Transition::List { channel, ask_price } => {
                self.do_list(&mut item, channel, ask_price).await?;
            }
            Transition::MarkPresale(channel) => {
                self.do_presale_flag(&mut item, channel, true).await?;
            }
            Transition::UnmarkPresale(channel) => {
                self.do_presale_flag(&mut item, channel, false).await?;
            }
            Transition::ChannelReportsSold {
                channel,
                order_number,
                amount,
            } => {
                self.do_sold(&mut item, channel, order_number, amount).await?;
            }
            Transition::Reserve | Transition::Release => {
                item.status = target;
                self.store(&item)?;
            }
            Transition::ManualSet { status, listing_id } => {
                self.do_manual_set(&mut item, status, listing_id)?;
            }
            Transition::Retry => {
                self.do_retry(&mut item, target).await?;
            }
        }

        Ok(item)
    }

    /// Idempotent listing creation: probe for an existing live listing
    /// before creating, so a retried create never duplicates.
    async fn ensure_listing(
        &self,
        adapter: &Arc<dyn ChannelAdapter>,
        item: &InventoryItem,
        ask_price: f64,
    ) -> Result<String> {
        if let Some(existing) = adapter
            .find_listing_for(&item.product_ref, item.size.as_deref())
            .await?
        {
            log::info!(
                "Reusing existing {} listing {} for item {}",
                adapter.channel(),
                existing.channel_listing_id,
                item.id
            );
            return Ok(existing.channel_listing_id);
        }
        adapter.create_listing(item, ask_price).await
    }

    async fn do_list(
        &self,
        item: &mut InventoryItem,
        channel: Channel,
        ask_price: f64,
    ) -> Result<()> {
        let adapter = self.adapter(channel)?.clone();
        let snapshot = item.clone();
        let listed = with_retry(channel, "create_listing", || {
            self.ensure_listing(&adapter, &snapshot, ask_price)
        })
        .await;

        match listed {
            Ok(listing_id) => {
                item.previous_status = None;
                item.error_reason = None;
                item.status = ItemStatus::Listed(channel);
                item.set_listing_id(channel, Some(listing_id));
                item.ask_price = Some(ask_price);
                self.store(item)?;
                Ok(())
            }
            Err(e) => {
                // Listing may or may not exist channel-side; park in error so
                // retry can probe rather than pretending nothing happened.
                log::error!("Listing item {} on {channel} failed: {e}", item.id);
                item.previous_status = Some(ItemStatus::Listed(channel));
                item.error_reason = Some(format!("list failed: {e}"));
                item.status = ItemStatus::Error;
                item.ask_price = Some(ask_price);
                self.store(item)?;
                Err(e)
            }
        }
    }

    async fn do_presale_flag(
        &self,
        item: &mut InventoryItem,
        channel: Channel,
        flag: bool,
    ) -> Result<()> {
        let adapter = self.adapter(channel)?.clone();
        let listing_id = item
            .listing_id(channel)
            .ok_or_else(|| SyncError::ItemNotFound(item.id.clone()))?
            .to_string();

        let op = if flag { "mark_presale" } else { "unmark_presale" };
        with_retry(channel, op, || async {
            if flag {
                adapter.mark_presale(&listing_id).await
            } else {
                adapter.unmark_presale(&listing_id).await
            }
        })
        .await?;

        // Status is unchanged by design; only the flag moves.
        item.presale_flag = flag;
        self.store(item)?;
        Ok(())
    }

    async fn do_sold(
        &self,
        item: &mut InventoryItem,
        channel: Channel,
        order_number: Option<String>,
        amount: Option<f64>,
    ) -> Result<()> {
        let listing_id = item.listing_id(channel).map(str::to_string);
        let natural_key = match &order_number {
            Some(number) => channel_key(channel, number),
            // A sale without an order number keys on the listing it consumed
            None => format!(
                "{}:listing:{}",
                channel.as_str(),
                listing_id.as_deref().unwrap_or(&item.id)
            ),
        };

        // Order the locks item → key; the merge engine only ever takes key
        // locks, so this cannot cycle.
        let _key_guard = self.locks.acquire(&format!("order:{natural_key}")).await;

        let conn = self.db.lock().unwrap();
        match db::get_order_by_natural_key(&conn, &natural_key)? {
            Some(mut order) => {
                order.status = OrderStatus::Completed;
                if order.inventory_item_id.is_none() {
                    order.inventory_item_id = Some(item.id.clone());
                }
                if amount.is_some() {
                    order.amount = amount;
                }
                db::update_order(&conn, &order)?;
            }
            None => {
                let mut order = db::new_order(&natural_key, OrderStatus::Completed);
                order.inventory_item_id = Some(item.id.clone());
                order.amount = amount.or(item.ask_price);
                order.sale_channel = Some(channel);
                order.sku = Some(item.product_ref.clone());
                order.size = item.size.clone();
                db::insert_order(&conn, &order)?;
                log::info!(
                    "Sale recorded for item {} on {channel}: order key {natural_key}",
                    item.id
                );
            }
        }

        item.status = ItemStatus::Sold;
        item.set_listing_id(channel, None);
        item.presale_flag = false;
        item.previous_status = None;
        item.error_reason = None;
        db::update_item(&conn, item)?;
        Ok(())
    }

    fn do_manual_set(
        &self,
        item: &mut InventoryItem,
        status: ItemStatus,
        listing_id: Option<String>,
    ) -> Result<()> {
        let old = item.status;
        if status == ItemStatus::Error {
            item.previous_status = Some(old);
            item.error_reason = Some("manually set".to_string());
        } else {
            item.previous_status = None;
            item.error_reason = None;
        }

        // Keep listing ids consistent with the new status.
        match status.listed_channel() {
            Some(channel) => {
                if let Some(id) = listing_id {
                    // Linking a listing another item already holds is a
                    // conflict, not a constraint violation.
                    {
                        let conn = self.db.lock().unwrap();
                        if let Some(other) = db::find_item_by_listing(&conn, channel, &id)? {
                            if other.id != item.id {
                                return Err(SyncError::ListingConflict {
                                    channel,
                                    listing_id: id,
                                });
                            }
                        }
                    }
                    item.set_listing_id(channel, Some(id));
                }
            }
            None => {
                if status != ItemStatus::Error {
                    for channel in Channel::ALL {
                        item.set_listing_id(channel, None);
                    }
                    item.presale_flag = false;
                }
            }
        }

        item.status = status;
        self.store(item)?;
        log::info!(
            "AUDIT manual_set: item {} {} -> {} (operator override)",
            item.id,
            old,
            status
        );
        Ok(())
    }

    async fn do_retry(&self, item: &mut InventoryItem, target: ItemStatus) -> Result<()> {
        match target {
            ItemStatus::Listed(channel) => {
                let ask = item.ask_price.unwrap_or(0.0);
                // Probe-then-create inside do_list keeps this idempotent even
                // when the original create actually went through.
                self.do_list(item, channel, ask).await
            }
            other => {
                item.status = other;
                item.previous_status = None;
                item.error_reason = None;
                self.store(item)?;
                Ok(())
            }
        }
    }
}
