//! Listing reconciliation: channel-reported state vs. local inventory.
//!
//! Pulls every snapshot for a channel, folds matching ones into the state
//! machine, and reports the rest as conflicts for the operator. A channel
//! that cannot be reached after retries fails the whole call with
//! `ChannelUnavailable` before any local row is touched.

use crate::channel::{with_retry, ChannelAdapter};
use crate::db;
use crate::error::{Result, SyncError};
use crate::keylock::KeyLocks;
use crate::models::{Channel, ChannelStatus, InventoryItem, ItemStatus, ListingSnapshot};
use crate::state_machine::{StateMachine, Transition};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A channel listing with no matching local item. Never auto-adopted; the
/// operator resolves it through the import pipeline or manual linking.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileConflict {
    pub channel: Channel,
    pub listing_id: String,
    pub ask_price: Option<f64>,
    pub channel_status: ChannelStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub channel: Channel,
    /// Listings examined (local items claiming this channel)
    pub checked: u32,
    /// Items whose local state changed (sales folded in, vanished listings
    /// parked in error, presale flags corrected)
    pub updated: u32,
    pub conflicts: Vec<ReconcileConflict>,
    /// Per-item failures; reconciliation continues past them
    pub errors: Vec<String>,
}

pub struct Reconciler {
    db: Arc<Mutex<Connection>>,
    machine: Arc<StateMachine>,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    locks: KeyLocks,
}

impl Reconciler {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        machine: Arc<StateMachine>,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
        locks: KeyLocks,
    ) -> Self {
        Self {
            db,
            machine,
            adapters,
            locks,
        }
    }

    /// Reconcile one channel.
    pub async fn reconcile(&self, channel: Channel) -> Result<ReconciliationReport> {
        let adapter = self
            .adapters
            .get(&channel)
            .ok_or(SyncError::ChannelNotConfigured(channel))?
            .clone();

        // Fetch first; failure here must leave every item untouched.
        let snapshots = with_retry(channel, "list_snapshots", || adapter.list_snapshots()).await?;
        let mut by_listing: HashMap<String, ListingSnapshot> = snapshots
            .into_iter()
            .map(|s| (s.channel_listing_id.clone(), s))
            .collect();
        log::info!(
            "Reconciling {channel}: {} channel listings reported",
            by_listing.len()
        );

        let local_items = {
            let conn = self.db.lock().unwrap();
            db::items_listed_on(&conn, channel)?
        };

        let mut report = ReconciliationReport {
            channel,
            checked: 0,
            updated: 0,
            conflicts: Vec::new(),
            errors: Vec::new(),
        };

        for item in local_items {
            report.checked += 1;
            let listing_id = match item.listing_id(channel) {
                Some(id) => id.to_string(),
                None => continue,
            };
            let snapshot = by_listing.remove(&listing_id);

            match self.reconcile_item(channel, &item, snapshot).await {
                Ok(true) => report.updated += 1,
                Ok(false) => {}
                Err(e) => {
                    log::error!("Reconcile failed for item {}: {e}", item.id);
                    report.errors.push(format!("item {}: {e}", item.id));
                }
            }
        }

        // Whatever the channel reported that we couldn't match is a conflict.
        for (listing_id, snapshot) in by_listing {
            log::warn!("Unmatched {channel} listing {listing_id}, recording conflict");
            report.conflicts.push(ReconcileConflict {
                channel,
                listing_id,
                ask_price: snapshot.ask_price,
                channel_status: snapshot.channel_status,
            });
        }

        log::info!(
            "Reconciled {channel}: {} checked, {} updated, {} conflicts, {} errors",
            report.checked,
            report.updated,
            report.conflicts.len(),
            report.errors.len()
        );
        Ok(report)
    }

    /// Fold one snapshot into one item. Returns whether local state changed.
    async fn reconcile_item(
        &self,
        channel: Channel,
        item: &InventoryItem,
        snapshot: Option<ListingSnapshot>,
    ) -> Result<bool> {
        // Items parked in error keep their listing reserved for retry; the
        // matching snapshot is consumed above so it doesn't become a
        // conflict, but no transition is driven from here.
        if item.status != ItemStatus::Listed(channel) {
            return Ok(false);
        }

        match snapshot {
            Some(snapshot) => match snapshot.channel_status {
                ChannelStatus::Sold => {
                    self.machine
                        .apply(
                            &item.id,
                            Transition::ChannelReportsSold {
                                channel,
                                order_number: snapshot.order_number.clone(),
                                amount: snapshot.ask_price,
                            },
                        )
                        .await?;
                    Ok(true)
                }
                ChannelStatus::Deleted => {
                    self.mark_vanished(channel, &item.id).await?;
                    Ok(true)
                }
                ChannelStatus::Active | ChannelStatus::Pending | ChannelStatus::Presale => {
                    // The channel is authoritative for the presale flag
                    let flag = snapshot.channel_status == ChannelStatus::Presale;
                    if flag != item.presale_flag {
                        self.update_presale_flag(&item.id, flag).await?;
                        return Ok(true);
                    }
                    Ok(false)
                }
            },
            None => {
                self.mark_vanished(channel, &item.id).await?;
                Ok(true)
            }
        }
    }

    /// The channel no longer knows the listing but local state still claims
    /// it: park in error until an operator (or automation) retries.
    async fn mark_vanished(&self, channel: Channel, item_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(&format!("item:{item_id}")).await;
        let conn = self.db.lock().unwrap();
        let mut item =
            db::get_item(&conn, item_id)?.ok_or_else(|| SyncError::ItemNotFound(item_id.into()))?;
        // Re-check under the lock; a concurrent transition may have moved it
        if item.status != ItemStatus::Listed(channel) {
            return Ok(());
        }
        log::warn!("Listing vanished on {channel} for item {item_id}");
        item.previous_status = Some(item.status);
        item.status = ItemStatus::Error;
        item.error_reason = Some("listing_vanished".to_string());
        db::update_item(&conn, &item)?;
        Ok(())
    }

    async fn update_presale_flag(&self, item_id: &str, flag: bool) -> Result<()> {
        let _guard = self.locks.acquire(&format!("item:{item_id}")).await;
        let conn = self.db.lock().unwrap();
        let mut item =
            db::get_item(&conn, item_id)?.ok_or_else(|| SyncError::ItemNotFound(item_id.into()))?;
        item.presale_flag = flag;
        db::update_item(&conn, &item)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SimulationAdapter;
    use crate::models::{OrderStatus, SourcingType};

    struct Fixture {
        reconciler: Reconciler,
        machine: Arc<StateMachine>,
        sim_a: Arc<SimulationAdapter>,
        db: Arc<Mutex<Connection>>,
    }

    fn fixture() -> Fixture {
        let conn = Connection::open_in_memory().unwrap();
        db::init_schema(&conn).unwrap();
        let db = Arc::new(Mutex::new(conn));
        let locks = KeyLocks::new();

        let sim_a = Arc::new(SimulationAdapter::new(Channel::A));
        let sim_b = Arc::new(SimulationAdapter::new(Channel::B));
        let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
        adapters.insert(Channel::A, sim_a.clone());
        adapters.insert(Channel::B, sim_b);

        let machine = Arc::new(StateMachine::new(
            db.clone(),
            adapters.clone(),
            locks.clone(),
        ));
        let reconciler = Reconciler::new(db.clone(), machine.clone(), adapters, locks);
        Fixture {
            reconciler,
            machine,
            sim_a,
            db,
        }
    }

    async fn listed_item(fx: &Fixture) -> InventoryItem {
        let item = db::new_item("SKU1", SourcingType::Physical, Some(80.0), Some("10".into()), None);
        {
            let conn = fx.db.lock().unwrap();
            db::insert_item(&conn, &item).unwrap();
        }
        fx.machine
            .apply(&item.id, Transition::List { channel: Channel::A, ask_price: 120.0 })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn clean_channel_reports_no_changes() {
        let fx = fixture();
        listed_item(&fx).await;

        let report = fx.reconciler.reconcile(Channel::A).await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.updated, 0);
        assert!(report.conflicts.is_empty());
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn sold_on_channel_drives_sale_transition() {
        let fx = fixture();
        let item = listed_item(&fx).await;
        let listing_id = item.listing_id_channel_a.clone().unwrap();
        fx.sim_a.report_sold(&listing_id, "A-1001");

        let report = fx.reconciler.reconcile(Channel::A).await.unwrap();
        assert_eq!(report.updated, 1);

        let conn = fx.db.lock().unwrap();
        let stored = db::get_item(&conn, &item.id).unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Sold);
        assert_eq!(stored.listing_id_channel_a, None);
        let order = db::get_order_by_natural_key(&conn, "channel_a:A-1001")
            .unwrap()
            .unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn vanished_listing_parks_item_in_error() {
        let fx = fixture();
        let item = listed_item(&fx).await;
        fx.sim_a.vanish(&item.listing_id_channel_a.clone().unwrap());

        let report = fx.reconciler.reconcile(Channel::A).await.unwrap();
        assert_eq!(report.updated, 1);

        let conn = fx.db.lock().unwrap();
        let stored = db::get_item(&conn, &item.id).unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Error);
        assert_eq!(stored.error_reason.as_deref(), Some("listing_vanished"));
        assert_eq!(stored.previous_status, Some(ItemStatus::Listed(Channel::A)));
    }

    #[tokio::test]
    async fn unknown_channel_listing_is_a_conflict_not_an_adoption() {
        let fx = fixture();
        fx.sim_a.seed_listing("L-foreign", "SKU9", 75.0);

        let report = fx.reconciler.reconcile(Channel::A).await.unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].listing_id, "L-foreign");

        // No item was invented for it
        let conn = fx.db.lock().unwrap();
        let items = db::list_items(&conn, &Default::default()).unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn unavailable_channel_touches_nothing() {
        let fx = fixture();
        let item = listed_item(&fx).await;
        let before = {
            let conn = fx.db.lock().unwrap();
            db::get_item(&conn, &item.id).unwrap().unwrap()
        };

        fx.sim_a.set_unavailable(true);
        let err = fx.reconciler.reconcile(Channel::A).await.unwrap_err();
        assert!(matches!(err, SyncError::ChannelUnavailable { .. }));

        let conn = fx.db.lock().unwrap();
        let after = db::get_item(&conn, &item.id).unwrap().unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.listing_id_channel_a, before.listing_id_channel_a);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn presale_flag_follows_channel_state() {
        let fx = fixture();
        let item = listed_item(&fx).await;
        let listing_id = item.listing_id_channel_a.clone().unwrap();

        // Flag set channel-side (e.g. through the marketplace UI)
        fx.sim_a.mark_presale(&listing_id).await.unwrap();

        let report = fx.reconciler.reconcile(Channel::A).await.unwrap();
        assert_eq!(report.updated, 1);

        let conn = fx.db.lock().unwrap();
        let stored = db::get_item(&conn, &item.id).unwrap().unwrap();
        assert!(stored.presale_flag);
        assert_eq!(stored.status, ItemStatus::Listed(Channel::A));
    }

    #[tokio::test]
    async fn errored_item_listing_is_not_a_conflict() {
        let fx = fixture();
        let item = listed_item(&fx).await;
        // Park the item in error while its listing stays live channel-side
        fx.machine
            .apply(
                &item.id,
                Transition::ManualSet { status: ItemStatus::Error, listing_id: None },
            )
            .await
            .unwrap();

        let report = fx.reconciler.reconcile(Channel::A).await.unwrap();
        assert!(report.conflicts.is_empty());
        assert_eq!(report.updated, 0);
    }
}
