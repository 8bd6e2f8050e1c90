//! In-memory channel adapter for tests and `--simulate` runs.
//!
//! Behaves like a real marketplace: created listings get channel-assigned
//! ids, sales consume listings, and the whole channel can be scripted to go
//! unavailable or fail a number of calls. No HTTP involved.

use crate::error::{Result, SyncError};
use crate::models::{now_rfc3339, Channel, ChannelStatus, InventoryItem, ListingSnapshot};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::ChannelAdapter;

#[derive(Debug, Clone)]
struct SimListing {
    id: String,
    sku: String,
    size: Option<String>,
    ask_price: f64,
    status: ChannelStatus,
    order_number: Option<String>,
}

#[derive(Default)]
struct SimState {
    listings: HashMap<String, SimListing>,
    next_id: u64,
    /// All calls fail transiently while set
    unavailable: bool,
    /// Remaining calls that fail transiently before succeeding
    fail_count: u32,
    create_calls: u32,
}

/// Scriptable in-memory marketplace.
pub struct SimulationAdapter {
    channel: Channel,
    state: Mutex<SimState>,
}

impl SimulationAdapter {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            state: Mutex::new(SimState::default()),
        }
    }

    fn transient_error(&self) -> SyncError {
        SyncError::HttpStatus {
            channel: self.channel,
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Fails the call while the channel is scripted as down or has failure
    /// budget left.
    fn gate(&self, state: &mut SimState) -> Result<()> {
        if state.unavailable {
            return Err(self.transient_error());
        }
        if state.fail_count > 0 {
            state.fail_count -= 1;
            return Err(self.transient_error());
        }
        Ok(())
    }

    fn snapshot(&self, listing: &SimListing) -> ListingSnapshot {
        ListingSnapshot {
            channel: self.channel,
            channel_listing_id: listing.id.clone(),
            ask_price: Some(listing.ask_price),
            channel_status: listing.status,
            order_number: listing.order_number.clone(),
            observed_at: now_rfc3339(),
        }
    }

    // ── Scripting interface ──────────────────────────────────────────────

    /// Make every call fail transiently until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Fail the next `n` calls transiently, then recover.
    pub fn fail_next_calls(&self, n: u32) {
        self.state.lock().unwrap().fail_count = n;
    }

    /// Channel-side sale: the listing is consumed and an order number
    /// appears on the snapshot.
    pub fn report_sold(&self, listing_id: &str, order_number: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(listing) = state.listings.get_mut(listing_id) {
            listing.status = ChannelStatus::Sold;
            listing.order_number = Some(order_number.to_string());
        }
    }

    /// Channel-side removal without a sale (moderation, expiry).
    pub fn vanish(&self, listing_id: &str) {
        self.state.lock().unwrap().listings.remove(listing_id);
    }

    /// Plant a listing local state knows nothing about (conflict scenarios).
    pub fn seed_listing(&self, listing_id: &str, sku: &str, ask_price: f64) {
        let mut state = self.state.lock().unwrap();
        state.listings.insert(
            listing_id.to_string(),
            SimListing {
                id: listing_id.to_string(),
                sku: sku.to_string(),
                size: None,
                ask_price,
                status: ChannelStatus::Active,
                order_number: None,
            },
        );
    }

    /// How many create calls the channel has served (idempotency assertions).
    pub fn create_call_count(&self) -> u32 {
        self.state.lock().unwrap().create_calls
    }

    pub fn listing_count(&self) -> usize {
        self.state.lock().unwrap().listings.len()
    }
}

#[async_trait]
impl ChannelAdapter for SimulationAdapter {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn list_snapshots(&self) -> Result<Vec<ListingSnapshot>> {
        let mut state = self.state.lock().unwrap();
        self.gate(&mut state)?;
        Ok(state.listings.values().map(|l| self.snapshot(l)).collect())
    }

    async fn create_listing(&self, item: &InventoryItem, ask_price: f64) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        self.gate(&mut state)?;

        state.next_id += 1;
        let id = format!("SIM-{}-{}", self.channel.as_str(), state.next_id);
        state.listings.insert(
            id.clone(),
            SimListing {
                id: id.clone(),
                sku: item.product_ref.clone(),
                size: item.size.clone(),
                ask_price,
                status: ChannelStatus::Active,
                order_number: None,
            },
        );
        log::debug!("simulated {} listing {id} created", self.channel);
        Ok(id)
    }

    async fn mark_presale(&self, listing_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.gate(&mut state)?;
        match state.listings.get_mut(listing_id) {
            Some(listing) => {
                listing.status = ChannelStatus::Presale;
                Ok(())
            }
            None => Err(SyncError::ListingConflict {
                channel: self.channel,
                listing_id: listing_id.to_string(),
            }),
        }
    }

    async fn unmark_presale(&self, listing_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        self.gate(&mut state)?;
        match state.listings.get_mut(listing_id) {
            Some(listing) => {
                listing.status = ChannelStatus::Active;
                Ok(())
            }
            None => Err(SyncError::ListingConflict {
                channel: self.channel,
                listing_id: listing_id.to_string(),
            }),
        }
    }

    async fn fetch_listing(&self, listing_id: &str) -> Result<Option<ListingSnapshot>> {
        let mut state = self.state.lock().unwrap();
        self.gate(&mut state)?;
        Ok(state.listings.get(listing_id).map(|l| self.snapshot(l)))
    }

    async fn find_listing_for(
        &self,
        product_ref: &str,
        size: Option<&str>,
    ) -> Result<Option<ListingSnapshot>> {
        let mut state = self.state.lock().unwrap();
        self.gate(&mut state)?;
        Ok(state
            .listings
            .values()
            .find(|l| {
                l.sku == product_ref
                    && (size.is_none() || l.size.as_deref() == size)
                    && matches!(
                        l.status,
                        ChannelStatus::Active | ChannelStatus::Pending | ChannelStatus::Presale
                    )
            })
            .map(|l| self.snapshot(l)))
    }
}
