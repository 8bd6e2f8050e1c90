//! Channel adapters: one per external marketplace.
//!
//! Everything above this module (reconciliation, state machine) depends only
//! on the [`ChannelAdapter`] trait, never on a concrete channel type. Adapters
//! hold read-only credentials and are safe to call concurrently; the only
//! shared mutable state is a call-concurrency limiter.

mod channel_a;
mod channel_b;
pub mod simulation;

pub use channel_a::ChannelAAdapter;
pub use channel_b::ChannelBAdapter;
pub use simulation::SimulationAdapter;

use crate::error::{Result, SyncError};
use crate::models::{Channel, InventoryItem, ListingSnapshot};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// Maximum attempts for a transient-failure retry loop
pub const MAX_ATTEMPTS: u32 = 4;
/// First backoff delay; doubles per attempt
pub const BASE_BACKOFF: Duration = Duration::from_millis(250);
/// Per-request timeout for channel HTTP calls
pub const CALL_TIMEOUT: Duration = Duration::from_secs(15);
/// Concurrent in-flight calls allowed per channel (coarse rate limiting)
pub const MAX_IN_FLIGHT: usize = 4;

/// Capability interface implemented once per marketplace.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Which channel this adapter talks to
    fn channel(&self) -> Channel;

    /// All listings the channel currently knows for our account
    async fn list_snapshots(&self) -> Result<Vec<ListingSnapshot>>;

    /// Create a listing for `item` at `ask_price`; returns the channel's
    /// listing id. Callers are expected to probe with [`find_listing_for`]
    /// before retrying a create, so a repeated call never duplicates.
    ///
    /// [`find_listing_for`]: ChannelAdapter::find_listing_for
    async fn create_listing(&self, item: &InventoryItem, ask_price: f64) -> Result<String>;

    /// Flag an existing listing as presale
    async fn mark_presale(&self, listing_id: &str) -> Result<()>;

    /// Remove the presale flag
    async fn unmark_presale(&self, listing_id: &str) -> Result<()>;

    /// Fetch one listing; `None` when the channel no longer knows the id
    async fn fetch_listing(&self, listing_id: &str) -> Result<Option<ListingSnapshot>>;

    /// Look up a live listing for a product/size combination. Used as the
    /// check-before-create idempotency probe.
    async fn find_listing_for(
        &self,
        product_ref: &str,
        size: Option<&str>,
    ) -> Result<Option<ListingSnapshot>>;
}

/// Credentials and endpoint for one channel. Shared read-only.
#[derive(Debug, Clone)]
pub struct ChannelCredentials {
    pub base_url: String,
    pub api_key: String,
}

impl ChannelCredentials {
    pub fn from_env(channel: Channel) -> Option<Self> {
        let prefix = match channel {
            Channel::A => "CHANNEL_A",
            Channel::B => "CHANNEL_B",
        };
        let base_url = std::env::var(format!("{prefix}_BASE_URL")).ok()?;
        let api_key = std::env::var(format!("{prefix}_API_KEY")).ok()?;
        Some(Self { base_url, api_key })
    }
}

/// Run `op` with exponential backoff on transient failures.
///
/// Non-transient errors surface immediately. Exhausting the attempt budget
/// converts the last transient error into [`SyncError::ChannelUnavailable`],
/// which callers treat as "touch nothing".
pub async fn with_retry<T, F, Fut>(channel: Channel, op_name: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = BASE_BACKOFF;
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                log::warn!(
                    "{channel} {op_name} failed (attempt {attempt}/{MAX_ATTEMPTS}), retrying in {:?}: {e}",
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                log::error!("{channel} {op_name} failed after {MAX_ATTEMPTS} attempts: {e}");
                return Err(SyncError::ChannelUnavailable {
                    channel,
                    attempts: MAX_ATTEMPTS,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

/// Build the shared reqwest client with the per-call timeout applied.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(CALL_TIMEOUT)
        .user_agent(concat!("resale_sync/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
