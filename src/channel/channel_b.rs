//! HTTP adapter for the secondary marketplace (Channel B).
//!
//! Channel B's API is snake_case JSON with integer cent amounts and
//! lower-case state strings. Presale flagging is a PATCH on the listing.

use crate::error::{Result, SyncError};
use crate::models::{now_rfc3339, Channel, ChannelStatus, InventoryItem, ListingSnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{ChannelAdapter, ChannelCredentials, MAX_IN_FLIGHT};

#[derive(Debug, Deserialize)]
struct WireListing {
    id: String,
    state: String,
    price_cents: Option<i64>,
    order_number: Option<String>,
    sku: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateListingBody<'a> {
    sku: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    price_cents: i64,
}

#[derive(Debug, Deserialize)]
struct CreateListingResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct PresaleBody {
    presale: bool,
}

pub struct ChannelBAdapter {
    client: reqwest::Client,
    credentials: ChannelCredentials,
    limiter: Arc<Semaphore>,
}

impl ChannelBAdapter {
    pub fn new(credentials: ChannelCredentials) -> Self {
        Self {
            client: super::http_client(),
            credentials,
            limiter: Arc::new(Semaphore::new(MAX_IN_FLIGHT)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.base_url.trim_end_matches('/'), path)
    }

    fn auth_header(&self) -> String {
        format!("Token {}", self.credentials.api_key)
    }

    fn check_status(&self, status: reqwest::StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::HttpStatus {
                channel: Channel::B,
                status,
            })
        }
    }

    fn to_snapshot(&self, wire: WireListing) -> ListingSnapshot {
        ListingSnapshot {
            channel: Channel::B,
            channel_listing_id: wire.id,
            ask_price: wire.price_cents.map(|c| c as f64 / 100.0),
            channel_status: map_state(&wire.state),
            order_number: wire.order_number,
            observed_at: now_rfc3339(),
        }
    }
}

fn map_state(raw: &str) -> ChannelStatus {
    match raw.to_ascii_lowercase().as_str() {
        "active" | "listed" => ChannelStatus::Active,
        "pending" | "draft" => ChannelStatus::Pending,
        "presale" => ChannelStatus::Presale,
        "sold" | "fulfilled" => ChannelStatus::Sold,
        "deleted" | "removed" | "expired" => ChannelStatus::Deleted,
        other => {
            log::warn!("channel_b reported unknown listing state {other:?}");
            ChannelStatus::Pending
        }
    }
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

#[async_trait]
impl ChannelAdapter for ChannelBAdapter {
    fn channel(&self) -> Channel {
        Channel::B
    }

    async fn list_snapshots(&self) -> Result<Vec<ListingSnapshot>> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .get(self.url("/api/listings"))
            .header("Authorization", self.auth_header())
            .send()
            .await?;
        self.check_status(response.status())?;

        let listings: Vec<WireListing> = response.json().await?;
        log::debug!("channel_b returned {} listings", listings.len());
        Ok(listings.into_iter().map(|w| self.to_snapshot(w)).collect())
    }

    async fn create_listing(&self, item: &InventoryItem, ask_price: f64) -> Result<String> {
        let _permit = self.limiter.acquire().await;
        let body = CreateListingBody {
            sku: &item.product_ref,
            size: item.size.as_deref(),
            price_cents: to_cents(ask_price),
        };
        let response = self
            .client
            .post(self.url("/api/listings"))
            .header("Authorization", self.auth_header())
            .json(&body)
            .send()
            .await?;
        self.check_status(response.status())?;

        let created: CreateListingResponse = response.json().await?;
        log::info!(
            "channel_b listing created: {} for {}",
            created.id,
            item.product_ref
        );
        Ok(created.id)
    }

    async fn mark_presale(&self, listing_id: &str) -> Result<()> {
        self.set_presale(listing_id, true).await
    }

    async fn unmark_presale(&self, listing_id: &str) -> Result<()> {
        self.set_presale(listing_id, false).await
    }

    async fn fetch_listing(&self, listing_id: &str) -> Result<Option<ListingSnapshot>> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .get(self.url(&format!("/api/listings/{listing_id}")))
            .header("Authorization", self.auth_header())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        self.check_status(response.status())?;

        let wire: WireListing = response.json().await?;
        Ok(Some(self.to_snapshot(wire)))
    }

    async fn find_listing_for(
        &self,
        product_ref: &str,
        size: Option<&str>,
    ) -> Result<Option<ListingSnapshot>> {
        let _permit = self.limiter.acquire().await;
        let mut query = vec![("sku", product_ref.to_string())];
        if let Some(size) = size {
            query.push(("size", size.to_string()));
        }
        let response = self
            .client
            .get(self.url("/api/listings"))
            .query(&query)
            .header("Authorization", self.auth_header())
            .send()
            .await?;
        self.check_status(response.status())?;

        let listings: Vec<WireListing> = response.json().await?;
        Ok(listings
            .into_iter()
            .filter(|w| {
                w.sku.as_deref() == Some(product_ref)
                    && (size.is_none() || w.size.as_deref() == size)
            })
            .map(|w| self.to_snapshot(w))
            .find(|s| {
                matches!(
                    s.channel_status,
                    ChannelStatus::Active | ChannelStatus::Pending | ChannelStatus::Presale
                )
            }))
    }
}

impl ChannelBAdapter {
    async fn set_presale(&self, listing_id: &str, presale: bool) -> Result<()> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .patch(self.url(&format!("/api/listings/{listing_id}")))
            .header("Authorization", self.auth_header())
            .json(&PresaleBody { presale })
            .send()
            .await?;
        self.check_status(response.status())
    }
}
