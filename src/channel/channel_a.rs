//! HTTP adapter for the primary marketplace (Channel A).
//!
//! Channel A speaks camelCase JSON with nested amount objects and upper-case
//! status strings. Listing ids are opaque strings assigned by the channel.

use crate::error::{Result, SyncError};
use crate::models::{now_rfc3339, Channel, ChannelStatus, InventoryItem, ListingSnapshot};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::{ChannelAdapter, ChannelCredentials, MAX_IN_FLIGHT};

/// Nested money object used throughout Channel A's API
#[derive(Debug, Serialize, Deserialize)]
struct WireAmount {
    amount: f64,
    currency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireListing {
    listing_id: String,
    status: String,
    ask: Option<WireAmount>,
    order_number: Option<String>,
    sku: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingsPage {
    listings: Vec<WireListing>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateListingBody<'a> {
    sku: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<&'a str>,
    ask: WireAmount,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateListingResponse {
    listing_id: String,
}

pub struct ChannelAAdapter {
    client: reqwest::Client,
    credentials: ChannelCredentials,
    limiter: Arc<Semaphore>,
}

impl ChannelAAdapter {
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

    fn check_status(&self, status: reqwest::StatusCode) -> Result<()> {
        if status.is_success() {
            Ok(())
        } else {
            Err(SyncError::HttpStatus {
                channel: Channel::A,
                status,
            })
        }
    }

    fn to_snapshot(&self, wire: WireListing) -> ListingSnapshot {
        ListingSnapshot {
            channel: Channel::A,
            channel_listing_id: wire.listing_id,
            ask_price: wire.ask.as_ref().map(|a| a.amount),
            channel_status: map_status(&wire.status),
            order_number: wire.order_number,
            observed_at: now_rfc3339(),
        }
    }
}

/// Map Channel A's native status strings onto the normalized enum.
/// Unknown statuses are treated as pending and logged.
fn map_status(raw: &str) -> ChannelStatus {
    match raw.to_ascii_uppercase().as_str() {
        "ACTIVE" => ChannelStatus::Active,
        "PENDING" | "CREATED" => ChannelStatus::Pending,
        "PRESALE" => ChannelStatus::Presale,
        "SOLD" | "COMPLETED" | "MATCHED" => ChannelStatus::Sold,
        "DELETED" | "INACTIVE" | "EXPIRED" => ChannelStatus::Deleted,
        other => {
            log::warn!("channel_a reported unknown listing status {other:?}");
            ChannelStatus::Pending
        }
    }
}

#[async_trait]
impl ChannelAdapter for ChannelAAdapter {
    fn channel(&self) -> Channel {
        Channel::A
    }

    async fn list_snapshots(&self) -> Result<Vec<ListingSnapshot>> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .get(self.url("/v2/selling/listings"))
            .bearer_auth(&self.credentials.api_key)
            .send()
            .await?;
        self.check_status(response.status())?;

        let page: ListingsPage = response.json().await?;
        log::debug!("channel_a returned {} listings", page.listings.len());
        Ok(page
            .listings
            .into_iter()
            .map(|w| self.to_snapshot(w))
            .collect())
    }

    async fn create_listing(&self, item: &InventoryItem, ask_price: f64) -> Result<String> {
        let _permit = self.limiter.acquire().await;
        let body = CreateListingBody {
            sku: &item.product_ref,
            size: item.size.as_deref(),
            ask: WireAmount {
                amount: ask_price,
                currency: "EUR".to_string(),
            },
        };
        let response = self
            .client
            .post(self.url("/v2/selling/listings"))
            .bearer_auth(&self.credentials.api_key)
            .json(&body)
            .send()
            .await?;
        self.check_status(response.status())?;

        let created: CreateListingResponse = response.json().await?;
        log::info!(
            "channel_a listing created: {} for {}",
            created.listing_id,
            item.product_ref
        );
        Ok(created.listing_id)
    }

    async fn mark_presale(&self, listing_id: &str) -> Result<()> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .put(self.url(&format!("/v2/selling/listings/{listing_id}/presale")))
            .bearer_auth(&self.credentials.api_key)
            .send()
            .await?;
        self.check_status(response.status())
    }

    async fn unmark_presale(&self, listing_id: &str) -> Result<()> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .delete(self.url(&format!("/v2/selling/listings/{listing_id}/presale")))
            .bearer_auth(&self.credentials.api_key)
            .send()
            .await?;
        self.check_status(response.status())
    }

    async fn fetch_listing(&self, listing_id: &str) -> Result<Option<ListingSnapshot>> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .client
            .get(self.url(&format!("/v2/selling/listings/{listing_id}")))
            .bearer_auth(&self.credentials.api_key)
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
            .get(self.url("/v2/selling/listings"))
            .query(&query)
            .bearer_auth(&self.credentials.api_key)
            .send()
            .await?;
        self.check_status(response.status())?;

        let page: ListingsPage = response.json().await?;
        // Re-check the filter client-side; the endpoint has been seen to
        // ignore unknown query params instead of rejecting them.
        Ok(page
            .listings
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

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn adapter(server: &MockServer) -> ChannelAAdapter {
        ChannelAAdapter::new(ChannelCredentials {
            base_url: server.uri(),
            api_key: "test-key".into(),
        })
    }

    fn test_item() -> InventoryItem {
        crate::db::new_item(
            "SKU1",
            crate::models::SourcingType::Physical,
            Some(80.0),
            Some("10".into()),
            None,
        )
    }

    #[tokio::test]
    async fn list_snapshots_decodes_camel_case_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/selling/listings"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "listings": [
                    {
                        "listingId": "L-1",
                        "status": "ACTIVE",
                        "ask": {"amount": 120.0, "currency": "EUR"},
                        "orderNumber": null,
                        "sku": "SKU1",
                        "size": "10"
                    },
                    {
                        "listingId": "L-2",
                        "status": "SOLD",
                        "ask": null,
                        "orderNumber": "A-1001",
                        "sku": "SKU2",
                        "size": null
                    }
                ]
            })))
            .mount(&server)
            .await;

        let snapshots = adapter(&server).list_snapshots().await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].channel_listing_id, "L-1");
        assert_eq!(snapshots[0].channel_status, ChannelStatus::Active);
        assert_eq!(snapshots[0].ask_price, Some(120.0));
        assert_eq!(snapshots[1].channel_status, ChannelStatus::Sold);
        assert_eq!(snapshots[1].order_number.as_deref(), Some("A-1001"));
    }

    #[tokio::test]
    async fn create_listing_posts_nested_amount() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/selling/listings"))
            .and(body_partial_json(serde_json::json!({
                "sku": "SKU1",
                "ask": {"amount": 150.0, "currency": "EUR"}
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(serde_json::json!({"listingId": "L-99"})),
            )
            .mount(&server)
            .await;

        let id = adapter(&server)
            .create_listing(&test_item(), 150.0)
            .await
            .unwrap();
        assert_eq!(id, "L-99");
    }

    #[tokio::test]
    async fn fetch_listing_maps_404_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/selling/listings/L-gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = adapter(&server).fetch_listing("L-gone").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/selling/listings"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = adapter(&server).list_snapshots().await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn find_listing_for_ignores_dead_listings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/selling/listings"))
            .and(query_param("sku", "SKU1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "listings": [
                    {"listingId": "L-dead", "status": "DELETED", "ask": null,
                     "orderNumber": null, "sku": "SKU1", "size": "10"},
                    {"listingId": "L-live", "status": "ACTIVE",
                     "ask": {"amount": 99.0, "currency": "EUR"},
                     "orderNumber": null, "sku": "SKU1", "size": "10"}
                ]
            })))
            .mount(&server)
            .await;

        let found = adapter(&server)
            .find_listing_for("SKU1", Some("10"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.channel_listing_id, "L-live");
    }

    #[test]
    fn unknown_status_maps_to_pending() {
        assert_eq!(map_status("SOMETHING_NEW"), ChannelStatus::Pending);
        assert_eq!(map_status("active"), ChannelStatus::Active);
        assert_eq!(map_status("Matched"), ChannelStatus::Sold);
    }
}
