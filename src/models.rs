//! Domain model for the reseller inventory engine.
//!
//! Status and sourcing type are the only two lifecycle fields an item carries;
//! channel-specific flavors like "listed on the primary channel" are expressed
//! through `ItemStatus::Listed(Channel)` so no third ad hoc status string can
//! leak into persisted state.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An external sales channel.
///
/// The engine supports exactly two marketplaces; everything downstream
/// (adapters, listed statuses, listing-id columns) is keyed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    A,
    B,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::A, Channel::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::A => "channel_a",
            Channel::B => "channel_b",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel_a" | "a" => Ok(Channel::A),
            "channel_b" | "b" => Ok(Channel::B),
            other => Err(format!("unknown channel: {other:?}")),
        }
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Channel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Where a unit of stock originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcingType {
    /// Unit is physically on hand
    Physical,
    /// Sold on promise, acquired after the sale
    Presale,
    /// Fulfilled directly by a third party
    Dropship,
}

impl SourcingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourcingType::Physical => "physical",
            SourcingType::Presale => "presale",
            SourcingType::Dropship => "dropship",
        }
    }

    /// Initial item status for this sourcing type.
    pub fn initial_status(&self) -> ItemStatus {
        match self {
            SourcingType::Physical => ItemStatus::InStock,
            SourcingType::Presale => ItemStatus::Presale,
            SourcingType::Dropship => ItemStatus::Dropship,
        }
    }
}

impl fmt::Display for SourcingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourcingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physical" => Ok(SourcingType::Physical),
            "presale" => Ok(SourcingType::Presale),
            "dropship" => Ok(SourcingType::Dropship),
            other => Err(format!("unknown sourcing type: {other:?}")),
        }
    }
}

/// Lifecycle status of an inventory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    InStock,
    Presale,
    Dropship,
    Listed(Channel),
    Sold,
    Reserved,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::InStock => "in_stock",
            ItemStatus::Presale => "presale",
            ItemStatus::Dropship => "dropship",
            ItemStatus::Listed(Channel::A) => "listed_channel_a",
            ItemStatus::Listed(Channel::B) => "listed_channel_b",
            ItemStatus::Sold => "sold",
            ItemStatus::Reserved => "reserved",
            ItemStatus::Error => "error",
        }
    }

    /// `sold` is the only terminal status; nothing transitions out of it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Sold)
    }

    /// The channel this status is listed on, if any.
    pub fn listed_channel(&self) -> Option<Channel> {
        match self {
            ItemStatus::Listed(c) => Some(*c),
            _ => None,
        }
    }

    /// Statuses from which a `list(channel)` transition is legal.
    pub fn is_listable(&self) -> bool {
        matches!(
            self,
            ItemStatus::InStock | ItemStatus::Presale | ItemStatus::Dropship
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_stock" => Ok(ItemStatus::InStock),
            "presale" => Ok(ItemStatus::Presale),
            "dropship" => Ok(ItemStatus::Dropship),
            "listed_channel_a" => Ok(ItemStatus::Listed(Channel::A)),
            "listed_channel_b" => Ok(ItemStatus::Listed(Channel::B)),
            "sold" => Ok(ItemStatus::Sold),
            "reserved" => Ok(ItemStatus::Reserved),
            "error" => Ok(ItemStatus::Error),
            other => Err(format!("unknown item status: {other:?}")),
        }
    }
}

impl Serialize for ItemStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ItemStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One physical or virtual unit of stock.
///
/// Items are never deleted; sold or errored items are retained for audit.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryItem {
    pub id: String,
    pub sourcing_type: SourcingType,
    pub status: ItemStatus,
    /// Pre-error status, populated only while `status == Error`
    pub previous_status: Option<ItemStatus>,
    /// Why the item landed in `Error`
    pub error_reason: Option<String>,
    /// Presale flag on the live channel listing (set by `mark_presale`)
    pub presale_flag: bool,
    pub quantity: u32,
    /// Required for physical units; presale/dropship may acquire on demand
    pub purchase_price: Option<f64>,
    pub product_ref: String,
    pub brand: Option<String>,
    pub size: Option<String>,
    /// Channel-assigned listing id, at most one per channel
    pub listing_id_channel_a: Option<String>,
    pub listing_id_channel_b: Option<String>,
    /// Last ask price pushed to a channel
    pub ask_price: Option<f64>,
    pub created_at: String,
    pub updated_at: String,
}

impl InventoryItem {
    /// Active listing id for `channel`, if any.
    pub fn listing_id(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::A => self.listing_id_channel_a.as_deref(),
            Channel::B => self.listing_id_channel_b.as_deref(),
        }
    }

    pub fn set_listing_id(&mut self, channel: Channel, id: Option<String>) {
        match channel {
            Channel::A => self.listing_id_channel_a = id,
            Channel::B => self.listing_id_channel_b = id,
        }
    }
}

/// Order processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            other => Err(format!("unknown order status: {other:?}")),
        }
    }
}

/// A completed or pending transaction, keyed by a deterministic natural key.
///
/// This is the single ledger: both bulk imports and channel-reported sales
/// land here, deduplicated on `natural_key`.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: String,
    pub inventory_item_id: Option<String>,
    pub natural_key: String,
    pub status: OrderStatus,
    pub amount: Option<f64>,
    pub currency: String,
    pub sale_channel: Option<Channel>,
    pub sku: Option<String>,
    pub size: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Import/sync job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Cancelled
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            "cancelled" => Ok(BatchStatus::Cancelled),
            other => Err(format!("unknown batch status: {other:?}")),
        }
    }
}

/// One run of an import or reconciliation job.
#[derive(Debug, Clone, Serialize)]
pub struct ImportBatch {
    pub id: String,
    pub source_type: SourceType,
    pub status: BatchStatus,
    /// None while the total is unknown (streaming import)
    pub total_estimated: Option<u32>,
    pub records_processed: u32,
    pub records_failed: u32,
    /// Infrastructure failure message when `status == Failed`
    pub error: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl ImportBatch {
    /// Progress in percent. `None` means indeterminate (total unknown and the
    /// batch is still running); terminal batches snap to 100.
    pub fn progress(&self) -> Option<u8> {
        if self.status.is_terminal() {
            return Some(100);
        }
        let total = self.total_estimated?;
        if total == 0 {
            return Some(100);
        }
        let done = self.records_processed + self.records_failed;
        Some(((done as f64 / total as f64) * 100.0).min(100.0) as u8)
    }
}

/// Where an import batch's records came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Order feed pulled from the primary marketplace
    ChannelA,
    /// Order feed pulled from the secondary marketplace
    ChannelB,
    /// Historical spreadsheet/JSON export without channel order numbers
    Spreadsheet,
    /// Operator-entered record
    Manual,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::ChannelA => "channel_a",
            SourceType::ChannelB => "channel_b",
            SourceType::Spreadsheet => "spreadsheet",
            SourceType::Manual => "manual",
        }
    }

    /// The channel this source's orders settle on, if it is channel-bound.
    pub fn channel(&self) -> Option<Channel> {
        match self {
            SourceType::ChannelA => Some(Channel::A),
            SourceType::ChannelB => Some(Channel::B),
            SourceType::Spreadsheet | SourceType::Manual => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "channel_a" => Ok(SourceType::ChannelA),
            "channel_b" => Ok(SourceType::ChannelB),
            "spreadsheet" => Ok(SourceType::Spreadsheet),
            "manual" => Ok(SourceType::Manual),
            other => Err(format!("unknown source type: {other:?}")),
        }
    }
}

/// Channel-native listing state, normalized across both marketplaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Active,
    Pending,
    Presale,
    Sold,
    Deleted,
}

/// Normalized, channel-reported view of one listing at a point in time.
///
/// Transient: produced by a channel adapter, folded into the matching
/// `InventoryItem` by reconciliation, never persisted verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct ListingSnapshot {
    pub channel: Channel,
    pub channel_listing_id: String,
    pub ask_price: Option<f64>,
    pub channel_status: ChannelStatus,
    /// Channel order number, set once the listing has been consumed by a sale
    pub order_number: Option<String>,
    pub observed_at: String,
}

/// A raw import row: field name → value, as handed over by the upstream
/// file/API reader. The engine never sees file formats, only these maps.
pub type RawRecord = BTreeMap<String, String>;

/// Normalized representation of one import row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub natural_key: String,
    pub source_type: SourceType,
    pub status: OrderStatus,
    pub amount: Option<f64>,
    pub currency: String,
    pub product_ref: String,
    pub sku: String,
    pub size: Option<String>,
    pub brand: Option<String>,
    pub sale_channel: Option<Channel>,
    pub transaction_date: Option<String>,
    pub purchase_price: Option<f64>,
    pub sourcing_type: SourcingType,
}

/// Read-side filter for `list_items`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemFilter {
    pub status: Option<ItemStatus>,
    pub sourcing_type: Option<SourcingType>,
    /// Items currently listed on this channel
    pub channel: Option<Channel>,
    pub product_ref: Option<String>,
}

/// Current UTC time as an RFC 3339 string, the storage format for all
/// timestamp columns.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
