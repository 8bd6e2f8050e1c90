//! Service facade wiring the engine together: one database handle, one set
//! of channel adapters, shared key locks. Both the CLI daemon and the web
//! layer talk to the engine through this type.

use crate::batch::BatchCoordinator;
use crate::channel::ChannelAdapter;
use crate::db;
use crate::error::{Result, SyncError};
use crate::keylock::KeyLocks;
use crate::merge::MergeEngine;
use crate::models::{
    Channel, ImportBatch, InventoryItem, ItemFilter, RawRecord, SourceType, SourcingType,
};
use crate::reconcile::{Reconciler, ReconciliationReport};
use crate::state_machine::{StateMachine, Transition};
use rusqlite::Connection;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Payload for manually registering an inventory item.
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub product_ref: String,
    pub sourcing_type: SourcingType,
    #[serde(default)]
    pub purchase_price: Option<f64>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub quantity: Option<u32>,
}

pub struct SyncService {
    db: Arc<Mutex<Connection>>,
    adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    machine: Arc<StateMachine>,
    reconciler: Arc<Reconciler>,
    coordinator: Arc<BatchCoordinator>,
}

impl SyncService {
    /// Build the full engine over an already-open connection.
    pub fn new(
        conn: Connection,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    ) -> Result<Arc<Self>> {
        db::init_schema(&conn)?;
        let db = Arc::new(Mutex::new(conn));
        let locks = KeyLocks::new();

        let machine = Arc::new(StateMachine::new(
            db.clone(),
            adapters.clone(),
            locks.clone(),
        ));
        let merge = Arc::new(MergeEngine::new(db.clone(), locks.clone()));
        let reconciler = Arc::new(Reconciler::new(
            db.clone(),
            machine.clone(),
            adapters.clone(),
            locks,
        ));
        let coordinator = Arc::new(BatchCoordinator::new(
            db.clone(),
            merge,
            reconciler.clone(),
        ));

        Ok(Arc::new(Self {
            db,
            adapters,
            machine,
            reconciler,
            coordinator,
        }))
    }

    /// Open (or create) the database file and build the engine on it.
    pub fn open(
        path: &Path,
        adapters: HashMap<Channel, Arc<dyn ChannelAdapter>>,
    ) -> Result<Arc<Self>> {
        log::info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;
        Self::new(conn, adapters)
    }

    pub fn configured_channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.adapters.keys().copied().collect();
        channels.sort_by_key(|c| c.as_str());
        channels
    }

    // ── Imports ──────────────────────────────────────────────────────────

    pub fn create_import_batch(
        &self,
        source_type: SourceType,
        records: Vec<RawRecord>,
    ) -> Result<String> {
        self.coordinator.start(source_type, records)
    }

    pub fn get_batch_status(&self, batch_id: &str) -> Result<ImportBatch> {
        self.coordinator.poll(batch_id)
    }

    pub fn cancel_batch(&self, batch_id: &str) -> Result<()> {
        self.coordinator.cancel(batch_id)
    }

    // ── Items ────────────────────────────────────────────────────────────

    pub fn create_item(&self, new: NewItem) -> Result<InventoryItem> {
        let mut item = db::new_item(
            &new.product_ref,
            new.sourcing_type,
            new.purchase_price,
            new.size,
            new.brand,
        );
        if let Some(quantity) = new.quantity {
            item.quantity = quantity;
        }
        let conn = self.db.lock().unwrap();
        db::insert_item(&conn, &item)?;
        log::info!(
            "Registered {} item {} ({})",
            item.sourcing_type,
            item.id,
            item.product_ref
        );
        Ok(item)
    }

    pub fn get_item(&self, item_id: &str) -> Result<InventoryItem> {
        let conn = self.db.lock().unwrap();
        db::get_item(&conn, item_id)?.ok_or_else(|| SyncError::ItemNotFound(item_id.to_string()))
    }

    pub fn list_items(&self, filter: &ItemFilter) -> Result<Vec<InventoryItem>> {
        let conn = self.db.lock().unwrap();
        Ok(db::list_items(&conn, filter)?)
    }

    pub async fn transition_item(
        &self,
        item_id: &str,
        transition: Transition,
    ) -> Result<InventoryItem> {
        self.machine.apply(item_id, transition).await
    }

    // ── Reconciliation ───────────────────────────────────────────────────

    /// Run a reconciliation pass synchronously and return the report.
    pub async fn reconcile_channel(&self, channel: Channel) -> Result<ReconciliationReport> {
        self.reconciler.reconcile(channel).await
    }

    /// Run reconciliation as a tracked background job.
    pub fn start_reconcile_job(&self, channel: Channel) -> Result<String> {
        self.coordinator.start_reconcile(channel)
    }
}
