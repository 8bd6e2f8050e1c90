//! Resale Sync - reseller inventory and listing synchronization engine.
//!
//! Tracks every unit of stock through its lifecycle, keeps marketplace
//! listings consistent with local state, and deduplicates imported sale
//! records by natural key.

pub mod batch;
pub mod channel;
pub mod db;
pub mod error;
pub mod keylock;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod reconcile;
pub mod service;
pub mod state_machine;
pub mod web;

pub use error::{Result, SyncError};
pub use service::SyncService;
