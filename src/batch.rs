//! Batch coordinator: job tracking for imports and reconciliation runs.
//!
//! One record failing never aborts a batch; only infrastructure failures
//! (database unavailable) do. Cancellation is cooperative, checked between
//! units, and already-applied merges stay applied.

use crate::db;
use crate::error::{Result, SyncError};
use crate::merge::MergeEngine;
use crate::models::{
    now_rfc3339, BatchStatus, Channel, ImportBatch, RawRecord, SourceType,
};
use crate::normalize::normalize;
use crate::reconcile::Reconciler;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub struct BatchCoordinator {
    db: Arc<Mutex<Connection>>,
    merge: Arc<MergeEngine>,
    reconciler: Arc<Reconciler>,
    /// Cancellation flags for running jobs
    jobs: Mutex<HashMap<String, Arc<AtomicBool>>>,
}

impl BatchCoordinator {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        merge: Arc<MergeEngine>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            db,
            merge,
            reconciler,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn create_batch(
        &self,
        source_type: SourceType,
        total_estimated: Option<u32>,
    ) -> Result<ImportBatch> {
        let batch = ImportBatch {
            id: uuid::Uuid::new_v4().to_string(),
            source_type,
            status: BatchStatus::Pending,
            total_estimated,
            records_processed: 0,
            records_failed: 0,
            error: None,
            created_at: now_rfc3339(),
            completed_at: None,
        };
        let conn = self.db.lock().unwrap();
        db::insert_batch(&conn, &batch)?;
        Ok(batch)
    }

    fn save(&self, batch: &ImportBatch) -> Result<()> {
        let conn = self.db.lock().unwrap();
        db::update_batch(&conn, batch)?;
        Ok(())
    }

    fn register(&self, batch_id: &str) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.jobs
            .lock()
            .unwrap()
            .insert(batch_id.to_string(), flag.clone());
        flag
    }

    fn deregister(&self, batch_id: &str) {
        self.jobs.lock().unwrap().remove(batch_id);
    }

    /// Start an import of a known-size record set. Returns immediately with
    /// the batch id; processing runs in a background task.
    pub fn start(
        self: &Arc<Self>,
        source_type: SourceType,
        records: Vec<RawRecord>,
    ) -> Result<String> {
        let batch = self.create_batch(source_type, Some(records.len() as u32))?;
        let batch_id = batch.id.clone();
        log::info!(
            "Import batch {batch_id} created: {} {} records",
            records.len(),
            source_type
        );

        let coordinator = self.clone();
        let cancel = self.register(&batch_id);
        tokio::spawn(async move {
            coordinator
                .run_import(batch, source_type, records, cancel)
                .await;
        });
        Ok(batch_id)
    }

    /// Start an import fed by a stream of unknown length. Progress reads as
    /// indeterminate until the stream ends.
    pub fn start_streaming(
        self: &Arc<Self>,
        source_type: SourceType,
        mut rx: mpsc::Receiver<RawRecord>,
    ) -> Result<String> {
        let batch = self.create_batch(source_type, None)?;
        let batch_id = batch.id.clone();
        log::info!("Streaming import batch {batch_id} created ({source_type})");

        let coordinator = self.clone();
        let cancel = self.register(&batch_id);
        tokio::spawn(async move {
            let mut batch = batch;
            batch.status = BatchStatus::Processing;
            if coordinator.save(&batch).is_err() {
                return;
            }
            while let Some(record) = rx.recv().await {
                if cancel.load(Ordering::SeqCst) {
                    coordinator.finish(&mut batch, BatchStatus::Cancelled, None);
                    return;
                }
                if !coordinator
                    .process_one(&mut batch, source_type, &record)
                    .await
                {
                    return;
                }
            }
            // Stream exhausted: the total is now known and progress snaps
            batch.total_estimated = Some(batch.records_processed + batch.records_failed);
            coordinator.finish(&mut batch, BatchStatus::Completed, None);
        });
        Ok(batch_id)
    }

    /// Run a reconciliation pass as a tracked job.
    pub fn start_reconcile(self: &Arc<Self>, channel: Channel) -> Result<String> {
        let source_type = match channel {
            Channel::A => SourceType::ChannelA,
            Channel::B => SourceType::ChannelB,
        };
        let batch = self.create_batch(source_type, None)?;
        let batch_id = batch.id.clone();
        log::info!("Reconciliation batch {batch_id} created for {channel}");

        let coordinator = self.clone();
        self.register(&batch_id);
        tokio::spawn(async move {
            let mut batch = batch;
            batch.status = BatchStatus::Processing;
            if coordinator.save(&batch).is_err() {
                return;
            }
            match coordinator.reconciler.reconcile(channel).await {
                Ok(report) => {
                    batch.records_processed = report.checked;
                    batch.records_failed =
                        (report.errors.len() + report.conflicts.len()) as u32;
                    batch.total_estimated = Some(batch.records_processed + batch.records_failed);
                    coordinator.finish(&mut batch, BatchStatus::Completed, None);
                }
                Err(e) => {
                    coordinator.finish(&mut batch, BatchStatus::Failed, Some(e.to_string()));
                }
            }
        });
        Ok(batch_id)
    }

    async fn run_import(
        &self,
        mut batch: ImportBatch,
        source_type: SourceType,
        records: Vec<RawRecord>,
        cancel: Arc<AtomicBool>,
    ) {
        batch.status = BatchStatus::Processing;
        if let Err(e) = self.save(&batch) {
            log::error!("Batch {} could not start: {e}", batch.id);
            self.deregister(&batch.id);
            return;
        }

        for record in &records {
            if cancel.load(Ordering::SeqCst) {
                log::info!("Batch {} cancelled after {} units", batch.id, batch.records_processed);
                self.finish(&mut batch, BatchStatus::Cancelled, None);
                return;
            }
            if !self.process_one(&mut batch, source_type, record).await {
                return;
            }
        }

        self.finish(&mut batch, BatchStatus::Completed, None);
    }

    /// Process a single record. Returns false when the batch aborted.
    async fn process_one(
        &self,
        batch: &mut ImportBatch,
        source_type: SourceType,
        record: &RawRecord,
    ) -> bool {
        match normalize(record, source_type) {
            Ok(normalized) => match self.merge.merge(&normalized).await {
                Ok(result) => {
                    log::debug!(
                        "Batch {}: {} {:?}",
                        batch.id,
                        normalized.natural_key,
                        result.outcome
                    );
                    batch.records_processed += 1;
                }
                Err(SyncError::Database(e)) => {
                    // Infrastructure failure: abort the whole batch
                    log::error!("Batch {} aborted, database error: {e}", batch.id);
                    self.finish(batch, BatchStatus::Failed, Some(e.to_string()));
                    return false;
                }
                Err(e) => {
                    log::warn!("Batch {}: record failed: {e}", batch.id);
                    batch.records_failed += 1;
                }
            },
            Err(e) => {
                log::warn!("Batch {}: record rejected: {e}", batch.id);
                batch.records_failed += 1;
            }
        }

        // Progress is recomputed from the counters after every unit
        if let Err(e) = self.save(batch) {
            log::error!("Batch {} aborted, cannot persist progress: {e}", batch.id);
            self.finish(batch, BatchStatus::Failed, Some(e.to_string()));
            return false;
        }
        true
    }

    fn finish(&self, batch: &mut ImportBatch, status: BatchStatus, error: Option<String>) {
        batch.status = status;
        batch.error = error;
        batch.completed_at = Some(now_rfc3339());
        if let Err(e) = self.save(batch) {
            log::error!("Failed to persist terminal state for batch {}: {e}", batch.id);
        }
        self.deregister(&batch.id);
        log::info!(
            "Batch {} finished: {status}, {} processed, {} failed",
            batch.id,
            batch.records_processed,
            batch.records_failed
        );
    }

    /// Current state of a batch.
    pub fn poll(&self, batch_id: &str) -> Result<ImportBatch> {
        let conn = self.db.lock().unwrap();
        db::get_batch(&conn, batch_id)?.ok_or_else(|| SyncError::BatchNotFound(batch_id.into()))
    }

    /// Request cooperative cancellation. A batch that already finished is
    /// left as-is.
    pub fn cancel(&self, batch_id: &str) -> Result<()> {
        if let Some(flag) = self.jobs.lock().unwrap().get(batch_id) {
            flag.store(true, Ordering::SeqCst);
            log::info!("Cancellation requested for batch {batch_id}");
            return Ok(());
        }
        // Not running: valid only if the batch exists at all
        self.poll(batch_id).map(|_| ())
    }
}
