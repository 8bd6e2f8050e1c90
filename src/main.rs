//! Resale Sync - reseller inventory and listing synchronization engine.
//!
//! Runs continuously, reconciling configured channels on a schedule, with an
//! optional REST API. One-shot modes cover single reconcile passes and
//! importing a JSON-lines record file.

use clap::Parser;
use resale_sync::channel::{
    ChannelAAdapter, ChannelAdapter, ChannelBAdapter, ChannelCredentials, SimulationAdapter,
};
use resale_sync::models::{Channel, RawRecord, SourceType};
use resale_sync::{web, SyncService};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Reseller inventory sync server - tracks stock lifecycle and keeps
/// marketplace listings consistent
#[derive(Parser, Debug)]
#[command(name = "resale_sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Run one reconcile pass and exit (default: run continuously)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Reconcile interval in hours when running continuously
    #[arg(long, default_value_t = 1)]
    interval_hours: u64,

    /// Enable the REST API on specified port (default: disabled)
    #[arg(long)]
    web_port: Option<u16>,

    /// Use in-memory simulated channels instead of real marketplace APIs
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Import a JSON-lines record file, wait for completion, and exit
    #[arg(long)]
    import: Option<PathBuf>,

    /// Source type for --import (channel_a, channel_b, spreadsheet, manual)
    #[arg(long, default_value = "spreadsheet")]
    source_type: SourceType,
}

/// Returns the default database path: ~/.local/share/resale_sync/resale.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("resale_sync")
        .join("resale.db")
        .to_string_lossy()
        .to_string()
}

fn build_adapters(simulate: bool) -> HashMap<Channel, Arc<dyn ChannelAdapter>> {
    let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();

    if simulate {
        log::info!("Simulation mode: using in-memory channels");
        for channel in Channel::ALL {
            adapters.insert(channel, Arc::new(SimulationAdapter::new(channel)));
        }
        return adapters;
    }

    if let Some(credentials) = ChannelCredentials::from_env(Channel::A) {
        adapters.insert(Channel::A, Arc::new(ChannelAAdapter::new(credentials)));
    }
    if let Some(credentials) = ChannelCredentials::from_env(Channel::B) {
        adapters.insert(Channel::B, Arc::new(ChannelBAdapter::new(credentials)));
    }
    if adapters.is_empty() {
        log::warn!(
            "No channel credentials found in environment; reconciliation is disabled. \
             Set CHANNEL_A_BASE_URL/CHANNEL_A_API_KEY (or CHANNEL_B_...) or use --simulate."
        );
    }
    adapters
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting resale_sync...");

    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let adapters = build_adapters(args.simulate);
    let service = match SyncService::open(&db_path, adapters) {
        Ok(service) => service,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = args.import {
        let exit_code = run_import(&service, &path, args.source_type).await;
        std::process::exit(exit_code);
    }

    if let Some(port) = args.web_port {
        let web_service = Arc::clone(&service);
        tokio::spawn(async move {
            if let Err(e) = web::serve(web_service, port).await {
                log::error!("API server error: {}", e);
            }
        });
    }

    if args.once {
        run_reconcile_pass(&service).await;
    } else {
        log::info!(
            "Running in daemon mode, reconciling every {} hour(s)",
            args.interval_hours
        );
        run_daemon(&service, args.interval_hours).await;
    }
}

/// Reconcile all configured channels on a schedule.
async fn run_daemon(service: &Arc<SyncService>, interval_hours: u64) {
    let mut ticker = interval(Duration::from_secs(interval_hours * 3600));

    loop {
        ticker.tick().await;
        run_reconcile_pass(service).await;
    }
}

/// One reconcile pass over every configured channel.
async fn run_reconcile_pass(service: &Arc<SyncService>) {
    for channel in service.configured_channels() {
        match service.reconcile_channel(channel).await {
            Ok(report) => {
                log::info!(
                    "Reconciled {channel}: {} checked, {} updated, {} conflicts, {} errors",
                    report.checked,
                    report.updated,
                    report.conflicts.len(),
                    report.errors.len()
                );
                for conflict in &report.conflicts {
                    log::warn!(
                        "Unmatched {channel} listing {} ({:?}); resolve via import or manual link",
                        conflict.listing_id,
                        conflict.channel_status
                    );
                }
            }
            Err(e) => {
                log::error!("Reconciliation of {channel} failed: {}", e);
            }
        }
    }
}

/// Import a JSON-lines file (one record object per line), wait for the
/// batch to finish, and report the outcome. Returns the process exit code.
async fn run_import(service: &Arc<SyncService>, path: &std::path::Path, source: SourceType) -> i32 {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            log::error!("Cannot read {}: {}", path.display(), e);
            return 1;
        }
    };

    let mut records: Vec<RawRecord> = Vec::new();
    for (line_number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => {
                log::error!("{}:{}: invalid record: {}", path.display(), line_number + 1, e);
                return 1;
            }
        }
    }
    log::info!("Importing {} records from {}", records.len(), path.display());

    let batch_id = match service.create_import_batch(source, records) {
        Ok(batch_id) => batch_id,
        Err(e) => {
            log::error!("Failed to start import: {}", e);
            return 1;
        }
    };

    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let batch = match service.get_batch_status(&batch_id) {
            Ok(batch) => batch,
            Err(e) => {
                log::error!("Lost track of batch {}: {}", batch_id, e);
                return 1;
            }
        };
        if batch.status.is_terminal() {
            log::info!(
                "Import {}: {} processed, {} failed",
                batch.status,
                batch.records_processed,
                batch.records_failed
            );
            return match batch.error {
                None => 0,
                Some(reason) => {
                    log::error!("Import failed: {}", reason);
                    1
                }
            };
        }
    }
}
