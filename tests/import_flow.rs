//! Integration tests for the full import/listing/reconciliation flow.
//!
//! These tests run the engine end to end against simulated channels:
//! records go in through the batch coordinator, listings are created through
//! the state machine, and channel-side events come back via reconciliation.

use resale_sync::channel::{ChannelAdapter, SimulationAdapter};
use resale_sync::models::{
    BatchStatus, Channel, ItemFilter, ItemStatus, RawRecord, SourceType, SourcingType,
};
use resale_sync::service::{NewItem, SyncService};
use resale_sync::state_machine::Transition;
use resale_sync::SyncError;
use rusqlite::Connection;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn build_service() -> (Arc<SyncService>, Arc<SimulationAdapter>, Arc<SimulationAdapter>) {
    let sim_a = Arc::new(SimulationAdapter::new(Channel::A));
    let sim_b = Arc::new(SimulationAdapter::new(Channel::B));
    let mut adapters: HashMap<Channel, Arc<dyn ChannelAdapter>> = HashMap::new();
    adapters.insert(Channel::A, sim_a.clone());
    adapters.insert(Channel::B, sim_b.clone());

    let conn = Connection::open_in_memory().unwrap();
    let service = SyncService::new(conn, adapters).unwrap();
    (service, sim_a, sim_b)
}

fn order_record(order_number: &str, sku: &str, status: &str) -> RawRecord {
    [
        ("order_number", order_number),
        ("sku", sku),
        ("size", "10"),
        ("amount", "120.00"),
        ("currency", "EUR"),
        ("status", status),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn physical_item(sku: &str) -> NewItem {
    NewItem {
        product_ref: sku.to_string(),
        sourcing_type: SourcingType::Physical,
        purchase_price: Some(80.0),
        size: Some("10".into()),
        brand: None,
        quantity: None,
    }
}

async fn wait_batch(service: &SyncService, batch_id: &str) -> resale_sync::models::ImportBatch {
    for _ in 0..300 {
        let batch = service.get_batch_status(batch_id).unwrap();
        if batch.status.is_terminal() {
            return batch;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("batch {batch_id} did not finish");
}

// ==================== Import Path ====================

mod importing {
    use super::*;

    #[tokio::test]
    async fn completed_order_creates_sold_item() {
        let (service, _, _) = build_service();

        let batch_id = service
            .create_import_batch(
                SourceType::ChannelA,
                vec![order_record("A-1001", "SKU1", "completed")],
            )
            .unwrap();
        let batch = wait_batch(&service, &batch_id).await;

        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.records_processed, 1);
        assert_eq!(batch.records_failed, 0);

        let items = service.list_items(&ItemFilter::default()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ItemStatus::Sold);
        assert_eq!(items[0].product_ref, "SKU1");
    }

    #[tokio::test]
    async fn reimport_of_same_records_changes_nothing() {
        let (service, _, _) = build_service();
        let records = vec![
            order_record("A-1001", "SKU1", "completed"),
            order_record("A-1002", "SKU2", "completed"),
        ];

        let first = service
            .create_import_batch(SourceType::ChannelA, records.clone())
            .unwrap();
        wait_batch(&service, &first).await;
        let items_before = service.list_items(&ItemFilter::default()).unwrap();

        let second = service
            .create_import_batch(SourceType::ChannelA, records)
            .unwrap();
        let batch = wait_batch(&service, &second).await;

        // All records are recognized as duplicates, nothing fails
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.records_processed, 2);
        assert_eq!(batch.records_failed, 0);

        let items_after = service.list_items(&ItemFilter::default()).unwrap();
        assert_eq!(items_after.len(), items_before.len());
        for (before, after) in items_before.iter().zip(&items_after) {
            assert_eq!(before.id, after.id);
            assert_eq!(before.updated_at, after.updated_at);
        }
    }

    #[tokio::test]
    async fn pending_order_completes_on_later_import() {
        let (service, _, _) = build_service();

        let first = service
            .create_import_batch(
                SourceType::ChannelA,
                vec![order_record("A-1001", "SKU1", "pending")],
            )
            .unwrap();
        wait_batch(&service, &first).await;

        let items = service.list_items(&ItemFilter::default()).unwrap();
        assert_eq!(items[0].status, ItemStatus::InStock);

        let second = service
            .create_import_batch(
                SourceType::ChannelA,
                vec![order_record("A-1001", "SKU1", "completed")],
            )
            .unwrap();
        wait_batch(&service, &second).await;

        // Completion advances the order and sells the linked item
        let items = service.list_items(&ItemFilter::default()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ItemStatus::Sold);
    }

    #[tokio::test]
    async fn malformed_records_are_counted_not_fatal() {
        let (service, _, _) = build_service();
        let mut garbage = RawRecord::new();
        garbage.insert("size".into(), "10".into());

        let batch_id = service
            .create_import_batch(
                SourceType::ChannelA,
                vec![garbage, order_record("A-1001", "SKU1", "completed")],
            )
            .unwrap();
        let batch = wait_batch(&service, &batch_id).await;

        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.records_processed, 1);
        assert_eq!(batch.records_failed, 1);
    }
}

// ==================== Listing Lifecycle ====================

mod listing {
    use super::*;

    #[tokio::test]
    async fn list_then_channel_sale_via_reconcile() {
        let (service, sim_a, _) = build_service();
        let item = service.create_item(physical_item("SKU1")).unwrap();

        let listed = service
            .transition_item(
                &item.id,
                Transition::List {
                    channel: Channel::A,
                    ask_price: 120.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.status, ItemStatus::Listed(Channel::A));
        let listing_id = listed.listing_id(Channel::A).unwrap().to_string();

        sim_a.report_sold(&listing_id, "A-9001");
        let report = service.reconcile_channel(Channel::A).await.unwrap();
        assert_eq!(report.checked, 1);
        assert_eq!(report.updated, 1);
        assert!(report.conflicts.is_empty());

        let sold = service.get_item(&item.id).unwrap();
        assert_eq!(sold.status, ItemStatus::Sold);
        assert!(sold.listing_id(Channel::A).is_none());
    }

    #[tokio::test]
    async fn presale_item_lifecycle() {
        let (service, _, sim_b) = build_service();
        let item = service
            .create_item(NewItem {
                sourcing_type: SourcingType::Presale,
                purchase_price: None,
                ..physical_item("SKU9")
            })
            .unwrap();
        assert_eq!(item.status, ItemStatus::Presale);

        let listed = service
            .transition_item(
                &item.id,
                Transition::List {
                    channel: Channel::B,
                    ask_price: 200.0,
                },
            )
            .await
            .unwrap();
        let listing_id = listed.listing_id(Channel::B).unwrap().to_string();

        let flagged = service
            .transition_item(&item.id, Transition::MarkPresale(Channel::B))
            .await
            .unwrap();
        assert!(flagged.presale_flag);
        assert_eq!(flagged.status, ItemStatus::Listed(Channel::B));

        sim_b.report_sold(&listing_id, "B-555");
        service.reconcile_channel(Channel::B).await.unwrap();
        let sold = service.get_item(&item.id).unwrap();
        assert_eq!(sold.status, ItemStatus::Sold);
    }

    #[tokio::test]
    async fn failed_listing_parks_item_then_retry_recovers() {
        let (service, sim_a, _) = build_service();
        let item = service.create_item(physical_item("SKU1")).unwrap();

        sim_a.set_unavailable(true);
        let result = service
            .transition_item(
                &item.id,
                Transition::List {
                    channel: Channel::A,
                    ask_price: 120.0,
                },
            )
            .await;
        assert!(matches!(result, Err(SyncError::ChannelUnavailable { .. })));

        let parked = service.get_item(&item.id).unwrap();
        assert_eq!(parked.status, ItemStatus::Error);
        assert_eq!(parked.previous_status, Some(ItemStatus::Listed(Channel::A)));
        assert!(parked.error_reason.is_some());

        sim_a.set_unavailable(false);
        let recovered = service
            .transition_item(&item.id, Transition::Retry)
            .await
            .unwrap();
        assert_eq!(recovered.status, ItemStatus::Listed(Channel::A));
        assert!(recovered.error_reason.is_none());

        // The retry found no channel-side listing and created exactly one
        assert_eq!(sim_a.listing_count(), 1);
    }

    #[tokio::test]
    async fn reserve_blocks_listing_until_release() {
        let (service, _, _) = build_service();
        let item = service.create_item(physical_item("SKU1")).unwrap();

        service
            .transition_item(&item.id, Transition::Reserve)
            .await
            .unwrap();
        let result = service
            .transition_item(
                &item.id,
                Transition::List {
                    channel: Channel::A,
                    ask_price: 100.0,
                },
            )
            .await;
        assert!(matches!(result, Err(SyncError::InvalidTransition { .. })));

        service
            .transition_item(&item.id, Transition::Release)
            .await
            .unwrap();
        let listed = service
            .transition_item(
                &item.id,
                Transition::List {
                    channel: Channel::A,
                    ask_price: 100.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.status, ItemStatus::Listed(Channel::A));
    }
}

// ==================== Reconciliation ====================

mod reconciliation {
    use super::*;

    #[tokio::test]
    async fn vanished_listing_is_parked_in_error() {
        let (service, sim_a, _) = build_service();
        let item = service.create_item(physical_item("SKU1")).unwrap();
        let listed = service
            .transition_item(
                &item.id,
                Transition::List {
                    channel: Channel::A,
                    ask_price: 120.0,
                },
            )
            .await
            .unwrap();

        sim_a.vanish(listed.listing_id(Channel::A).unwrap());
        let report = service.reconcile_channel(Channel::A).await.unwrap();
        assert_eq!(report.updated, 1);

        let parked = service.get_item(&item.id).unwrap();
        assert_eq!(parked.status, ItemStatus::Error);
        assert_eq!(parked.error_reason.as_deref(), Some("listing_vanished"));
    }

    #[tokio::test]
    async fn unknown_channel_listing_is_reported_never_adopted() {
        let (service, sim_a, _) = build_service();
        sim_a.seed_listing("L-777", "MYSTERY", 50.0);

        let report = service.reconcile_channel(Channel::A).await.unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].listing_id, "L-777");

        // No local item was invented for it
        assert!(service.list_items(&ItemFilter::default()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn unavailable_channel_touches_nothing() {
        let (service, sim_a, _) = build_service();
        let item = service.create_item(physical_item("SKU1")).unwrap();
        service
            .transition_item(
                &item.id,
                Transition::List {
                    channel: Channel::A,
                    ask_price: 120.0,
                },
            )
            .await
            .unwrap();
        let before = service.get_item(&item.id).unwrap();

        sim_a.set_unavailable(true);
        let result = service.reconcile_channel(Channel::A).await;
        assert!(matches!(result, Err(SyncError::ChannelUnavailable { .. })));

        let after = service.get_item(&item.id).unwrap();
        assert_eq!(after.status, before.status);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[tokio::test]
    async fn channel_sale_import_and_reconcile_agree() {
        let (service, sim_a, _) = build_service();
        let item = service.create_item(physical_item("SKU1")).unwrap();
        let listed = service
            .transition_item(
                &item.id,
                Transition::List {
                    channel: Channel::A,
                    ask_price: 120.0,
                },
            )
            .await
            .unwrap();
        sim_a.report_sold(listed.listing_id(Channel::A).unwrap(), "A-1001");

        // The sale arrives twice: once via reconcile, once via order import
        service.reconcile_channel(Channel::A).await.unwrap();
        let batch_id = service
            .create_import_batch(
                SourceType::ChannelA,
                vec![order_record("A-1001", "SKU1", "completed")],
            )
            .unwrap();
        let batch = wait_batch(&service, &batch_id).await;

        // Same natural key, so the import deduplicates instead of double-selling
        assert_eq!(batch.records_processed, 1);
        let items = service.list_items(&ItemFilter::default()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ItemStatus::Sold);
    }
}
