// sync-engine/tests/order_sync.rs
// Offline capture, upload and restart behaviour against a scripted server

mod common;

use std::sync::atomic::Ordering;

use common::*;
use shared::{LocalOrder, OrderStatus, SyncEventType};
use sync_engine::{
    CycleOutcome, ExistenceCheckPolicy, LocalStore, OrderOutcome, Partition, PaymentInput,
    SyncError, SyncSettings,
};

fn completed(outcome: Option<CycleOutcome>) -> sync_engine::CycleReport {
    match outcome {
        Some(CycleOutcome::Completed(report)) => report,
        other => panic!("expected completed cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn offline_sale_uploads_when_back_online() {
    let h = Harness::new(SyncSettings::default());

    let order = h.engine.capture_sale(scenario_a_sale()).unwrap();
    assert_eq!(order.subtotal, 100_000.0);
    assert_eq!(order.tax_amount, 10_000.0);
    assert_eq!(order.total_amount, 105_000.0);
    assert!(!order.synced);
    assert_eq!(order.items[0].product_name, shared::models::UNKNOWN_PRODUCT_NAME);
    assert_eq!(h.engine.status().pending_orders, 1);
    assert_eq!(h.server.upload_count(), 0);

    let report = completed(h.engine.set_online(true).await.unwrap());
    assert_eq!(
        report.upload.outcome(&order.id),
        Some(&OrderOutcome::Uploaded {
            order_id: order.id.clone(),
            server_order_number: Some("ORD-000042".to_string()),
        })
    );

    assert!(h.engine.get_order(&order.id).unwrap().is_none());
    let events = h.engine.events().timeline(&order.id).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.event_type, SyncEventType::SyncSuccess);
    assert_eq!(last.details.as_deref(), Some("ORD-000042"));

    let status = h.engine.status();
    assert!(status.online);
    assert_eq!(status.pending_orders, 0);
    assert!(!status.sync_in_progress);
    assert!(status.last_sync_at.is_some());
}

#[tokio::test]
async fn payload_carries_device_and_timeline() {
    let h = Harness::new(SyncSettings::default());
    let order = h.engine.capture_sale(scenario_a_sale()).unwrap();
    h.engine.set_online(true).await.unwrap();

    let uploads = h.server.uploads.lock();
    let payload = &uploads[0];
    assert_eq!(payload.offline_id, order.id);
    assert_eq!(payload.device_id, h.engine.device_id());
    assert_eq!(payload.status, "completed");
    assert_eq!(payload.payment_status, "paid");
    assert_eq!(payload.version, 1);
    assert_eq!(payload.items.len(), 2);
    let kinds: Vec<SyncEventType> = payload.sync_timeline.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, vec![SyncEventType::Created, SyncEventType::SyncAttempted]);
}

#[tokio::test]
async fn one_failing_order_does_not_block_the_rest() {
    let h = Harness::new(single_pass());
    let orders: Vec<LocalOrder> = (1..=5)
        .map(|i| h.engine.capture_sale(simple_sale(i as f64)).unwrap())
        .collect();
    h.server.failing_uploads.lock().insert(orders[2].id.clone());

    let outcome = h.engine.set_online(true).await.unwrap();
    let (attempts, last_report) = match outcome {
        Some(CycleOutcome::RetriesExhausted {
            attempts,
            last_report,
        }) => (attempts, last_report),
        other => panic!("expected a failed cycle, got {other:?}"),
    };
    assert_eq!(attempts, 1);
    let report = last_report.unwrap();
    assert_eq!(report.upload.uploaded(), 4);
    assert_eq!(report.upload.failed(), 1);

    for (i, order) in orders.iter().enumerate() {
        let stored = h.engine.get_order(&order.id).unwrap();
        if i == 2 {
            let stored = stored.unwrap();
            assert!(!stored.synced);
            assert_eq!(stored.sync_attempts, 1);
        } else {
            assert!(stored.is_none());
            assert_eq!(h.server.uploads_of(&order.id), 1);
        }
    }
    assert_eq!(h.engine.status().pending_orders, 1);
}

#[tokio::test]
async fn acknowledged_order_is_never_uploaded_twice() {
    let h = Harness::new(SyncSettings::default());
    let order = h.engine.capture_sale(simple_sale(12.5)).unwrap();

    h.engine.set_online(true).await.unwrap();
    h.engine.force_sync().await.unwrap();
    h.engine.force_sync().await.unwrap();

    assert_eq!(h.server.uploads_of(&order.id), 1);
}

#[tokio::test]
async fn synced_leftover_is_purged_without_upload() {
    let h = Harness::new(SyncSettings::default());
    let mut order = h.engine.capture_sale(simple_sale(3.0)).unwrap();
    // Crash between "mark synced" and "delete"
    order.synced = true;
    h.store().upsert_one(&order).unwrap();

    let report = completed(h.engine.set_online(true).await.unwrap());
    assert_eq!(report.upload.purged, 1);
    assert_eq!(h.server.upload_count(), 0);
    assert!(h.engine.get_order(&order.id).unwrap().is_none());
}

#[tokio::test]
async fn server_copy_without_differences_is_not_resent() {
    let h = Harness::new(SyncSettings::default());
    let order = h.engine.capture_sale(simple_sale(20.0)).unwrap();
    h.server.put_order(&order.id, 20.0, "completed", "paid");

    let report = completed(h.engine.set_online(true).await.unwrap());
    assert!(matches!(
        report.upload.outcome(&order.id),
        Some(OrderOutcome::AlreadyOnServer { .. })
    ));
    assert_eq!(h.server.upload_count(), 0);
    assert!(h.engine.get_order(&order.id).unwrap().is_none());
}

#[tokio::test]
async fn drafts_wait_until_finalized() {
    let h = Harness::new(SyncSettings::default());
    let draft = h.engine.save_draft(simple_sale(8.0)).unwrap();
    assert_eq!(draft.status, OrderStatus::Pending);
    assert_eq!(h.engine.status().pending_orders, 0);

    let report = completed(h.engine.set_online(true).await.unwrap());
    assert!(matches!(
        report.upload.outcome(&draft.id),
        Some(OrderOutcome::SkippedDraft { .. })
    ));
    assert_eq!(h.server.upload_count(), 0);

    let done = h
        .engine
        .finalize_draft(
            &draft.id,
            PaymentInput {
                payment_method: "card".to_string(),
                payment_status: shared::PaymentStatus::Paid,
            },
        )
        .unwrap();
    assert_eq!(done.version, 2);
    assert_eq!(h.engine.status().pending_orders, 1);

    h.engine.force_sync().await.unwrap();
    assert_eq!(h.server.uploads_of(&draft.id), 1);
    assert_eq!(h.server.uploads.lock()[0].version, 2);
}

#[tokio::test]
async fn rejected_upload_keeps_order() {
    let h = Harness::new(SyncSettings::default());
    let order = h.engine.capture_sale(simple_sale(5.0)).unwrap();
    h.server.rejected_uploads.lock().insert(order.id.clone());

    // A rejection is not a network failure, so the cycle itself completes
    let report = completed(h.engine.set_online(true).await.unwrap());
    assert!(matches!(
        report.upload.outcome(&order.id),
        Some(OrderOutcome::Failed { transient: false, .. })
    ));
    let stored = h.engine.get_order(&order.id).unwrap().unwrap();
    assert_eq!(stored.sync_attempts, 1);
}

#[tokio::test]
async fn existence_check_failure_follows_policy() {
    let open = Harness::new(single_pass());
    let a = open.engine.capture_sale(simple_sale(1.0)).unwrap();
    open.server.fail_existence_checks.store(true, Ordering::SeqCst);
    open.engine.set_online(true).await.unwrap();
    assert_eq!(open.server.uploads_of(&a.id), 1);

    let mut settings = single_pass();
    settings.existence_check_policy = ExistenceCheckPolicy::FailSafe;
    let safe = Harness::new(settings);
    let b = safe.engine.capture_sale(simple_sale(1.0)).unwrap();
    safe.server.fail_existence_checks.store(true, Ordering::SeqCst);
    safe.engine.set_online(true).await.unwrap();
    assert_eq!(safe.server.upload_count(), 0);
    assert_eq!(safe.engine.get_order(&b.id).unwrap().unwrap().sync_attempts, 1);
}

#[tokio::test]
async fn forced_sync_requires_connectivity() {
    let h = Harness::new(SyncSettings::default());
    assert!(matches!(h.engine.force_sync().await, Err(SyncError::Offline)));
    assert!(matches!(h.engine.refresh_catalog().await, Err(SyncError::Offline)));
}

#[tokio::test]
async fn orders_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::new();
    let clock = ManualClock::new();

    let (order, device_id) = {
        let engine = open_engine(&dir, &server, &clock, SyncSettings::default());
        let order = engine.capture_sale(scenario_a_sale()).unwrap();
        (order, engine.device_id().to_string())
    };

    let engine = open_engine(&dir, &server, &clock, SyncSettings::default());
    assert_eq!(engine.device_id(), device_id);
    assert_eq!(engine.get_order(&order.id).unwrap(), Some(order.clone()));
    assert_eq!(engine.status().pending_orders, 1);

    // Order numbers keep counting after a restart
    let next = engine.capture_sale(simple_sale(1.0)).unwrap();
    assert!(next.order_number.ends_with("-0002"));
}

#[tokio::test]
async fn store_reopens_with_all_partitions() {
    let dir = tempfile::tempdir().unwrap();
    let path = store_path(&dir);
    {
        let store = LocalStore::open(&path).unwrap();
        store.upsert_one(&product(5, "Tea", 9.0)).unwrap();
    }
    let store = LocalStore::open(&path).unwrap();
    assert_eq!(store.count(Partition::Products).unwrap(), 1);
    assert_eq!(store.count(Partition::Orders).unwrap(), 0);
}

#[tokio::test]
async fn discard_during_in_flight_upload_stays_discarded() {
    let h = Harness::new(single_pass());
    let order = h.engine.capture_sale(simple_sale(10.0)).unwrap();
    h.server.fail_all_uploads.store(true, Ordering::SeqCst);
    let gate = h.server.hold_next_upload();

    let (outcome, ()) = tokio::join!(h.engine.set_online(true), async {
        gate.reached.notified().await;
        h.engine.discard_order(&order.id).unwrap();
        gate.release.notify_one();
    });

    let report = completed(outcome.unwrap());
    assert!(matches!(
        report.upload.outcome(&order.id),
        Some(OrderOutcome::Discarded { .. })
    ));
    assert!(h.engine.get_order(&order.id).unwrap().is_none());
    assert_eq!(h.engine.status().pending_orders, 0);

    // The next cycle has nothing to send
    h.server.fail_all_uploads.store(false, Ordering::SeqCst);
    h.engine.force_sync().await.unwrap();
    assert_eq!(h.server.uploads_of(&order.id), 0);
    assert_eq!(h.store().count(Partition::Orders).unwrap(), 0);
}
