// sync-engine/tests/orchestrator.rs
// Connectivity transitions, retry bound, status publication, catalog mirror

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::*;
use parking_lot::Mutex;
use shared::{OrderStatus, SyncStatus};
use sync_engine::{CycleOutcome, EntityOutcome, Partition, SyncSettings};

#[tokio::test]
async fn retries_stop_after_limit() {
    let h = Harness::new(SyncSettings::default());
    let order = h.engine.capture_sale(simple_sale(10.0)).unwrap();
    h.server.fail_all_uploads.store(true, Ordering::SeqCst);

    let outcome = h.engine.set_online(true).await.unwrap();
    let attempts = match outcome {
        Some(CycleOutcome::RetriesExhausted { attempts, .. }) => attempts,
        other => panic!("expected retries to run out, got {other:?}"),
    };
    assert_eq!(attempts, 4);
    assert_eq!(*h.clock.sleeps.lock(), vec![Duration::from_secs(5); 3]);

    let status = h.engine.status();
    assert!(!status.sync_in_progress);
    assert!(status.last_sync_at.is_none());
    assert_eq!(status.pending_orders, 1);
    let stored = h.engine.get_order(&order.id).unwrap().unwrap();
    assert_eq!(stored.sync_attempts, 4);
}

#[tokio::test]
async fn retry_delay_comes_from_settings() {
    let mut settings = SyncSettings::default();
    settings.retry.max_retries = 1;
    settings.retry.delay = Duration::from_millis(250);
    let h = Harness::new(settings);
    h.engine.capture_sale(simple_sale(10.0)).unwrap();
    h.server.fail_all_uploads.store(true, Ordering::SeqCst);

    h.engine.set_online(true).await.unwrap();
    assert_eq!(*h.clock.sleeps.lock(), vec![Duration::from_millis(250)]);
}

#[tokio::test]
async fn catalog_failure_counts_as_failed_cycle() {
    let h = Harness::new(SyncSettings::default());
    h.engine.capture_sale(simple_sale(10.0)).unwrap();
    h.server.fail_customers.store(true, Ordering::SeqCst);

    // Customers keep failing, so every attempt counts as failed
    let outcome = h.engine.set_online(true).await.unwrap();
    assert!(matches!(outcome, Some(CycleOutcome::RetriesExhausted { .. })));
    // Orders still went out on the first attempt
    assert_eq!(h.server.upload_count(), 1);

    h.server.fail_customers.store(false, Ordering::SeqCst);
    let outcome = h.engine.force_sync().await.unwrap();
    let CycleOutcome::Completed(report) = outcome else {
        panic!("expected completed cycle");
    };
    assert_eq!(report.attempts, 1);
}

#[tokio::test]
async fn status_subscribers_see_transitions_in_order() {
    let h = Harness::new(SyncSettings::default());
    let seen: Arc<Mutex<Vec<SyncStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let order_log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let s = seen.clone();
    let first = order_log.clone();
    h.engine.subscribe(move |status| {
        s.lock().push(status.clone());
        first.lock().push("first");
    });
    let second = order_log.clone();
    let second_id = h.engine.subscribe(move |_| second.lock().push("second"));

    h.engine.capture_sale(simple_sale(1.0)).unwrap();
    h.engine.set_online(true).await.unwrap();

    let statuses = seen.lock().clone();
    assert_eq!(statuses.first().unwrap().pending_orders, 1);
    assert!(statuses.iter().any(|s| s.online && s.sync_in_progress));
    let last = statuses.last().unwrap();
    assert!(last.online && !last.sync_in_progress);
    assert_eq!(last.pending_orders, 0);

    let log = order_log.lock().clone();
    assert!(log.chunks(2).all(|pair| pair == ["first", "second"]));

    assert!(h.engine.unsubscribe(second_id));
    let before = order_log.lock().len();
    h.engine.set_online(false).await.unwrap();
    let after = order_log.lock().clone();
    assert_eq!(&after[before..], &["first"]);
}

#[tokio::test]
async fn repeated_transition_is_a_no_op() {
    let h = Harness::new(SyncSettings::default());
    assert!(h.engine.set_online(false).await.unwrap().is_none());
    assert!(h.engine.set_online(true).await.unwrap().is_some());
    assert!(h.engine.set_online(true).await.unwrap().is_none());
}

#[tokio::test]
async fn reconnect_hands_unsynced_orders_to_restore_listeners() {
    let h = Harness::new(SyncSettings::default());
    let a = h.engine.capture_sale(simple_sale(1.0)).unwrap();
    let b = h.engine.save_draft(simple_sale(2.0)).unwrap();

    let restored: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let r = restored.clone();
    h.engine.subscribe_restored(move |orders| {
        r.lock().extend(orders.iter().map(|o| o.id.clone()));
    });

    h.engine.set_online(true).await.unwrap();
    assert_eq!(*restored.lock(), vec![a.id, b.id]);
}

#[tokio::test]
async fn going_offline_saves_sale_in_progress() {
    let h = Harness::new(SyncSettings::default());
    h.engine.set_online(true).await.unwrap();
    h.engine.set_in_progress_sale(Some(simple_sale(7.5)));

    h.engine.set_online(false).await.unwrap();

    let drafts = h.engine.capture().drafts().unwrap();
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].status, OrderStatus::Pending);
    assert_eq!(drafts[0].total_amount, 7.5);
    assert!(!h.engine.status().online);

    // Consumed: a second outage does not duplicate it
    h.engine.set_online(true).await.unwrap();
    h.engine.set_online(false).await.unwrap();
    assert_eq!(h.engine.capture().drafts().unwrap().len(), 1);
}

#[tokio::test]
async fn catalog_mirror_is_idempotent() {
    let h = Harness::new(SyncSettings::default());
    h.engine.set_online(true).await.unwrap();

    let dump = |p| h.store().dump_raw(p).unwrap();
    let before = (
        dump(Partition::Products),
        dump(Partition::Customers),
        dump(Partition::Settings),
    );

    let report = h.engine.refresh_catalog().await.unwrap();
    assert_eq!(report.products, EntityOutcome::Mirrored(2));
    assert_eq!(report.settings, EntityOutcome::Unchanged);

    let after = (
        dump(Partition::Products),
        dump(Partition::Customers),
        dump(Partition::Settings),
    );
    assert_eq!(before, after);
}

#[tokio::test]
async fn catalog_entities_fail_independently() {
    let h = Harness::new(SyncSettings::default());
    h.server.fail_customers.store(true, Ordering::SeqCst);
    h.server.products.lock().push(product(3, "Green Tea", 15.0));

    h.engine.set_online(true).await.unwrap();
    let report = h.engine.refresh_catalog().await.unwrap();
    assert!(report.customers.is_transient_failure());
    assert_eq!(report.products, EntityOutcome::Mirrored(3));

    let catalog = h.engine.catalog();
    assert!(catalog.customers().unwrap().is_empty());
    assert_eq!(catalog.settings().unwrap().tax_rate, 10.0);
    assert_eq!(catalog.search_products("tea").unwrap().len(), 1);
    assert_eq!(
        catalog.product_by_barcode("8990002").unwrap().unwrap().name,
        "Cake"
    );
    assert_eq!(catalog.product_by_barcode("SKU-1").unwrap().unwrap().id, 1);
}

#[tokio::test]
async fn settings_refresh_keeps_device_identity() {
    let h = Harness::new(SyncSettings::default());
    let device_id = h.engine.device_id().to_string();
    h.engine.set_online(true).await.unwrap();

    h.server.settings.lock().tax_rate = 11.0;
    let report = h.engine.refresh_catalog().await.unwrap();
    assert_eq!(report.settings, EntityOutcome::Mirrored(1));
    assert_eq!(h.engine.catalog().settings().unwrap().tax_rate, 11.0);

    let reloaded = sync_engine::DeviceIdentity::load_or_create(h.store()).unwrap();
    assert_eq!(reloaded.id(), device_id);
}

#[tokio::test]
async fn cached_tax_rate_applies_when_sale_has_none() {
    let h = Harness::new(SyncSettings::default());
    h.engine.set_online(true).await.unwrap();
    h.engine.set_online(false).await.unwrap();

    let mut sale = simple_sale(100.0);
    sale.tax_rate = None;
    let order = h.engine.capture_sale(sale).unwrap();
    assert_eq!(order.tax_amount, 10.0);
    assert_eq!(order.total_amount, 110.0);
    assert_eq!(order.items[0].product_name, "Coffee");
}

#[tokio::test]
async fn trigger_during_running_cycle_is_skipped() {
    let h = Harness::new(SyncSettings::default());
    let order = h.engine.capture_sale(simple_sale(10.0)).unwrap();
    let gate = h.server.hold_next_upload();

    let (first, second) = tokio::join!(h.engine.set_online(true), async {
        gate.reached.notified().await;
        let second = h.engine.force_sync().await;
        assert!(h.engine.status().sync_in_progress);
        gate.release.notify_one();
        second
    });

    assert_eq!(second.unwrap(), CycleOutcome::Skipped);
    assert!(matches!(first.unwrap(), Some(CycleOutcome::Completed(_))));
    assert_eq!(h.server.uploads_of(&order.id), 1);
    assert!(!h.engine.status().sync_in_progress);
}
