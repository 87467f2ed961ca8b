// sync-engine/tests/common/mod.rs
// Shared fixtures: scripted server, manual clock, on-disk store

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pos_client::{ClientError, ClientResult, SyncApi};
use shared::{
    LocalCustomer, LocalProduct, OrderUploadPayload, PaymentStatus, ServerOrder, StoreSettings,
    UploadResponse,
};
use sync_engine::{
    Clock, LocalStore, SaleInput, SaleItemInput, SyncOrchestrator, SyncSettings,
};
use tempfile::TempDir;
use tokio::sync::Notify;

/// 2025-01-15 12:00:00 UTC
pub const START_MILLIS: i64 = 1_736_942_400_000;

fn unavailable() -> ClientError {
    ClientError::Server {
        status: 503,
        body: "unavailable".to_string(),
    }
}

/// Holds one upload request open until released
#[derive(Clone, Default)]
pub struct UploadGate {
    /// Signalled once the request has reached the server
    pub reached: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// In-memory stand-in for the transaction server
pub struct MockServer {
    pub products: Mutex<Vec<LocalProduct>>,
    pub customers: Mutex<Vec<LocalCustomer>>,
    pub settings: Mutex<StoreSettings>,
    /// Server-side orders keyed by offline id
    pub orders: Mutex<HashMap<String, ServerOrder>>,
    pub uploads: Mutex<Vec<OrderUploadPayload>>,
    pub existence_checks: Mutex<Vec<String>>,
    /// Offline ids whose upload fails with a network error
    pub failing_uploads: Mutex<HashSet<String>>,
    /// Offline ids the server answers `success: false` for
    pub rejected_uploads: Mutex<HashSet<String>>,
    pub fail_all_uploads: AtomicBool,
    pub fail_existence_checks: AtomicBool,
    pub fail_customers: AtomicBool,
    pub healthy: AtomicBool,
    upload_gate: Mutex<Option<UploadGate>>,
    next_number: AtomicU64,
}

impl MockServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            products: Mutex::new(vec![product(1, "Coffee", 30_000.0), product(2, "Cake", 40_000.0)]),
            customers: Mutex::new(vec![customer(1, "Ana")]),
            settings: Mutex::new(StoreSettings {
                tax_rate: 10.0,
                store_name: "Main Street".to_string(),
                ..Default::default()
            }),
            orders: Mutex::new(HashMap::new()),
            uploads: Mutex::new(Vec::new()),
            existence_checks: Mutex::new(Vec::new()),
            failing_uploads: Mutex::new(HashSet::new()),
            rejected_uploads: Mutex::new(HashSet::new()),
            fail_all_uploads: AtomicBool::new(false),
            fail_existence_checks: AtomicBool::new(false),
            fail_customers: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            upload_gate: Mutex::new(None),
            next_number: AtomicU64::new(42),
        })
    }

    /// Stall the next upload request until `release` is notified
    pub fn hold_next_upload(&self) -> UploadGate {
        let gate = UploadGate::default();
        *self.upload_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().len()
    }

    pub fn uploads_of(&self, offline_id: &str) -> usize {
        self.uploads
            .lock()
            .iter()
            .filter(|p| p.offline_id == offline_id)
            .count()
    }

    pub fn put_order(&self, offline_id: &str, total: f64, status: &str, payment_status: &str) {
        self.orders.lock().insert(
            offline_id.to_string(),
            ServerOrder {
                id: Some(7),
                offline_id: Some(offline_id.to_string()),
                order_number: Some("ORD-000007".to_string()),
                customer_id: None,
                subtotal: total,
                tax_amount: 0.0,
                discount_amount: 0.0,
                total_amount: total,
                status: status.to_string(),
                payment_status: payment_status.to_string(),
                updated_at: None,
            },
        );
    }
}

#[async_trait]
impl SyncApi for MockServer {
    async fn fetch_products(&self) -> ClientResult<Vec<LocalProduct>> {
        Ok(self.products.lock().clone())
    }

    async fn fetch_customers(&self) -> ClientResult<Vec<LocalCustomer>> {
        if self.fail_customers.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.customers.lock().clone())
    }

    async fn fetch_settings(&self) -> ClientResult<StoreSettings> {
        Ok(self.settings.lock().clone())
    }

    async fn fetch_order(&self, offline_id: &str) -> ClientResult<Option<ServerOrder>> {
        self.existence_checks.lock().push(offline_id.to_string());
        if self.fail_existence_checks.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.orders.lock().get(offline_id).cloned())
    }

    async fn upload_order(&self, payload: &OrderUploadPayload) -> ClientResult<UploadResponse> {
        let gate = self.upload_gate.lock().take();
        if let Some(gate) = gate {
            gate.reached.notify_one();
            gate.release.notified().await;
        }
        if self.fail_all_uploads.load(Ordering::SeqCst)
            || self.failing_uploads.lock().contains(&payload.offline_id)
        {
            return Err(unavailable());
        }
        if self.rejected_uploads.lock().contains(&payload.offline_id) {
            return Ok(UploadResponse {
                success: false,
                order_number: None,
                error: Some("invalid items".to_string()),
            });
        }

        let number = format!("ORD-{:06}", self.next_number.fetch_add(1, Ordering::SeqCst));
        self.uploads.lock().push(payload.clone());
        self.orders.lock().insert(
            payload.offline_id.clone(),
            ServerOrder {
                id: None,
                offline_id: Some(payload.offline_id.clone()),
                order_number: Some(number.clone()),
                customer_id: payload.customer_id,
                subtotal: payload.subtotal,
                tax_amount: payload.tax_amount,
                discount_amount: payload.discount_amount,
                total_amount: payload.total_amount,
                status: payload.status.clone(),
                payment_status: payload.payment_status.clone(),
                updated_at: None,
            },
        );
        Ok(UploadResponse {
            success: true,
            order_number: Some(number),
            error: None,
        })
    }

    async fn health(&self) -> ClientResult<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(unavailable())
        }
    }
}

/// Clock whose sleeps return immediately and advance time
pub struct ManualClock {
    now: AtomicI64,
    pub sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: AtomicI64::new(START_MILLIS),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.fetch_add(1, Ordering::SeqCst)
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub server: Arc<MockServer>,
    pub clock: Arc<ManualClock>,
    pub engine: SyncOrchestrator,
}

impl Harness {
    pub fn new(settings: SyncSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let server = MockServer::new();
        let clock = ManualClock::new();
        let engine = open_engine(&dir, &server, &clock, settings);
        Self {
            dir,
            server,
            clock,
            engine,
        }
    }

    pub fn store(&self) -> &LocalStore {
        self.engine.store()
    }
}

pub fn store_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join("data").join("pos.redb")
}

pub fn open_engine(
    dir: &TempDir,
    server: &Arc<MockServer>,
    clock: &Arc<ManualClock>,
    settings: SyncSettings,
) -> SyncOrchestrator {
    let store = LocalStore::open(store_path(dir)).unwrap();
    SyncOrchestrator::new(store, server.clone(), clock.clone(), settings).unwrap()
}

/// Settings with retries disabled, so one failing pass is observable as is
pub fn single_pass() -> SyncSettings {
    let mut settings = SyncSettings::default();
    settings.retry.max_retries = 0;
    settings
}

pub fn product(id: i64, name: &str, price: f64) -> LocalProduct {
    LocalProduct {
        id,
        name: name.to_string(),
        price,
        wholesale_price: None,
        cost_price: None,
        stock_quantity: 10,
        barcode: Some(format!("899{id:04}")),
        sku: Some(format!("SKU-{id}")),
        status: "active".to_string(),
        is_service: false,
        category_id: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn customer(id: i64, name: &str) -> LocalCustomer {
    LocalCustomer {
        id,
        name: name.to_string(),
        phone: None,
        email: None,
        address: None,
    }
}

pub fn item(product_id: i64, quantity: i32, unit_price: f64) -> SaleItemInput {
    SaleItemInput {
        product_id,
        product_name: None,
        quantity,
        unit_price,
    }
}

/// Two items, subtotal 100,000; 10% tax; 5,000 discount
pub fn scenario_a_sale() -> SaleInput {
    SaleInput {
        customer_id: Some(1),
        items: vec![item(1, 2, 30_000.0), item(2, 1, 40_000.0)],
        discount_amount: 5_000.0,
        tax_rate: Some(10.0),
        payment_method: "cash".to_string(),
        payment_status: PaymentStatus::Paid,
    }
}

pub fn simple_sale(unit_price: f64) -> SaleInput {
    SaleInput {
        customer_id: None,
        items: vec![item(1, 1, unit_price)],
        discount_amount: 0.0,
        tax_rate: Some(0.0),
        payment_method: "cash".to_string(),
        payment_status: PaymentStatus::Paid,
    }
}
