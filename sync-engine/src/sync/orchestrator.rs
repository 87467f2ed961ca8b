//! Sync orchestrator
//!
//! Owns the engine's [`SyncStatus`] and drives everything that talks to
//! the server: catalog refresh, the upload cycle with bounded retry, the
//! restoration pass and operator conflict decisions.
//!
//! # Connectivity transitions
//!
//! ```text
//! Offline ──► Online : catalog refresh → restoration pass → cycle (with retry)
//! Online ──► Offline : save in-progress sale as draft → publish status
//! ```
//!
//! A cycle never overlaps another one: a trigger that arrives while a cycle
//! is running returns [`CycleOutcome::Skipped`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use pos_client::SyncApi;
use shared::{
    ConflictRecord, ConflictStrategy, LocalOrder, ManualDecision, SyncStatus,
};

use crate::catalog::{CatalogMirror, MirrorReport};
use crate::device::DeviceIdentity;
use crate::orders::{OrderCapture, PaymentInput, SaleInput};
use crate::store::{Index, LocalStore};
use crate::sync::conflict::ConflictResolver;
use crate::sync::event_log::{DEFAULT_LOG_CAPACITY, SyncEventLog};
use crate::sync::status::{ObserverRegistry, StatusHub, SubscriptionId};
use crate::sync::upload::{ExistenceCheckPolicy, UploadPipeline, UploadReport};
use crate::utils::{Clock, SyncError, SyncResult};

/// Fixed-delay bounded retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub conflict_strategy: ConflictStrategy,
    pub existence_check_policy: ExistenceCheckPolicy,
    pub retry: RetryPolicy,
    pub sync_log_capacity: usize,
    /// How long conflict records and timelines of orders that have left
    /// the store are kept
    pub history_retention: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::default(),
            existence_check_policy: ExistenceCheckPolicy::default(),
            retry: RetryPolicy::default(),
            sync_log_capacity: DEFAULT_LOG_CAPACITY,
            history_retention: Duration::from_secs(7 * 24 * 3600),
        }
    }
}

/// One successful cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub catalog: MirrorReport,
    pub upload: UploadReport,
    /// Attempts used, including the first
    pub attempts: u32,
}

impl CycleReport {
    fn failed(&self) -> bool {
        self.catalog.hit_transient() || self.upload.hit_transient()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was already running
    Skipped,
    /// Every attempt hit a transient failure
    RetriesExhausted {
        attempts: u32,
        last_report: Option<CycleReport>,
    },
}

/// Resets the in-progress flag when the cycle ends, however it ends
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct Inner {
    store: LocalStore,
    clock: Arc<dyn Clock>,
    device: DeviceIdentity,
    settings: SyncSettings,
    events: SyncEventLog,
    catalog: CatalogMirror,
    capture: OrderCapture,
    resolver: ConflictResolver,
    pipeline: UploadPipeline,
    status: StatusHub,
    restore_observers: ObserverRegistry<[LocalOrder]>,
    cycle_running: AtomicBool,
    in_progress_sale: Mutex<Option<SaleInput>>,
}

/// Entry point of the engine; cheap to clone
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Wire up every component over one store; starts Offline
    pub fn new(
        store: LocalStore,
        api: Arc<dyn SyncApi>,
        clock: Arc<dyn Clock>,
        settings: SyncSettings,
    ) -> SyncResult<Self> {
        let device = DeviceIdentity::load_or_create(&store)?;
        let events = SyncEventLog::new(
            store.clone(),
            clock.clone(),
            device.id(),
            settings.sync_log_capacity,
        );
        let catalog = CatalogMirror::new(store.clone(), api.clone());
        let capture = OrderCapture::new(store.clone(), catalog.clone(), events.clone(), clock.clone());
        let resolver = ConflictResolver::new(
            store.clone(),
            events.clone(),
            clock.clone(),
            settings.conflict_strategy,
        );
        let pipeline = UploadPipeline::new(
            store.clone(),
            api,
            resolver.clone(),
            events.clone(),
            settings.existence_check_policy,
        );

        let orchestrator = Self {
            inner: Arc::new(Inner {
                store,
                clock,
                device,
                settings,
                events,
                catalog,
                capture,
                resolver,
                pipeline,
                status: StatusHub::new(),
                restore_observers: ObserverRegistry::new(),
                cycle_running: AtomicBool::new(false),
                in_progress_sale: Mutex::new(None),
            }),
        };
        orchestrator.refresh_status()?;

        tracing::info!(
            device_id = %orchestrator.inner.device,
            strategy = %settings.conflict_strategy,
            existence_check = %settings.existence_check_policy,
            "Sync orchestrator ready"
        );
        Ok(orchestrator)
    }

    // ========== Components ==========

    pub fn device_id(&self) -> &str {
        self.inner.device.id()
    }

    pub fn store(&self) -> &LocalStore {
        &self.inner.store
    }

    pub fn catalog(&self) -> &CatalogMirror {
        &self.inner.catalog
    }

    pub fn capture(&self) -> &OrderCapture {
        &self.inner.capture
    }

    pub fn events(&self) -> &SyncEventLog {
        &self.inner.events
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    // ========== Status ==========

    pub fn status(&self) -> SyncStatus {
        self.inner.status.snapshot()
    }

    pub fn is_online(&self) -> bool {
        self.status().online
    }

    pub fn subscribe(
        &self,
        callback: impl Fn(&SyncStatus) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.status.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.status.unsubscribe(id)
    }

    /// Called with every unsynced order when connectivity comes back
    pub fn subscribe_restored(
        &self,
        callback: impl Fn(&[LocalOrder]) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.restore_observers.subscribe(callback)
    }

    pub fn unsubscribe_restored(&self, id: SubscriptionId) -> bool {
        self.inner.restore_observers.unsubscribe(id)
    }

    /// Recompute store-derived counters and publish if changed
    pub fn refresh_status(&self) -> SyncResult<SyncStatus> {
        let pending = self.inner.capture.pending_orders()?.len();
        let unresolved = self.inner.store.count_index(Index::UnresolvedConflicts)?;
        let last_resolution = self.inner.resolver.last_resolution_at()?;

        self.inner.status.update(|s| {
            s.pending_orders = pending;
            s.unresolved_conflicts = unresolved;
            s.last_conflict_resolution_at = last_resolution;
        });
        Ok(self.status())
    }

    // ========== Order capture ==========

    pub fn capture_sale(&self, input: SaleInput) -> SyncResult<LocalOrder> {
        let order = self.inner.capture.capture_sale(input)?;
        self.refresh_status()?;
        Ok(order)
    }

    pub fn save_draft(&self, input: SaleInput) -> SyncResult<LocalOrder> {
        let order = self.inner.capture.save_draft(input)?;
        self.refresh_status()?;
        Ok(order)
    }

    pub fn finalize_draft(&self, order_id: &str, payment: PaymentInput) -> SyncResult<LocalOrder> {
        let order = self.inner.capture.finalize_draft(order_id, payment)?;
        self.refresh_status()?;
        Ok(order)
    }

    pub fn pending_orders(&self) -> SyncResult<Vec<LocalOrder>> {
        self.inner.capture.pending_orders()
    }

    pub fn get_order(&self, order_id: &str) -> SyncResult<Option<LocalOrder>> {
        self.inner.capture.get_order(order_id)
    }

    /// Register (or clear) the sale currently on screen
    ///
    /// It is saved as a draft if the terminal goes offline.
    pub fn set_in_progress_sale(&self, sale: Option<SaleInput>) {
        *self.inner.in_progress_sale.lock() = sale;
    }

    /// Drop an unsynced local order
    pub fn discard_order(&self, order_id: &str) -> SyncResult<()> {
        self.inner.capture.discard(order_id)?;
        self.refresh_status()?;
        Ok(())
    }

    // ========== Conflicts ==========

    pub fn unresolved_conflicts(&self) -> SyncResult<Vec<ConflictRecord>> {
        Ok(self.inner.store.get_by_index(Index::UnresolvedConflicts)?)
    }

    pub fn conflict(&self, order_id: &str) -> SyncResult<Option<ConflictRecord>> {
        self.inner.resolver.conflict(order_id)
    }

    /// Apply an operator decision to a manual conflict
    ///
    /// With `KeepLocal` the order uploads right away when online
    /// (`Some(outcome)`), otherwise on the next cycle.
    pub async fn resolve_conflict(
        &self,
        order_id: &str,
        decision: ManualDecision,
    ) -> SyncResult<Option<CycleOutcome>> {
        self.inner.resolver.resolve_manual(order_id, decision)?;
        self.refresh_status()?;

        if decision == ManualDecision::KeepLocal && self.is_online() {
            return self.run_with_retry().await.map(Some);
        }
        Ok(None)
    }

    // ========== Connectivity ==========

    /// Apply a connectivity change
    ///
    /// Returns the cycle outcome when going online; `None` when the state
    /// did not change or the terminal went offline.
    pub async fn set_online(&self, online: bool) -> SyncResult<Option<CycleOutcome>> {
        let was_online = self.is_online();
        if was_online == online {
            return Ok(None);
        }

        self.inner.status.update(|s| s.online = online);

        if online {
            tracing::info!("Connectivity restored");
            self.inner.catalog.refresh_all().await;
            self.restore_orders()?;
            self.run_with_retry().await.map(Some)
        } else {
            tracing::warn!("Connectivity lost, switching to offline mode");
            self.save_incomplete_orders()?;
            self.refresh_status()?;
            Ok(None)
        }
    }

    /// Hand every unsynced order to the restore listeners
    fn restore_orders(&self) -> SyncResult<()> {
        let orders = self.inner.capture.unsynced_orders()?;
        tracing::info!(count = orders.len(), "Restoring unsynced orders");
        self.inner.restore_observers.notify(&orders);
        Ok(())
    }

    /// Persist the sale on screen as a draft so nothing is lost offline
    fn save_incomplete_orders(&self) -> SyncResult<()> {
        let sale = self.inner.in_progress_sale.lock().take();
        if let Some(sale) = sale {
            let draft = self.inner.capture.save_draft(sale)?;
            tracing::info!(order_id = %draft.id, "In-progress sale saved as draft");
        }
        Ok(())
    }

    /// Explicit sync request
    pub async fn force_sync(&self) -> SyncResult<CycleOutcome> {
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        self.run_with_retry().await
    }

    /// Explicit full catalog refresh
    pub async fn refresh_catalog(&self) -> SyncResult<MirrorReport> {
        if !self.is_online() {
            return Err(SyncError::Offline);
        }
        Ok(self.inner.catalog.refresh_all().await)
    }

    /// Run a cycle, retrying on transient failure with a fixed delay
    pub async fn run_with_retry(&self) -> SyncResult<CycleOutcome> {
        let Some(_guard) = CycleGuard::acquire(&self.inner.cycle_running) else {
            tracing::debug!("Sync cycle already running, skipping trigger");
            return Ok(CycleOutcome::Skipped);
        };
        self.inner.status.update(|s| s.sync_in_progress = true);

        let result = self.retry_loop().await;

        let completed = matches!(result, Ok(CycleOutcome::Completed(_)));
        let now = self.inner.clock.now_millis();
        self.inner.status.update(|s| {
            s.sync_in_progress = false;
            if completed {
                s.last_sync_at = Some(now);
            }
        });
        self.refresh_status()?;
        result
    }

    async fn retry_loop(&self) -> SyncResult<CycleOutcome> {
        let retry = self.inner.settings.retry;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let last_report = match self.run_cycle().await {
                Ok(mut report) if !report.failed() => {
                    report.attempts = attempt;
                    tracing::info!(attempt, uploaded = report.upload.uploaded(), "Sync cycle completed");
                    return Ok(CycleOutcome::Completed(report));
                }
                Ok(mut report) => {
                    report.attempts = attempt;
                    tracing::warn!(attempt, failed = report.upload.failed(), "Sync cycle hit network failures");
                    Some(report)
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(attempt, error = %e, "Sync cycle failed");
                    None
                }
                Err(e) => return Err(e),
            };

            if attempt > retry.max_retries || !self.is_online() {
                tracing::error!(attempts = attempt, "Sync retries exhausted");
                return Ok(CycleOutcome::RetriesExhausted {
                    attempts: attempt,
                    last_report,
                });
            }

            tracing::info!(
                retry = attempt,
                max_retries = retry.max_retries,
                delay_ms = retry.delay.as_millis() as u64,
                "Retrying sync cycle"
            );
            self.inner.clock.sleep(retry.delay).await;
        }
    }

    /// Drop conflict records and timelines past the retention window
    fn prune_history(&self) -> SyncResult<()> {
        let retention = self.inner.settings.history_retention.as_millis() as i64;
        let cutoff = self.inner.clock.now_millis().saturating_sub(retention);
        let conflicts = self.inner.resolver.prune_settled(cutoff)?;
        let timelines = self.inner.events.prune_settled(cutoff)?;
        if conflicts + timelines > 0 {
            tracing::info!(conflicts, timelines, "Pruned settled sync history");
        }
        Ok(())
    }

    /// Prune old history, mirror customers and settings, upload pending
    /// orders, publish status
    async fn run_cycle(&self) -> SyncResult<CycleReport> {
        self.prune_history()?;
        let catalog = self.inner.catalog.refresh_for_cycle().await;
        let upload = self.inner.pipeline.run().await?;
        self.refresh_status()?;
        Ok(CycleReport {
            catalog,
            upload,
            attempts: 1,
        })
    }
}
