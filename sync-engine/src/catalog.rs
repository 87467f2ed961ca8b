//! Catalog mirror
//!
//! Pulls products, customers and store settings from the server and
//! replaces the local copies. Each entity is fetched and written on its
//! own, so a failure on one never blocks the others.

use std::sync::Arc;

use pos_client::SyncApi;
use shared::models::STORE_SETTINGS_KEY;
use shared::util::now_millis;
use shared::{LocalCustomer, LocalProduct, SettingRecord, StoreSettings};

use crate::store::LocalStore;
use crate::utils::{SyncError, SyncResult};

/// Outcome of mirroring one entity type
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOutcome {
    /// Not requested in this pass
    Skipped,
    /// Partition replaced with this many records
    Mirrored(usize),
    /// Server value identical to the cached one, nothing written
    Unchanged,
    Failed { error: String, transient: bool },
}

impl EntityOutcome {
    fn from_error(error: &SyncError) -> Self {
        EntityOutcome::Failed {
            error: error.to_string(),
            transient: error.is_transient(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EntityOutcome::Failed { .. })
    }

    pub fn is_transient_failure(&self) -> bool {
        matches!(self, EntityOutcome::Failed { transient: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MirrorReport {
    pub products: EntityOutcome,
    pub customers: EntityOutcome,
    pub settings: EntityOutcome,
}

impl MirrorReport {
    fn skipped() -> Self {
        Self {
            products: EntityOutcome::Skipped,
            customers: EntityOutcome::Skipped,
            settings: EntityOutcome::Skipped,
        }
    }

    fn outcomes(&self) -> [&EntityOutcome; 3] {
        [&self.products, &self.customers, &self.settings]
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes().iter().any(|o| o.is_failed())
    }

    /// 任一实体因网络瞬时错误失败
    pub fn hit_transient(&self) -> bool {
        self.outcomes().iter().any(|o| o.is_transient_failure())
    }
}

#[derive(Clone)]
pub struct CatalogMirror {
    store: LocalStore,
    api: Arc<dyn SyncApi>,
}

impl CatalogMirror {
    pub fn new(store: LocalStore, api: Arc<dyn SyncApi>) -> Self {
        Self { store, api }
    }

    /// Full refresh: products, customers and settings
    pub async fn refresh_all(&self) -> MirrorReport {
        let report = MirrorReport {
            products: self.outcome(self.refresh_products().await),
            customers: self.outcome(self.refresh_customers().await),
            settings: self.outcome(self.refresh_settings().await),
        };
        tracing::info!(?report, "Catalog refresh finished");
        report
    }

    /// Per-cycle refresh: customers and settings only
    pub async fn refresh_for_cycle(&self) -> MirrorReport {
        MirrorReport {
            customers: self.outcome(self.refresh_customers().await),
            settings: self.outcome(self.refresh_settings().await),
            ..MirrorReport::skipped()
        }
    }

    fn outcome(&self, result: SyncResult<EntityOutcome>) -> EntityOutcome {
        result.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Catalog entity mirror failed");
            EntityOutcome::from_error(&e)
        })
    }

    pub async fn refresh_products(&self) -> SyncResult<EntityOutcome> {
        let products = self.api.fetch_products().await?;
        let count = self.store.replace_all(&products)?;
        tracing::debug!(count, "Products mirrored");
        Ok(EntityOutcome::Mirrored(count))
    }

    pub async fn refresh_customers(&self) -> SyncResult<EntityOutcome> {
        let customers = self.api.fetch_customers().await?;
        let count = self.store.replace_all(&customers)?;
        tracing::debug!(count, "Customers mirrored");
        Ok(EntityOutcome::Mirrored(count))
    }

    /// Replace only the `store_settings` record; device identity and the
    /// order counter live in the same partition and must survive.
    pub async fn refresh_settings(&self) -> SyncResult<EntityOutcome> {
        let settings = self.api.fetch_settings().await?;
        let value = serde_json::to_value(&settings)?;

        if let Some(existing) = self.store.get::<SettingRecord>(STORE_SETTINGS_KEY)? {
            if existing.value == value {
                return Ok(EntityOutcome::Unchanged);
            }
        }

        self.store.upsert_one(&SettingRecord {
            key: STORE_SETTINGS_KEY.to_string(),
            value,
            updated_at: now_millis(),
        })?;
        tracing::debug!(store = %settings.store_name, "Store settings mirrored");
        Ok(EntityOutcome::Mirrored(1))
    }

    // ========== Cached reads ==========

    pub fn products(&self) -> SyncResult<Vec<LocalProduct>> {
        Ok(self.store.get_all()?)
    }

    pub fn product(&self, id: i64) -> SyncResult<Option<LocalProduct>> {
        Ok(self.store.get(&id.to_string())?)
    }

    /// Scanner lookup: matches barcode first, then SKU
    pub fn product_by_barcode(&self, code: &str) -> SyncResult<Option<LocalProduct>> {
        let products = self.store.get_all_matching::<LocalProduct>(|p| {
            p.barcode.as_deref() == Some(code) || p.sku.as_deref() == Some(code)
        })?;
        Ok(products
            .iter()
            .find(|p| p.barcode.as_deref() == Some(code))
            .or_else(|| products.first())
            .cloned())
    }

    /// Case-insensitive search over name, barcode and SKU (active products only)
    pub fn search_products(&self, query: &str) -> SyncResult<Vec<LocalProduct>> {
        let needle = query.trim().to_lowercase();
        Ok(self.store.get_all_matching::<LocalProduct>(|p| {
            p.is_active()
                && (p.name.to_lowercase().contains(&needle)
                    || p.barcode.as_deref().is_some_and(|b| b.contains(&needle))
                    || p.sku
                        .as_deref()
                        .is_some_and(|s| s.to_lowercase().contains(&needle)))
        })?)
    }

    pub fn customers(&self) -> SyncResult<Vec<LocalCustomer>> {
        Ok(self.store.get_all()?)
    }

    pub fn customer(&self, id: i64) -> SyncResult<Option<LocalCustomer>> {
        Ok(self.store.get(&id.to_string())?)
    }

    /// Cached store settings, defaults when never mirrored
    pub fn settings(&self) -> SyncResult<StoreSettings> {
        match self.store.get::<SettingRecord>(STORE_SETTINGS_KEY)? {
            Some(record) => Ok(serde_json::from_value(record.value)?),
            None => Ok(StoreSettings::default()),
        }
    }
}
