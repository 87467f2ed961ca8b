//! Settings Model
//!
//! The `settings` partition holds heterogeneous key/value records: the
//! mirrored store settings, the device identity, the daily order counter and
//! the latest conflict resolution time.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key of the mirrored [`StoreSettings`] record
pub const STORE_SETTINGS_KEY: &str = "store_settings";
/// Key of the persisted device identity
pub const DEVICE_IDENTITY_KEY: &str = "device_identity";
/// Key of the daily order number counter
pub const ORDER_COUNTER_KEY: &str = "order_counter";
/// Key of the latest conflict resolution timestamp (Unix millis)
pub const LAST_CONFLICT_RESOLUTION_KEY: &str = "last_conflict_resolution";

/// One entry of the settings partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingRecord {
    pub key: String,
    pub value: Value,
    pub updated_at: i64,
}

/// Store settings served by `GET /api/settings`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Tax rate in percentage (e.g., 10 = 10%)
    #[serde(default)]
    pub tax_rate: f64,
    #[serde(default)]
    pub store_name: String,
    #[serde(default)]
    pub store_address: Option<String>,
    #[serde(default)]
    pub store_phone: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    /// Server fields this terminal does not interpret, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Daily order number counter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderCounter {
    /// `YYYYMMDD` of the last issued number
    pub day: String,
    pub sequence: u64,
}
