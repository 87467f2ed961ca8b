//! Device identity
//!
//! A random token generated on first run and kept in the `settings`
//! partition. Orders and sync events carry it so the server can tell
//! terminals apart.

use serde_json::Value;
use shared::models::DEVICE_IDENTITY_KEY;
use shared::util::{new_device_id, now_millis};
use shared::SettingRecord;

use crate::store::LocalStore;
use crate::utils::SyncResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    id: String,
}

impl DeviceIdentity {
    /// 读取已保存的设备 ID，首次运行时生成并持久化
    pub fn load_or_create(store: &LocalStore) -> SyncResult<Self> {
        if let Some(SettingRecord {
            value: Value::String(id),
            ..
        }) = store.get::<SettingRecord>(DEVICE_IDENTITY_KEY)?
        {
            if !id.is_empty() {
                return Ok(Self { id });
            }
        }

        let id = new_device_id();
        store.upsert_one(&SettingRecord {
            key: DEVICE_IDENTITY_KEY.to_string(),
            value: Value::String(id.clone()),
            updated_at: now_millis(),
        })?;
        tracing::info!(device_id = %id, "Generated new device identity");
        Ok(Self { id })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_across_loads() {
        let store = LocalStore::open_in_memory().unwrap();
        let first = DeviceIdentity::load_or_create(&store).unwrap();
        let second = DeviceIdentity::load_or_create(&store).unwrap();
        assert_eq!(first, second);
        assert!(first.id().starts_with("device-"));
    }

    #[test]
    fn malformed_record_is_replaced() {
        let store = LocalStore::open_in_memory().unwrap();
        store
            .upsert_one(&SettingRecord {
                key: DEVICE_IDENTITY_KEY.to_string(),
                value: Value::Null,
                updated_at: 0,
            })
            .unwrap();
        let identity = DeviceIdentity::load_or_create(&store).unwrap();
        assert!(identity.id().starts_with("device-"));
    }
}
