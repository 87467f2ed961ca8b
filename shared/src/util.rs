/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a globally unique id for a locally captured order.
///
/// Random (UUID v4), never a per-device sequence, so two terminals that
/// happen to share a device id still cannot collide on order ids.
pub fn new_order_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate a fresh device identity token
pub fn new_device_id() -> String {
    format!("device-{}", uuid::Uuid::new_v4().simple())
}

/// Local calendar day as `YYYYMMDD` (used for order number prefixes)
pub fn local_day_stamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.with_timezone(&chrono::Local).format("%Y%m%d").to_string())
        .unwrap_or_else(|| "00000000".to_string())
}

/// Human-readable offline order number: `OFF-20250101-0007`
pub fn format_order_number(day_stamp: &str, sequence: u64) -> String {
    format!("OFF-{day_stamp}-{sequence:04}")
}
