//! Wire protocol with the backend transaction server
//!
//! ```text
//! POST /api/orders/sync                 OrderUploadPayload -> UploadResponse
//! GET  /api/orders/offline/{offline_id} 404 | ServerOrder
//! GET  /api/products                    Vec<LocalProduct>
//! GET  /api/customers                   Vec<LocalCustomer>
//! GET  /api/settings                    StoreSettings
//! GET  /api/health                      any 2xx
//! ```

use crate::models::{LocalOrder, SyncEvent};
use serde::{Deserialize, Serialize};

/// Line item as sent to the order-ingestion endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub total_price: f64,
    pub is_service: bool,
}

/// Body of `POST /api/orders/sync`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUploadPayload {
    pub customer_id: Option<i64>,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub discount_amount: f64,
    pub total_amount: f64,
    pub payment_method: String,
    pub payment_status: String,
    pub status: String,
    pub items: Vec<UploadItem>,
    /// Local order id; the server's idempotency key
    pub offline_id: String,
    pub created_at: i64,
    pub version: u32,
    pub device_id: String,
    pub sync_timeline: Vec<SyncEvent>,
}

impl OrderUploadPayload {
    pub fn from_order(
        order: &LocalOrder,
        device_id: impl Into<String>,
        sync_timeline: Vec<SyncEvent>,
    ) -> Self {
        Self {
            customer_id: order.customer_id,
            subtotal: order.subtotal,
            tax_amount: order.tax_amount,
            discount_amount: order.discount_amount,
            total_amount: order.total_amount,
            payment_method: order.payment_method.clone(),
            payment_status: order.payment_status.as_str().to_string(),
            status: order.status.as_str().to_string(),
            items: order
                .items
                .iter()
                .map(|item| UploadItem {
                    product_id: item.product_id,
                    product_name: item.product_name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: item.total_price,
                    is_service: item.is_service,
                })
                .collect(),
            offline_id: order.id.clone(),
            created_at: order.created_at,
            version: order.version,
            device_id: device_id.into(),
            sync_timeline,
        }
    }
}

/// Response of `POST /api/orders/sync`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Server's view of an order, as returned by the existence check
///
/// Status fields stay as plain strings so that values this terminal does
/// not know still compare as a difference instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerOrder {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub offline_id: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub customer_id: Option<i64>,
    #[serde(default)]
    pub subtotal: f64,
    #[serde(default)]
    pub tax_amount: f64,
    #[serde(default)]
    pub discount_amount: f64,
    pub total_amount: f64,
    pub status: String,
    pub payment_status: String,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_response_tolerates_missing_fields() {
        let resp: UploadResponse = serde_json::from_str(r#"{"success":false}"#).unwrap();
        assert!(!resp.success);
        assert!(resp.order_number.is_none());
        assert!(resp.error.is_none());
    }

    #[test]
    fn server_order_minimal_shape() {
        let order: ServerOrder = serde_json::from_str(
            r#"{"total_amount":105000,"status":"pending","payment_status":"paid"}"#,
        )
        .unwrap();
        assert_eq!(order.total_amount, 105000.0);
        assert_eq!(order.status, "pending");
        assert!(order.order_number.is_none());
    }
}
