//! Product Model

use serde::{Deserialize, Serialize};

/// Product as mirrored from the server catalog
///
/// Overwritten wholesale on every successful catalog pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalProduct {
    pub id: i64,
    pub name: String,
    /// Retail price in currency unit
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub wholesale_price: Option<f64>,
    #[serde(default)]
    pub cost_price: Option<f64>,
    #[serde(default)]
    pub stock_quantity: i64,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    /// e.g. "active" / "inactive"
    #[serde(default = "default_status")]
    pub status: String,
    /// Service items carry no stock
    #[serde(default)]
    pub is_service: bool,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

fn default_status() -> String {
    "active".to_string()
}

impl LocalProduct {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}
