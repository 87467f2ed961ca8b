//! Customer Model

use serde::{Deserialize, Serialize};

/// Customer as mirrored from the server (read-only on the terminal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalCustomer {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}
