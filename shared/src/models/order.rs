//! Local Order Model
//!
//! Orders captured on the terminal. They live in the local store until the
//! server acknowledges them, at which point the local copy is purged.

use crate::money::{amounts_equal, line_total, to_decimal};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Placeholder used when a line item has no usable product name
pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown Product";

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// In-progress sale, not finalized (never uploaded)
    #[default]
    Pending,
    Completed,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "refunded" => Ok(OrderStatus::Refunded),
            other => Err(OrderError::UnknownValue {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Partial,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "partial" => Ok(PaymentStatus::Partial),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(OrderError::UnknownValue {
                field: "payment_status",
                value: other.to_string(),
            }),
        }
    }
}

/// Order invariant violations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum OrderError {
    #[error("Order {0} is already synced and cannot be modified")]
    AlreadySynced(String),

    #[error("Item {index}: quantity must be positive, got {quantity}")]
    InvalidQuantity { index: usize, quantity: i32 },

    #[error("Item {index}: total_price {total} != unit_price x quantity ({expected})")]
    LineTotalMismatch {
        index: usize,
        total: f64,
        expected: f64,
    },

    #[error("{field} must be a finite non-negative amount, got {value}")]
    InvalidAmount { field: &'static str, value: f64 },

    #[error("total_amount {total} != subtotal + tax - discount ({expected})")]
    TotalMismatch { total: f64, expected: f64 },

    #[error("Unknown {field} value: {value}")]
    UnknownValue { field: &'static str, value: String },
}

/// Line item of a local order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOrderItem {
    pub product_id: i64,
    /// Denormalized at capture time, never empty
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: f64,
    pub total_price: f64,
    #[serde(default)]
    pub is_service: bool,
}

impl LocalOrderItem {
    /// Build an item, deriving `total_price` and falling back to the
    /// placeholder name when none is given
    pub fn new(
        product_id: i64,
        product_name: impl Into<String>,
        quantity: i32,
        unit_price: f64,
        is_service: bool,
    ) -> Self {
        let name: String = product_name.into();
        let product_name = if name.trim().is_empty() {
            UNKNOWN_PRODUCT_NAME.to_string()
        } else {
            name
        };
        Self {
            product_id,
            product_name,
            quantity,
            unit_price,
            total_price: line_total(unit_price, quantity),
            is_service,
        }
    }
}

/// A locally originated sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalOrder {
    /// Client-generated UUID (sent to the server as `offline_id`)
    pub id: String,
    /// Human-readable, locally formatted (e.g. `OFF-20250101-0001`)
    pub order_number: String,
    #[serde(default)]
    pub customer_id: Option<i64>,
    pub subtotal: f64,
    pub tax_amount: f64,
    pub discount_amount: f64,
    pub total_amount: f64,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub items: Vec<LocalOrderItem>,
    #[serde(default)]
    pub synced: bool,
    /// Starts at 1, incremented on every local mutation
    pub version: u32,
    pub last_modified: i64,
    pub created_at: i64,
    /// Device identity of the terminal that captured the order
    pub created_by: String,
    #[serde(default)]
    pub sync_attempts: u32,
}

impl LocalOrder {
    /// Only finalized sales are eligible for upload
    pub fn is_finalized(&self) -> bool {
        self.status != OrderStatus::Pending
    }

    /// Guard + bookkeeping for a local mutation: rejects synced orders,
    /// bumps `version` and `last_modified`
    pub fn touch(&mut self, now: i64) -> Result<(), OrderError> {
        if self.synced {
            return Err(OrderError::AlreadySynced(self.id.clone()));
        }
        self.version += 1;
        self.last_modified = now;
        Ok(())
    }

    /// Check item and money invariants
    pub fn validate(&self) -> Result<(), OrderError> {
        for (index, item) in self.items.iter().enumerate() {
            if item.quantity <= 0 {
                return Err(OrderError::InvalidQuantity {
                    index,
                    quantity: item.quantity,
                });
            }
            let expected = line_total(item.unit_price, item.quantity);
            if !amounts_equal(item.total_price, expected) {
                return Err(OrderError::LineTotalMismatch {
                    index,
                    total: item.total_price,
                    expected,
                });
            }
        }

        for (field, value) in [
            ("subtotal", self.subtotal),
            ("tax_amount", self.tax_amount),
            ("discount_amount", self.discount_amount),
            ("total_amount", self.total_amount),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(OrderError::InvalidAmount { field, value });
            }
        }

        let expected = to_decimal(self.subtotal) + to_decimal(self.tax_amount)
            - to_decimal(self.discount_amount);
        let expected = crate::money::to_f64(expected);
        if !amounts_equal(self.total_amount, expected) {
            return Err(OrderError::TotalMismatch {
                total: self.total_amount,
                expected,
            });
        }
        Ok(())
    }
}
