//! Order capture
//!
//! - **capture**: validation, totals, order numbering and local persistence

pub mod capture;

pub use capture::{
    OrderCapture, OrderTotals, PaymentInput, SaleInput, SaleItemInput, calculate_totals,
};
