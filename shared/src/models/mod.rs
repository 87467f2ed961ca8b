//! Data models
//!
//! Records held in the terminal's local durable store. Catalog records
//! (products, customers, settings) mirror the server and are never created
//! on the client; orders originate locally.
//! All server IDs are `i64`; locally created orders use UUID strings.

pub mod customer;
pub mod order;
pub mod product;
pub mod settings;
pub mod sync;

// Re-exports
pub use customer::*;
pub use order::*;
pub use product::*;
pub use settings::*;
pub use sync::*;
