//! POS Client - HTTP client for the backend transaction server
//!
//! Provides the network calls the sync engine makes (catalog fetch, order
//! existence check, order upload, health probe) and the [`SyncApi`] seam
//! the engine is written against.

pub mod api;
pub mod config;
pub mod error;
pub mod http;

pub use api::SyncApi;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use http::HttpClient;
