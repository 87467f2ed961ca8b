//! Server API seam used by the sync engine
//!
//! The engine only talks to the server through [`SyncApi`], so tests and
//! alternative transports can stand in for [`HttpClient`].

use async_trait::async_trait;
use shared::{
    LocalCustomer, LocalProduct, OrderUploadPayload, ServerOrder, StoreSettings, UploadResponse,
};

use crate::{ClientResult, HttpClient};

#[async_trait]
pub trait SyncApi: Send + Sync {
    async fn fetch_products(&self) -> ClientResult<Vec<LocalProduct>>;

    async fn fetch_customers(&self) -> ClientResult<Vec<LocalCustomer>>;

    async fn fetch_settings(&self) -> ClientResult<StoreSettings>;

    /// `Ok(None)` means the server has no record for this offline id
    async fn fetch_order(&self, offline_id: &str) -> ClientResult<Option<ServerOrder>>;

    async fn upload_order(&self, payload: &OrderUploadPayload) -> ClientResult<UploadResponse>;

    async fn health(&self) -> ClientResult<()>;
}

#[async_trait]
impl SyncApi for HttpClient {
    async fn fetch_products(&self) -> ClientResult<Vec<LocalProduct>> {
        HttpClient::fetch_products(self).await
    }

    async fn fetch_customers(&self) -> ClientResult<Vec<LocalCustomer>> {
        HttpClient::fetch_customers(self).await
    }

    async fn fetch_settings(&self) -> ClientResult<StoreSettings> {
        HttpClient::fetch_settings(self).await
    }

    async fn fetch_order(&self, offline_id: &str) -> ClientResult<Option<ServerOrder>> {
        HttpClient::fetch_order(self, offline_id).await
    }

    async fn upload_order(&self, payload: &OrderUploadPayload) -> ClientResult<UploadResponse> {
        HttpClient::upload_order(self, payload).await
    }

    async fn health(&self) -> ClientResult<()> {
        HttpClient::health(self).await
    }
}
