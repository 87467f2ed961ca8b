//! HTTP client for network-based API calls

use crate::{ClientConfig, ClientError, ClientResult};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use shared::{
    LocalCustomer, LocalProduct, OrderUploadPayload, ServerOrder, StoreSettings, UploadResponse,
};
use std::time::Duration;

/// HTTP client for making network requests to the transaction server
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::handle_response(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::handle_response(response).await
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await?;
            return match status {
                StatusCode::UNAUTHORIZED => Err(ClientError::Unauthorized),
                StatusCode::FORBIDDEN => Err(ClientError::Forbidden(text)),
                StatusCode::NOT_FOUND => Err(ClientError::NotFound(text)),
                StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                    Err(ClientError::Validation(text))
                }
                s if s.is_server_error() => Err(ClientError::Server {
                    status: s.as_u16(),
                    body: text,
                }),
                s => Err(ClientError::Status {
                    status: s.as_u16(),
                    body: text,
                }),
            };
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            ClientError::InvalidResponse(format!("{e}: {}", String::from_utf8_lossy(&bytes)))
        })
    }

    // ========== Catalog API ==========

    pub async fn fetch_products(&self) -> ClientResult<Vec<LocalProduct>> {
        self.get("/api/products").await
    }

    pub async fn fetch_customers(&self) -> ClientResult<Vec<LocalCustomer>> {
        self.get("/api/customers").await
    }

    pub async fn fetch_settings(&self) -> ClientResult<StoreSettings> {
        self.get("/api/settings").await
    }

    // ========== Order Sync API ==========

    /// Look up the server's record for an offline order
    ///
    /// `Ok(None)` when the server answers 404.
    pub async fn fetch_order(&self, offline_id: &str) -> ClientResult<Option<ServerOrder>> {
        match self
            .get::<ServerOrder>(&format!("/api/orders/offline/{offline_id}"))
            .await
        {
            Ok(order) => Ok(Some(order)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Submit an order to the ingestion endpoint
    pub async fn upload_order(&self, payload: &OrderUploadPayload) -> ClientResult<UploadResponse> {
        tracing::debug!(offline_id = %payload.offline_id, "Uploading order");
        self.post("/api/orders/sync", payload).await
    }

    /// Connectivity probe; any 2xx counts as reachable
    pub async fn health(&self) -> ClientResult<()> {
        let response = self.client.get(self.url("/api/health")).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ClientError::Server {
                status: response.status().as_u16(),
                body: String::new(),
            })
        }
    }
}
