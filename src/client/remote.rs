//! Remote store client for the backend record API.
//!
//! One round-trip per call, no retries. Every failure (transport, timeout,
//! non-success status, unreadable body) comes back as
//! [`StoreError::RemoteUnavailable`]; the status is kept for callers that
//! care, the fallback logic does not.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::config::ClientConfig;
use crate::errors::{ErrorResponse, StoreError, StoreResult};
use crate::models::{DeleteRequestBody, TeamRequest};

/// The four record operations the offline-first layer needs from the backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn list(&self) -> StoreResult<Vec<TeamRequest>>;
    async fn create(&self, record: &TeamRequest) -> StoreResult<TeamRequest>;
    async fn update(&self, id: &str, record: &TeamRequest) -> StoreResult<TeamRequest>;
    async fn remove(&self, id: &str, owner_fingerprint: &str) -> StoreResult<()>;
}

/// Response body, with or without the `{success, data}` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum Body<T> {
    Wrapped { success: bool, data: T },
    Bare(T),
}

/// [`RemoteStore`] over HTTP with `reqwest`.
#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Duration) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(StoreError::from)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> StoreResult<Self> {
        Self::new(&config.api_base_url, config.remote_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn list(&self) -> StoreResult<Vec<TeamRequest>> {
        let resp = self.client.get(self.url("/requests")).send().await?;
        read_body(resp).await
    }

    async fn create(&self, record: &TeamRequest) -> StoreResult<TeamRequest> {
        let resp = self
            .client
            .post(self.url("/requests"))
            .json(record)
            .send()
            .await?;
        read_body(resp).await
    }

    async fn update(&self, id: &str, record: &TeamRequest) -> StoreResult<TeamRequest> {
        let resp = self
            .client
            .put(self.url(&format!("/requests/{}", id)))
            .json(record)
            .send()
            .await?;
        read_body(resp).await
    }

    async fn remove(&self, id: &str, owner_fingerprint: &str) -> StoreResult<()> {
        let resp = self
            .client
            .delete(self.url(&format!("/requests/{}", id)))
            .json(&DeleteRequestBody {
                owner_fingerprint: owner_fingerprint.to_string(),
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(status_error(resp).await);
        }
        Ok(())
    }
}

async fn read_body<T: DeserializeOwned>(resp: Response) -> StoreResult<T> {
    let status = resp.status();
    if !status.is_success() {
        return Err(status_error(resp).await);
    }

    let body: Body<T> = resp.json().await.map_err(|e| {
        StoreError::remote(Some(status.as_u16()), format!("malformed response body: {}", e))
    })?;

    match body {
        Body::Wrapped {
            success: true,
            data,
        }
        | Body::Bare(data) => Ok(data),
        Body::Wrapped { success: false, .. } => Err(StoreError::remote(
            Some(status.as_u16()),
            "backend reported failure",
        )),
    }
}

async fn status_error(resp: Response) -> StoreError {
    let status = resp.status();
    let message = match resp.json::<ErrorResponse>().await {
        Ok(body) => body.error.message,
        Err(_) => status.to_string(),
    };
    StoreError::remote(Some(status.as_u16()), message)
}
