//! HTTP side of ErgoPay: fetching signing requests and replying to dApps

use std::time::Duration;

use async_trait::async_trait;
use wallet_core::{ErgoPayConfig, TransportError};

use crate::types::ReplyPayload;

#[async_trait]
pub trait ErgoPayTransport: Send + Sync {
    /// GET `url` and return the response body
    async fn fetch(&self, url: &str) -> Result<String, TransportError>;

    /// POST `payload` as JSON to a dApp's reply-to URL
    async fn reply(&self, url: &str, payload: &ReplyPayload) -> Result<(), TransportError>;
}

/// [`ErgoPayTransport`] over `reqwest`
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &ErgoPayConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| TransportError::RequestFailed {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

fn request_failed(url: &str, e: reqwest::Error) -> TransportError {
    TransportError::RequestFailed {
        url: url.to_string(),
        message: e.to_string(),
    }
}

#[async_trait]
impl ErgoPayTransport for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<String, TransportError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| TransportError::InvalidUri(e.to_string()))?;

        let start = std::time::Instant::now();
        let response = self
            .client
            .get(parsed)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| request_failed(url, e))?;

        let status = response.status();
        tracing::debug!(
            url,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ErgoPay request fetched"
        );
        if !status.is_success() {
            return Err(TransportError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| TransportError::MalformedBody(e.to_string()))
    }

    async fn reply(&self, url: &str, payload: &ReplyPayload) -> Result<(), TransportError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| TransportError::InvalidUri(e.to_string()))?;
        let response = self
            .client
            .post(parsed)
            .json(payload)
            .send()
            .await
            .map_err(|e| request_failed(url, e))?;

        if !response.status().is_success() {
            return Err(TransportError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}
