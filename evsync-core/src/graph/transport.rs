//! HTTP seam for the Graph client.
//!
//! A transport performs exactly one GET and reports either the raw response
//! (any status) or a transport-level failure. Classification and retry live
//! in the client.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::error::GraphError;

/// Status and body of one HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// No response was received.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<TransportError> for GraphError {
    fn from(err: TransportError) -> Self {
        GraphError::Transport {
            message: err.message,
        }
    }
}

#[async_trait]
pub trait GraphTransport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Use a preconfigured client (proxy, custom TLS, ...).
    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl GraphTransport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<RawResponse, TransportError> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

impl From<reqwest::Error> for TransportError {
    /// reqwest errors embed the full URL, access token included.
    fn from(err: reqwest::Error) -> Self {
        TransportError::new(err.without_url().to_string())
    }
}
