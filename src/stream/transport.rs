//! Transport for the ask stream
//!
//! The session controller only needs a status and an incremental byte body,
//! so the HTTP client sits behind a trait and tests can script the bytes.

use crate::api::AskRequest;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::ACCEPT;
use reqwest::Client;
use thiserror::Error;

/// Incremental response body
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Transport error with classification
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn body(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Body, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unknown, message)
    }

    fn from_request(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("Request timeout: {e}"))
        } else if e.is_connect() {
            Self::connect(format!("Connection failed: {e}"))
        } else {
            Self::unknown(format!("Request failed: {e}"))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Could not reach the backend
    Connect,
    Timeout,
    /// Failure while reading the response body
    Body,
    Unknown,
}

/// Response head plus the body, if one is readable
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<ByteStream>,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Opens one streaming ask request
#[async_trait]
pub trait AskTransport: Send + Sync + 'static {
    async fn open(&self, request: &AskRequest) -> Result<TransportResponse, TransportError>;
}

/// `POST {base}/ask` over reqwest
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    /// No total timeout is set: an answer may stream for as long as the
    /// backend keeps sending. Callers cancel through the session handle.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::unknown(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/ask", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl AskTransport for HttpTransport {
    async fn open(&self, request: &AskRequest) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::from_request(&e))?;

        let status = response.status();
        tracing::debug!(
            status = status.as_u16(),
            content_type = ?response.headers().get(reqwest::header::CONTENT_TYPE),
            "Ask stream opened"
        );

        if !status.is_success() {
            return Ok(TransportResponse {
                status: status.as_u16(),
                body: None,
            });
        }

        let body = response
            .bytes_stream()
            .map_err(|e| TransportError::body(format!("Failed to read stream: {e}")))
            .boxed();

        Ok(TransportResponse {
            status: status.as_u16(),
            body: Some(body),
        })
    }
}
