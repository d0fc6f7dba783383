//! HTTP transport seam
//!
//! The executor only needs "send this request, give me status and body".
//! [`HttpTransport`] does that with a blocking reqwest client; tests plug in
//! an in-memory implementation.

use std::collections::BTreeMap;
use std::time::Duration;

use apiplan_core::ErrorKind;

/// One outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Upper-case HTTP method
    pub method: String,
    pub url: String,
    /// Query pairs in send order; array values repeat their key
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
}

/// Response as seen by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Whether the body is declared as JSON (`application/json`, `+json`).
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| {
            let mime = ct.split(';').next().unwrap_or("").trim();
            mime == "application/json" || mime.ends_with("+json")
        })
    }
}

pub trait Transport {
    /// Send `request` and wait for the full response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no response was received.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking reqwest transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Fails when the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::InvalidMethod(request.method.clone()))?;

        let mut req = self.client.request(method, &request.url);
        for (k, v) in &request.headers {
            // Values that are not valid HTTP header text never reach the server.
            if reqwest::header::HeaderValue::from_str(v).is_ok() {
                req = req.header(k, v);
            } else {
                log::warn!("skipping header {k}: invalid value");
            }
        }
        if !request.query.is_empty() {
            req = req.query(&request.query);
        }

        let resp = req.send().map_err(|e| TransportError::Send {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = resp.text().map_err(|e| TransportError::Send {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP client error: {0}")]
    Client(String),
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    #[error("request to {url} failed: {message}")]
    Send { url: String, message: String },
}

impl TransportError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMethod(_) => ErrorKind::Invalid,
            Self::Client(_) | Self::Send { .. } => ErrorKind::Transport,
        }
    }
}
