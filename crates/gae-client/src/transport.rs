use async_trait::async_trait;
use std::time::Duration;

use gae_types::{GaeError, Result};

// ---------------------------------------------------------------------------
// Request / response envelopes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub method: HttpMethod,
    pub url: String,
    /// Full `Authorization` header value, when the call is authenticated.
    pub authorization: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl EngineRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            authorization: None,
            body: None,
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Status and raw body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// EngineTransport
// ---------------------------------------------------------------------------

/// The HTTP seam. Non-2xx statuses are returned, not turned into errors;
/// only failures to exchange a request at all are `Err`.
#[async_trait]
pub trait EngineTransport: Send + Sync {
    async fn execute(&self, request: EngineRequest) -> Result<RawResponse>;
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Transport whose individual requests are bounded by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GaeError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineTransport for HttpTransport {
    async fn execute(&self, request: EngineRequest) -> Result<RawResponse> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
            HttpMethod::Delete => self.client.delete(&request.url),
        };
        if let Some(ref auth) = request.authorization {
            builder = builder.header("Authorization", auth);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let resp = builder.send().await.map_err(|e| {
            GaeError::Transport(format!(
                "{} {}: {}",
                request.method.as_str(),
                request.url,
                e
            ))
        })?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| GaeError::Transport(format!("reading response body: {e}")))?;

        tracing::trace!(
            method = request.method.as_str(),
            url = %request.url,
            status,
            "Engine exchange"
        );
        Ok(RawResponse { status, body })
    }

    fn name(&self) -> &str {
        "http"
    }
}
