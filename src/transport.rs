//! HTTP seam between the aggregator and the network.
//!
//! The aggregator only needs "GET this URL with these headers and give me the
//! status and body", so tests substitute a scripted transport and count calls.

use crate::error::{BirdError, Result};
use log::debug;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;

/// An outbound GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: String) -> Self {
        Self {
            url,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Turn a non-2xx response into [`BirdError::Status`].
    pub fn into_success_body(self) -> Result<String> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(BirdError::Status {
                status: self.status,
                body: self.body,
            })
        }
    }
}

pub trait HttpTransport: Send + Sync + 'static {
    /// Execute one request. No explicit deadline is applied here; timeouts
    /// are whatever the underlying client is configured with.
    fn send(&self, request: &HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send;
}

impl<T: HttpTransport> HttpTransport for Arc<T> {
    fn send(&self, request: &HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send {
        (**self).send(request)
    }
}

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("wherenow-birds/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BirdError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> impl Future<Output = Result<HttpResponse>> + Send {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let url = request.url.clone();

        async move {
            debug!("GET {}", url);
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(HttpResponse { status, body })
        }
    }
}
