//! Outbound HTTP dispatch.
//!
//! The pipeline talks to the network through the [`HttpDispatcher`] trait
//! so tests can substitute a recording fake; the production implementation
//! is a thin `reqwest` wrapper.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("transport error: {0}")]
    Transport(String),
}

/// A fully composed outbound request: credentials are already injected.
#[derive(Debug, Clone)]
pub struct HttpCallRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct HttpCallResponse {
    pub status: u16,
    /// Response headers with lowercased names.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpCallResponse {
    /// The `Content-Type` header value, when present.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

#[async_trait]
pub trait HttpDispatcher: Send + Sync {
    async fn dispatch(&self, request: HttpCallRequest) -> Result<HttpCallResponse, DispatchError>;
}

/// Production dispatcher backed by a shared `reqwest` client.
pub struct ReqwestDispatcher {
    http: reqwest::Client,
}

impl ReqwestDispatcher {
    /// Build a dispatcher with the given request timeout.
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| DispatchError::Transport(error.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl HttpDispatcher for ReqwestDispatcher {
    async fn dispatch(&self, request: HttpCallRequest) -> Result<HttpCallResponse, DispatchError> {
        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|error| DispatchError::Transport(error.to_string()))?;

        let mut builder = self.http.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| DispatchError::Transport(error.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|error| DispatchError::Transport(error.to_string()))?
            .to_vec();

        Ok(HttpCallResponse {
            status,
            headers,
            body,
        })
    }
}
