//! Minimal client for the report analysis backend.
//!
//! The backend exposes a single endpoint, `POST /chat`, which accepts the
//! operator's message and answers with an envelope whose `response` field
//! carries the report as a JSON-encoded string. This crate only transports
//! that envelope; decoding the report is left to the caller.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur when talking to the analysis backend.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Connection settings for the backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL; the chat endpoint is `{base_url}/chat`.
    pub base_url: String,

    /// Upper bound on a whole request, response body included.
    pub timeout: Duration,

    /// Upper bound on establishing the connection.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Read `SITREP_BACKEND_URL` and `SITREP_TIMEOUT_SECS`, falling back to defaults.
    pub fn from_env() -> Result<Self, Error> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("SITREP_BACKEND_URL") {
            config.base_url = url;
        }

        if let Ok(secs) = std::env::var("SITREP_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|e| Error::Config(format!("SITREP_TIMEOUT_SECS must be an integer: {e}")))?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url.trim_end_matches('/'))
    }
}

/// Analysis backend client.
#[derive(Clone)]
pub struct Analyst {
    client: reqwest::Client,
    config: ClientConfig,
}

impl Analyst {
    /// Create a client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        if config.timeout.is_zero() {
            return Err(Error::Config("timeout must be greater than zero".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Create a client configured from the environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a message and return the raw response body.
    ///
    /// Any non-2xx status is an error; the body is returned untouched
    /// otherwise so the caller can run its own decoding.
    pub async fn chat(&self, message: &str) -> Result<String, Error> {
        let url = self.config.chat_url();
        tracing::debug!(%url, chars = message.chars().count(), "sending chat request");

        let response = self
            .client
            .post(&url)
            .headers(build_headers())
            .json(&ChatRequest { message })
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        response.text().await.map_err(|e| self.map_transport_error(e))
    }

    fn map_transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(self.config.timeout)
        } else {
            Error::Network(e.to_string())
        }
    }
}

fn build_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}
