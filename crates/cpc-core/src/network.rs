//! Shared HTTP client for the tenant's authentication and REST endpoints.
//!
//! One client per panel so the session cookie granted at authentication is
//! presented on every later REST call.

use std::time::Duration;

use reqwest::Client;

use crate::config::NetworkConfig;
use crate::error::{CpcError, Result};

/// HTTP client with a cookie store and request timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a new HTTP client with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(NetworkConfig::USER_AGENT)
            .cookie_store(true)
            .build()
            .map_err(|e| CpcError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self { client })
    }

    /// Get a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
