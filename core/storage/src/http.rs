//! HTTP storage provider.
//!
//! Talks to a vault server exposing a single resource:
//!
//! - `GET  {base}/api/vault` returns the blob (404 when none exists yet)
//! - `POST {base}/api/vault` replaces it
//!
//! Bodies are the raw blob bytes (`application/octet-stream`).

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::provider::StorageProvider;
use pearanoid_common::{Error, Result};

/// Path of the vault resource relative to the base URL.
const VAULT_RESOURCE: &str = "api/vault";

fn default_timeout_secs() -> u64 {
    30
}

/// Configuration for [`HttpProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Server base URL, e.g. `http://localhost:8080`.
    pub base_url: String,
    /// Bearer token sent with every request, if set.
    #[serde(default)]
    pub token: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Storage provider backed by a remote HTTP vault server.
pub struct HttpProvider {
    http: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpProvider {
    /// Create a provider for the server at `config.base_url`.
    ///
    /// # Errors
    /// - `InvalidInput` if the base URL does not parse or is not http(s)
    /// - `Transport` if the HTTP client cannot be built
    pub fn new(config: HttpConfig) -> Result<Self> {
        let endpoint = Self::endpoint(&config.base_url)?;

        let http = Client::builder()
            .user_agent(concat!("Pearanoid/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            token: config.token,
        })
    }

    /// Resolve the vault resource URL under `base_url`.
    fn endpoint(base_url: &str) -> Result<Url> {
        let mut base = Url::parse(base_url)
            .map_err(|e| Error::InvalidInput(format!("Invalid base URL '{}': {}", base_url, e)))?;

        if !matches!(base.scheme(), "http" | "https") {
            return Err(Error::InvalidInput(format!(
                "Unsupported URL scheme '{}'",
                base.scheme()
            )));
        }

        // Without a trailing slash `join` would replace the last segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        base.join(VAULT_RESOURCE)
            .map_err(|e| Error::InvalidInput(format!("Invalid base URL '{}': {}", base_url, e)))
    }

    /// The URL requests are sent to.
    pub fn url(&self) -> &Url {
        &self.endpoint
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl StorageProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_encrypted_vault(&self) -> Result<Vec<u8>> {
        let response = self
            .authorize(self.http.get(self.endpoint.clone()))
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to fetch vault: {}", e)))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!(
                "No vault at {}",
                self.endpoint
            ))),
            status if status.is_success() => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| Error::Transport(format!("Failed to read vault: {}", e)))?;
                debug!(url = %self.endpoint, size = body.len(), "Fetched vault blob");
                Ok(body.to_vec())
            }
            status => {
                warn!(url = %self.endpoint, %status, "Vault fetch rejected");
                Err(Error::Transport(format!("Fetch failed with HTTP {}", status)))
            }
        }
    }

    async fn save_encrypted_vault(&self, data: Vec<u8>) -> Result<()> {
        let size = data.len();
        let response = self
            .authorize(self.http.post(self.endpoint.clone()))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to save vault: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.endpoint, %status, "Vault save rejected");
            return Err(Error::Transport(format!("Save failed with HTTP {}", status)));
        }

        debug!(url = %self.endpoint, size, "Saved vault blob");
        Ok(())
    }
}
