//! Bearer-token cache for the execution provider.
//!
//! The provider authenticates with short-lived bearer tokens obtained
//! by exchanging an API key against an identity endpoint. The cache
//! holds one token and refreshes it when it gets within a safety
//! margin of expiry. Refreshes are guarded by an async mutex so
//! callers racing on an expired cache share a single exchange instead
//! of each firing their own.

use std::fmt;
use std::sync::RwLock;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::{ProviderError, ProviderResult};

/// Default identity endpoint for the credential grant.
pub const DEFAULT_IDENTITY_URL: &str = "https://iam.cloud.ibm.com/identity/token";

/// OAuth grant type for the apikey exchange.
const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Refresh this many seconds before the token actually expires.
const DEFAULT_REFRESH_MARGIN_SECS: u64 = 300;

/// Configuration for the token cache.
#[derive(Clone)]
pub struct AuthConfig {
    /// Identity endpoint URL.
    pub identity_url: String,
    /// API key exchanged for bearer tokens.
    pub api_key: String,
    /// Safety margin before expiry at which the token is refreshed.
    pub refresh_margin_secs: u64,
}

impl AuthConfig {
    /// Create a config for the default identity endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            identity_url: DEFAULT_IDENTITY_URL.to_string(),
            api_key: api_key.into(),
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
        }
    }

    /// Read the API key from `QRELAY_PROVIDER_API_KEY`, honoring a
    /// `QRELAY_IDENTITY_URL` override.
    pub fn from_env() -> ProviderResult<Self> {
        let api_key = std::env::var("QRELAY_PROVIDER_API_KEY").map_err(|_| {
            ProviderError::Config("QRELAY_PROVIDER_API_KEY environment variable not set".into())
        })?;
        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var("QRELAY_IDENTITY_URL") {
            config.identity_url = url;
        }
        Ok(config)
    }

    /// Override the identity endpoint.
    pub fn with_identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = url.into();
        self
    }

    /// Override the refresh safety margin.
    pub fn with_refresh_margin(mut self, secs: u64) -> Self {
        self.refresh_margin_secs = secs;
        self
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("identity_url", &self.identity_url)
            .field("api_key", &"[REDACTED]")
            .field("refresh_margin_secs", &self.refresh_margin_secs)
            .finish()
    }
}

/// A cached bearer token with its absolute expiry.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    /// Unix timestamp (seconds) at which the token expires.
    expires_at: u64,
}

impl CachedToken {
    fn expires_soon(&self, margin_secs: u64) -> bool {
        unix_now() + margin_secs >= self.expires_at
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Token response from the identity endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Injectable bearer-token cache.
pub struct TokenCache {
    config: AuthConfig,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
    /// Serializes refreshes so concurrent callers share one exchange.
    refresh: Mutex<()>,
}

impl fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("config", &self.config)
            .finish()
    }
}

impl TokenCache {
    /// Create a new token cache.
    pub fn new(config: AuthConfig) -> ProviderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            config,
            http,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        })
    }

    /// Get a valid bearer token, exchanging credentials if the cached
    /// one is missing or within the refresh margin of expiry.
    pub async fn get_token(&self) -> ProviderResult<String> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let token = self.exchange().await?;
        let access = token.access_token.clone();
        {
            let mut cached = self.cached.write().expect("token cache lock poisoned");
            *cached = Some(token);
        }
        Ok(access)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub fn invalidate(&self) {
        let mut cached = self.cached.write().expect("token cache lock poisoned");
        *cached = None;
    }

    fn fresh_token(&self) -> Option<String> {
        let cached = self.cached.read().expect("token cache lock poisoned");
        cached
            .as_ref()
            .filter(|t| !t.expires_soon(self.config.refresh_margin_secs))
            .map(|t| t.access_token.clone())
    }

    /// Perform the apikey credential grant.
    async fn exchange(&self) -> ProviderResult<CachedToken> {
        let response = self
            .http
            .post(&self.config.identity_url)
            .form(&[
                ("grant_type", APIKEY_GRANT_TYPE),
                ("apikey", self.config.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Auth(format!("token exchange request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "no body".to_string());
            return Err(ProviderError::Auth(format!(
                "identity endpoint returned {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Auth(format!("failed to parse token response: {e}")))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: unix_now() + token.expires_in,
        })
    }
}
