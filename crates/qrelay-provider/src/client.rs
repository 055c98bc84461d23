//! REST client for the execution provider.
//!
//! Wraps the three calls the job engine needs (submit, status fetch,
//! device listing) behind the [`Provider`] trait. Status envelopes are
//! returned verbatim as [`serde_json::Value`] so the result normalizer
//! downstream can classify them without this layer committing to a
//! response schema that drifts between provider versions.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};

use crate::auth::TokenCache;
use crate::error::{ProviderError, ProviderResult};

/// Default runtime API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://quantum.cloud.ibm.com/api/v1";

/// User-Agent sent with requests (edge proxies block the default one).
const USER_AGENT: &str = "qrelay/0.3 (+https://github.com/qrelay/qrelay)";

/// Primitives V2 compatibility headers.
const RUNTIME_UA_HEADER: &str = "x-ibm-quantum-user-agent";
const RUNTIME_UA_VALUE: &str = "qiskit-runtime/v2";
const API_VERSION_HEADER: &str = "x-ibm-quantum-api-version";
const API_VERSION_VALUE: &str = "v2";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Runtime API base URL.
    pub endpoint: String,
    /// Service instance CRN header value, when the deployment needs one.
    pub service_crn: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            service_crn: std::env::var("QRELAY_SERVICE_CRN").ok(),
        }
    }
}

impl ProviderConfig {
    /// Point the client at a different endpoint (tests, staging).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Job submission payload.
///
/// The `program_id` pins the execution primitive; `inputs` carries the
/// prepared circuit source and shot count.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    /// Execution primitive identifier ("sampler" or "estimator").
    pub program_id: String,
    /// Target backend name.
    pub backend: String,
    /// "hardware" or "simulator".
    pub run_mode: String,
    /// Circuit inputs.
    pub inputs: SubmitInputs,
}

/// Inputs block of a submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitInputs {
    /// Prepared circuit sources.
    pub circuits: Vec<String>,
    /// Number of shots.
    pub shots: u32,
}

/// Submission response.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Provider-assigned job id.
    pub id: String,
    /// Initial status, when reported.
    #[serde(default)]
    pub status: Option<String>,
}

/// A device entry from the provider's backend listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device name (e.g. "ibm_torino").
    pub name: String,
    /// Qubit capacity, when the listing reports it.
    pub num_qubits: Option<u32>,
}

/// Error body shapes the provider uses for rejections.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    message: Option<String>,
}

/// The provider operations the job engine depends on.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Submit an execution request; returns the provider's job id.
    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<SubmitResponse>;

    /// Fetch the current status/result envelope for a job, verbatim.
    async fn fetch_status(&self, external_id: &str) -> ProviderResult<serde_json::Value>;

    /// List available devices with their capability metadata.
    async fn list_devices(&self) -> ProviderResult<Vec<DeviceInfo>>;
}

/// HTTP implementation of [`Provider`].
pub struct ProviderClient {
    http: reqwest::Client,
    config: ProviderConfig,
    auth: Arc<TokenCache>,
}

impl fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderClient")
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}

impl ProviderClient {
    /// Create a client over the given auth cache.
    pub fn new(config: ProviderConfig, auth: Arc<TokenCache>) -> ProviderResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::HeaderName::from_static(RUNTIME_UA_HEADER),
            header::HeaderValue::from_static(RUNTIME_UA_VALUE),
        );
        headers.insert(
            header::HeaderName::from_static(API_VERSION_HEADER),
            header::HeaderValue::from_static(API_VERSION_VALUE),
        );
        if let Some(crn) = &config.service_crn {
            headers.insert(
                header::HeaderName::from_static("service-crn"),
                header::HeaderValue::from_str(crn)
                    .map_err(|_| ProviderError::Config("invalid service CRN value".into()))?,
            );
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { http, config, auth })
    }

    /// Recover the provider's own message from an error body, falling
    /// back to a generic rejection text.
    fn submission_error_message(body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
            if let Some(msg) = parsed.errors.into_iter().find_map(|e| e.message) {
                return msg;
            }
            if let Some(msg) = parsed.message {
                return msg;
            }
        }
        "the provider rejected the job submission".to_string()
    }

    /// Parse a device listing that is either `{"devices": [...]}` or a
    /// bare array, with entries as names or objects.
    fn parse_devices(body: serde_json::Value) -> Vec<DeviceInfo> {
        let entries = match &body {
            serde_json::Value::Object(map) => map
                .get("devices")
                .and_then(serde_json::Value::as_array)
                .cloned()
                .unwrap_or_default(),
            serde_json::Value::Array(list) => list.clone(),
            _ => Vec::new(),
        };

        entries
            .iter()
            .filter_map(|entry| match entry {
                serde_json::Value::String(name) => Some(DeviceInfo {
                    name: name.clone(),
                    num_qubits: None,
                }),
                serde_json::Value::Object(obj) => {
                    let name = obj
                        .get("name")
                        .or_else(|| obj.get("backend_name"))
                        .and_then(serde_json::Value::as_str)?;
                    let num_qubits = obj
                        .get("num_qubits")
                        .or_else(|| obj.get("n_qubits"))
                        .and_then(serde_json::Value::as_u64)
                        .map(|n| u32::try_from(n).unwrap_or(u32::MAX));
                    Some(DeviceInfo {
                        name: name.to_string(),
                        num_qubits,
                    })
                }
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Provider for ProviderClient {
    async fn submit(&self, request: &SubmitRequest) -> ProviderResult<SubmitResponse> {
        let token = self.auth.get_token().await?;
        let url = format!("{}/jobs", self.config.endpoint);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = Self::submission_error_message(&body);
            tracing::warn!(%status, "job submission rejected: {message}");
            return Err(ProviderError::Submission(message));
        }

        response.json().await.map_err(ProviderError::from)
    }

    async fn fetch_status(&self, external_id: &str) -> ProviderResult<serde_json::Value> {
        let token = self.auth.get_token().await?;
        let url = format!("{}/jobs/{}", self.config.endpoint, external_id);

        let response = self.http.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Query(format!(
                "status fetch for job {external_id} returned {status}: {body}"
            )));
        }

        response.json().await.map_err(ProviderError::from)
    }

    async fn list_devices(&self) -> ProviderResult<Vec<DeviceInfo>> {
        let token = self.auth.get_token().await?;
        let url = format!("{}/backends", self.config.endpoint);

        let response = self.http.get(&url).bearer_auth(token).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Query(format!(
                "device listing returned {status}: {body}"
            )));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(Self::parse_devices(body))
    }
}
