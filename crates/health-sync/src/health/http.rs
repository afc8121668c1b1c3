//! REST upload client for the self-hosted server
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic, like the rest of
//! the engine.

use std::time::Duration;

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use url::Url;

use super::{ChunkError, UploadBatch, UploadClient};
use crate::models::DateRange;
use crate::settings::SyncSettings;

/// Response from the coverage endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoverageResponse {
    covered: bool,
}

/// Upload client talking to the server's health-data import API
pub struct HttpUploadClient {
    base_url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl HttpUploadClient {
    const COVERAGE_PATH: &'static str = "api/health-data/coverage";
    const IMPORT_PATH: &'static str = "api/health-data/import";

    /// Create a client for the server at `base_url`
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid server URL: {}", base_url))?;
        // Url::join replaces the last path segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key,
            agent,
        })
    }

    /// Create a client from loaded settings
    pub fn from_settings(settings: &SyncSettings) -> Result<Self> {
        Self::new(
            &settings.server_url,
            settings.api_key.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChunkError> {
        self.base_url
            .join(path)
            .map_err(|e| ChunkError::Validation(format!("invalid endpoint {}: {}", path, e)))
    }

    fn authorization(&self) -> Option<String> {
        self.api_key.as_ref().map(|key| format!("Bearer {}", key))
    }
}

impl UploadClient for HttpUploadClient {
    fn has_data(&self, device_id: &str, range: &DateRange) -> Result<bool, ChunkError> {
        let mut url = self.endpoint(Self::COVERAGE_PATH)?;
        url.query_pairs_mut()
            .append_pair("deviceId", device_id)
            .append_pair("startDate", &range.start.to_string())
            .append_pair("endDate", &range.end.to_string());

        let mut request = self.agent.get(url.as_str());
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        let mut response = request.call().map_err(transport_error)?;

        let status = response.status().as_u16();
        if status == 404 {
            // Servers without a coverage endpoint never report existing data
            return Ok(false);
        }
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(status_error(status, body));
        }

        let coverage: CoverageResponse = response
            .body_mut()
            .read_json()
            .map_err(|e| ChunkError::MalformedResponse(e.to_string()))?;
        debug!("Coverage for {} on {}: {}", device_id, range, coverage.covered);
        Ok(coverage.covered)
    }

    fn upload(&self, batch: &UploadBatch) -> Result<(), ChunkError> {
        let url = self.endpoint(Self::IMPORT_PATH)?;

        let mut request = self
            .agent
            .post(url.as_str())
            .header("Idempotency-Key", &batch.idempotency_key);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", &auth);
        }
        let mut response = request.send_json(batch).map_err(transport_error)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.body_mut().read_to_string().unwrap_or_default();
            return Err(status_error(status, body));
        }

        debug!(
            "Uploaded {} metrics and {} activities for {}",
            batch.metrics.len(),
            batch.activities.len(),
            batch.idempotency_key
        );
        Ok(())
    }
}

/// Map a transport-level failure (no HTTP status available)
fn transport_error(error: ureq::Error) -> ChunkError {
    match error {
        ureq::Error::Timeout(_) => ChunkError::Timeout,
        ureq::Error::StatusCode(status) => status_error(status, String::new()),
        other => ChunkError::Network(other.to_string()),
    }
}

/// Map a non-success HTTP status to a chunk error
pub(crate) fn status_error(status: u16, body: String) -> ChunkError {
    let message = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        body.trim().to_string()
    };
    match status {
        401 => ChunkError::Unauthorized(message),
        403 => ChunkError::PermissionDenied(message),
        408 => ChunkError::Timeout,
        429 => ChunkError::RateLimited,
        400 | 409 | 413 | 422 => ChunkError::Validation(message),
        _ => ChunkError::Server { status, message },
    }
}
