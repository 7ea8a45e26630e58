//! HTTP client for the external cloud recording service.
//!
//! The service records a media channel server-side through a four-call
//! lifecycle: `acquire` a recording resource for the channel, `start` a
//! session on it, `query` its progress, `stop` it. Finished files land in
//! the configured storage bucket under the file prefix given at start.
//!
//! [`RecordingBackend`] is the seam the rest of the crate depends on;
//! [`RecordingApi`] is the production implementation over [`reqwest`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::RecorderError;

/// Seam over the external recording service.
#[async_trait]
pub trait RecordingBackend: Send + Sync {
    /// Reserve a recording resource for a channel. Returns the resource id.
    async fn acquire(&self, channel: &str, uid: &str) -> Result<String, RecorderError>;

    /// Start recording on an acquired resource. Returns the recording
    /// session id.
    async fn start(
        &self,
        resource_id: &str,
        channel: &str,
        uid: &str,
        file_prefix: &str,
    ) -> Result<String, RecorderError>;

    /// Fetch the service's view of a recording session, verbatim.
    async fn query(&self, resource_id: &str, session_id: &str) -> Result<Value, RecorderError>;

    /// Stop a recording session.
    async fn stop(
        &self,
        resource_id: &str,
        session_id: &str,
        channel: &str,
        uid: &str,
    ) -> Result<(), RecorderError>;
}

/// Where the service uploads finished recording files.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    pub vendor: u32,
    pub region: u32,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
}

/// Mix-mode transcoding settings sent with every start call.
///
/// The service composites all publishers of the channel into a single
/// stream with these dimensions; one file per room instead of one per
/// participant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodingConfig {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Video bitrate in kbps.
    pub bitrate: u32,
    /// Layout code for the composite (0 floating, 1 adaptive grid).
    pub mixed_layout: u32,
}

impl Default for TranscodingConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            framerate: 15,
            bitrate: 500,
            mixed_layout: 1,
        }
    }
}

/// Connection settings for [`RecordingApi`].
#[derive(Debug, Clone)]
pub struct RecordingApiConfig {
    /// Base HTTP URL, e.g. `https://recorder.example.com`.
    pub base_url: String,
    /// Bearer token for the `Authorization` header.
    pub auth_token: String,
    /// The service ends a session on its own after this many seconds
    /// without a publisher in the channel.
    pub max_idle_seconds: u32,
    pub transcoding: TranscodingConfig,
    pub storage: StorageConfig,
}

/// Production [`RecordingBackend`] over the service's REST API.
pub struct RecordingApi {
    client: reqwest::Client,
    config: RecordingApiConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AcquireResponse {
    resource_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    session_id: String,
}

impl RecordingApi {
    pub fn new(config: RecordingApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Reuse an existing [`reqwest::Client`] (connection pooling shared
    /// with other outbound calls).
    pub fn with_client(client: reqwest::Client, config: RecordingApiConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. 429 maps to
    /// [`RecorderError::RateLimited`] so callers can log and pace it
    /// differently from ordinary failures.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RecorderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(status_error(status.as_u16(), body))
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RecorderError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), RecorderError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Map a non-2xx status and body to the matching error variant.
fn status_error(status: u16, body: String) -> RecorderError {
    if status == 429 {
        RecorderError::RateLimited { body }
    } else {
        RecorderError::Api { status, body }
    }
}

#[async_trait]
impl RecordingBackend for RecordingApi {
    async fn acquire(&self, channel: &str, uid: &str) -> Result<String, RecorderError> {
        let body = json!({
            "channel": channel,
            "uid": uid,
        });

        let response = self
            .client
            .post(self.url("/v1/recordings/acquire"))
            .bearer_auth(&self.config.auth_token)
            .json(&body)
            .send()
            .await?;

        let parsed: AcquireResponse = Self::parse_response(response).await?;
        Ok(parsed.resource_id)
    }

    async fn start(
        &self,
        resource_id: &str,
        channel: &str,
        uid: &str,
        file_prefix: &str,
    ) -> Result<String, RecorderError> {
        let body = json!({
            "resourceId": resource_id,
            "channel": channel,
            "uid": uid,
            "fileNamePrefix": file_prefix,
            "maxIdleSeconds": self.config.max_idle_seconds,
            "transcoding": &self.config.transcoding,
            "storage": &self.config.storage,
        });

        let response = self
            .client
            .post(self.url("/v1/recordings/start"))
            .bearer_auth(&self.config.auth_token)
            .json(&body)
            .send()
            .await?;

        let parsed: StartResponse = Self::parse_response(response).await?;
        Ok(parsed.session_id)
    }

    async fn query(&self, resource_id: &str, session_id: &str) -> Result<Value, RecorderError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/recordings/{resource_id}/{session_id}")))
            .bearer_auth(&self.config.auth_token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn stop(
        &self,
        resource_id: &str,
        session_id: &str,
        channel: &str,
        uid: &str,
    ) -> Result<(), RecorderError> {
        let body = json!({
            "resourceId": resource_id,
            "sessionId": session_id,
            "channel": channel,
            "uid": uid,
        });

        let response = self
            .client
            .post(self.url("/v1/recordings/stop"))
            .bearer_auth(&self.config.auth_token)
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }
}
