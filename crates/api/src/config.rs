//! Environment-driven configuration.

use std::time::Duration;

use plenum_recorder::{
    ClaimConfig, ClaimStrategy, QueueConfig, RecordingApiConfig, StorageConfig, TranscodingConfig,
};
use uuid::Uuid;

use crate::auth::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Graceful shutdown timeout in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// JWT token configuration (secret, expiry).
    pub jwt: JwtConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            jwt,
        }
    }
}

/// Recording-service configuration loaded from environment variables.
///
/// Connection and storage settings are required; tuning knobs default to
/// values that respect the service's published rate limits.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Recording service base URL, e.g. `https://recorder.example.com`.
    pub base_url: String,
    /// Bearer token for the recording service.
    pub auth_token: String,
    /// Seconds without a publisher before the service ends a session on
    /// its own (default: `30`).
    pub max_idle_seconds: u32,
    /// Storage vendor code for finished recording files (default: `0`).
    pub storage_vendor: u32,
    /// Storage region code (default: `0`).
    pub storage_region: u32,
    /// Destination bucket for recording files.
    pub bucket: String,
    pub bucket_access_key: String,
    pub bucket_secret_key: String,
    /// Uid the recorder joins channels with (default: `1000001`).
    pub recorder_uid: String,
    /// How claims reach the store (default: transactional).
    pub claim_strategy: ClaimStrategy,
    /// Recording starts per queue drain burst (default: `100`).
    pub batch_size: usize,
    /// Pause between drain bursts in milliseconds (default: `200`).
    pub batch_pause_ms: u64,
    /// Start attempts per room before giving up (default: `3`).
    pub max_start_attempts: u32,
    /// Identity written into claim documents, so operators can tell which
    /// instance started a recording.
    pub claimant: String,
}

impl RecorderConfig {
    /// Load recorder configuration from environment variables.
    ///
    /// | Env Var                     | Required | Default         |
    /// |-----------------------------|----------|-----------------|
    /// | `RECORDER_API_URL`          | **yes**  | --              |
    /// | `RECORDER_API_TOKEN`        | **yes**  | --              |
    /// | `RECORDER_BUCKET`           | **yes**  | --              |
    /// | `RECORDER_BUCKET_ACCESS_KEY`| **yes**  | --              |
    /// | `RECORDER_BUCKET_SECRET_KEY`| **yes**  | --              |
    /// | `RECORDER_MAX_IDLE_SECS`    | no       | `30`            |
    /// | `RECORDER_STORAGE_VENDOR`   | no       | `0`             |
    /// | `RECORDER_STORAGE_REGION`   | no       | `0`             |
    /// | `RECORDER_UID`              | no       | `1000001`       |
    /// | `RECORDING_CLAIM_STRATEGY`  | no       | `transactional` |
    /// | `RECORDING_BATCH_SIZE`      | no       | `100`           |
    /// | `RECORDING_BATCH_PAUSE_MS`  | no       | `200`           |
    /// | `RECORDING_MAX_ATTEMPTS`    | no       | `3`             |
    /// | `INSTANCE_ID`               | no       | `api-<uuid>`    |
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("RECORDER_API_URL").expect("RECORDER_API_URL must be set");
        let auth_token =
            std::env::var("RECORDER_API_TOKEN").expect("RECORDER_API_TOKEN must be set");
        let bucket = std::env::var("RECORDER_BUCKET").expect("RECORDER_BUCKET must be set");
        let bucket_access_key = std::env::var("RECORDER_BUCKET_ACCESS_KEY")
            .expect("RECORDER_BUCKET_ACCESS_KEY must be set");
        let bucket_secret_key = std::env::var("RECORDER_BUCKET_SECRET_KEY")
            .expect("RECORDER_BUCKET_SECRET_KEY must be set");

        let max_idle_seconds: u32 = std::env::var("RECORDER_MAX_IDLE_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("RECORDER_MAX_IDLE_SECS must be a valid u32");
        let storage_vendor: u32 = std::env::var("RECORDER_STORAGE_VENDOR")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("RECORDER_STORAGE_VENDOR must be a valid u32");
        let storage_region: u32 = std::env::var("RECORDER_STORAGE_REGION")
            .unwrap_or_else(|_| "0".into())
            .parse()
            .expect("RECORDER_STORAGE_REGION must be a valid u32");
        let recorder_uid =
            std::env::var("RECORDER_UID").unwrap_or_else(|_| "1000001".into());

        let claim_strategy = match std::env::var("RECORDING_CLAIM_STRATEGY").ok().as_deref() {
            None | Some("transactional") => ClaimStrategy::Transactional,
            Some("write_verify") => ClaimStrategy::WriteVerify,
            Some(other) => panic!(
                "RECORDING_CLAIM_STRATEGY must be 'transactional' or 'write_verify', got '{other}'"
            ),
        };

        let batch_size: usize = std::env::var("RECORDING_BATCH_SIZE")
            .unwrap_or_else(|_| "100".into())
            .parse()
            .expect("RECORDING_BATCH_SIZE must be a valid usize");
        let batch_pause_ms: u64 = std::env::var("RECORDING_BATCH_PAUSE_MS")
            .unwrap_or_else(|_| "200".into())
            .parse()
            .expect("RECORDING_BATCH_PAUSE_MS must be a valid u64");
        let max_start_attempts: u32 = std::env::var("RECORDING_MAX_ATTEMPTS")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("RECORDING_MAX_ATTEMPTS must be a valid u32");

        let claimant = std::env::var("INSTANCE_ID")
            .unwrap_or_else(|_| format!("api-{}", Uuid::new_v4()));

        Self {
            base_url,
            auth_token,
            max_idle_seconds,
            storage_vendor,
            storage_region,
            bucket,
            bucket_access_key,
            bucket_secret_key,
            recorder_uid,
            claim_strategy,
            batch_size,
            batch_pause_ms,
            max_start_attempts,
            claimant,
        }
    }

    /// Connection settings for the recording-service HTTP client. Mix-mode
    /// transcoding uses the client defaults; no deployment has needed to
    /// tune them.
    pub fn api_config(&self) -> RecordingApiConfig {
        RecordingApiConfig {
            base_url: self.base_url.clone(),
            auth_token: self.auth_token.clone(),
            max_idle_seconds: self.max_idle_seconds,
            transcoding: TranscodingConfig::default(),
            storage: StorageConfig {
                vendor: self.storage_vendor,
                region: self.storage_region,
                bucket: self.bucket.clone(),
                access_key: self.bucket_access_key.clone(),
                secret_key: self.bucket_secret_key.clone(),
            },
        }
    }

    /// Claim-manager tuning.
    pub fn claim_config(&self) -> ClaimConfig {
        ClaimConfig {
            strategy: self.claim_strategy,
            ..ClaimConfig::default()
        }
    }

    /// Recording-queue tuning.
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            batch_size: self.batch_size,
            batch_pause: Duration::from_millis(self.batch_pause_ms),
            max_attempts: self.max_start_attempts,
            ..QueueConfig::default()
        }
    }
}
