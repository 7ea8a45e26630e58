//! Cloud recording coordination.
//!
//! Recording a room happens server-side through an external recording
//! service. This crate owns everything between "a participant joined" and
//! "that service is recording the right channel exactly once":
//!
//! - [`api`] — HTTP client for the service, behind the
//!   [`RecordingBackend`] seam.
//! - [`claim`] — the claim protocol that lets racing instances agree on a
//!   single starter per room.
//! - [`queue`] — deferred, deduplicated, rate-limit-friendly starts.
//! - [`control`] — the start/stop sequences tying claim, API, and state
//!   document together.

pub mod api;
pub mod claim;
pub mod control;
pub mod queue;

pub use api::{
    RecordingApi, RecordingApiConfig, RecordingBackend, StorageConfig, TranscodingConfig,
};
pub use claim::{
    ClaimConfig, ClaimOutcome, ClaimStrategy, ClaimTicket, RecordingClaimManager, SkipReason,
};
pub use control::{
    RecordingControl, RoomRecordingStatus, StartOutcome, StopOutcome, StopReport,
};
pub use queue::{QueueConfig, RecordingQueue, StartExecutor};

use plenum_store::StoreError;
use thiserror::Error;

/// Errors from recording coordination.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("recording API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service asked us to slow down.
    #[error("recording API rate limited: {body}")]
    RateLimited { body: String },

    /// The service returned a non-2xx status other than 429.
    #[error("recording API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecorderError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RecorderError::RateLimited { .. })
    }

    /// Whether a retry after a pause has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            RecorderError::Request(_) | RecorderError::RateLimited { .. } => true,
            RecorderError::Api { status, .. } => *status >= 500,
            RecorderError::Store(StoreError::Database(_)) => true,
            RecorderError::Store(_) => false,
        }
    }
}
