//! Recording claim state: model, staleness windows, and the claim decision
//! table.
//!
//! The decision table is pure so the claim manager can evaluate it both on
//! a plain read (write-delay-verify strategy) and inside a store
//! transaction (transactional strategy) without duplicating the rules.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Staleness windows
// ---------------------------------------------------------------------------

/// A `claiming` state older than this may be overridden: the claimant
/// either crashed before starting the recording or lost its verification
/// race long ago.
pub const CLAIMING_STALE_AFTER_SECS: i64 = 120;

/// A `recording` state older than this may be overridden. Covers recorder
/// sessions that died without the stop path ever running.
pub const RECORDING_STALE_AFTER_SECS: i64 = 900;

/// Staleness thresholds, overridable in tests.
#[derive(Debug, Clone, Copy)]
pub struct StalenessPolicy {
    pub claiming_after: Duration,
    pub recording_after: Duration,
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            claiming_after: Duration::seconds(CLAIMING_STALE_AFTER_SECS),
            recording_after: Duration::seconds(RECORDING_STALE_AFTER_SECS),
        }
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Lifecycle status of a room's cloud recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    /// A claimant is running the start sequence.
    Claiming,
    /// The external recorder confirmed the start.
    Recording,
    /// Deliberately stopped; not restarted by later joins.
    Stopped,
    /// The last start attempt failed; the next claim may retry.
    Error,
}

/// Per-room document encoding the idempotent claim/lifecycle of a cloud
/// recording. Lives under the meeting (main or breakout) it describes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingState {
    pub status: RecordingStatus,
    /// Channel the recorder joined; must match the claiming room.
    pub channel: String,
    /// External resource handle, present once acquired.
    pub resource_id: Option<String>,
    /// External recording-session handle, present once started.
    pub recording_session_id: Option<String>,
    /// Identity of the claimant that wrote this state.
    pub claimant: String,
    /// Random token compared on the verification read; the surviving token
    /// decides the winner of a write race.
    pub claim_id: String,
    pub claimed_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub stopped_at: Option<Timestamp>,
    pub errored_at: Option<Timestamp>,
    /// What went wrong, when status is `error`.
    pub error: Option<String>,
    /// Error text carried over from the attempt this one recovered from.
    pub previous_error: Option<String>,
}

impl RecordingState {
    /// A fresh `claiming` document for the given channel.
    pub fn new_claim(
        channel: impl Into<String>,
        claimant: impl Into<String>,
        claim_id: impl Into<String>,
        previous_error: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            status: RecordingStatus::Claiming,
            channel: channel.into(),
            resource_id: None,
            recording_session_id: None,
            claimant: claimant.into(),
            claim_id: claim_id.into(),
            claimed_at: now,
            started_at: None,
            stopped_at: None,
            errored_at: None,
            error: None,
            previous_error,
        }
    }

    /// Age of the state relative to its relevant timestamp: `started_at`
    /// for a running recording, `claimed_at` otherwise.
    pub fn age(&self, now: Timestamp) -> Duration {
        let reference = match self.status {
            RecordingStatus::Recording => self.started_at.unwrap_or(self.claimed_at),
            _ => self.claimed_at,
        };
        now - reference
    }

    /// Whether this state is old enough to be overridden by a new claimant.
    pub fn is_stale(&self, now: Timestamp, policy: &StalenessPolicy) -> bool {
        match self.status {
            RecordingStatus::Claiming => self.age(now) > policy.claiming_after,
            RecordingStatus::Recording => self.age(now) > policy.recording_after,
            // Stopped and error states are not time-gated.
            RecordingStatus::Stopped | RecordingStatus::Error => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Decision table
// ---------------------------------------------------------------------------

/// What a claim attempt should do given the existing state document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Write a fresh claim (possibly overriding a stale predecessor).
    Attempt {
        /// True when an existing stale/errored state is being overridden.
        stale_override: bool,
        /// Diagnostics carried into the new claim document.
        previous_error: Option<String>,
    },
    /// A live recording already covers this channel.
    DenyActive,
    /// Another claimant's start sequence is in flight.
    DenyInFlight,
    /// The recording was deliberately stopped; later joins do not restart it.
    DenyStopped,
    /// State does not match this channel or is otherwise unexpected.
    DenyAnomalous,
}

/// Evaluate the claim decision table for one room.
///
/// `channel` is the claiming room's channel name; a `recording` state for a
/// different channel under this path is treated as anomalous rather than
/// silently overridden.
pub fn decide_claim(
    existing: Option<&RecordingState>,
    channel: &str,
    now: Timestamp,
    policy: &StalenessPolicy,
) -> ClaimDecision {
    let Some(state) = existing else {
        return ClaimDecision::Attempt {
            stale_override: false,
            previous_error: None,
        };
    };

    match state.status {
        RecordingStatus::Claiming => {
            if state.is_stale(now, policy) {
                ClaimDecision::Attempt {
                    stale_override: true,
                    previous_error: state.error.clone().or_else(|| state.previous_error.clone()),
                }
            } else {
                ClaimDecision::DenyInFlight
            }
        }
        RecordingStatus::Recording => {
            if state.channel != channel {
                ClaimDecision::DenyAnomalous
            } else if state.is_stale(now, policy) {
                ClaimDecision::Attempt {
                    stale_override: true,
                    previous_error: None,
                }
            } else {
                ClaimDecision::DenyActive
            }
        }
        RecordingStatus::Error => ClaimDecision::Attempt {
            stale_override: false,
            previous_error: state.error.clone(),
        },
        RecordingStatus::Stopped => ClaimDecision::DenyStopped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const CHANNEL: &str = "room-1";

    fn policy() -> StalenessPolicy {
        StalenessPolicy::default()
    }

    fn claiming_state(age_secs: i64, now: Timestamp) -> RecordingState {
        RecordingState::new_claim(CHANNEL, "fn-a", "claim-1", None, now - Duration::seconds(age_secs))
    }

    fn recording_state(age_secs: i64, now: Timestamp) -> RecordingState {
        let mut state = claiming_state(age_secs + 5, now);
        state.status = RecordingStatus::Recording;
        state.resource_id = Some("res-1".into());
        state.recording_session_id = Some("sid-1".into());
        state.started_at = Some(now - Duration::seconds(age_secs));
        state
    }

    // -----------------------------------------------------------------------
    // Absent state
    // -----------------------------------------------------------------------

    #[test]
    fn absent_state_attempts_fresh_claim() {
        let decision = decide_claim(None, CHANNEL, Utc::now(), &policy());
        assert_eq!(
            decision,
            ClaimDecision::Attempt {
                stale_override: false,
                previous_error: None
            }
        );
    }

    // -----------------------------------------------------------------------
    // Claiming states
    // -----------------------------------------------------------------------

    #[test]
    fn fresh_claiming_is_denied() {
        let now = Utc::now();
        let state = claiming_state(30, now);
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::DenyInFlight
        );
    }

    #[test]
    fn claiming_just_inside_window_is_denied() {
        let now = Utc::now();
        let state = claiming_state(CLAIMING_STALE_AFTER_SECS, now);
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::DenyInFlight
        );
    }

    #[test]
    fn stale_claiming_is_overridden() {
        let now = Utc::now();
        let state = claiming_state(CLAIMING_STALE_AFTER_SECS + 1, now);
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::Attempt {
                stale_override: true,
                previous_error: None
            }
        );
    }

    #[test]
    fn stale_claiming_carries_previous_error_forward() {
        let now = Utc::now();
        let mut state = claiming_state(CLAIMING_STALE_AFTER_SECS + 1, now);
        state.previous_error = Some("acquire failed: 500".into());
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::Attempt {
                stale_override: true,
                previous_error: Some("acquire failed: 500".into())
            }
        );
    }

    // -----------------------------------------------------------------------
    // Recording states
    // -----------------------------------------------------------------------

    #[test]
    fn fresh_recording_is_denied_active() {
        let now = Utc::now();
        let state = recording_state(60, now);
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::DenyActive
        );
    }

    #[test]
    fn recording_near_window_edge_is_still_denied() {
        let now = Utc::now();
        let state = recording_state(RECORDING_STALE_AFTER_SECS, now);
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::DenyActive
        );
    }

    #[test]
    fn stale_recording_is_overridden() {
        let now = Utc::now();
        let state = recording_state(RECORDING_STALE_AFTER_SECS + 1, now);
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::Attempt {
                stale_override: true,
                previous_error: None
            }
        );
    }

    #[test]
    fn recording_for_other_channel_is_anomalous() {
        let now = Utc::now();
        let state = recording_state(10, now);
        assert_eq!(
            decide_claim(Some(&state), "room-other", now, &policy()),
            ClaimDecision::DenyAnomalous
        );
    }

    #[test]
    fn recording_age_uses_started_at_not_claimed_at() {
        let now = Utc::now();
        // Claimed long ago but started recently: still fresh.
        let mut state = recording_state(60, now);
        state.claimed_at = now - Duration::seconds(RECORDING_STALE_AFTER_SECS * 2);
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::DenyActive
        );
    }

    // -----------------------------------------------------------------------
    // Error and stopped states
    // -----------------------------------------------------------------------

    #[test]
    fn error_state_attempts_with_previous_error() {
        let now = Utc::now();
        let mut state = claiming_state(10, now);
        state.status = RecordingStatus::Error;
        state.error = Some("start rejected: bad storage config".into());
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::Attempt {
                stale_override: false,
                previous_error: Some("start rejected: bad storage config".into())
            }
        );
    }

    #[test]
    fn stopped_state_is_denied_without_override() {
        let now = Utc::now();
        let mut state = recording_state(10, now);
        state.status = RecordingStatus::Stopped;
        state.stopped_at = Some(now);
        assert_eq!(
            decide_claim(Some(&state), CHANNEL, now, &policy()),
            ClaimDecision::DenyStopped
        );
    }
}
