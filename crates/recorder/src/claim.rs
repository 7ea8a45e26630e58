//! Claim-before-start coordination for room recordings.
//!
//! Several service instances can react to the same join at once; at most
//! one may start the recorder. Instances race by writing a claim into the
//! room's recording-state document. The decision rules live in
//! [`plenum_core::recording`]; this module applies them through the store
//! with one of two strategies and owns the state document's lifecycle
//! transitions afterwards.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use plenum_core::naming::RoomTarget;
use plenum_core::recording::{
    decide_claim, ClaimDecision, RecordingState, StalenessPolicy,
};
use plenum_store::{
    path, DocPath, DocumentStore, DocumentStoreExt, SetMode, StoreError, TxOutcome, TxPlan,
    TxWrite,
};
use serde_json::json;
use uuid::Uuid;

use crate::RecorderError;

/// How a claim reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimStrategy {
    /// Decide and write inside a store transaction on the state document.
    #[default]
    Transactional,
    /// Write the claim, wait [`ClaimConfig::verify_delay`], re-read, and
    /// keep it only if our claim id survived. For stores whose
    /// transactions cannot be used from this path.
    WriteVerify,
}

/// Tuning for [`RecordingClaimManager`].
#[derive(Debug, Clone)]
pub struct ClaimConfig {
    pub strategy: ClaimStrategy,
    /// Settle time between write and verification read under
    /// [`ClaimStrategy::WriteVerify`].
    pub verify_delay: Duration,
    pub staleness: StalenessPolicy,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            strategy: ClaimStrategy::default(),
            verify_delay: Duration::from_millis(50),
            staleness: StalenessPolicy::default(),
        }
    }
}

/// Why a claim was not granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A fresh recording already covers this channel.
    AlreadyRecording,
    /// Another claimant's start sequence is in flight and not yet stale.
    ClaimInFlight,
    /// The recording was deliberately stopped; later joins do not restart
    /// it.
    AlreadyStopped,
    /// Another instance won the write race.
    LostRace,
    /// The state document does not match this room or cannot be read.
    Anomalous,
}

/// A granted claim.
#[derive(Debug, Clone)]
pub struct ClaimTicket {
    pub claim_id: String,
    /// The claim displaced a stale or errored predecessor.
    pub stale_override: bool,
    /// Error text carried over from that predecessor, if any.
    pub previous_error: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Granted(ClaimTicket),
    Skipped(SkipReason),
}

fn skip_reason(decision: &ClaimDecision) -> SkipReason {
    match decision {
        ClaimDecision::DenyActive => SkipReason::AlreadyRecording,
        ClaimDecision::DenyInFlight => SkipReason::ClaimInFlight,
        ClaimDecision::DenyStopped => SkipReason::AlreadyStopped,
        ClaimDecision::DenyAnomalous => SkipReason::Anomalous,
        ClaimDecision::Attempt { .. } => SkipReason::LostRace,
    }
}

fn encode_state(path: &DocPath, state: &RecordingState) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(state).map_err(|source| StoreError::Decode {
        path: path.as_str().to_string(),
        source,
    })
}

/// Applies the claim protocol for one store.
pub struct RecordingClaimManager {
    store: Arc<dyn DocumentStore>,
    config: ClaimConfig,
    /// Identity written into claims (instance name).
    claimant: String,
}

impl RecordingClaimManager {
    pub fn new(store: Arc<dyn DocumentStore>, config: ClaimConfig, claimant: String) -> Self {
        Self {
            store,
            config,
            claimant,
        }
    }

    /// Try to claim the right to start recording `target`.
    pub async fn claim(&self, target: &RoomTarget) -> Result<ClaimOutcome, RecorderError> {
        let state_path = path::recording_state(target.meeting_id());
        let channel = target.channel_name();
        let claim_id = Uuid::new_v4().to_string();
        match self.config.strategy {
            ClaimStrategy::Transactional => {
                self.claim_transactional(&state_path, &channel, claim_id).await
            }
            ClaimStrategy::WriteVerify => {
                self.claim_write_verify(&state_path, &channel, claim_id).await
            }
        }
    }

    /// Claim inside a store transaction: the decision and the claim write
    /// are atomic, so no verification read is needed.
    async fn claim_transactional(
        &self,
        state_path: &DocPath,
        channel: &str,
        claim_id: String,
    ) -> Result<ClaimOutcome, RecorderError> {
        let mut decision: Option<ClaimDecision> = None;
        let mut encode_err: Option<StoreError> = None;

        let outcome = self
            .store
            .run_transaction(
                state_path,
                Box::new(|current| {
                    let existing = match current {
                        None => None,
                        Some(value) => match serde_json::from_value::<RecordingState>(value) {
                            Ok(state) => Some(state),
                            Err(_) => {
                                decision = Some(ClaimDecision::DenyAnomalous);
                                return TxPlan::Abort("unreadable recording state".to_string());
                            }
                        },
                    };

                    let d = decide_claim(
                        existing.as_ref(),
                        channel,
                        Utc::now(),
                        &self.config.staleness,
                    );
                    let plan = match &d {
                        ClaimDecision::Attempt { previous_error, .. } => {
                            let candidate = RecordingState::new_claim(
                                channel,
                                &self.claimant,
                                &claim_id,
                                previous_error.clone(),
                                Utc::now(),
                            );
                            match encode_state(state_path, &candidate) {
                                Ok(value) => {
                                    TxPlan::Commit(vec![TxWrite::set(state_path.clone(), value)])
                                }
                                Err(err) => {
                                    encode_err = Some(err);
                                    TxPlan::Abort("unencodable claim".to_string())
                                }
                            }
                        }
                        ClaimDecision::DenyActive => {
                            TxPlan::Abort("recording already active".to_string())
                        }
                        ClaimDecision::DenyInFlight => {
                            TxPlan::Abort("claim already in flight".to_string())
                        }
                        ClaimDecision::DenyStopped => {
                            TxPlan::Abort("recording already stopped".to_string())
                        }
                        ClaimDecision::DenyAnomalous => {
                            TxPlan::Abort("anomalous recording state".to_string())
                        }
                    };
                    decision = Some(d);
                    plan
                }),
            )
            .await?;

        if let Some(err) = encode_err {
            return Err(err.into());
        }

        match (outcome, decision) {
            (
                TxOutcome::Committed,
                Some(ClaimDecision::Attempt {
                    stale_override,
                    previous_error,
                }),
            ) => Ok(ClaimOutcome::Granted(ClaimTicket {
                claim_id,
                stale_override,
                previous_error,
            })),
            (_, Some(d)) => Ok(ClaimOutcome::Skipped(skip_reason(&d))),
            (_, None) => Ok(ClaimOutcome::Skipped(SkipReason::Anomalous)),
        }
    }

    /// Claim by writing and then verifying after a settle delay. The
    /// surviving claim id decides the winner of a write race.
    async fn claim_write_verify(
        &self,
        state_path: &DocPath,
        channel: &str,
        claim_id: String,
    ) -> Result<ClaimOutcome, RecorderError> {
        let existing = match self.store.get(state_path).await? {
            None => None,
            Some(value) => match serde_json::from_value::<RecordingState>(value) {
                Ok(state) => Some(state),
                Err(err) => {
                    tracing::warn!(path = %state_path, error = %err, "unreadable recording state");
                    return Ok(ClaimOutcome::Skipped(SkipReason::Anomalous));
                }
            },
        };

        let decision = decide_claim(existing.as_ref(), channel, Utc::now(), &self.config.staleness);
        let ClaimDecision::Attempt {
            stale_override,
            previous_error,
        } = decision
        else {
            return Ok(ClaimOutcome::Skipped(skip_reason(&decision)));
        };

        let candidate = RecordingState::new_claim(
            channel,
            &self.claimant,
            &claim_id,
            previous_error.clone(),
            Utc::now(),
        );
        self.store
            .set_as(state_path, &candidate, SetMode::Replace)
            .await?;

        tokio::time::sleep(self.config.verify_delay).await;

        match self.store.get_as::<RecordingState>(state_path).await {
            Ok(Some(state)) if state.claim_id == claim_id => {
                Ok(ClaimOutcome::Granted(ClaimTicket {
                    claim_id,
                    stale_override,
                    previous_error,
                }))
            }
            Ok(_) => {
                tracing::info!(path = %state_path, "lost recording claim race");
                Ok(ClaimOutcome::Skipped(SkipReason::LostRace))
            }
            // Someone replaced our claim with something we cannot read;
            // either way it is not ours anymore.
            Err(StoreError::Decode { .. }) => Ok(ClaimOutcome::Skipped(SkipReason::LostRace)),
            Err(err) => Err(err.into()),
        }
    }

    // ---- state transitions after a granted claim ----

    /// Record the successful start handshake.
    pub async fn mark_recording(
        &self,
        target: &RoomTarget,
        resource_id: &str,
        recording_session_id: &str,
    ) -> Result<(), RecorderError> {
        let state_path = path::recording_state(target.meeting_id());
        self.store
            .update(
                &state_path,
                json!({
                    "status": "recording",
                    "resource_id": resource_id,
                    "recording_session_id": recording_session_id,
                    "started_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Record a failed start attempt; the next claim may retry over it.
    pub async fn mark_error(&self, target: &RoomTarget, message: &str) -> Result<(), RecorderError> {
        let state_path = path::recording_state(target.meeting_id());
        self.store
            .update(
                &state_path,
                json!({
                    "status": "error",
                    "error": message,
                    "errored_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Record a deliberate stop; later joins will not restart it.
    pub async fn mark_stopped(&self, target: &RoomTarget) -> Result<(), RecorderError> {
        let state_path = path::recording_state(target.meeting_id());
        self.store
            .update(
                &state_path,
                json!({
                    "status": "stopped",
                    "stopped_at": Utc::now(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Current recording state for a room, if any.
    pub async fn state(&self, target: &RoomTarget) -> Result<Option<RecordingState>, RecorderError> {
        let state_path = path::recording_state(target.meeting_id());
        Ok(self.store.get_as(&state_path).await?)
    }
}
