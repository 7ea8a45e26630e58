//! Start/stop orchestration for room recordings.
//!
//! The start sequence is claim, acquire, start, then persist the handles.
//! Every deny from the claim short-circuits without touching the recording
//! API. A start failure writes an `error` state so the next claim can see
//! it, then propagates so the queue's retry policy applies. Recording is
//! strictly best-effort alongside the meeting itself: nothing here is ever
//! allowed to block a join.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use plenum_core::naming::RoomTarget;
use plenum_core::recording::{RecordingState, RecordingStatus};
use serde::Serialize;
use serde_json::Value;

use crate::api::RecordingBackend;
use crate::claim::{ClaimOutcome, RecordingClaimManager, SkipReason};
use crate::queue::StartExecutor;
use crate::RecorderError;

/// Stop calls in flight at once during a bulk stop.
const STOP_CONCURRENCY: usize = 8;

/// Result of a start sequence.
#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started {
        resource_id: String,
        recording_session_id: String,
    },
    /// The claim denied the start; no API call was made.
    Skipped(SkipReason),
    /// All attempts failed; carries the final error text. Produced by the
    /// queue, never by a single sequence.
    Failed(String),
}

/// Result of stopping one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// Nothing running for this room.
    NotRecording,
}

/// Aggregate of a bulk stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub stopped: u32,
    pub skipped: u32,
    pub failed: u32,
}

/// One room's recording, as reported by the overview surface.
#[derive(Debug, Serialize)]
pub struct RoomRecordingStatus {
    pub channel: String,
    /// Prefix the room's recording files land under in the bucket.
    pub file_prefix: String,
    pub main_room: bool,
    pub state: Option<RecordingState>,
    /// Raw session info from the recording service, when one is live.
    pub live: Option<Value>,
    pub query_error: Option<String>,
}

/// Ties the claim manager, the recording backend, and the state document
/// together.
pub struct RecordingControl {
    backend: Arc<dyn RecordingBackend>,
    claims: RecordingClaimManager,
    /// Uid the recorder joins channels with.
    recorder_uid: String,
}

impl RecordingControl {
    pub fn new(
        backend: Arc<dyn RecordingBackend>,
        claims: RecordingClaimManager,
        recorder_uid: String,
    ) -> Self {
        Self {
            backend,
            claims,
            recorder_uid,
        }
    }

    /// Claim and start recording one room.
    pub async fn start_room(&self, target: &RoomTarget) -> Result<StartOutcome, RecorderError> {
        let ticket = match self.claims.claim(target).await? {
            ClaimOutcome::Skipped(reason) => {
                tracing::debug!(target = %target, ?reason, "recording start skipped");
                return Ok(StartOutcome::Skipped(reason));
            }
            ClaimOutcome::Granted(ticket) => ticket,
        };
        if ticket.stale_override {
            tracing::warn!(
                target = %target,
                previous_error = ?ticket.previous_error,
                "overriding stale recording claim"
            );
        }

        let channel = target.channel_name();
        let resource_id = match self.backend.acquire(&channel, &self.recorder_uid).await {
            Ok(id) => id,
            Err(err) => {
                self.record_failure(target, &err).await;
                return Err(err);
            }
        };

        let file_prefix = target.file_prefix();
        let recording_session_id = match self
            .backend
            .start(&resource_id, &channel, &self.recorder_uid, &file_prefix)
            .await
        {
            Ok(sid) => sid,
            Err(err) => {
                self.record_failure(target, &err).await;
                return Err(err);
            }
        };

        self.claims
            .mark_recording(target, &resource_id, &recording_session_id)
            .await?;
        tracing::info!(
            target = %target,
            resource = %resource_id,
            session = %recording_session_id,
            "recording started"
        );
        Ok(StartOutcome::Started {
            resource_id,
            recording_session_id,
        })
    }

    /// Annotate the state document with the failure; the failure itself is
    /// what propagates to the caller.
    async fn record_failure(&self, target: &RoomTarget, err: &RecorderError) {
        if let Err(update_err) = self.claims.mark_error(target, &err.to_string()).await {
            tracing::error!(
                target = %target,
                error = %update_err,
                "could not persist recording error state"
            );
        }
    }

    /// Stop one room's recording if it is running. Idempotent: stopping a
    /// room with nothing running reports [`StopOutcome::NotRecording`].
    pub async fn stop_room(&self, target: &RoomTarget) -> Result<StopOutcome, RecorderError> {
        let Some(state) = self.claims.state(target).await? else {
            return Ok(StopOutcome::NotRecording);
        };
        if state.status != RecordingStatus::Recording {
            return Ok(StopOutcome::NotRecording);
        }
        let (Some(resource_id), Some(session_id)) = (
            state.resource_id.as_deref(),
            state.recording_session_id.as_deref(),
        ) else {
            // A recording status without handles cannot be stopped remotely;
            // close it out locally so it cannot linger forever.
            tracing::warn!(target = %target, "recording state lacks service handles");
            self.claims.mark_stopped(target).await?;
            return Ok(StopOutcome::Stopped);
        };

        match self
            .backend
            .stop(resource_id, session_id, &target.channel_name(), &self.recorder_uid)
            .await
        {
            Ok(()) => {}
            // The service no longer knows the session; it is already over.
            Err(RecorderError::Api { status: 404, .. }) => {
                tracing::debug!(target = %target, "recording session already gone");
            }
            Err(err) => return Err(err),
        }

        self.claims.mark_stopped(target).await?;
        tracing::info!(target = %target, "recording stopped");
        Ok(StopOutcome::Stopped)
    }

    /// Stop many rooms with bounded concurrency. One room's failure never
    /// stops the sweep; the report carries the tallies.
    pub async fn stop_many(&self, targets: Vec<RoomTarget>) -> StopReport {
        let results = stream::iter(targets)
            .map(|target| async move {
                let outcome = self.stop_room(&target).await;
                (target, outcome)
            })
            .buffer_unordered(STOP_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        let mut report = StopReport::default();
        for (target, outcome) in results {
            match outcome {
                Ok(StopOutcome::Stopped) => report.stopped += 1,
                Ok(StopOutcome::NotRecording) => report.skipped += 1,
                Err(err) => {
                    tracing::error!(target = %target, error = %err, "failed to stop room recording");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Store and service view of the given rooms' recordings. Per-room
    /// query failures are reported inline, never propagated.
    pub async fn overview(&self, targets: Vec<RoomTarget>) -> Vec<RoomRecordingStatus> {
        let mut out = Vec::with_capacity(targets.len());
        for target in targets {
            let state = match self.claims.state(&target).await {
                Ok(state) => state,
                Err(err) => {
                    out.push(RoomRecordingStatus {
                        channel: target.channel_name(),
                        file_prefix: target.file_prefix(),
                        main_room: target.is_main(),
                        state: None,
                        live: None,
                        query_error: Some(err.to_string()),
                    });
                    continue;
                }
            };

            let mut live = None;
            let mut query_error = None;
            if let Some(current) = &state {
                if current.status == RecordingStatus::Recording {
                    if let (Some(resource_id), Some(session_id)) = (
                        current.resource_id.as_deref(),
                        current.recording_session_id.as_deref(),
                    ) {
                        match self.backend.query(resource_id, session_id).await {
                            Ok(info) => live = Some(info),
                            Err(err) => query_error = Some(err.to_string()),
                        }
                    }
                }
            }

            out.push(RoomRecordingStatus {
                channel: target.channel_name(),
                file_prefix: target.file_prefix(),
                main_room: target.is_main(),
                state,
                live,
                query_error,
            });
        }
        out
    }
}

#[async_trait]
impl StartExecutor for RecordingControl {
    async fn start_recording(&self, target: &RoomTarget) -> Result<StartOutcome, RecorderError> {
        self.start_room(target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::{ClaimConfig, ClaimStrategy};
    use assert_matches::assert_matches;
    use plenum_core::types::{EventId, RoomId, SessionId};
    use plenum_store::{DocumentStore, MemoryStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Backend double that hands out predictable ids and counts calls.
    struct StubBackend {
        acquires: AtomicU32,
        starts: AtomicU32,
        stops: AtomicU32,
        queries: AtomicU32,
        fail_acquire: bool,
        fail_start: bool,
    }

    impl StubBackend {
        fn ok() -> Self {
            Self {
                acquires: AtomicU32::new(0),
                starts: AtomicU32::new(0),
                stops: AtomicU32::new(0),
                queries: AtomicU32::new(0),
                fail_acquire: false,
                fail_start: false,
            }
        }

        fn failing_start() -> Self {
            Self {
                fail_start: true,
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl RecordingBackend for StubBackend {
        async fn acquire(&self, _channel: &str, _uid: &str) -> Result<String, RecorderError> {
            self.acquires.fetch_add(1, Ordering::SeqCst);
            if self.fail_acquire {
                return Err(RecorderError::Api {
                    status: 500,
                    body: "acquire failed".into(),
                });
            }
            Ok("res-1".to_string())
        }

        async fn start(
            &self,
            _resource_id: &str,
            _channel: &str,
            _uid: &str,
            _file_prefix: &str,
        ) -> Result<String, RecorderError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(RecorderError::Api {
                    status: 500,
                    body: "start failed".into(),
                });
            }
            Ok("sid-1".to_string())
        }

        async fn query(&self, _resource_id: &str, _session_id: &str) -> Result<Value, RecorderError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"status": "uploading"}))
        }

        async fn stop(
            &self,
            _resource_id: &str,
            _session_id: &str,
            _channel: &str,
            _uid: &str,
        ) -> Result<(), RecorderError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn control(store: Arc<MemoryStore>, backend: Arc<StubBackend>) -> RecordingControl {
        let claims = RecordingClaimManager::new(
            store as Arc<dyn DocumentStore>,
            ClaimConfig {
                strategy: ClaimStrategy::Transactional,
                ..ClaimConfig::default()
            },
            "inst-a".to_string(),
        );
        RecordingControl::new(backend, claims, "7777".to_string())
    }

    #[tokio::test]
    async fn start_sequence_persists_handles() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(StubBackend::ok());
        let ctl = control(store.clone(), backend.clone());
        let target = RoomTarget::main(EventId::new());

        let outcome = ctl.start_room(&target).await.unwrap();
        assert_matches!(outcome, StartOutcome::Started { .. });

        let state = ctl.claims.state(&target).await.unwrap().unwrap();
        assert_eq!(state.status, RecordingStatus::Recording);
        assert_eq!(state.resource_id.as_deref(), Some("res-1"));
        assert_eq!(state.recording_session_id.as_deref(), Some("sid-1"));
        assert_eq!(backend.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(backend.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_start_skips_without_an_api_call() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(StubBackend::ok());
        let ctl = control(store.clone(), backend.clone());
        let target = RoomTarget::main(EventId::new());

        ctl.start_room(&target).await.unwrap();
        let outcome = ctl.start_room(&target).await.unwrap();
        assert_matches!(outcome, StartOutcome::Skipped(SkipReason::AlreadyRecording));
        assert_eq!(backend.acquires.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_failure_marks_error_state() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(StubBackend::failing_start());
        let ctl = control(store.clone(), backend.clone());
        let target = RoomTarget::main(EventId::new());

        let err = ctl.start_room(&target).await.unwrap_err();
        assert!(!err.is_rate_limited());

        let state = ctl.claims.state(&target).await.unwrap().unwrap();
        assert_eq!(state.status, RecordingStatus::Error);
        assert!(state.error.as_deref().unwrap_or("").contains("start failed"));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_blocks_restart() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(StubBackend::ok());
        let ctl = control(store.clone(), backend.clone());
        let target = RoomTarget::main(EventId::new());

        ctl.start_room(&target).await.unwrap();
        assert_eq!(ctl.stop_room(&target).await.unwrap(), StopOutcome::Stopped);
        assert_eq!(
            ctl.stop_room(&target).await.unwrap(),
            StopOutcome::NotRecording
        );
        assert_eq!(backend.stops.load(Ordering::SeqCst), 1);

        // A later join must not revive a deliberately stopped recording.
        let outcome = ctl.start_room(&target).await.unwrap();
        assert_matches!(outcome, StartOutcome::Skipped(SkipReason::AlreadyStopped));
    }

    #[tokio::test]
    async fn bulk_stop_tallies_per_room() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(StubBackend::ok());
        let ctl = control(store.clone(), backend.clone());
        let event_id = EventId::new();
        let session_id = SessionId::new();

        let running = RoomTarget::breakout(event_id, session_id, RoomId::new());
        let idle = RoomTarget::breakout(event_id, session_id, RoomId::new());
        ctl.start_room(&running).await.unwrap();

        let report = ctl
            .stop_many(vec![running, idle, RoomTarget::main(event_id)])
            .await;
        assert_eq!(
            report,
            StopReport {
                stopped: 1,
                skipped: 2,
                failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn overview_reports_state_and_live_info() {
        let store = Arc::new(MemoryStore::new());
        let backend = Arc::new(StubBackend::ok());
        let ctl = control(store.clone(), backend.clone());
        let event_id = EventId::new();
        let main = RoomTarget::main(event_id);

        ctl.start_room(&main).await.unwrap();
        let statuses = ctl
            .overview(vec![
                main,
                RoomTarget::breakout(event_id, SessionId::new(), RoomId::new()),
            ])
            .await;

        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].main_room);
        assert_eq!(statuses[0].file_prefix, RoomTarget::main(event_id).file_prefix());
        assert_eq!(statuses[0].live, Some(json!({"status": "uploading"})));
        assert!(statuses[1].state.is_none());
        assert_eq!(backend.queries.load(Ordering::SeqCst), 1);
    }
}
