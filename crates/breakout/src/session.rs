//! Session lifecycle: initiate, activate, end.

use std::sync::Arc;

use chrono::{Duration, Utc};
use plenum_core::error::CoreError;
use plenum_core::event::{Event, EventKind};
use plenum_core::meeting::LiveMeeting;
use plenum_core::room::BreakoutRoom;
use plenum_core::session::{
    check_activate, check_create, ActivateCheck, AssignmentMethod, BreakoutSession, CreateCheck,
    SessionStatus,
};
use plenum_core::types::{MeetingId, ParticipantId, SessionId};
use plenum_sched::{CheckRequest, Scheduler};
use plenum_store::{path, DocumentStore, DocumentStoreExt, StoreError, TxPlan, TxWrite};
use serde_json::json;

use crate::participants::eligible_participants;
use crate::rooms::assign_rooms;
use crate::BreakoutError;

/// How long a hostless session stays pending before activation.
pub const DEFAULT_WAIT_WINDOW_SECS: i64 = 30;

/// Assignment parameters for one initiation.
#[derive(Debug, Clone)]
pub struct InitiateParams {
    pub method: AssignmentMethod,
    pub target_per_room: u32,
    pub include_waiting_room: bool,
    pub created_by: ParticipantId,
}

impl InitiateParams {
    /// Parameters for hostless auto-initiation, taken from the event's
    /// breakout defaults and recorded as created by the host.
    pub fn from_defaults(event: &Event) -> Self {
        Self {
            method: event.breakout_defaults.method,
            target_per_room: event.breakout_defaults.target_per_room,
            include_waiting_room: event.breakout_defaults.include_waiting_room,
            created_by: event.host_id,
        }
    }
}

/// Result of an initiation attempt.
#[derive(Debug)]
pub enum InitiateOutcome {
    /// Hostless: a pending session was written and its activation check
    /// scheduled.
    Scheduled { session: BreakoutSession },
    /// Hosted: the session was created and activated in one call.
    Started {
        session: BreakoutSession,
        rooms: Vec<BreakoutRoom>,
    },
    /// A pending or active session is already in place.
    Busy,
    /// The event has no live meeting yet, so there is nobody to assign.
    NoMeeting,
}

/// Why a scheduled activation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSkip {
    /// The event was canceled after the activation was scheduled.
    EventInactive,
    /// The meeting's current session is no longer the scheduled one.
    SessionReplaced,
    /// Redelivered trigger; the session is already active.
    AlreadyActive,
}

/// Result of an activation attempt.
#[derive(Debug)]
pub enum ActivationResult {
    Activated { rooms: Vec<BreakoutRoom> },
    /// Nobody eligible: the session was ended instead of activated.
    EndedEmpty,
    /// A redelivered or superseded trigger; nothing changed.
    Skipped(ActivationSkip),
}

/// Orchestrates breakout session transitions against the document store.
///
/// All state transitions run inside a transaction guarded by the event's
/// main meeting document, whose `current_session` descriptor is the single
/// source of truth for what is live.
#[derive(Clone)]
pub struct BreakoutManager {
    store: Arc<dyn DocumentStore>,
    scheduler: Scheduler,
    wait_window: Duration,
}

impl BreakoutManager {
    pub fn new(store: Arc<dyn DocumentStore>, scheduler: Scheduler) -> Self {
        Self {
            store,
            scheduler,
            wait_window: Duration::seconds(DEFAULT_WAIT_WINDOW_SECS),
        }
    }

    /// Override the pending window before hostless activation.
    pub fn with_wait_window(mut self, wait_window: Duration) -> Self {
        self.wait_window = wait_window;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Create a new breakout session for the event.
    ///
    /// Hosted events assign immediately; hostless events leave the session
    /// pending for the wait window and schedule its activation check.
    /// Creation is guarded by a transaction on the meeting document, so
    /// concurrent initiations collapse to one session.
    pub async fn initiate(
        &self,
        event: &Event,
        params: InitiateParams,
    ) -> Result<InitiateOutcome, BreakoutError> {
        let session_id = SessionId::new();
        let now = Utc::now();
        let scheduled_at = match event.kind {
            EventKind::Hosted => now,
            EventKind::Hostless => now + self.wait_window,
        };
        let mut session = BreakoutSession {
            id: session_id,
            status: SessionStatus::Pending,
            method: params.method,
            target_per_room: params.target_per_room,
            include_waiting_room: params.include_waiting_room,
            scheduled_at,
            created_by: params.created_by,
            created_at: now,
            ended_at: None,
        };

        let meeting_path = path::meeting(MeetingId::from(event.id));
        let session_path = path::session(event.id, session_id);
        let session_value = serde_json::to_value(&session).map_err(|source| StoreError::Decode {
            path: session_path.as_str().to_string(),
            source,
        })?;

        let mut decision: Option<CreateCheck> = None;
        let mut meeting_absent = false;
        let mut decode_err: Option<StoreError> = None;
        let outcome = self
            .store
            .run_transaction(
                &meeting_path,
                Box::new(|current| {
                    let Some(value) = current else {
                        meeting_absent = true;
                        return TxPlan::Abort("no live meeting".to_string());
                    };
                    let meeting: LiveMeeting = match serde_json::from_value(value) {
                        Ok(meeting) => meeting,
                        Err(source) => {
                            decode_err = Some(StoreError::Decode {
                                path: meeting_path.as_str().to_string(),
                                source,
                            });
                            return TxPlan::Abort("unreadable meeting document".to_string());
                        }
                    };
                    let check = check_create(meeting.current_session.as_ref(), session_id);
                    decision = Some(check);
                    match check {
                        CreateCheck::Proceed => TxPlan::Commit(vec![
                            TxWrite::set(session_path.clone(), session_value.clone()),
                            TxWrite::merge(
                                meeting_path.clone(),
                                json!({
                                    "current_session": {
                                        "id": session_id,
                                        "status": "pending",
                                    }
                                }),
                            ),
                        ]),
                        CreateCheck::DuplicateId => {
                            TxPlan::Abort("session already created".to_string())
                        }
                        CreateCheck::Busy => TxPlan::Abort("another session is live".to_string()),
                    }
                }),
            )
            .await?;

        if let Some(e) = decode_err {
            return Err(e.into());
        }
        if meeting_absent {
            tracing::debug!(event_id = %event.id, "initiation skipped; event has no live meeting");
            return Ok(InitiateOutcome::NoMeeting);
        }
        if !outcome.committed() {
            tracing::debug!(
                event_id = %event.id,
                decision = ?decision,
                "initiation skipped; a session is already in place"
            );
            return Ok(InitiateOutcome::Busy);
        }

        match event.kind {
            EventKind::Hostless => {
                self.scheduler
                    .schedule(
                        CheckRequest::BreakoutStart {
                            event_id: event.id,
                            session_id,
                        },
                        scheduled_at,
                    )
                    .await?;
                tracing::info!(
                    event_id = %event.id,
                    session_id = %session_id,
                    scheduled_at = %scheduled_at,
                    "pending breakout session created"
                );
                Ok(InitiateOutcome::Scheduled { session })
            }
            EventKind::Hosted => match self.activate(event, session_id).await? {
                ActivationResult::Activated { rooms } => {
                    session.status = SessionStatus::Active;
                    Ok(InitiateOutcome::Started { session, rooms })
                }
                ActivationResult::EndedEmpty => Err(CoreError::Validation(
                    "no eligible participants to assign".to_string(),
                )
                .into()),
                ActivationResult::Skipped(_) => Err(CoreError::Conflict(
                    "session was superseded during initiation".to_string(),
                )
                .into()),
            },
        }
    }

    /// Activate a pending session: assign rooms and flip everything live.
    ///
    /// Gated on the event still being active and the meeting's current
    /// session still being the requested one, so redelivered triggers are
    /// quiet no-ops. With nobody eligible the session is ended instead,
    /// leaving the meeting free for a later round.
    pub async fn activate(
        &self,
        event: &Event,
        session_id: SessionId,
    ) -> Result<ActivationResult, BreakoutError> {
        let meeting_id = MeetingId::from(event.id);
        let meeting_path = path::meeting(meeting_id);
        let session_path = path::session(event.id, session_id);

        // The session document carries the assignment parameters.
        let Some(session) = self.store.get_as::<BreakoutSession>(&session_path).await? else {
            tracing::warn!(
                event_id = %event.id,
                session_id = %session_id,
                "activation target session document is missing"
            );
            return Ok(ActivationResult::Skipped(ActivationSkip::SessionReplaced));
        };

        let eligible = eligible_participants(
            self.store.as_ref(),
            meeting_id,
            session.include_waiting_room,
            Some(event.host_id),
        )
        .await?;
        let rooms = assign_rooms(
            session.method,
            session.target_per_room,
            &eligible,
            event.settings.always_record,
        )?;

        // Precompute both possible write batches; the transaction closure
        // only decides which (if either) applies.
        let now = Utc::now();
        let mut activation_writes = vec![
            TxWrite::merge(session_path.clone(), json!({ "status": "active" })),
            TxWrite::merge(
                meeting_path.clone(),
                json!({ "current_session": { "id": session_id, "status": "active" } }),
            ),
        ];
        for room in &rooms {
            let room_path = path::room(event.id, session_id, room.id);
            let room_value = serde_json::to_value(room).map_err(|source| StoreError::Decode {
                path: room_path.as_str().to_string(),
                source,
            })?;
            activation_writes.push(TxWrite::set(room_path, room_value));

            // The room's nested meeting exists from activation on; the
            // first join stamps its `started_at`.
            let nested = LiveMeeting {
                id: MeetingId::from(room.id),
                record: room.record,
                current_session: None,
                started_at: None,
            };
            let nested_path = path::meeting(nested.id);
            let nested_value =
                serde_json::to_value(&nested).map_err(|source| StoreError::Decode {
                    path: nested_path.as_str().to_string(),
                    source,
                })?;
            activation_writes.push(TxWrite::set(nested_path, nested_value));
        }
        let end_writes = vec![
            TxWrite::merge(
                session_path.clone(),
                json!({ "status": "ended", "ended_at": now }),
            ),
            TxWrite::merge(meeting_path.clone(), json!({ "current_session": null })),
        ];

        let event_status = event.status;
        let assigning = !rooms.is_empty();
        let mut check_result: Option<ActivateCheck> = None;
        let mut decode_err: Option<StoreError> = None;
        let outcome = self
            .store
            .run_transaction(
                &meeting_path,
                Box::new(|current| {
                    let Some(value) = current else {
                        return TxPlan::Abort("no live meeting".to_string());
                    };
                    let meeting: LiveMeeting = match serde_json::from_value(value) {
                        Ok(meeting) => meeting,
                        Err(source) => {
                            decode_err = Some(StoreError::Decode {
                                path: meeting_path.as_str().to_string(),
                                source,
                            });
                            return TxPlan::Abort("unreadable meeting document".to_string());
                        }
                    };
                    let check =
                        check_activate(event_status, meeting.current_session.as_ref(), session_id);
                    check_result = Some(check);
                    match check {
                        ActivateCheck::Proceed if assigning => {
                            TxPlan::Commit(activation_writes.clone())
                        }
                        ActivateCheck::Proceed => TxPlan::Commit(end_writes.clone()),
                        ActivateCheck::EventInactive => {
                            TxPlan::Abort("event is no longer active".to_string())
                        }
                        ActivateCheck::SessionReplaced => {
                            TxPlan::Abort("session was replaced".to_string())
                        }
                        ActivateCheck::AlreadyActive => {
                            TxPlan::Abort("session is already active".to_string())
                        }
                    }
                }),
            )
            .await?;

        if let Some(e) = decode_err {
            return Err(e.into());
        }
        if outcome.committed() {
            if assigning {
                tracing::info!(
                    event_id = %event.id,
                    session_id = %session_id,
                    rooms = rooms.len(),
                    participants = eligible.len(),
                    "breakout session activated"
                );
                return Ok(ActivationResult::Activated { rooms });
            }
            tracing::info!(
                event_id = %event.id,
                session_id = %session_id,
                "no eligible participants; breakout session ended"
            );
            return Ok(ActivationResult::EndedEmpty);
        }

        let skip = match check_result {
            Some(ActivateCheck::EventInactive) => ActivationSkip::EventInactive,
            Some(ActivateCheck::AlreadyActive) => ActivationSkip::AlreadyActive,
            _ => ActivationSkip::SessionReplaced,
        };
        tracing::debug!(
            event_id = %event.id,
            session_id = %session_id,
            skip = ?skip,
            "activation skipped"
        );
        Ok(ActivationResult::Skipped(skip))
    }

    /// End the event's current session, whatever its state.
    ///
    /// Clears the meeting's `current_session` so a new round may be
    /// created, and cancels a still-pending activation check. Returns the
    /// ended session's id, or `None` when there was nothing to end.
    pub async fn end_current(&self, event: &Event) -> Result<Option<SessionId>, BreakoutError> {
        let meeting_path = path::meeting(MeetingId::from(event.id));
        let now = Utc::now();

        let mut ended: Option<SessionId> = None;
        let mut decode_err: Option<StoreError> = None;
        let event_id = event.id;
        let outcome = self
            .store
            .run_transaction(
                &meeting_path,
                Box::new(|current| {
                    let Some(value) = current else {
                        return TxPlan::Abort("no live meeting".to_string());
                    };
                    let meeting: LiveMeeting = match serde_json::from_value(value) {
                        Ok(meeting) => meeting,
                        Err(source) => {
                            decode_err = Some(StoreError::Decode {
                                path: meeting_path.as_str().to_string(),
                                source,
                            });
                            return TxPlan::Abort("unreadable meeting document".to_string());
                        }
                    };
                    match meeting.current_session {
                        Some(current) if !current.status.is_terminal() => {
                            ended = Some(current.id);
                            TxPlan::Commit(vec![
                                TxWrite::merge(
                                    path::session(event_id, current.id),
                                    json!({ "status": "ended", "ended_at": now }),
                                ),
                                TxWrite::merge(
                                    meeting_path.clone(),
                                    json!({ "current_session": null }),
                                ),
                            ])
                        }
                        _ => TxPlan::Abort("no live session".to_string()),
                    }
                }),
            )
            .await?;

        if let Some(e) = decode_err {
            return Err(e.into());
        }
        if !outcome.committed() {
            return Ok(None);
        }
        let Some(session_id) = ended else {
            return Ok(None);
        };

        // Best effort: a pending activation for this session is now moot.
        if let Err(e) = self
            .scheduler
            .cancel(&CheckRequest::BreakoutStart {
                event_id: event.id,
                session_id,
            })
            .await
        {
            tracing::warn!(
                event_id = %event.id,
                session_id = %session_id,
                error = %e,
                "failed to cancel pending activation check"
            );
        }
        tracing::info!(event_id = %event.id, session_id = %session_id, "breakout session ended");
        Ok(Some(session_id))
    }
}
