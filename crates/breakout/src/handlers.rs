//! Check handlers: scheduled checks driving breakout transitions.
//!
//! Both handlers are idempotent, as the dispatcher's at-least-once delivery
//! requires: every transition they trigger is guarded by the meeting
//! document transaction, so a redelivered check lands on a quiet skip.

use async_trait::async_trait;
use chrono::Utc;
use plenum_core::event::{Event, EventKind, EventStatus};
use plenum_core::types::MeetingId;
use plenum_sched::{BoxError, CheckHandler, CheckRequest, Followup};
use plenum_store::{path, DocumentStoreExt};

use crate::participants::admit_waiting;
use crate::session::{ActivationResult, BreakoutManager, InitiateOutcome, InitiateParams};

/// Fires when a hostless event's waiting-room window closes: admits the
/// lobby and kicks off the first breakout round from the event's defaults.
pub struct WaitingRoomHandler {
    manager: BreakoutManager,
}

impl WaitingRoomHandler {
    pub fn new(manager: BreakoutManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl CheckHandler for WaitingRoomHandler {
    async fn handle(&self, request: &CheckRequest) -> Result<Followup, BoxError> {
        let CheckRequest::WaitingRoom { event_id } = request else {
            tracing::warn!(kind = request.kind(), "waiting-room handler got a foreign check");
            return Ok(Followup::Done);
        };
        let store = self.manager.store();
        let Some(event) = store.get_as::<Event>(&path::event(*event_id)).await? else {
            tracing::warn!(event_id = %event_id, "waiting-room check for unknown event");
            return Ok(Followup::Done);
        };
        if event.status != EventStatus::Active || event.kind != EventKind::Hostless {
            return Ok(Followup::Done);
        }
        let finished_at = event.waiting_room_finished_at();
        if Utc::now() < finished_at {
            // The window moved after this check was armed.
            return Ok(Followup::Reschedule(finished_at));
        }

        admit_waiting(store.as_ref(), MeetingId::from(event.id)).await?;

        match self
            .manager
            .initiate(&event, InitiateParams::from_defaults(&event))
            .await?
        {
            InitiateOutcome::Scheduled { session } => {
                tracing::info!(
                    event_id = %event.id,
                    session_id = %session.id,
                    "hostless breakouts initiated"
                );
            }
            InitiateOutcome::Busy => {
                tracing::debug!(
                    event_id = %event.id,
                    "breakouts already underway at waiting-room close"
                );
            }
            InitiateOutcome::NoMeeting => {
                tracing::info!(event_id = %event.id, "waiting room closed with no live meeting");
            }
            // Immediate assignment only happens for hosted events, which
            // never reach this handler.
            InitiateOutcome::Started { .. } => {}
        }
        Ok(Followup::Done)
    }
}

/// Fires when a pending session's wait window elapses: runs the assignment
/// and flips the session active.
pub struct BreakoutStartHandler {
    manager: BreakoutManager,
}

impl BreakoutStartHandler {
    pub fn new(manager: BreakoutManager) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl CheckHandler for BreakoutStartHandler {
    async fn handle(&self, request: &CheckRequest) -> Result<Followup, BoxError> {
        let CheckRequest::BreakoutStart {
            event_id,
            session_id,
        } = request
        else {
            tracing::warn!(kind = request.kind(), "breakout-start handler got a foreign check");
            return Ok(Followup::Done);
        };
        let store = self.manager.store();
        let Some(event) = store.get_as::<Event>(&path::event(*event_id)).await? else {
            tracing::warn!(event_id = %event_id, "activation check for unknown event");
            return Ok(Followup::Done);
        };

        match self.manager.activate(&event, *session_id).await? {
            ActivationResult::Activated { rooms } => {
                tracing::info!(
                    event_id = %event.id,
                    session_id = %session_id,
                    rooms = rooms.len(),
                    "scheduled breakout activation ran"
                );
            }
            ActivationResult::EndedEmpty => {
                tracing::info!(
                    event_id = %event.id,
                    session_id = %session_id,
                    "scheduled activation found nobody; session ended"
                );
            }
            ActivationResult::Skipped(skip) => {
                tracing::debug!(
                    event_id = %event.id,
                    session_id = %session_id,
                    skip = ?skip,
                    "scheduled activation skipped"
                );
            }
        }
        Ok(Followup::Done)
    }
}
