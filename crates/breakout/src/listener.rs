//! Keeps waiting-room checks aligned with event mutations.
//!
//! Hostless events carry one durable waiting-room check, armed for the
//! moment the lobby window closes. Every event write funnels through this
//! listener so the check follows schedule changes, appears when an event
//! becomes hostless, and disappears when it is canceled or becomes hosted.

use plenum_core::event::{Event, EventKind, EventStatus};
use plenum_sched::{CheckRequest, Scheduler};

use crate::BreakoutError;

#[derive(Clone)]
pub struct EventListener {
    scheduler: Scheduler,
}

impl EventListener {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    fn wants_check(event: &Event) -> bool {
        event.kind == EventKind::Hostless && event.status == EventStatus::Active
    }

    /// Called once after an event is first written.
    pub async fn event_created(&self, event: &Event) -> Result<(), BreakoutError> {
        if Self::wants_check(event) {
            self.scheduler
                .schedule(
                    CheckRequest::WaitingRoom { event_id: event.id },
                    event.waiting_room_finished_at(),
                )
                .await?;
        }
        Ok(())
    }

    /// Called after an event mutation, with both versions.
    pub async fn event_updated(&self, before: &Event, after: &Event) -> Result<(), BreakoutError> {
        let request = CheckRequest::WaitingRoom { event_id: after.id };

        if !Self::wants_check(after) {
            if Self::wants_check(before) {
                self.scheduler.cancel(&request).await?;
            }
            return Ok(());
        }

        let window_moved =
            before.waiting_room_finished_at() != after.waiting_room_finished_at();
        if window_moved || !Self::wants_check(before) {
            self.scheduler
                .schedule(request, after.waiting_room_finished_at())
                .await?;
        }
        Ok(())
    }

    /// Called after an event is canceled.
    pub async fn event_canceled(&self, event: &Event) -> Result<(), BreakoutError> {
        self.scheduler
            .cancel(&CheckRequest::WaitingRoom { event_id: event.id })
            .await?;
        Ok(())
    }
}
