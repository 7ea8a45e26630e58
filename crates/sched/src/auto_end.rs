//! Auto-end sweep: locks events that ran past their end time.
//!
//! One self-rescheduling [`CheckRequest::AutoEnd`] drives the sweep; it is
//! armed once at startup and re-arms itself after every run, so exactly one
//! instance of the fleet executes each pass. The effective end prefers the
//! live meeting's actual start over the nominal schedule, so a late-started
//! event gets its full duration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use plenum_core::event::{Event, EventStatus};
use plenum_core::meeting::LiveMeeting;
use plenum_core::types::{MeetingId, Timestamp};
use plenum_store::{path, DocumentStore, DocumentStoreExt, StoreError};
use serde_json::json;

use crate::check::CheckRequest;
use crate::dispatcher::{BoxError, CheckHandler, Followup};

/// Seconds between sweeps.
const SWEEP_INTERVAL_SECS: i64 = 60;

/// Handler for the [`CheckRequest::AutoEnd`] sweep.
pub struct AutoEndHandler {
    store: Arc<dyn DocumentStore>,
}

impl AutoEndHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Scan every event and lock the ones past their effective end.
    /// Returns how many were locked this pass.
    async fn sweep(&self, now: Timestamp) -> Result<u32, StoreError> {
        let mut locked = 0;
        for doc in self.store.list(&path::events()).await? {
            let event: Event = match doc.decode_as() {
                Ok(event) => event,
                Err(error) => {
                    tracing::warn!(doc_id = %doc.id, error = %error, "skipping undecodable event");
                    continue;
                }
            };
            if event.status != EventStatus::Active || event.locked {
                continue;
            }
            // One bad event must not starve the rest of the sweep.
            match self.lock_if_past_end(&event, now).await {
                Ok(true) => locked += 1,
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(event_id = %event.id, error = %error, "auto-end pass failed for event");
                }
            }
        }
        Ok(locked)
    }

    async fn lock_if_past_end(&self, event: &Event, now: Timestamp) -> Result<bool, StoreError> {
        let meeting = self
            .store
            .get_as::<LiveMeeting>(&path::meeting(MeetingId::from(event.id)))
            .await?;
        let actual_start = meeting.and_then(|m| m.started_at);
        if !event.is_past_end(actual_start, now) {
            return Ok(false);
        }
        // The lock is one-way, so a concurrent sweep writing the same
        // fields is harmless.
        self.store
            .update(
                &path::event(event.id),
                json!({ "locked": true, "updated_at": now }),
            )
            .await?;
        tracing::info!(
            event_id = %event.id,
            end = %event.effective_end(actual_start),
            "event ran past its end; locked"
        );
        Ok(true)
    }
}

#[async_trait]
impl CheckHandler for AutoEndHandler {
    async fn handle(&self, request: &CheckRequest) -> Result<Followup, BoxError> {
        if !matches!(request, CheckRequest::AutoEnd) {
            tracing::warn!(kind = request.kind(), "auto-end handler got a foreign check");
            return Ok(Followup::Done);
        }
        let now = Utc::now();
        match self.sweep(now).await {
            Ok(0) => {}
            Ok(locked) => tracing::info!(locked, "auto-end sweep locked events"),
            // A failed pass must not burn the check's retry budget: the
            // sweep is perpetual, so the next interval is the retry.
            Err(error) => tracing::error!(error = %error, "auto-end sweep failed"),
        }
        Ok(Followup::Reschedule(
            now + Duration::seconds(SWEEP_INTERVAL_SECS),
        ))
    }
}
