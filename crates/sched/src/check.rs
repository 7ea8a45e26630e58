//! Check documents: what to run, when, and how the last run went.

use plenum_core::types::{EventId, SessionId, Timestamp};
use plenum_store::{path, DocPath};
use serde::{Deserialize, Serialize};

pub const KIND_WAITING_ROOM: &str = "waiting_room";
pub const KIND_BREAKOUT_START: &str = "breakout_start";
pub const KIND_AUTO_END: &str = "auto_end";

/// What a due check asks its handler to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckRequest {
    /// The event's waiting-room window is over: admit the waiting
    /// participants and, for hostless events, kick off breakouts.
    WaitingRoom { event_id: EventId },
    /// Activate a pending breakout session once its open window elapses.
    BreakoutStart {
        event_id: EventId,
        session_id: SessionId,
    },
    /// Periodic sweep ending events that ran past their end.
    AutoEnd,
}

impl CheckRequest {
    /// Stable kind tag; selects the handler and prefixes the document id.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckRequest::WaitingRoom { .. } => KIND_WAITING_ROOM,
            CheckRequest::BreakoutStart { .. } => KIND_BREAKOUT_START,
            CheckRequest::AutoEnd => KIND_AUTO_END,
        }
    }

    /// Dedupe key within the kind: scheduling the same request twice
    /// addresses the same document.
    pub fn key(&self) -> String {
        match self {
            CheckRequest::WaitingRoom { event_id } => event_id.to_string(),
            CheckRequest::BreakoutStart {
                event_id,
                session_id,
            } => format!("{event_id}:{session_id}"),
            CheckRequest::AutoEnd => "sweep".to_string(),
        }
    }

    pub fn doc_path(&self) -> DocPath {
        path::check(self.kind(), &self.key())
    }
}

/// Lifecycle of a check document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Waiting for its `run_at` to pass.
    Pending,
    /// Leased by a dispatcher instance.
    Running,
    /// Gave up after the retry budget; kept for inspection.
    Failed,
}

/// One durable scheduled check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledCheck {
    pub request: CheckRequest,
    pub run_at: Timestamp,
    pub status: CheckStatus,
    /// Attempts so far, counting the one currently leased.
    pub attempts: u32,
    /// Set while leased; a dispatcher may take over once it passes.
    pub lease_expires_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ScheduledCheck {
    pub fn new(request: CheckRequest, run_at: Timestamp, now: Timestamp) -> Self {
        Self {
            request,
            run_at,
            status: CheckStatus::Pending,
            attempts: 0,
            lease_expires_at: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a dispatcher should pick this check up now.
    pub fn is_due(&self, now: Timestamp) -> bool {
        match self.status {
            CheckStatus::Pending => self.run_at <= now,
            // A running check whose lease expired belonged to an instance
            // that died mid-handle.
            CheckStatus::Running => self
                .lease_expires_at
                .map(|expiry| expiry <= now)
                .unwrap_or(true),
            CheckStatus::Failed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn pending_is_due_once_run_at_passes() {
        let now = Utc::now();
        let check = ScheduledCheck::new(CheckRequest::AutoEnd, now - Duration::seconds(1), now);
        assert!(check.is_due(now));

        let later = ScheduledCheck::new(CheckRequest::AutoEnd, now + Duration::seconds(60), now);
        assert!(!later.is_due(now));
    }

    #[test]
    fn running_is_due_only_after_lease_expiry() {
        let now = Utc::now();
        let mut check = ScheduledCheck::new(CheckRequest::AutoEnd, now, now);
        check.status = CheckStatus::Running;
        check.lease_expires_at = Some(now + Duration::minutes(5));
        assert!(!check.is_due(now));

        check.lease_expires_at = Some(now - Duration::seconds(1));
        assert!(check.is_due(now));
    }

    #[test]
    fn failed_is_never_due() {
        let now = Utc::now();
        let mut check = ScheduledCheck::new(CheckRequest::AutoEnd, now - Duration::hours(1), now);
        check.status = CheckStatus::Failed;
        assert!(!check.is_due(now));
    }

    #[test]
    fn same_request_addresses_same_document() {
        let event_id = EventId::new();
        let a = CheckRequest::WaitingRoom { event_id };
        let b = CheckRequest::WaitingRoom { event_id };
        assert_eq!(a.doc_path(), b.doc_path());
        assert_ne!(
            a.doc_path(),
            CheckRequest::AutoEnd.doc_path(),
        );
    }
}
