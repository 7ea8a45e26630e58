//! Breakout session lifecycle: model and state-machine guards.
//!
//! A session moves `pending -> active -> ended`. At most one non-ended
//! session exists per live meeting; the guards here are evaluated inside a
//! store transaction on the meeting document so concurrent triggers
//! (duplicate webhooks, racing host clicks, redelivered checks) collapse to
//! a single transition.

use serde::{Deserialize, Serialize};

use crate::event::EventStatus;
use crate::meeting::CurrentSession;
use crate::types::{ParticipantId, SessionId, Timestamp};

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

/// Breakout session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, waiting for its scheduled activation.
    Pending,
    /// Rooms assigned, participants breaking out.
    Active,
    /// Finished; a new session may replace it.
    Ended,
}

impl SessionStatus {
    /// Terminal sessions no longer block creation of a replacement.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Ended)
    }
}

/// How eligible participants are distributed into rooms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    /// Shuffle participants before partitioning.
    Random,
    /// Keep join order (earliest joiners share the first rooms).
    JoinOrder,
}

/// One round of breakout assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutSession {
    pub id: SessionId,
    pub status: SessionStatus,
    pub method: AssignmentMethod,
    pub target_per_room: u32,
    pub include_waiting_room: bool,
    /// When a pending session becomes eligible for activation.
    pub scheduled_at: Timestamp,
    pub created_by: ParticipantId,
    pub created_at: Timestamp,
    pub ended_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// State-machine guards
// ---------------------------------------------------------------------------

/// Outcome of the session-creation guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateCheck {
    /// No live session in the way; write the new pending session.
    Proceed,
    /// The meeting's current session already has the requested id — the
    /// same logical transition fired twice. Skip without scheduling again.
    DuplicateId,
    /// A different pending or active session exists. Skip.
    Busy,
}

/// Decide whether a new session with `requested` id may be created given
/// the meeting's current session descriptor.
pub fn check_create(current: Option<&CurrentSession>, requested: SessionId) -> CreateCheck {
    match current {
        None => CreateCheck::Proceed,
        Some(cur) if cur.id == requested => CreateCheck::DuplicateId,
        Some(cur) if cur.status.is_terminal() => CreateCheck::Proceed,
        Some(_) => CreateCheck::Busy,
    }
}

/// Outcome of the pending-to-active activation guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivateCheck {
    Proceed,
    /// The event was canceled after the check was scheduled.
    EventInactive,
    /// The meeting's current session is no longer the one the check was
    /// scheduled for (replaced or ended in the meantime).
    SessionReplaced,
    /// Already active — a redelivered check. Safe no-op.
    AlreadyActive,
}

/// Decide whether a scheduled activation for `session_id` may run.
pub fn check_activate(
    event_status: EventStatus,
    current: Option<&CurrentSession>,
    session_id: SessionId,
) -> ActivateCheck {
    if event_status != EventStatus::Active {
        return ActivateCheck::EventInactive;
    }
    match current {
        Some(cur) if cur.id == session_id => match cur.status {
            SessionStatus::Active => ActivateCheck::AlreadyActive,
            SessionStatus::Pending => ActivateCheck::Proceed,
            SessionStatus::Ended => ActivateCheck::SessionReplaced,
        },
        _ => ActivateCheck::SessionReplaced,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cur(id: SessionId, status: SessionStatus) -> CurrentSession {
        CurrentSession { id, status }
    }

    // -----------------------------------------------------------------------
    // Creation guard
    // -----------------------------------------------------------------------

    #[test]
    fn create_allowed_when_no_current_session() {
        assert_eq!(check_create(None, SessionId::new()), CreateCheck::Proceed);
    }

    #[test]
    fn create_skipped_for_same_session_id() {
        let id = SessionId::new();
        let current = cur(id, SessionStatus::Pending);
        assert_eq!(check_create(Some(&current), id), CreateCheck::DuplicateId);
    }

    #[test]
    fn create_skipped_while_pending_session_exists() {
        let current = cur(SessionId::new(), SessionStatus::Pending);
        assert_eq!(
            check_create(Some(&current), SessionId::new()),
            CreateCheck::Busy
        );
    }

    #[test]
    fn create_skipped_while_active_session_exists() {
        let current = cur(SessionId::new(), SessionStatus::Active);
        assert_eq!(
            check_create(Some(&current), SessionId::new()),
            CreateCheck::Busy
        );
    }

    #[test]
    fn create_allowed_after_session_ended() {
        let current = cur(SessionId::new(), SessionStatus::Ended);
        assert_eq!(
            check_create(Some(&current), SessionId::new()),
            CreateCheck::Proceed
        );
    }

    // -----------------------------------------------------------------------
    // Activation guard
    // -----------------------------------------------------------------------

    #[test]
    fn activate_allowed_for_matching_pending_session() {
        let id = SessionId::new();
        let current = cur(id, SessionStatus::Pending);
        assert_eq!(
            check_activate(EventStatus::Active, Some(&current), id),
            ActivateCheck::Proceed
        );
    }

    #[test]
    fn activate_blocked_when_event_canceled() {
        let id = SessionId::new();
        let current = cur(id, SessionStatus::Pending);
        assert_eq!(
            check_activate(EventStatus::Canceled, Some(&current), id),
            ActivateCheck::EventInactive
        );
    }

    #[test]
    fn activate_noop_when_already_active() {
        let id = SessionId::new();
        let current = cur(id, SessionStatus::Active);
        assert_eq!(
            check_activate(EventStatus::Active, Some(&current), id),
            ActivateCheck::AlreadyActive
        );
    }

    #[test]
    fn activate_blocked_when_session_replaced() {
        let current = cur(SessionId::new(), SessionStatus::Pending);
        assert_eq!(
            check_activate(EventStatus::Active, Some(&current), SessionId::new()),
            ActivateCheck::SessionReplaced
        );
    }

    #[test]
    fn activate_blocked_when_no_current_session() {
        assert_eq!(
            check_activate(EventStatus::Active, None, SessionId::new()),
            ActivateCheck::SessionReplaced
        );
    }
}
