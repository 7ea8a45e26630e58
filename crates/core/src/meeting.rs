//! Live meeting and participant presence documents.

use serde::{Deserialize, Serialize};

use crate::session::SessionStatus;
use crate::types::{MeetingId, ParticipantId, SessionId, Timestamp};

/// Descriptor of the meeting's current breakout session, embedded in the
/// live meeting document so session creation can be guarded by a single
/// transactional read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentSession {
    pub id: SessionId,
    pub status: SessionStatus,
}

/// The active video session tied to one event or one breakout room.
///
/// Created on first join. The `id` always equals the owning entity's id
/// (event id for the main meeting, room id for a breakout room's nested
/// meeting), so the meeting path is derivable without an extra read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveMeeting {
    pub id: MeetingId,
    /// Whether a cloud recording should cover this meeting.
    pub record: bool,
    /// The current (non-ended) breakout session, if any. Only meaningful on
    /// the main meeting.
    pub current_session: Option<CurrentSession>,
    /// First-join time, set exactly once. The auto-end scan prefers this
    /// over the event's nominal schedule.
    pub started_at: Option<Timestamp>,
}

impl LiveMeeting {
    /// A fresh meeting document as written on first join.
    pub fn on_first_join(id: MeetingId, record: bool, now: Timestamp) -> Self {
        Self {
            id,
            record,
            current_session: None,
            started_at: Some(now),
        }
    }
}

/// A participant's presence in a live meeting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub joined_at: Timestamp,
    /// Participant is in the hostless waiting room (lobby) rather than the
    /// main call.
    pub waiting: bool,
    /// Cleared when the participant leaves.
    pub active: bool,
}
