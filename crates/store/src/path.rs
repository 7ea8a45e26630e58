//! Typed builders for document paths.
//!
//! Every document the service touches lives at a path assembled here.
//! Free-form string paths drift between writers and readers, so the
//! constructors in this module are the only sanctioned way to produce a
//! [`DocPath`] or [`CollectionPath`].
//!
//! Layout:
//!
//! ```text
//! events/{event_id}
//! events/{event_id}/sessions/{session_id}
//! events/{event_id}/sessions/{session_id}/rooms/{room_id}
//! meetings/{meeting_id}
//! meetings/{meeting_id}/participants/{participant_id}
//! meetings/{meeting_id}/recording/state
//! checks/{kind}:{key}
//! ```
//!
//! A meeting id is the event id for the main room and the breakout room id
//! for a breakout room, so `meetings/*` addresses both uniformly.

use std::fmt;

use plenum_core::types::{EventId, MeetingId, ParticipantId, RoomId, SessionId};

const EVENTS: &str = "events";
const SESSIONS: &str = "sessions";
const ROOMS: &str = "rooms";
const MEETINGS: &str = "meetings";
const PARTICIPANTS: &str = "participants";
const RECORDING: &str = "recording";
/// Singleton document id under the `recording` subcollection.
const RECORDING_STATE: &str = "state";
const CHECKS: &str = "checks";

/// Path of a single document.
///
/// Always an even number of segments: alternating collection names and
/// document ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocPath(String);

impl DocPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The document's id within its collection (last path segment).
    pub fn doc_id(&self) -> &str {
        match self.0.rsplit_once('/') {
            Some((_, id)) => id,
            None => &self.0,
        }
    }

    /// The collection holding this document.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath(parent.to_string()),
            None => CollectionPath(String::new()),
        }
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a collection: a set of sibling documents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Address one document inside this collection.
    pub fn doc(&self, id: impl fmt::Display) -> DocPath {
        DocPath(format!("{}/{}", self.0, id))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Collection of all event documents.
pub fn events() -> CollectionPath {
    CollectionPath(EVENTS.to_string())
}

/// Document for one event.
pub fn event(id: EventId) -> DocPath {
    events().doc(id)
}

/// Collection of breakout sessions under an event.
pub fn sessions(event_id: EventId) -> CollectionPath {
    CollectionPath(format!("{EVENTS}/{event_id}/{SESSIONS}"))
}

/// Document for one breakout session.
pub fn session(event_id: EventId, session_id: SessionId) -> DocPath {
    sessions(event_id).doc(session_id)
}

/// Collection of rooms under a breakout session.
pub fn rooms(event_id: EventId, session_id: SessionId) -> CollectionPath {
    CollectionPath(format!(
        "{EVENTS}/{event_id}/{SESSIONS}/{session_id}/{ROOMS}"
    ))
}

/// Document for one breakout room.
pub fn room(event_id: EventId, session_id: SessionId, room_id: RoomId) -> DocPath {
    rooms(event_id, session_id).doc(room_id)
}

/// Document for one live meeting (main room or breakout room).
pub fn meeting(id: MeetingId) -> DocPath {
    CollectionPath(MEETINGS.to_string()).doc(id)
}

/// Collection of participant presences within a meeting.
pub fn participants(meeting_id: MeetingId) -> CollectionPath {
    CollectionPath(format!("{MEETINGS}/{meeting_id}/{PARTICIPANTS}"))
}

/// Presence document for one participant of a meeting.
pub fn participant(meeting_id: MeetingId, participant_id: ParticipantId) -> DocPath {
    participants(meeting_id).doc(participant_id)
}

/// Singleton recording-state document for a meeting.
///
/// ```
/// use plenum_core::types::{EventId, MeetingId};
/// use plenum_store::path;
///
/// let meeting = MeetingId::from(EventId::new());
/// let p = path::recording_state(meeting);
/// assert!(p.as_str().ends_with("/recording/state"));
/// assert_eq!(p.doc_id(), "state");
/// ```
pub fn recording_state(meeting_id: MeetingId) -> DocPath {
    CollectionPath(format!("{MEETINGS}/{meeting_id}/{RECORDING}")).doc(RECORDING_STATE)
}

/// Collection of scheduled checks.
pub fn checks() -> CollectionPath {
    CollectionPath(CHECKS.to_string())
}

/// Document for one scheduled check.
///
/// The id embeds the check kind and its subject key, so scheduling the same
/// logical check twice addresses the same document.
pub fn check(kind: &str, key: &str) -> DocPath {
    checks().doc(format_args!("{kind}:{key}"))
}
