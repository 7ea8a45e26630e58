//! Recording channel and storage-prefix naming conventions.
//!
//! The download collaborator discovers finished `.mp4` objects by prefix:
//! the event id for the main room, the breakout room id for breakout
//! rooms. Everything that names a channel or a storage object goes through
//! [`RoomTarget`] so the two sides can never drift apart.

use serde::{Deserialize, Serialize};

use crate::types::{EventId, MeetingId, RoomId, SessionId};

/// Reference to a breakout room within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BreakoutRef {
    pub session_id: SessionId,
    pub room_id: RoomId,
}

/// The meeting a recording covers: an event's main room or one breakout
/// room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomTarget {
    pub event_id: EventId,
    /// `None` for the main room.
    pub breakout: Option<BreakoutRef>,
}

impl RoomTarget {
    /// Target the event's main room.
    pub fn main(event_id: EventId) -> Self {
        Self {
            event_id,
            breakout: None,
        }
    }

    /// Target one breakout room of the event.
    pub fn breakout(event_id: EventId, session_id: SessionId, room_id: RoomId) -> Self {
        Self {
            event_id,
            breakout: Some(BreakoutRef {
                session_id,
                room_id,
            }),
        }
    }

    /// The media channel the recorder joins.
    ///
    /// ```
    /// use plenum_core::naming::RoomTarget;
    /// use plenum_core::types::{EventId, RoomId, SessionId};
    ///
    /// let event = EventId::new();
    /// assert_eq!(RoomTarget::main(event).channel_name(), event.to_string());
    ///
    /// let room = RoomId::new();
    /// let target = RoomTarget::breakout(event, SessionId::new(), room);
    /// assert_eq!(target.channel_name(), room.to_string());
    /// ```
    pub fn channel_name(&self) -> String {
        match &self.breakout {
            None => self.event_id.to_string(),
            Some(b) => b.room_id.to_string(),
        }
    }

    /// Storage-object name prefix for this room's recording files.
    ///
    /// Identical to the channel name by convention: event id for the main
    /// room, room id for a breakout room.
    pub fn file_prefix(&self) -> String {
        self.channel_name()
    }

    /// Id of the live meeting this target addresses.
    ///
    /// The main room's meeting reuses the event id; a breakout room's
    /// meeting reuses the room id.
    pub fn meeting_id(&self) -> MeetingId {
        match &self.breakout {
            None => MeetingId::from(self.event_id),
            Some(b) => MeetingId::from(b.room_id),
        }
    }

    pub fn is_main(&self) -> bool {
        self.breakout.is_none()
    }
}

impl std::fmt::Display for RoomTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.breakout {
            None => write!(f, "event {} main room", self.event_id),
            Some(b) => write!(f, "event {} room {}", self.event_id, b.room_id),
        }
    }
}
