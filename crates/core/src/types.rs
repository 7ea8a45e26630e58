//! Identifier newtypes and shared primitive aliases.
//!
//! Every entity id is a UUID wrapped in its own type so an event id can
//! never be passed where a room id is expected. The wrappers serialize as
//! plain UUID strings.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }
    };
}

define_id! {
    /// A scheduled deliberation event.
    EventId
}

define_id! {
    /// A live meeting (main event call or a breakout room's own call).
    MeetingId
}

define_id! {
    /// One round of breakout assignment.
    SessionId
}

define_id! {
    /// A single breakout room within a session.
    RoomId
}

define_id! {
    /// A participant (also used for hosts and admins).
    ParticipantId
}

impl From<EventId> for MeetingId {
    /// The main live meeting reuses its event's id.
    fn from(value: EventId) -> Self {
        MeetingId(value.0)
    }
}

impl From<RoomId> for MeetingId {
    /// A breakout room's nested live meeting reuses the room's id.
    fn from(value: RoomId) -> Self {
        MeetingId(value.0)
    }
}
