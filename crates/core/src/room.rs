//! Breakout room model and help-flag transition semantics.

use serde::{Deserialize, Serialize};

use crate::types::{ParticipantId, RoomId, Timestamp};

/// Help-flag status of a breakout room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomFlag {
    Unflagged,
    NeedsHelp,
}

/// One room within a breakout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakoutRoom {
    pub id: RoomId,
    pub name: String,
    /// Assigned members, in assignment order.
    pub participants: Vec<ParticipantId>,
    pub flag: RoomFlag,
    /// When help was first requested. Set only on the
    /// unflagged -> needs-help transition and cleared only on the
    /// transition back to unflagged, so it always reflects the oldest
    /// outstanding request.
    pub help_requested_at: Option<Timestamp>,
    /// Whether this room's nested meeting should be recorded.
    pub record: bool,
}

/// Apply a requested flag change, returning the new flag and timestamp.
///
/// A repeated needs-help update is a no-op for the timestamp; hosts sorting
/// rooms by `help_requested_at` therefore see the room that has been
/// waiting longest first.
pub fn apply_flag(
    current: RoomFlag,
    current_since: Option<Timestamp>,
    requested: RoomFlag,
    now: Timestamp,
) -> (RoomFlag, Option<Timestamp>) {
    match (current, requested) {
        (RoomFlag::Unflagged, RoomFlag::NeedsHelp) => (RoomFlag::NeedsHelp, Some(now)),
        (RoomFlag::NeedsHelp, RoomFlag::NeedsHelp) => (RoomFlag::NeedsHelp, current_since),
        (_, RoomFlag::Unflagged) => (RoomFlag::Unflagged, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn raising_flag_sets_timestamp() {
        let now = Utc::now();
        let (flag, since) = apply_flag(RoomFlag::Unflagged, None, RoomFlag::NeedsHelp, now);
        assert_eq!(flag, RoomFlag::NeedsHelp);
        assert_eq!(since, Some(now));
    }

    #[test]
    fn repeated_needs_help_keeps_original_timestamp() {
        let first = Utc::now();
        let later = first + Duration::seconds(90);
        let (flag, since) =
            apply_flag(RoomFlag::NeedsHelp, Some(first), RoomFlag::NeedsHelp, later);
        assert_eq!(flag, RoomFlag::NeedsHelp);
        assert_eq!(since, Some(first));
    }

    #[test]
    fn clearing_flag_clears_timestamp() {
        let first = Utc::now();
        let (flag, since) = apply_flag(
            RoomFlag::NeedsHelp,
            Some(first),
            RoomFlag::Unflagged,
            first + Duration::seconds(5),
        );
        assert_eq!(flag, RoomFlag::Unflagged);
        assert_eq!(since, None);
    }

    #[test]
    fn clearing_an_unflagged_room_is_a_noop() {
        let now = Utc::now();
        let (flag, since) = apply_flag(RoomFlag::Unflagged, None, RoomFlag::Unflagged, now);
        assert_eq!(flag, RoomFlag::Unflagged);
        assert_eq!(since, None);
    }
}
