//! Event entity: a scheduled deliberation instance.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::session::AssignmentMethod;
use crate::types::{EventId, ParticipantId, Timestamp};

/// Who drives the event's breakout transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A human host triggers breakouts manually.
    Hosted,
    /// Breakouts start automatically when the waiting room elapses.
    Hostless,
}

/// Event lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Active,
    Canceled,
}

/// Per-event feature toggles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSettings {
    /// Start a cloud recording for every live meeting of this event.
    pub always_record: bool,
    /// Send reminder emails before the scheduled start (delivery is an
    /// external collaborator; the flag is only carried here).
    pub reminder_emails: bool,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            always_record: false,
            reminder_emails: true,
        }
    }
}

/// Default assignment policy applied when a breakout session is created
/// without explicit parameters (hostless auto-initiation uses these).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakoutDefaults {
    pub method: AssignmentMethod,
    pub target_per_room: u32,
    pub include_waiting_room: bool,
}

impl Default for BreakoutDefaults {
    fn default() -> Self {
        Self {
            method: AssignmentMethod::Random,
            target_per_room: 6,
            include_waiting_room: true,
        }
    }
}

/// A scheduled deliberation instance.
///
/// Events are created by a host, mutated on scheduling changes, and
/// auto-locked once their end time passes. They are never hard-deleted by
/// this subsystem (cancellation flips [`EventStatus::Canceled`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub host_id: ParticipantId,
    pub kind: EventKind,
    pub status: EventStatus,
    /// One-way flag preventing new joins. Set by the auto-end scan once the
    /// event's end time passes; never cleared by this subsystem.
    pub locked: bool,
    pub scheduled_start: Timestamp,
    pub duration_minutes: i64,
    /// How long hostless participants sit in the waiting room before
    /// breakout assignment becomes eligible.
    pub waiting_room_minutes: i64,
    pub settings: EventSettings,
    pub breakout_defaults: BreakoutDefaults,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Event {
    /// When the waiting room closes and hostless breakouts may begin.
    pub fn waiting_room_finished_at(&self) -> Timestamp {
        self.scheduled_start + Duration::minutes(self.waiting_room_minutes)
    }

    /// The event's effective end time.
    ///
    /// Prefers the observed live-meeting start over the nominal scheduled
    /// time when available, so an event that started late is not cut short.
    pub fn effective_end(&self, actual_start: Option<Timestamp>) -> Timestamp {
        actual_start.unwrap_or(self.scheduled_start) + Duration::minutes(self.duration_minutes)
    }

    /// Whether the event is past its effective end time.
    pub fn is_past_end(&self, actual_start: Option<Timestamp>, now: Timestamp) -> bool {
        now > self.effective_end(actual_start)
    }

    /// Whether new participants may still join.
    pub fn accepts_joins(&self) -> bool {
        self.status == EventStatus::Active && !self.locked
    }
}
