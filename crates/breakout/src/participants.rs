//! Presence queries against a live meeting's participant collection.

use plenum_core::meeting::Presence;
use plenum_core::types::{MeetingId, ParticipantId};
use plenum_store::{path, DocumentStore, StoreError};
use serde_json::json;

/// Load the participants eligible for breakout assignment, sorted by join
/// time.
///
/// Eligible means active (still present), not the excluded participant
/// (the event host stays in the main room), and not sitting in the waiting
/// room unless `include_waiting_room` says lobby participants count.
/// Unreadable presence documents are skipped with a warning rather than
/// failing the whole assignment.
pub async fn eligible_participants(
    store: &dyn DocumentStore,
    meeting_id: MeetingId,
    include_waiting_room: bool,
    exclude: Option<ParticipantId>,
) -> Result<Vec<Presence>, StoreError> {
    let mut eligible = Vec::new();
    for doc in store.list(&path::participants(meeting_id)).await? {
        let presence: Presence = match doc.decode_as() {
            Ok(presence) => presence,
            Err(e) => {
                tracing::warn!(
                    meeting_id = %meeting_id,
                    participant = %doc.id,
                    error = %e,
                    "skipping unreadable presence document"
                );
                continue;
            }
        };
        if !presence.active {
            continue;
        }
        if presence.waiting && !include_waiting_room {
            continue;
        }
        if exclude == Some(presence.participant_id) {
            continue;
        }
        eligible.push(presence);
    }
    eligible.sort_by_key(|p| p.joined_at);
    Ok(eligible)
}

/// Move every waiting participant of the meeting into the call.
///
/// Runs when the waiting-room window elapses. Each admission is written
/// independently so one failing document does not strand the rest; returns
/// how many were admitted.
pub async fn admit_waiting(
    store: &dyn DocumentStore,
    meeting_id: MeetingId,
) -> Result<usize, StoreError> {
    let mut admitted = 0;
    for doc in store.list(&path::participants(meeting_id)).await? {
        let presence: Presence = match doc.decode_as() {
            Ok(presence) => presence,
            Err(e) => {
                tracing::warn!(
                    meeting_id = %meeting_id,
                    participant = %doc.id,
                    error = %e,
                    "skipping unreadable presence document"
                );
                continue;
            }
        };
        if !presence.active || !presence.waiting {
            continue;
        }
        let presence_path = path::participant(meeting_id, presence.participant_id);
        match store
            .update(&presence_path, json!({ "waiting": false }))
            .await
        {
            Ok(()) => admitted += 1,
            Err(e) => {
                tracing::warn!(
                    meeting_id = %meeting_id,
                    participant_id = %presence.participant_id,
                    error = %e,
                    "failed to admit waiting participant"
                );
            }
        }
    }
    if admitted > 0 {
        tracing::info!(meeting_id = %meeting_id, admitted, "admitted waiting participants");
    }
    Ok(admitted)
}
