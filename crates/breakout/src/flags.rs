//! Help-flag updates on breakout rooms.

use chrono::Utc;
use plenum_core::error::CoreError;
use plenum_core::room::{apply_flag, BreakoutRoom, RoomFlag};
use plenum_core::types::{EventId, ParticipantId, RoomId, SessionId};
use plenum_store::{path, DocumentStore, StoreError, TxPlan, TxWrite};
use serde_json::json;

use crate::BreakoutError;

/// Apply a help-flag change to a room.
///
/// Permitted to room members and privileged callers (the event host,
/// admins). Runs as a transaction on the room document so racing updates
/// keep the oldest outstanding request's timestamp. Returns the room as it
/// stands after the update; a repeated needs-help request is a no-op.
pub async fn update_flag(
    store: &dyn DocumentStore,
    event_id: EventId,
    session_id: SessionId,
    room_id: RoomId,
    requested: RoomFlag,
    actor: ParticipantId,
    privileged: bool,
) -> Result<BreakoutRoom, BreakoutError> {
    let room_path = path::room(event_id, session_id, room_id);
    let now = Utc::now();

    let mut updated: Option<BreakoutRoom> = None;
    let mut failure: Option<BreakoutError> = None;
    let outcome = store
        .run_transaction(
            &room_path,
            Box::new(|current| {
                let Some(value) = current else {
                    failure = Some(CoreError::not_found("breakout room", room_id).into());
                    return TxPlan::Abort("room not found".to_string());
                };
                let mut room: BreakoutRoom = match serde_json::from_value(value) {
                    Ok(room) => room,
                    Err(source) => {
                        failure = Some(
                            StoreError::Decode {
                                path: room_path.as_str().to_string(),
                                source,
                            }
                            .into(),
                        );
                        return TxPlan::Abort("unreadable room document".to_string());
                    }
                };
                if !privileged && !room.participants.contains(&actor) {
                    failure = Some(
                        CoreError::Forbidden("not a member of this room".to_string()).into(),
                    );
                    return TxPlan::Abort("not a room member".to_string());
                }

                let (flag, since) = apply_flag(room.flag, room.help_requested_at, requested, now);
                if flag == room.flag && since == room.help_requested_at {
                    updated = Some(room);
                    return TxPlan::Abort("flag unchanged".to_string());
                }
                room.flag = flag;
                room.help_requested_at = since;
                updated = Some(room);
                TxPlan::Commit(vec![TxWrite::merge(
                    room_path.clone(),
                    json!({ "flag": flag, "help_requested_at": since }),
                )])
            }),
        )
        .await?;

    if let Some(failure) = failure {
        return Err(failure);
    }
    if outcome.committed() {
        tracing::debug!(
            event_id = %event_id,
            room_id = %room_id,
            flag = ?requested,
            "room flag updated"
        );
    }
    match updated {
        Some(room) => Ok(room),
        None => Err(CoreError::Internal("flag update resolved nothing".to_string()).into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use plenum_store::{DocumentStoreExt, MemoryStore, SetMode};
    use std::sync::Arc;

    async fn seed_room(store: &MemoryStore, event_id: EventId, session_id: SessionId) -> BreakoutRoom {
        let room = BreakoutRoom {
            id: RoomId::new(),
            name: "Room 1".to_string(),
            participants: vec![ParticipantId::new(), ParticipantId::new()],
            flag: RoomFlag::Unflagged,
            help_requested_at: None,
            record: false,
        };
        store
            .set_as(
                &path::room(event_id, session_id, room.id),
                &room,
                SetMode::Replace,
            )
            .await
            .unwrap();
        room
    }

    #[tokio::test]
    async fn member_can_raise_the_flag() {
        let store = Arc::new(MemoryStore::new());
        let (event_id, session_id) = (EventId::new(), SessionId::new());
        let room = seed_room(&store, event_id, session_id).await;
        let member = room.participants[0];

        let updated = update_flag(
            store.as_ref(),
            event_id,
            session_id,
            room.id,
            RoomFlag::NeedsHelp,
            member,
            false,
        )
        .await
        .unwrap();

        assert_eq!(updated.flag, RoomFlag::NeedsHelp);
        assert!(updated.help_requested_at.is_some());

        let stored: BreakoutRoom = store
            .require_as(&path::room(event_id, session_id, room.id))
            .await
            .unwrap();
        assert_eq!(stored.flag, RoomFlag::NeedsHelp);
        assert_eq!(stored.help_requested_at, updated.help_requested_at);
    }

    #[tokio::test]
    async fn repeated_request_keeps_the_original_timestamp() {
        let store = Arc::new(MemoryStore::new());
        let (event_id, session_id) = (EventId::new(), SessionId::new());
        let room = seed_room(&store, event_id, session_id).await;
        let member = room.participants[0];

        let first = update_flag(
            store.as_ref(),
            event_id,
            session_id,
            room.id,
            RoomFlag::NeedsHelp,
            member,
            false,
        )
        .await
        .unwrap();
        let second = update_flag(
            store.as_ref(),
            event_id,
            session_id,
            room.id,
            RoomFlag::NeedsHelp,
            room.participants[1],
            false,
        )
        .await
        .unwrap();

        assert_eq!(second.help_requested_at, first.help_requested_at);
    }

    #[tokio::test]
    async fn outsider_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let (event_id, session_id) = (EventId::new(), SessionId::new());
        let room = seed_room(&store, event_id, session_id).await;

        let err = update_flag(
            store.as_ref(),
            event_id,
            session_id,
            room.id,
            RoomFlag::NeedsHelp,
            ParticipantId::new(),
            false,
        )
        .await
        .unwrap_err();
        assert_matches!(err, BreakoutError::Core(CoreError::Forbidden(_)));

        let stored: BreakoutRoom = store
            .require_as(&path::room(event_id, session_id, room.id))
            .await
            .unwrap();
        assert_eq!(stored.flag, RoomFlag::Unflagged);
    }

    #[tokio::test]
    async fn privileged_caller_can_clear_without_membership() {
        let store = Arc::new(MemoryStore::new());
        let (event_id, session_id) = (EventId::new(), SessionId::new());
        let room = seed_room(&store, event_id, session_id).await;
        let member = room.participants[0];

        update_flag(
            store.as_ref(),
            event_id,
            session_id,
            room.id,
            RoomFlag::NeedsHelp,
            member,
            false,
        )
        .await
        .unwrap();

        let cleared = update_flag(
            store.as_ref(),
            event_id,
            session_id,
            room.id,
            RoomFlag::Unflagged,
            ParticipantId::new(),
            true,
        )
        .await
        .unwrap();

        assert_eq!(cleared.flag, RoomFlag::Unflagged);
        assert!(cleared.help_requested_at.is_none());
    }

    #[tokio::test]
    async fn unknown_room_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = update_flag(
            store.as_ref(),
            EventId::new(),
            SessionId::new(),
            RoomId::new(),
            RoomFlag::NeedsHelp,
            ParticipantId::new(),
            true,
        )
        .await
        .unwrap_err();
        assert_matches!(err, BreakoutError::Core(CoreError::NotFound { .. }));
    }
}
