//! Handlers for breakout sessions and rooms.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use plenum_breakout::{flags, InitiateOutcome, InitiateParams};
use plenum_core::error::CoreError;
use plenum_core::event::EventStatus;
use plenum_core::meeting::{LiveMeeting, Presence};
use plenum_core::naming::RoomTarget;
use plenum_core::room::{BreakoutRoom, RoomFlag};
use plenum_core::session::{AssignmentMethod, BreakoutSession, SessionStatus};
use plenum_core::types::{EventId, MeetingId, RoomId, SessionId};
use plenum_recorder::StopReport;
use plenum_store::{path, DocumentStoreExt, SetMode};

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::events::{ensure_meeting, load_event};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /events/{id}/breakouts/initiate.
///
/// Absent fields fall back to the event's breakout defaults.
#[derive(Debug, Deserialize, Default)]
pub struct InitiateRequest {
    pub method: Option<AssignmentMethod>,
    pub target_per_room: Option<u32>,
    pub include_waiting_room: Option<bool>,
}

/// Response for POST /events/{id}/breakouts/initiate.
#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    /// `"started"` for hosted events, `"scheduled"` for hostless ones.
    pub status: &'static str,
    pub session: BreakoutSession,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<BreakoutRoom>>,
}

/// Response for POST /events/{id}/breakouts/end.
#[derive(Debug, Serialize)]
pub struct EndResponse {
    /// `null` when no session was live.
    pub ended_session_id: Option<SessionId>,
    /// Stop results for the ended session's room recordings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recordings: Option<StopReport>,
}

/// Request body for POST .../rooms/{room}/join.
#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub display_name: String,
}

/// Response for POST .../rooms/{room}/join.
#[derive(Debug, Serialize)]
pub struct JoinRoomResponse {
    pub meeting_id: MeetingId,
    pub session_id: SessionId,
}

/// Request body for PATCH .../rooms/{room}/flag.
#[derive(Debug, Deserialize)]
pub struct FlagRequest {
    pub flag: RoomFlag,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// The id of the event's currently active session, or a conflict.
async fn active_session_id(state: &AppState, event_id: EventId) -> Result<SessionId, AppError> {
    let meeting: Option<LiveMeeting> = state
        .store
        .get_as(&path::meeting(MeetingId::from(event_id)))
        .await?;
    match meeting.and_then(|m| m.current_session) {
        Some(current) if current.status == SessionStatus::Active => Ok(current.id),
        Some(_) => Err(CoreError::Conflict("breakout rooms are not open yet".into()).into()),
        None => Err(CoreError::Conflict("no breakout session is underway".into()).into()),
    }
}

async fn load_room(
    state: &AppState,
    event_id: EventId,
    session_id: SessionId,
    room_id: RoomId,
) -> Result<BreakoutRoom, AppError> {
    let room: Option<BreakoutRoom> = state
        .store
        .get_as(&path::room(event_id, session_id, room_id))
        .await?;
    room.ok_or_else(|| AppError::Core(CoreError::not_found("breakout room", room_id)))
}

/// Recording targets for the recorded rooms of one session.
pub(crate) async fn session_room_targets(
    state: &AppState,
    event_id: EventId,
    session_id: SessionId,
) -> Result<Vec<RoomTarget>, AppError> {
    let mut targets = Vec::new();
    for doc in state.store.list(&path::rooms(event_id, session_id)).await? {
        let room: BreakoutRoom = match doc.decode_as() {
            Ok(room) => room,
            Err(err) => {
                tracing::warn!(
                    session_id = %session_id,
                    room = %doc.id,
                    error = %err,
                    "skipping unreadable room document"
                );
                continue;
            }
        };
        if room.record {
            targets.push(RoomTarget::breakout(event_id, session_id, room.id));
        }
    }
    Ok(targets)
}

// ---------------------------------------------------------------------------
// Session lifecycle
// ---------------------------------------------------------------------------

/// POST /api/v1/events/{id}/breakouts/initiate
///
/// Host/admin only. Hosted events assign and open rooms immediately;
/// hostless events leave the session pending for the wait window.
pub async fn initiate_session(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(input): Json<InitiateRequest>,
) -> AppResult<impl IntoResponse> {
    let event = load_event(&state, event_id).await?;
    auth.require_manage(&event)?;
    if event.status == EventStatus::Canceled {
        return Err(CoreError::Conflict("event is canceled".into()).into());
    }

    let defaults = &event.breakout_defaults;
    let params = InitiateParams {
        method: input.method.unwrap_or(defaults.method),
        target_per_room: input.target_per_room.unwrap_or(defaults.target_per_room),
        include_waiting_room: input
            .include_waiting_room
            .unwrap_or(defaults.include_waiting_room),
        created_by: auth.participant_id,
    };
    if params.target_per_room == 0 {
        return Err(CoreError::Validation("target_per_room must be at least 1".into()).into());
    }

    match state.breakouts.initiate(&event, params).await? {
        InitiateOutcome::Started { session, rooms } => {
            tracing::info!(
                event_id = %event_id,
                session_id = %session.id,
                rooms = rooms.len(),
                "breakout session started"
            );
            Ok(Json(DataResponse {
                data: InitiateResponse {
                    status: "started",
                    session,
                    rooms: Some(rooms),
                },
            }))
        }
        InitiateOutcome::Scheduled { session } => {
            tracing::info!(
                event_id = %event_id,
                session_id = %session.id,
                scheduled_at = %session.scheduled_at,
                "breakout session scheduled"
            );
            Ok(Json(DataResponse {
                data: InitiateResponse {
                    status: "scheduled",
                    session,
                    rooms: None,
                },
            }))
        }
        InitiateOutcome::Busy => {
            Err(CoreError::Conflict("a breakout session is already underway".into()).into())
        }
        InitiateOutcome::NoMeeting => {
            Err(CoreError::Conflict("nobody has joined this event yet".into()).into())
        }
    }
}

/// POST /api/v1/events/{id}/breakouts/end
///
/// Host/admin only. Ends the current session if one is live and stops that
/// session's room recordings, each stop isolated from the others. Ending
/// with nothing live is a no-op.
pub async fn end_session(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> AppResult<impl IntoResponse> {
    let event = load_event(&state, event_id).await?;
    auth.require_manage(&event)?;

    let ended = state.breakouts.end_current(&event).await?;
    let mut recordings = None;
    if let Some(session_id) = ended {
        let targets = session_room_targets(&state, event_id, session_id).await?;
        if !targets.is_empty() {
            recordings = Some(state.control.stop_many(targets).await);
        }
        tracing::info!(event_id = %event_id, session_id = %session_id, "breakout session ended");
    }

    Ok(Json(DataResponse {
        data: EndResponse {
            ended_session_id: ended,
            recordings,
        },
    }))
}

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// POST /api/v1/events/{id}/breakouts/rooms/{room}/join
///
/// Joins the caller's assigned room (hosts and admins may join any room).
/// First join creates the room's nested meeting; recorded rooms enqueue
/// their recording start here.
pub async fn join_room(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((event_id, room_id)): Path<(EventId, RoomId)>,
    Json(input): Json<JoinRoomRequest>,
) -> AppResult<impl IntoResponse> {
    let display_name = input.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(CoreError::Validation("display_name must not be empty".into()).into());
    }

    let event = load_event(&state, event_id).await?;
    if event.status == EventStatus::Canceled {
        return Err(CoreError::Conflict("event is canceled".into()).into());
    }

    let session_id = active_session_id(&state, event_id).await?;
    let room = load_room(&state, event_id, session_id, room_id).await?;
    if !room.participants.contains(&auth.participant_id) && !auth.can_manage(&event) {
        return Err(CoreError::Forbidden("not assigned to this room".into()).into());
    }

    let now = Utc::now();
    let meeting_id = MeetingId::from(room_id);
    ensure_meeting(&state, meeting_id, room.record, now).await?;

    let presence = Presence {
        participant_id: auth.participant_id,
        display_name,
        joined_at: now,
        waiting: false,
        active: true,
    };
    state
        .store
        .set_as(
            &path::participant(meeting_id, auth.participant_id),
            &presence,
            SetMode::Replace,
        )
        .await?;

    if room.record {
        drop(
            state
                .queue
                .enqueue(RoomTarget::breakout(event_id, session_id, room_id)),
        );
    }

    tracing::info!(
        event_id = %event_id,
        session_id = %session_id,
        room_id = %room_id,
        participant_id = %auth.participant_id,
        "participant joined breakout room"
    );
    Ok(Json(DataResponse {
        data: JoinRoomResponse {
            meeting_id,
            session_id,
        },
    }))
}

/// PATCH /api/v1/events/{id}/breakouts/rooms/{room}/flag
///
/// Raise or clear a room's help flag. Room members, the host, and admins
/// may flag; racing updates keep the oldest outstanding request time.
pub async fn update_room_flag(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((event_id, room_id)): Path<(EventId, RoomId)>,
    Json(input): Json<FlagRequest>,
) -> AppResult<impl IntoResponse> {
    let event = load_event(&state, event_id).await?;
    let session_id = active_session_id(&state, event_id).await?;

    let room = flags::update_flag(
        state.store.as_ref(),
        event_id,
        session_id,
        room_id,
        input.flag,
        auth.participant_id,
        auth.can_manage(&event),
    )
    .await?;

    tracing::info!(
        event_id = %event_id,
        room_id = %room_id,
        flag = ?room.flag,
        "room flag updated"
    );
    Ok(Json(DataResponse { data: room }))
}
