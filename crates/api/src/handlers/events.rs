//! Handlers for event lifecycle and live-meeting presence.
//!
//! Every event write funnels through the breakout listener so waiting-room
//! checks follow schedule changes. Joins are the entry point of the whole
//! pipeline: first join creates the live meeting, and always-record events
//! enqueue their recording start here.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use plenum_core::error::CoreError;
use plenum_core::event::{BreakoutDefaults, Event, EventKind, EventSettings, EventStatus};
use plenum_core::meeting::{LiveMeeting, Presence};
use plenum_core::naming::RoomTarget;
use plenum_core::types::{EventId, MeetingId, ParticipantId, Timestamp};
use plenum_store::{path, DocumentStoreExt, SetMode, StoreError, TxPlan, TxWrite};

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Request body for POST /events.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: String,
    pub kind: EventKind,
    pub scheduled_start: Timestamp,
    pub duration_minutes: i64,
    #[serde(default = "default_waiting_room_minutes")]
    pub waiting_room_minutes: i64,
    #[serde(default)]
    pub settings: EventSettings,
    #[serde(default)]
    pub breakout_defaults: BreakoutDefaults,
}

fn default_waiting_room_minutes() -> i64 {
    5
}

/// Request body for PUT /events/{id}. Absent fields stay as they are.
#[derive(Debug, Deserialize, Default)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub kind: Option<EventKind>,
    pub scheduled_start: Option<Timestamp>,
    pub duration_minutes: Option<i64>,
    pub waiting_room_minutes: Option<i64>,
    pub settings: Option<EventSettings>,
    pub breakout_defaults: Option<BreakoutDefaults>,
}

/// Request body for POST /events/{id}/join.
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub display_name: String,
}

/// Response for POST /events/{id}/join.
#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub meeting_id: MeetingId,
    /// The participant landed in the waiting room rather than the call.
    pub waiting: bool,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load an event or 404.
pub(crate) async fn load_event(state: &AppState, event_id: EventId) -> Result<Event, AppError> {
    let event: Option<Event> = state.store.get_as(&path::event(event_id)).await?;
    event.ok_or_else(|| AppError::Core(CoreError::not_found("event", event_id)))
}

/// Create the live meeting document on first join, leaving it untouched on
/// every later join.
///
/// Runs as a transaction on the meeting document so concurrent first joins
/// stamp `started_at` exactly once.
pub(crate) async fn ensure_meeting(
    state: &AppState,
    meeting_id: MeetingId,
    record: bool,
    now: Timestamp,
) -> Result<(), AppError> {
    let meeting_path = path::meeting(meeting_id);
    let fresh = LiveMeeting::on_first_join(meeting_id, record, now);
    let payload = serde_json::to_value(&fresh).map_err(|source| StoreError::Decode {
        path: meeting_path.as_str().to_string(),
        source,
    })?;

    let write_path = meeting_path.clone();
    state
        .store
        .run_transaction(
            &meeting_path,
            Box::new(move |current| {
                if current.is_some() {
                    TxPlan::Commit(vec![])
                } else {
                    TxPlan::Commit(vec![TxWrite::set(write_path.clone(), payload.clone())])
                }
            }),
        )
        .await?;
    Ok(())
}

fn validate_event_shape(event: &Event) -> Result<(), AppError> {
    if event.title.trim().is_empty() {
        return Err(CoreError::Validation("title must not be empty".into()).into());
    }
    if event.duration_minutes <= 0 {
        return Err(CoreError::Validation("duration_minutes must be positive".into()).into());
    }
    if event.waiting_room_minutes < 0 {
        return Err(CoreError::Validation("waiting_room_minutes must not be negative".into()).into());
    }
    if event.breakout_defaults.target_per_room == 0 {
        return Err(CoreError::Validation("target_per_room must be at least 1".into()).into());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Event CRUD
// ---------------------------------------------------------------------------

/// POST /api/v1/events
///
/// Creates an event with the caller as host. Hostless events get their
/// waiting-room check armed immediately.
pub async fn create_event(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateEventRequest>,
) -> AppResult<impl IntoResponse> {
    let now = Utc::now();
    let event = Event {
        id: EventId::new(),
        title: input.title.trim().to_string(),
        host_id: auth.participant_id,
        kind: input.kind,
        status: EventStatus::Active,
        locked: false,
        scheduled_start: input.scheduled_start,
        duration_minutes: input.duration_minutes,
        waiting_room_minutes: input.waiting_room_minutes,
        settings: input.settings,
        breakout_defaults: input.breakout_defaults,
        created_at: now,
        updated_at: now,
    };
    validate_event_shape(&event)?;

    state
        .store
        .set_as(&path::event(event.id), &event, SetMode::Replace)
        .await?;
    state.listener.event_created(&event).await?;

    tracing::info!(event_id = %event.id, kind = ?event.kind, "event created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: event })))
}

/// GET /api/v1/events/{id}
pub async fn get_event(
    _auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> AppResult<impl IntoResponse> {
    let event = load_event(&state, event_id).await?;
    Ok(Json(DataResponse { data: event }))
}

/// PUT /api/v1/events/{id}
///
/// Host/admin only. Re-arms or cancels the waiting-room check when the
/// schedule or event kind changes.
pub async fn update_event(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(input): Json<UpdateEventRequest>,
) -> AppResult<impl IntoResponse> {
    let before = load_event(&state, event_id).await?;
    auth.require_manage(&before)?;
    if before.status == EventStatus::Canceled {
        return Err(CoreError::Conflict("canceled events cannot be updated".into()).into());
    }

    let mut after = before.clone();
    if let Some(title) = input.title {
        after.title = title.trim().to_string();
    }
    if let Some(kind) = input.kind {
        after.kind = kind;
    }
    if let Some(start) = input.scheduled_start {
        after.scheduled_start = start;
    }
    if let Some(minutes) = input.duration_minutes {
        after.duration_minutes = minutes;
    }
    if let Some(minutes) = input.waiting_room_minutes {
        after.waiting_room_minutes = minutes;
    }
    if let Some(settings) = input.settings {
        after.settings = settings;
    }
    if let Some(defaults) = input.breakout_defaults {
        after.breakout_defaults = defaults;
    }
    validate_event_shape(&after)?;
    after.updated_at = Utc::now();

    state
        .store
        .set_as(&path::event(event_id), &after, SetMode::Replace)
        .await?;
    state.listener.event_updated(&before, &after).await?;

    tracing::info!(event_id = %event_id, "event updated");
    Ok(Json(DataResponse { data: after }))
}

/// POST /api/v1/events/{id}/cancel
///
/// Host/admin only. Idempotent: canceling a canceled event returns it
/// unchanged. Cancellation drops the pending waiting-room check.
pub async fn cancel_event(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> AppResult<impl IntoResponse> {
    let mut event = load_event(&state, event_id).await?;
    auth.require_manage(&event)?;

    if event.status != EventStatus::Canceled {
        event.status = EventStatus::Canceled;
        event.updated_at = Utc::now();
        state
            .store
            .set_as(&path::event(event_id), &event, SetMode::Replace)
            .await?;
        state.listener.event_canceled(&event).await?;
        tracing::info!(event_id = %event_id, "event canceled");
    }

    Ok(Json(DataResponse { data: event }))
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// POST /api/v1/events/{id}/join
///
/// Joins the event's live meeting, creating it on first join. Hostless
/// joiners sit in the waiting room until the lobby window closes. When the
/// event is always-record, the main-room recording start is enqueued here;
/// a recording problem never fails the join.
pub async fn join_event(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(input): Json<JoinRequest>,
) -> AppResult<impl IntoResponse> {
    let display_name = input.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(CoreError::Validation("display_name must not be empty".into()).into());
    }

    let event = load_event(&state, event_id).await?;
    if event.status == EventStatus::Canceled {
        return Err(CoreError::Conflict("event is canceled".into()).into());
    }
    if event.locked {
        return Err(CoreError::Conflict("event has ended and is locked".into()).into());
    }

    let now = Utc::now();
    let meeting_id = MeetingId::from(event_id);
    ensure_meeting(&state, meeting_id, event.settings.always_record, now).await?;

    let waiting = event.kind == EventKind::Hostless && now < event.waiting_room_finished_at();
    let presence = Presence {
        participant_id: auth.participant_id,
        display_name,
        joined_at: now,
        waiting,
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

    if event.settings.always_record {
        // Fire and forget: the queue owns retries and dedupe, and the
        // outcome must never surface to the joining participant.
        drop(state.queue.enqueue(RoomTarget::main(event_id)));
    }

    tracing::info!(
        event_id = %event_id,
        participant_id = %auth.participant_id,
        waiting,
        "participant joined"
    );
    Ok(Json(DataResponse {
        data: JoinResponse {
            meeting_id,
            waiting,
        },
    }))
}

/// POST /api/v1/events/{id}/leave
///
/// Retires the caller's presence. 404 if they never joined.
pub async fn leave_event(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> AppResult<impl IntoResponse> {
    let meeting_id = MeetingId::from(event_id);
    retire_presence(&state, meeting_id, auth.participant_id).await?;

    tracing::info!(
        event_id = %event_id,
        participant_id = %auth.participant_id,
        "participant left"
    );
    Ok(Json(DataResponse {
        data: json!({ "left": true }),
    }))
}

/// Mark a presence inactive, mapping a missing document to a domain 404.
pub(crate) async fn retire_presence(
    state: &AppState,
    meeting_id: MeetingId,
    participant_id: ParticipantId,
) -> Result<(), AppError> {
    let update = json!({ "active": false, "waiting": false });
    match state
        .store
        .update(&path::participant(meeting_id, participant_id), update)
        .await
    {
        Ok(()) => Ok(()),
        Err(StoreError::NotFound { .. }) => Err(AppError::Core(CoreError::not_found(
            "participant",
            participant_id,
        ))),
        Err(err) => Err(err.into()),
    }
}
