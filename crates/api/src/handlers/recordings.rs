//! Handlers for recording control and status.
//!
//! Both endpoints walk the event's recording tree: the main room plus
//! every recorded room of every session. Rooms from ended sessions stay in
//! the walk so a straggler recording can still be seen and stopped.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;

use plenum_core::naming::RoomTarget;
use plenum_core::session::BreakoutSession;
use plenum_core::types::EventId;
use plenum_store::path;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::handlers::breakouts::session_room_targets;
use crate::handlers::events::load_event;
use crate::response::DataResponse;
use crate::state::AppState;

/// Every recording target of an event: the main room, then each session's
/// recorded rooms in session order.
async fn recording_targets(
    state: &AppState,
    event_id: EventId,
) -> Result<Vec<RoomTarget>, AppError> {
    let mut targets = vec![RoomTarget::main(event_id)];
    for doc in state.store.list(&path::sessions(event_id)).await? {
        let session: BreakoutSession = match doc.decode_as() {
            Ok(session) => session,
            Err(err) => {
                tracing::warn!(
                    event_id = %event_id,
                    session = %doc.id,
                    error = %err,
                    "skipping unreadable session document"
                );
                continue;
            }
        };
        targets.extend(session_room_targets(state, event_id, session.id).await?);
    }
    Ok(targets)
}

/// GET /api/v1/events/{id}/recordings
///
/// Host/admin only. Per-target recording state, live service info, and the
/// file prefix downstream download tooling looks under.
pub async fn recording_overview(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> AppResult<impl IntoResponse> {
    let event = load_event(&state, event_id).await?;
    auth.require_manage(&event)?;

    let targets = recording_targets(&state, event_id).await?;
    let statuses = state.control.overview(targets).await;
    Ok(Json(DataResponse { data: statuses }))
}

/// POST /api/v1/events/{id}/recordings/stop
///
/// Host/admin only. Stops every recording under the event; one room's
/// failure never blocks the rest. Returns stopped/skipped/failed counts.
pub async fn stop_recordings(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> AppResult<impl IntoResponse> {
    let event = load_event(&state, event_id).await?;
    auth.require_manage(&event)?;

    let targets = recording_targets(&state, event_id).await?;
    let report = state.control.stop_many(targets).await;

    tracing::info!(
        event_id = %event_id,
        stopped = report.stopped,
        skipped = report.skipped,
        failed = report.failed,
        "bulk recording stop"
    );
    Ok(Json(DataResponse { data: report }))
}
