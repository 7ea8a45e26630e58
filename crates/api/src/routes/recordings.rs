//! Route definitions for recording control.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::recordings;
use crate::state::AppState;

/// Routes mounted at `/events/{event_id}/recordings`.
///
/// ```text
/// GET  /     -> recording_overview
/// POST /stop -> stop_recordings
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(recordings::recording_overview))
        .route("/stop", post(recordings::stop_recordings))
}
