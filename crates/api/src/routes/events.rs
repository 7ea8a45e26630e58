//! Route definitions for event lifecycle and presence.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::events;
use crate::state::AppState;

/// Routes mounted at `/events`.
///
/// ```text
/// POST /                  -> create_event
/// GET  /{event_id}        -> get_event
/// PUT  /{event_id}        -> update_event
/// POST /{event_id}/cancel -> cancel_event
/// POST /{event_id}/join   -> join_event
/// POST /{event_id}/leave  -> leave_event
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(events::create_event))
        .route(
            "/{event_id}",
            get(events::get_event).put(events::update_event),
        )
        .route("/{event_id}/cancel", post(events::cancel_event))
        .route("/{event_id}/join", post(events::join_event))
        .route("/{event_id}/leave", post(events::leave_event))
}
