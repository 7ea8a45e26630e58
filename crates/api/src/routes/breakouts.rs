//! Route definitions for breakout sessions and rooms.
//!
//! Initiating and ending sessions requires event-management rights;
//! room join and flag updates are open to assigned members.

use axum::routing::{patch, post};
use axum::Router;

use crate::handlers::breakouts;
use crate::state::AppState;

/// Routes mounted at `/events/{event_id}/breakouts`.
///
/// ```text
/// POST  /initiate               -> initiate_session
/// POST  /end                    -> end_session
/// POST  /rooms/{room_id}/join   -> join_room
/// PATCH /rooms/{room_id}/flag   -> update_room_flag
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/initiate", post(breakouts::initiate_session))
        .route("/end", post(breakouts::end_session))
        .route("/rooms/{room_id}/join", post(breakouts::join_room))
        .route("/rooms/{room_id}/flag", patch(breakouts::update_room_flag))
}
