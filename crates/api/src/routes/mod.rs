pub mod breakouts;
pub mod events;
pub mod health;
pub mod recordings;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /events                                          create
/// /events/{id}                                     get, update
/// /events/{id}/cancel                              cancel (POST)
/// /events/{id}/join                                join the live meeting
/// /events/{id}/leave                               leave the live meeting
///
/// /events/{id}/breakouts/initiate                  start a breakout session
/// /events/{id}/breakouts/end                       end the current session
/// /events/{id}/breakouts/rooms/{room}/join         join an assigned room
/// /events/{id}/breakouts/rooms/{room}/flag         help-flag update (PATCH)
///
/// /events/{id}/recordings                          per-room recording status
/// /events/{id}/recordings/stop                     stop everything (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/events", events::router())
        .nest("/events/{event_id}/breakouts", breakouts::router())
        .nest("/events/{event_id}/recordings", recordings::router())
}
