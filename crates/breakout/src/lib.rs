//! Breakout session orchestration.
//!
//! Splits a live meeting's participants into small rooms and walks the
//! session through `pending -> active -> ended`. Every transition is
//! guarded by a store transaction on the meeting document, so duplicate
//! triggers (racing host clicks, redelivered checks) collapse to one
//! transition. Hostless events get their sessions initiated automatically
//! when the waiting-room window elapses.

pub mod flags;
pub mod handlers;
pub mod listener;
pub mod participants;
pub mod rooms;
pub mod session;

pub use handlers::{BreakoutStartHandler, WaitingRoomHandler};
pub use listener::EventListener;
pub use session::{
    ActivationResult, ActivationSkip, BreakoutManager, InitiateOutcome, InitiateParams,
    DEFAULT_WAIT_WINDOW_SECS,
};

use plenum_core::error::CoreError;
use plenum_sched::SchedError;
use plenum_store::StoreError;
use thiserror::Error;

/// Errors from breakout orchestration.
#[derive(Debug, Error)]
pub enum BreakoutError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sched(#[from] SchedError),
}
