//! Durable scheduled checks.
//!
//! A check is a small document saying "run this request at this time".
//! [`Scheduler`] writes them; [`CheckDispatcher`] polls for due ones,
//! claims each with a lease so concurrent instances do not double-run it,
//! and hands it to the registered handler. Delivery is at-least-once:
//! a crash between handling and acknowledging replays the check, so
//! handlers must be idempotent.

pub mod auto_end;
pub mod check;
pub mod dispatcher;
pub mod scheduler;

pub use auto_end::AutoEndHandler;
pub use check::{
    CheckRequest, CheckStatus, ScheduledCheck, KIND_AUTO_END, KIND_BREAKOUT_START,
    KIND_WAITING_ROOM,
};
pub use dispatcher::{BoxError, CheckDispatcher, CheckHandler, DispatcherConfig, Followup};
pub use scheduler::Scheduler;

use plenum_store::StoreError;
use thiserror::Error;

/// Errors from the scheduling layer.
#[derive(Debug, Error)]
pub enum SchedError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
