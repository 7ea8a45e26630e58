use std::sync::Arc;

use plenum_breakout::{BreakoutManager, EventListener};
use plenum_recorder::{RecordingControl, RecordingQueue};
use plenum_sched::Scheduler;
use plenum_store::DocumentStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already
/// `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Document store backing all coordination state.
    pub store: Arc<dyn DocumentStore>,
    /// Server configuration (accessed by middleware and the auth extractor).
    pub config: Arc<ServerConfig>,
    /// Deferred, deduplicated recording starts.
    pub queue: Arc<RecordingQueue>,
    /// Direct recording control: stop sequences and status overviews.
    pub control: Arc<RecordingControl>,
    /// Breakout session transitions.
    pub breakouts: BreakoutManager,
    /// Keeps waiting-room checks aligned with event writes.
    pub listener: EventListener,
    /// Durable check scheduling (used directly by admin-ish flows).
    pub scheduler: Scheduler,
}
