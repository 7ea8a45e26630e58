//! Deferred, deduplicated recording starts.
//!
//! Joins must never wait on the recording API, and a burst of simultaneous
//! room activations must not trip its rate limits. Join paths drop a room
//! onto this queue and move on; a single worker drains it in bounded
//! concurrent batches with a pause between batches, retrying failed starts
//! with exponential backoff before giving up.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use plenum_core::backoff::{retry_backoff, BackoffConfig};
use plenum_core::naming::RoomTarget;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use crate::control::StartOutcome;
use crate::RecorderError;

/// Work the queue hands to its executor.
#[async_trait]
pub trait StartExecutor: Send + Sync {
    /// Run the full claim/acquire/start sequence for one room.
    async fn start_recording(&self, target: &RoomTarget) -> Result<StartOutcome, RecorderError>;
}

/// Tuning for [`RecordingQueue`].
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Rooms started per drain burst.
    pub batch_size: usize,
    /// Pause between bursts.
    pub batch_pause: Duration,
    /// Start attempts per room before giving up.
    pub max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            batch_pause: Duration::from_millis(200),
            max_attempts: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

struct QueueState {
    pending: VecDeque<RoomTarget>,
    /// Meeting ids sitting in `pending`.
    queued: HashSet<String>,
    /// Meeting ids currently running the start sequence.
    processing: HashSet<String>,
    /// Channels to resolve once a meeting's start finishes.
    waiters: HashMap<String, Vec<oneshot::Sender<StartOutcome>>>,
}

/// Serializes recording starts behind an in-process queue.
///
/// Deduplicates by meeting id: while a room is queued or processing,
/// further enqueues add no work but still receive the shared outcome.
pub struct RecordingQueue {
    executor: Arc<dyn StartExecutor>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl RecordingQueue {
    pub fn new(executor: Arc<dyn StartExecutor>, config: QueueConfig) -> Self {
        Self {
            executor,
            config,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                queued: HashSet::new(),
                processing: HashSet::new(),
                waiters: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a recording start for a room.
    ///
    /// The returned receiver resolves with the outcome once processing
    /// finishes; it errors out if the queue shuts down first.
    pub fn enqueue(&self, target: RoomTarget) -> oneshot::Receiver<StartOutcome> {
        let key = target.meeting_id().to_string();
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        state.waiters.entry(key.clone()).or_default().push(tx);
        if state.queued.contains(&key) || state.processing.contains(&key) {
            tracing::debug!(meeting = %key, "recording start already queued");
        } else {
            state.queued.insert(key);
            state.pending.push_back(target);
            drop(state);
            self.notify.notify_one();
        }
        rx
    }

    /// Drain loop. Runs until `cancel` fires; remaining work is dropped on
    /// shutdown and its waiters see a closed channel.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!(
            batch_size = self.config.batch_size,
            batch_pause_ms = self.config.batch_pause.as_millis() as u64,
            "recording queue started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.notify.notified() => {}
            }
            loop {
                let batch = self.take_batch();
                if batch.is_empty() {
                    break;
                }
                // Rooms within a batch start together; the batch size and
                // the pause below are what keep the API under its limits.
                futures::future::join_all(batch.iter().map(|target| self.process(target))).await;
                let more = !self.lock().pending.is_empty();
                if more {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            tracing::info!("recording queue stopped");
                            return;
                        }
                        _ = tokio::time::sleep(self.config.batch_pause) => {}
                    }
                }
            }
        }
        tracing::info!("recording queue stopped");
    }

    fn take_batch(&self) -> Vec<RoomTarget> {
        let mut state = self.lock();
        let n = self.config.batch_size.min(state.pending.len());
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            if let Some(target) = state.pending.pop_front() {
                let key = target.meeting_id().to_string();
                state.queued.remove(&key);
                state.processing.insert(key);
                batch.push(target);
            }
        }
        batch
    }

    async fn process(&self, target: &RoomTarget) {
        let key = target.meeting_id().to_string();
        let outcome = self.attempt_with_retries(target).await;
        let waiters = {
            let mut state = self.lock();
            state.processing.remove(&key);
            state.waiters.remove(&key).unwrap_or_default()
        };
        for waiter in waiters {
            // The caller may have stopped listening; that is fine.
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn attempt_with_retries(&self, target: &RoomTarget) -> StartOutcome {
        let mut attempt = 1u32;
        loop {
            match self.executor.start_recording(target).await {
                Ok(outcome) => return outcome,
                Err(err) if attempt < self.config.max_attempts => {
                    let delay = retry_backoff(attempt, &self.config.backoff, &mut rand::rng());
                    if err.is_rate_limited() {
                        tracing::warn!(
                            target = %target,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "recording API rate limited; backing off"
                        );
                    } else {
                        tracing::warn!(
                            target = %target,
                            attempt,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "recording start failed; will retry"
                        );
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        target = %target,
                        attempts = attempt,
                        error = %err,
                        "recording start failed permanently"
                    );
                    return StartOutcome::Failed(err.to_string());
                }
            }
        }
    }
}
