//! Polls for due checks and runs their handlers.
//!
//! Each due check is claimed inside a store transaction before its handler
//! runs, so concurrently polling instances agree on a single runner. The
//! claim carries a lease; if the runner dies mid-handle, the check becomes
//! due again once the lease expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use plenum_core::backoff::{retry_backoff, BackoffConfig};
use plenum_core::types::Timestamp;
use plenum_store::{path, DocumentStore, DocumentStoreExt, SetMode, StoreError, TxPlan, TxWrite};
use tokio_util::sync::CancellationToken;

use crate::check::{CheckRequest, CheckStatus, ScheduledCheck};
use crate::SchedError;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What to do with a check after its handler succeeds.
#[derive(Debug)]
pub enum Followup {
    /// Finished; drop the check document.
    Done,
    /// Run the same request again at the given time.
    Reschedule(Timestamp),
}

/// Runs one kind of check. Delivery is at-least-once, so implementations
/// must tolerate seeing the same request twice.
#[async_trait]
pub trait CheckHandler: Send + Sync {
    async fn handle(&self, request: &CheckRequest) -> Result<Followup, BoxError>;
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub poll_interval: Duration,
    /// Handler attempts per check before it is parked as failed.
    pub max_attempts: u32,
    /// How long a claim lasts before another instance may take over.
    pub lease: chrono::Duration,
    pub backoff: BackoffConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            max_attempts: 5,
            lease: chrono::Duration::minutes(5),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Background check runner.
///
/// A single long-lived Tokio task per process; multiple processes may run
/// one each against the same store.
pub struct CheckDispatcher {
    store: Arc<dyn DocumentStore>,
    handlers: HashMap<&'static str, Arc<dyn CheckHandler>>,
    config: DispatcherConfig,
}

impl CheckDispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, config: DispatcherConfig) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            config,
        }
    }

    /// Register the handler for one check kind, replacing any previous one.
    pub fn register(&mut self, kind: &'static str, handler: Arc<dyn CheckHandler>) {
        self.handlers.insert(kind, handler);
    }

    /// Run the polling loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            handlers = self.handlers.len(),
            "check dispatcher started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("check dispatcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "check sweep failed");
                    }
                }
            }
        }
    }

    /// One polling cycle: claim every due check and run it.
    async fn sweep(&self) -> Result<(), SchedError> {
        let now = Utc::now();
        for doc in self.store.list(&path::checks()).await? {
            let check: ScheduledCheck = match doc.decode_as() {
                Ok(check) => check,
                Err(e) => {
                    tracing::warn!(check = %doc.id, error = %e, "skipping unreadable check");
                    continue;
                }
            };
            if !check.is_due(now) {
                continue;
            }
            let Some(handler) = self.handlers.get(check.request.kind()) else {
                tracing::warn!(kind = check.request.kind(), "no handler registered for check");
                continue;
            };
            let Some(claimed) = self.claim(&check.request).await? else {
                // Raced another instance, or the check completed meanwhile.
                continue;
            };
            self.execute(handler.as_ref(), claimed).await?;
        }
        Ok(())
    }

    /// Mark a due check running under a fresh lease. Returns the claimed
    /// copy, or `None` when the check is no longer due.
    async fn claim(&self, request: &CheckRequest) -> Result<Option<ScheduledCheck>, SchedError> {
        let doc_path = request.doc_path();
        let now = Utc::now();
        let lease = self.config.lease;

        let mut claimed: Option<ScheduledCheck> = None;
        let mut encode_err: Option<StoreError> = None;
        let write_path = doc_path.clone();
        let outcome = self
            .store
            .run_transaction(
                &doc_path,
                Box::new(|current| {
                    let Some(value) = current else {
                        return TxPlan::Abort("check no longer exists".to_string());
                    };
                    let mut check: ScheduledCheck = match serde_json::from_value(value) {
                        Ok(check) => check,
                        Err(_) => return TxPlan::Abort("unreadable check".to_string()),
                    };
                    if !check.is_due(now) {
                        return TxPlan::Abort("check no longer due".to_string());
                    }
                    check.status = CheckStatus::Running;
                    check.attempts += 1;
                    check.lease_expires_at = Some(now + lease);
                    check.updated_at = now;
                    match serde_json::to_value(&check) {
                        Ok(value) => {
                            claimed = Some(check);
                            TxPlan::Commit(vec![TxWrite::set(write_path.clone(), value)])
                        }
                        Err(source) => {
                            encode_err = Some(StoreError::Decode {
                                path: write_path.as_str().to_string(),
                                source,
                            });
                            TxPlan::Abort("unencodable check".to_string())
                        }
                    }
                }),
            )
            .await?;

        if let Some(e) = encode_err {
            return Err(e.into());
        }
        if outcome.committed() {
            Ok(claimed)
        } else {
            Ok(None)
        }
    }

    async fn execute(
        &self,
        handler: &dyn CheckHandler,
        check: ScheduledCheck,
    ) -> Result<(), SchedError> {
        let doc_path = check.request.doc_path();
        tracing::debug!(
            kind = check.request.kind(),
            key = %check.request.key(),
            attempt = check.attempts,
            "running check"
        );

        match handler.handle(&check.request).await {
            Ok(Followup::Done) => {
                self.store.delete(&doc_path).await?;
            }
            Ok(Followup::Reschedule(run_at)) => {
                let next = ScheduledCheck {
                    run_at,
                    status: CheckStatus::Pending,
                    attempts: 0,
                    lease_expires_at: None,
                    last_error: None,
                    updated_at: Utc::now(),
                    ..check
                };
                self.store
                    .set_as(&doc_path, &next, SetMode::Replace)
                    .await?;
            }
            Err(e) => self.record_failure(check, e).await?,
        }
        Ok(())
    }

    /// Schedule a retry, or park the check as failed once the retry
    /// budget is spent.
    async fn record_failure(&self, check: ScheduledCheck, error: BoxError) -> Result<(), SchedError> {
        let doc_path = check.request.doc_path();
        let now = Utc::now();

        if check.attempts >= self.config.max_attempts {
            tracing::error!(
                kind = check.request.kind(),
                key = %check.request.key(),
                attempts = check.attempts,
                error = %error,
                "check failed permanently"
            );
            let parked = ScheduledCheck {
                status: CheckStatus::Failed,
                lease_expires_at: None,
                last_error: Some(error.to_string()),
                updated_at: now,
                ..check
            };
            self.store
                .set_as(&doc_path, &parked, SetMode::Replace)
                .await?;
            return Ok(());
        }

        let delay = retry_backoff(check.attempts, &self.config.backoff, &mut rand::rng());
        tracing::warn!(
            kind = check.request.kind(),
            key = %check.request.key(),
            attempt = check.attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %error,
            "check failed; will retry"
        );
        let retry = ScheduledCheck {
            run_at: now + delay,
            status: CheckStatus::Pending,
            lease_expires_at: None,
            last_error: Some(error.to_string()),
            updated_at: now,
            ..check
        };
        self.store
            .set_as(&doc_path, &retry, SetMode::Replace)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::{KIND_AUTO_END, KIND_BREAKOUT_START, KIND_WAITING_ROOM};
    use crate::Scheduler;
    use chrono::Duration as ChronoDuration;
    use plenum_core::types::EventId;
    use plenum_store::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    enum Behavior {
        Done,
        Reschedule(ChronoDuration),
        Fail,
    }

    struct StubHandler {
        calls: AtomicU32,
        behavior: Behavior,
    }

    #[async_trait]
    impl CheckHandler for StubHandler {
        async fn handle(&self, _request: &CheckRequest) -> Result<Followup, BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Done => Ok(Followup::Done),
                Behavior::Reschedule(delta) => Ok(Followup::Reschedule(Utc::now() + *delta)),
                Behavior::Fail => Err("handler exploded".into()),
            }
        }
    }

    fn fast_config(max_attempts: u32) -> DispatcherConfig {
        DispatcherConfig {
            max_attempts,
            backoff: BackoffConfig {
                base: Duration::ZERO,
                jitter_cap: Duration::ZERO,
            },
            ..DispatcherConfig::default()
        }
    }

    fn dispatcher_with(
        store: &Arc<MemoryStore>,
        behavior: Behavior,
        max_attempts: u32,
    ) -> (CheckDispatcher, Arc<StubHandler>) {
        let handler = Arc::new(StubHandler {
            calls: AtomicU32::new(0),
            behavior,
        });
        let mut dispatcher = CheckDispatcher::new(store.clone(), fast_config(max_attempts));
        for kind in [KIND_WAITING_ROOM, KIND_BREAKOUT_START, KIND_AUTO_END] {
            dispatcher.register(kind, handler.clone());
        }
        (dispatcher, handler)
    }

    async fn read_check(store: &MemoryStore, request: &CheckRequest) -> ScheduledCheck {
        store.require_as(&request.doc_path()).await.unwrap()
    }

    // ---

    #[tokio::test]
    async fn due_check_runs_once_and_is_removed() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, handler) = dispatcher_with(&store, Behavior::Done, 5);
        let request = CheckRequest::WaitingRoom {
            event_id: EventId::new(),
        };
        Scheduler::new(store.clone())
            .schedule(request.clone(), Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        dispatcher.sweep().await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(store.list(&path::checks()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn future_check_is_left_alone() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, handler) = dispatcher_with(&store, Behavior::Done, 5);
        let request = CheckRequest::AutoEnd;
        Scheduler::new(store.clone())
            .schedule(request.clone(), Utc::now() + ChronoDuration::minutes(10))
            .await
            .unwrap();

        dispatcher.sweep().await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        let check = read_check(&store, &request).await;
        assert_eq!(check.status, CheckStatus::Pending);
        assert_eq!(check.attempts, 0);
    }

    #[tokio::test]
    async fn reschedule_resets_the_cycle() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, handler) =
            dispatcher_with(&store, Behavior::Reschedule(ChronoDuration::minutes(1)), 5);
        let request = CheckRequest::AutoEnd;
        Scheduler::new(store.clone())
            .schedule(request.clone(), Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        dispatcher.sweep().await.unwrap();
        // The rescheduled run is a minute out, so a second sweep is a no-op.
        dispatcher.sweep().await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let check = read_check(&store, &request).await;
        assert_eq!(check.status, CheckStatus::Pending);
        assert_eq!(check.attempts, 0);
        assert!(check.run_at > Utc::now());
        assert!(check.lease_expires_at.is_none());
    }

    #[tokio::test]
    async fn failures_retry_until_the_budget_runs_out() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, handler) = dispatcher_with(&store, Behavior::Fail, 2);
        let request = CheckRequest::BreakoutStart {
            event_id: EventId::new(),
            session_id: plenum_core::types::SessionId::new(),
        };
        Scheduler::new(store.clone())
            .schedule(request.clone(), Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        // Zero backoff makes the retry due immediately.
        dispatcher.sweep().await.unwrap();
        let check = read_check(&store, &request).await;
        assert_eq!(check.status, CheckStatus::Pending);
        assert_eq!(check.attempts, 1);
        assert_eq!(check.last_error.as_deref(), Some("handler exploded"));

        dispatcher.sweep().await.unwrap();
        let check = read_check(&store, &request).await;
        assert_eq!(check.status, CheckStatus::Failed);
        assert_eq!(check.attempts, 2);

        // Parked checks stay parked.
        dispatcher.sweep().await.unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_lease_is_taken_over() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, handler) = dispatcher_with(&store, Behavior::Done, 5);
        let request = CheckRequest::WaitingRoom {
            event_id: EventId::new(),
        };
        let now = Utc::now();
        let mut abandoned = ScheduledCheck::new(request.clone(), now - ChronoDuration::minutes(10), now);
        abandoned.status = CheckStatus::Running;
        abandoned.attempts = 1;
        abandoned.lease_expires_at = Some(now - ChronoDuration::seconds(1));
        store
            .set_as(&request.doc_path(), &abandoned, SetMode::Replace)
            .await
            .unwrap();

        dispatcher.sweep().await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(store.list(&path::checks()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn live_lease_is_respected() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, handler) = dispatcher_with(&store, Behavior::Done, 5);
        let request = CheckRequest::WaitingRoom {
            event_id: EventId::new(),
        };
        let now = Utc::now();
        let mut leased = ScheduledCheck::new(request.clone(), now - ChronoDuration::minutes(1), now);
        leased.status = CheckStatus::Running;
        leased.attempts = 1;
        leased.lease_expires_at = Some(now + ChronoDuration::minutes(5));
        store
            .set_as(&request.doc_path(), &leased, SetMode::Replace)
            .await
            .unwrap();

        dispatcher.sweep().await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreadable_check_does_not_stall_the_sweep() {
        let store = Arc::new(MemoryStore::new());
        let (dispatcher, handler) = dispatcher_with(&store, Behavior::Done, 5);
        store
            .set(
                &path::check("waiting_room", "garbage"),
                serde_json::json!({"request": "not a check"}),
                SetMode::Replace,
            )
            .await
            .unwrap();
        Scheduler::new(store.clone())
            .schedule(CheckRequest::AutoEnd, Utc::now() - ChronoDuration::seconds(1))
            .await
            .unwrap();

        dispatcher.sweep().await.unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
