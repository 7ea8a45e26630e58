//! Write side of the check queue.

use std::sync::Arc;

use chrono::Utc;
use plenum_core::types::Timestamp;
use plenum_store::{DocumentStore, StoreError, TxPlan, TxWrite};

use crate::check::{CheckRequest, CheckStatus, ScheduledCheck};
use crate::SchedError;

/// Schedules and cancels checks.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn DocumentStore>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Schedule `request` to run at `run_at`.
    ///
    /// Scheduling the same request again re-arms the previous entry, so a
    /// request is pending at most once. A check that is mid-handle (running
    /// under a live lease) is left alone: the handler's own followup write
    /// would clobber the re-arm anyway.
    pub async fn schedule(&self, request: CheckRequest, run_at: Timestamp) -> Result<(), SchedError> {
        let doc_path = request.doc_path();
        let now = Utc::now();
        let check = ScheduledCheck::new(request, run_at, now);
        let value = serde_json::to_value(&check).map_err(|source| StoreError::Decode {
            path: doc_path.as_str().to_string(),
            source,
        })?;

        let write_path = doc_path.clone();
        let outcome = self
            .store
            .run_transaction(
                &doc_path,
                Box::new(move |current| {
                    if let Some(existing) = current {
                        match serde_json::from_value::<ScheduledCheck>(existing) {
                            Ok(existing)
                                if existing.status == CheckStatus::Running
                                    && !existing.is_due(now) =>
                            {
                                return TxPlan::Abort("check is mid-handle".to_string());
                            }
                            // Pending, failed, expired-lease, and unreadable
                            // entries all get replaced by the fresh schedule.
                            _ => {}
                        }
                    }
                    TxPlan::Commit(vec![TxWrite::set(write_path.clone(), value.clone())])
                }),
            )
            .await?;

        if outcome.committed() {
            tracing::debug!(
                kind = check.request.kind(),
                key = %check.request.key(),
                run_at = %run_at,
                "check scheduled"
            );
        }
        Ok(())
    }

    /// Schedule only if no entry for this request exists yet. Returns
    /// whether a new entry was written. Used for recurring checks that
    /// must survive restarts without resetting their cadence.
    pub async fn schedule_if_absent(
        &self,
        request: CheckRequest,
        run_at: Timestamp,
    ) -> Result<bool, SchedError> {
        let doc_path = request.doc_path();
        let check = ScheduledCheck::new(request, run_at, Utc::now());
        let value = serde_json::to_value(&check).map_err(|source| StoreError::Decode {
            path: doc_path.as_str().to_string(),
            source,
        })?;

        let write_path = doc_path.clone();
        let outcome = self
            .store
            .run_transaction(
                &doc_path,
                Box::new(move |current| {
                    if current.is_some() {
                        TxPlan::Abort("check already scheduled".to_string())
                    } else {
                        TxPlan::Commit(vec![TxWrite::set(write_path.clone(), value.clone())])
                    }
                }),
            )
            .await?;
        Ok(outcome.committed())
    }

    /// Remove a scheduled check, if present.
    pub async fn cancel(&self, request: &CheckRequest) -> Result<(), SchedError> {
        self.store.delete(&request.doc_path()).await?;
        tracing::debug!(kind = request.kind(), key = %request.key(), "check canceled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use plenum_core::types::EventId;
    use plenum_store::{path, DocumentStoreExt, MemoryStore, SetMode};

    #[tokio::test]
    async fn scheduling_twice_keeps_one_entry() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(store.clone());
        let request = CheckRequest::WaitingRoom {
            event_id: EventId::new(),
        };
        let now = Utc::now();

        scheduler
            .schedule(request.clone(), now + Duration::seconds(30))
            .await
            .unwrap();
        scheduler
            .schedule(request.clone(), now + Duration::seconds(90))
            .await
            .unwrap();

        let listed = store.list(&path::checks()).await.unwrap();
        assert_eq!(listed.len(), 1);
        let check: ScheduledCheck = listed[0].decode_as().unwrap();
        assert_eq!(check.run_at, now + Duration::seconds(90));
        assert_eq!(check.status, CheckStatus::Pending);
    }

    #[tokio::test]
    async fn schedule_if_absent_does_not_replace() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(store.clone());
        let now = Utc::now();

        let first = scheduler
            .schedule_if_absent(CheckRequest::AutoEnd, now + Duration::seconds(10))
            .await
            .unwrap();
        assert!(first);

        let second = scheduler
            .schedule_if_absent(CheckRequest::AutoEnd, now + Duration::seconds(99))
            .await
            .unwrap();
        assert!(!second);

        let check: ScheduledCheck = store
            .list(&path::checks())
            .await
            .unwrap()
            .remove(0)
            .decode_as()
            .unwrap();
        assert_eq!(check.run_at, now + Duration::seconds(10));
    }

    #[tokio::test]
    async fn schedule_leaves_a_leased_running_check_alone() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(store.clone());
        let request = CheckRequest::WaitingRoom {
            event_id: EventId::new(),
        };
        let now = Utc::now();

        let mut running = ScheduledCheck::new(request.clone(), now - Duration::seconds(5), now);
        running.status = CheckStatus::Running;
        running.attempts = 1;
        running.lease_expires_at = Some(now + Duration::minutes(5));
        store
            .set_as(&request.doc_path(), &running, SetMode::Replace)
            .await
            .unwrap();

        scheduler
            .schedule(request.clone(), now + Duration::minutes(2))
            .await
            .unwrap();

        let kept: ScheduledCheck = store.require_as(&request.doc_path()).await.unwrap();
        assert_eq!(kept.status, CheckStatus::Running);
        assert_eq!(kept.attempts, 1);
    }

    #[tokio::test]
    async fn cancel_removes_the_entry() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(store.clone());
        let request = CheckRequest::BreakoutStart {
            event_id: EventId::new(),
            session_id: plenum_core::types::SessionId::new(),
        };

        scheduler
            .schedule(request.clone(), Utc::now())
            .await
            .unwrap();
        scheduler.cancel(&request).await.unwrap();
        assert!(store.list(&path::checks()).await.unwrap().is_empty());
    }
}
