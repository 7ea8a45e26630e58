//! In-memory store backend.
//!
//! Used by the integration tests and by local development without a
//! database. Every operation takes one mutex, so transactions are
//! trivially atomic.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    deep_merge, CollectionPath, DocPath, Document, DocumentStore, SetMode, StoreError, TxDecide,
    TxOp, TxOutcome, TxPlan,
};

/// [`DocumentStore`] backed by a process-local ordered map.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        // A poisoned map is still structurally sound; keep serving it.
        self.docs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn apply(docs: &mut BTreeMap<String, Value>, path: &DocPath, op: TxOp) {
    match op {
        TxOp::Set(data) => {
            docs.insert(path.as_str().to_string(), data);
        }
        TxOp::Merge(data) => match docs.get_mut(path.as_str()) {
            Some(existing) => deep_merge(existing, data),
            None => {
                docs.insert(path.as_str().to_string(), data);
            }
        },
        TxOp::Delete => {
            docs.remove(path.as_str());
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        Ok(self.lock().get(path.as_str()).cloned())
    }

    async fn set(&self, path: &DocPath, data: Value, mode: SetMode) -> Result<(), StoreError> {
        let op = match mode {
            SetMode::Replace => TxOp::Set(data),
            SetMode::Merge => TxOp::Merge(data),
        };
        apply(&mut self.lock(), path, op);
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Value) -> Result<(), StoreError> {
        let mut docs = self.lock();
        match docs.get_mut(path.as_str()) {
            Some(existing) => {
                deep_merge(existing, fields);
                Ok(())
            }
            None => Err(StoreError::not_found(path)),
        }
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        self.lock().remove(path.as_str());
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let docs = self.lock();
        let prefix = format!("{}/", collection.as_str());
        let out = docs
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter_map(|(path, data)| {
                let id = &path[prefix.len()..];
                // Skip documents of nested subcollections.
                if id.contains('/') {
                    return None;
                }
                Some(Document {
                    id: id.to_string(),
                    data: data.clone(),
                })
            })
            .collect();
        Ok(out)
    }

    async fn run_transaction(
        &self,
        guard: &DocPath,
        mut decide: TxDecide<'_>,
    ) -> Result<TxOutcome, StoreError> {
        let mut docs = self.lock();
        let current = docs.get(guard.as_str()).cloned();
        match decide(current) {
            TxPlan::Abort(reason) => Ok(TxOutcome::Aborted(reason)),
            TxPlan::Commit(writes) => {
                for write in writes {
                    apply(&mut docs, &write.path, write.op);
                }
                Ok(TxOutcome::Committed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{path, DocumentStoreExt, TxWrite};
    use assert_matches::assert_matches;
    use plenum_core::types::{EventId, MeetingId, ParticipantId};
    use serde_json::json;

    #[tokio::test]
    async fn set_replace_overwrites_wholesale() {
        let store = MemoryStore::new();
        let p = path::event(EventId::new());
        store
            .set(&p, json!({"a": 1, "b": 2}), SetMode::Replace)
            .await
            .unwrap();
        store.set(&p, json!({"a": 9}), SetMode::Replace).await.unwrap();
        assert_eq!(store.get(&p).await.unwrap(), Some(json!({"a": 9})));
    }

    #[tokio::test]
    async fn set_merge_keeps_unrelated_fields() {
        let store = MemoryStore::new();
        let p = path::event(EventId::new());
        store
            .set(&p, json!({"a": 1, "b": {"x": 1}}), SetMode::Replace)
            .await
            .unwrap();
        store
            .set(&p, json!({"b": {"y": 2}}), SetMode::Merge)
            .await
            .unwrap();
        assert_eq!(
            store.get(&p).await.unwrap(),
            Some(json!({"a": 1, "b": {"x": 1, "y": 2}}))
        );
    }

    #[tokio::test]
    async fn update_requires_existing_document() {
        let store = MemoryStore::new();
        let p = path::event(EventId::new());
        let err = store.update(&p, json!({"a": 1})).await.unwrap_err();
        assert_matches!(err, StoreError::NotFound { .. });
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        let p = path::event(EventId::new());
        store.set(&p, json!({}), SetMode::Replace).await.unwrap();
        store.delete(&p).await.unwrap();
        store.delete(&p).await.unwrap();
        assert_eq!(store.get(&p).await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_returns_direct_children_only() {
        let store = MemoryStore::new();
        let meeting = MeetingId::from(EventId::new());
        let a = ParticipantId::new();
        let b = ParticipantId::new();
        store
            .set(&path::participant(meeting, a), json!({"n": "a"}), SetMode::Replace)
            .await
            .unwrap();
        store
            .set(&path::participant(meeting, b), json!({"n": "b"}), SetMode::Replace)
            .await
            .unwrap();
        // Sibling meeting document and nested recording state must not leak
        // into the participants listing.
        store
            .set(&path::meeting(meeting), json!({}), SetMode::Replace)
            .await
            .unwrap();
        store
            .set(&path::recording_state(meeting), json!({}), SetMode::Replace)
            .await
            .unwrap();

        let listed = store.list(&path::participants(meeting)).await.unwrap();
        assert_eq!(listed.len(), 2);
        let mut ids: Vec<String> = listed.into_iter().map(|d| d.id).collect();
        ids.sort();
        let mut expected = vec![a.to_string(), b.to_string()];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn transaction_abort_applies_nothing() {
        let store = MemoryStore::new();
        let guard = path::event(EventId::new());
        let other = path::event(EventId::new());
        let outcome = store
            .run_transaction(
                &guard,
                Box::new(|current| {
                    assert!(current.is_none());
                    TxPlan::Abort("nope".to_string())
                }),
            )
            .await
            .unwrap();
        assert_eq!(outcome, TxOutcome::Aborted("nope".to_string()));
        assert_eq!(store.get(&other).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn transaction_commit_applies_all_writes() {
        let store = MemoryStore::new();
        let guard = path::event(EventId::new());
        let other = path::event(EventId::new());
        store
            .set(&guard, json!({"n": 1}), SetMode::Replace)
            .await
            .unwrap();

        let g = guard.clone();
        let o = other.clone();
        let outcome = store
            .run_transaction(
                &guard,
                Box::new(move |current| {
                    assert_eq!(current, Some(json!({"n": 1})));
                    TxPlan::Commit(vec![
                        TxWrite::merge(g.clone(), json!({"n": 2})),
                        TxWrite::set(o.clone(), json!({"fresh": true})),
                    ])
                }),
            )
            .await
            .unwrap();
        assert!(outcome.committed());
        assert_eq!(store.get(&guard).await.unwrap(), Some(json!({"n": 2})));
        assert_eq!(store.get(&other).await.unwrap(), Some(json!({"fresh": true})));
    }

    #[tokio::test]
    async fn typed_round_trip_through_ext() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Doc {
            n: u32,
        }

        let store = MemoryStore::new();
        let p = path::event(EventId::new());
        store
            .set_as(&p, &Doc { n: 7 }, SetMode::Replace)
            .await
            .unwrap();
        let loaded: Doc = store.require_as(&p).await.unwrap();
        assert_eq!(loaded, Doc { n: 7 });
        let missing: Option<Doc> = store.get_as(&path::event(EventId::new())).await.unwrap();
        assert_eq!(missing, None);
    }
}
