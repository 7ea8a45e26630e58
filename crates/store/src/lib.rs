//! Path-addressed JSON document store.
//!
//! The rest of the workspace reads and writes state through the
//! [`DocumentStore`] trait and never names a backend directly. Two backends
//! are provided: [`MemoryStore`] for tests and local development, and
//! [`PgStore`] backed by a single Postgres JSONB table for deployment.
//!
//! Concurrency model: plain `set`/`update` writes are last-writer-wins.
//! Multi-document consistency goes through [`DocumentStore::run_transaction`],
//! which reads one guard document and applies a batch of writes atomically —
//! other transactions on the same guard observe either none or all of them.

pub mod memory;
pub mod path;
pub mod postgres;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use path::{CollectionPath, DocPath};
pub use postgres::PgStore;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {path}")]
    NotFound { path: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("malformed document at {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn not_found(path: &DocPath) -> Self {
        Self::NotFound {
            path: path.as_str().to_string(),
        }
    }
}

/// How [`DocumentStore::set`] treats an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Overwrite the document wholesale (creating it if absent).
    Replace,
    /// Deep-merge the payload into the existing document (creating it if
    /// absent). See [`deep_merge`] for the exact semantics.
    Merge,
}

/// A document returned from a collection listing.
#[derive(Debug, Clone)]
pub struct Document {
    /// Id within the collection (last path segment).
    pub id: String,
    pub data: Value,
}

impl Document {
    /// Decode the payload into a typed value.
    pub fn decode_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.data.clone()).map_err(|source| StoreError::Decode {
            path: self.id.clone(),
            source,
        })
    }
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// One write inside a transaction batch.
#[derive(Debug, Clone)]
pub struct TxWrite {
    pub path: DocPath,
    pub op: TxOp,
}

#[derive(Debug, Clone)]
pub enum TxOp {
    /// Replace or create the document.
    Set(Value),
    /// Deep-merge into the document, creating it if absent.
    Merge(Value),
    Delete,
}

impl TxWrite {
    pub fn set(path: DocPath, data: Value) -> Self {
        Self {
            path,
            op: TxOp::Set(data),
        }
    }

    pub fn merge(path: DocPath, data: Value) -> Self {
        Self {
            path,
            op: TxOp::Merge(data),
        }
    }

    pub fn delete(path: DocPath) -> Self {
        Self {
            path,
            op: TxOp::Delete,
        }
    }
}

/// Decision returned by a transaction closure after inspecting the guard
/// document.
#[derive(Debug)]
pub enum TxPlan {
    /// Apply all writes atomically.
    Commit(Vec<TxWrite>),
    /// Apply nothing; the reason is carried back in
    /// [`TxOutcome::Aborted`].
    Abort(String),
}

/// What a transaction did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    Committed,
    Aborted(String),
}

impl TxOutcome {
    pub fn committed(&self) -> bool {
        matches!(self, TxOutcome::Committed)
    }
}

/// Transaction closure: sees the current guard document (or `None`) and
/// returns the plan. May run more than once if the backend retries.
pub type TxDecide<'a> = Box<dyn FnMut(Option<Value>) -> TxPlan + Send + 'a>;

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Backend-neutral document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document's payload, or `None` if it does not exist.
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError>;

    /// Write a document. `Replace` overwrites wholesale; `Merge` deep-merges
    /// into whatever is there. Both create the document if absent.
    async fn set(&self, path: &DocPath, data: Value, mode: SetMode) -> Result<(), StoreError>;

    /// Deep-merge fields into an existing document. Fails with
    /// [`StoreError::NotFound`] if the document does not exist.
    async fn update(&self, path: &DocPath, fields: Value) -> Result<(), StoreError>;

    /// Delete a document. Deleting an absent document is a no-op.
    async fn delete(&self, path: &DocPath) -> Result<(), StoreError>;

    /// List the documents directly inside a collection, ordered by path.
    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError>;

    /// Read `guard` and atomically apply the writes the closure returns.
    ///
    /// The guard read and the writes are a single atomic unit with respect
    /// to other transactions on the same guard: the closure's view of the
    /// guard document cannot be stale by the time the writes land.
    async fn run_transaction(
        &self,
        guard: &DocPath,
        decide: TxDecide<'_>,
    ) -> Result<TxOutcome, StoreError>;
}

/// Typed convenience wrappers over the raw [`DocumentStore`] surface.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// [`DocumentStore::get`] decoded into `T`.
    async fn get_as<T>(&self, path: &DocPath) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(path).await? {
            None => Ok(None),
            Some(value) => decode(path, value).map(Some),
        }
    }

    /// [`Self::get_as`] that fails with [`StoreError::NotFound`] on absence.
    async fn require_as<T>(&self, path: &DocPath) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Send,
    {
        self.get_as(path)
            .await?
            .ok_or_else(|| StoreError::not_found(path))
    }

    /// [`DocumentStore::set`] from a serializable value.
    async fn set_as<T>(&self, path: &DocPath, value: &T, mode: SetMode) -> Result<(), StoreError>
    where
        T: Serialize + Sync,
    {
        let data = serde_json::to_value(value).map_err(|source| StoreError::Decode {
            path: path.as_str().to_string(),
            source,
        })?;
        self.set(path, data, mode).await
    }
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStoreExt for S {}

/// Decode a raw payload, attributing failures to the document's path.
pub fn decode<T: DeserializeOwned>(path: &DocPath, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Decode {
        path: path.as_str().to_string(),
        source,
    })
}

/// Deep-merge `patch` into `target`.
///
/// Objects merge key by key, recursing into keys present on both sides.
/// Any other pairing (arrays included) replaces the target value wholesale,
/// and an explicit `null` in the patch lands as `null`.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        existing.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_recurses_into_objects() {
        let mut target = json!({"a": {"x": 1, "y": 2}, "b": 1});
        deep_merge(&mut target, json!({"a": {"y": 3, "z": 4}}));
        assert_eq!(target, json!({"a": {"x": 1, "y": 3, "z": 4}, "b": 1}));
    }

    #[test]
    fn deep_merge_replaces_arrays_wholesale() {
        let mut target = json!({"items": [1, 2, 3]});
        deep_merge(&mut target, json!({"items": [9]}));
        assert_eq!(target, json!({"items": [9]}));
    }

    #[test]
    fn deep_merge_null_overwrites() {
        let mut target = json!({"error": "boom", "ok": true});
        deep_merge(&mut target, json!({"error": null}));
        assert_eq!(target, json!({"error": null, "ok": true}));
    }

    #[test]
    fn deep_merge_scalar_patch_replaces_object() {
        let mut target = json!({"a": {"x": 1}});
        deep_merge(&mut target, json!({"a": 7}));
        assert_eq!(target, json!({"a": 7}));
    }
}
