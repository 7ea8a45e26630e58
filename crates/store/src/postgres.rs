//! Postgres store backend.
//!
//! All documents live in one `documents` table keyed by path, with the
//! payload in a JSONB column. Collection listings read the indexed
//! `parent` column.
//!
//! Transactions serialize on a per-path advisory lock
//! (`pg_advisory_xact_lock` over a hash of the guard path) rather than
//! `SELECT ... FOR UPDATE`: a row lock cannot guard a document that does
//! not exist yet, and the create-if-absent race is exactly the one the
//! transaction callers care about. Merging writes take the same lock for
//! their own path, so read-modify-write updates cannot interleave with a
//! transaction on that document.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{
    deep_merge, CollectionPath, DocPath, Document, DocumentStore, SetMode, StoreError, TxDecide,
    TxOp, TxOutcome, TxPlan,
};

/// Pool size covering API handlers plus the background loops.
const MAX_CONNECTIONS: u32 = 10;

/// How long to wait for a free connection before giving up.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection pool against `database_url`.
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Verify the database is reachable.
pub async fn health_check(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// [`DocumentStore`] backed by the `documents` table.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Take the transaction-scoped advisory lock for a path.
async fn lock_path(
    tx: &mut Transaction<'_, Postgres>,
    path: &DocPath,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(path.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Insert or overwrite a document inside a transaction.
async fn upsert(
    tx: &mut Transaction<'_, Postgres>,
    path: &DocPath,
    data: &Value,
) -> Result<(), sqlx::Error> {
    let parent = path.parent();
    sqlx::query(
        "INSERT INTO documents (path, parent, doc_id, data) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (path) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
    )
    .bind(path.as_str())
    .bind(parent.as_str())
    .bind(path.doc_id())
    .bind(data)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Deep-merge `patch` into a document inside a transaction.
///
/// With `require_existing`, an absent document is a [`StoreError::NotFound`]
/// instead of a create.
async fn merge_into(
    tx: &mut Transaction<'_, Postgres>,
    path: &DocPath,
    patch: Value,
    require_existing: bool,
) -> Result<(), StoreError> {
    let current: Option<Value> =
        sqlx::query_scalar("SELECT data FROM documents WHERE path = $1 FOR UPDATE")
            .bind(path.as_str())
            .fetch_optional(&mut **tx)
            .await?;
    match current {
        Some(mut data) => {
            deep_merge(&mut data, patch);
            upsert(tx, path, &data).await?;
        }
        None if require_existing => return Err(StoreError::not_found(path)),
        None => upsert(tx, path, &patch).await?,
    }
    Ok(())
}

async fn delete_in(
    tx: &mut Transaction<'_, Postgres>,
    path: &DocPath,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM documents WHERE path = $1")
        .bind(path.as_str())
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Value>, StoreError> {
        let data: Option<Value> = sqlx::query_scalar("SELECT data FROM documents WHERE path = $1")
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(data)
    }

    async fn set(&self, path: &DocPath, data: Value, mode: SetMode) -> Result<(), StoreError> {
        match mode {
            SetMode::Replace => {
                let mut tx = self.pool.begin().await?;
                upsert(&mut tx, path, &data).await?;
                tx.commit().await?;
            }
            SetMode::Merge => {
                let mut tx = self.pool.begin().await?;
                lock_path(&mut tx, path).await?;
                merge_into(&mut tx, path, data, false).await?;
                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn update(&self, path: &DocPath, fields: Value) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_path(&mut tx, path).await?;
        merge_into(&mut tx, path, fields, true).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, path: &DocPath) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM documents WHERE path = $1")
            .bind(path.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list(&self, collection: &CollectionPath) -> Result<Vec<Document>, StoreError> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT doc_id, data FROM documents WHERE parent = $1 ORDER BY path")
                .bind(collection.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, data)| Document { id, data })
            .collect())
    }

    async fn run_transaction(
        &self,
        guard: &DocPath,
        mut decide: TxDecide<'_>,
    ) -> Result<TxOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_path(&mut tx, guard).await?;
        let current: Option<Value> =
            sqlx::query_scalar("SELECT data FROM documents WHERE path = $1")
                .bind(guard.as_str())
                .fetch_optional(&mut *tx)
                .await?;
        match decide(current) {
            TxPlan::Abort(reason) => {
                tx.rollback().await?;
                tracing::debug!(guard = %guard, %reason, "transaction aborted");
                Ok(TxOutcome::Aborted(reason))
            }
            TxPlan::Commit(writes) => {
                for write in writes {
                    match write.op {
                        TxOp::Set(data) => upsert(&mut tx, &write.path, &data).await?,
                        TxOp::Merge(data) => merge_into(&mut tx, &write.path, data, false).await?,
                        TxOp::Delete => delete_in(&mut tx, &write.path).await?,
                    }
                }
                tx.commit().await?;
                Ok(TxOutcome::Committed)
            }
        }
    }
}
