//! Batched point-read capability over materialized feature values, plus an
//! in-memory backend and a retrying decorator.

mod mem_store;
mod retry;

pub use mem_store::MemOnlineStore;
pub use retry::{RetryPolicy, RetryingStore, compute_backoff_delay, retry_async};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use feast_types::{EntityKey, Timestamp, Value};
use serde::{Deserialize, Serialize};

pub type StoreResult<T> = Result<T, StoreError>;
pub type DynOnlineStore = Arc<dyn OnlineStore>;

/// Latest materialized values of one feature table for one entity key.
///
/// A feature absent from `values` was never written for this key. A feature
/// present with `Value::NULL` was written as null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlineRecord {
    pub event_timestamp: Timestamp,
    pub values: BTreeMap<String, Value>,
}

/// Read side of an online store.
///
/// Implementations own their connection pooling and are shared across
/// concurrent requests.
#[async_trait]
pub trait OnlineStore: Send + Sync {
    fn kind(&self) -> &str;

    /// Read the records of `table` for every key in `keys`.
    ///
    /// The result has exactly one slot per key, in key order; `None` means no
    /// record exists. `features` names the columns the caller needs; a store
    /// may return more. Only a failure of the whole batch is an error.
    async fn online_read(
        &self,
        project: &str,
        table: &str,
        keys: &[EntityKey],
        features: &[String],
    ) -> StoreResult<Vec<Option<OnlineRecord>>>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("online store '{store}' unavailable: {message}")]
    Unavailable { store: String, message: String },
    #[error("online store read of table '{table}' timed out")]
    Timeout { table: String },
    #[error("online store backend error: {0}")]
    Backend(String),
    #[error("failed to decode record of table '{table}': {message}")]
    Decode { table: String, message: String },
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. } | StoreError::Timeout { .. })
    }
}
