use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use feast_online_store::{
    MemOnlineStore, OnlineRecord, OnlineStore, RetryPolicy, RetryingStore, StoreError, StoreResult,
};
use feast_types::{EntityKey, Timestamp, Value, encode_entity_key};

/// Fails the first `failures` reads with `error`, then delegates.
struct FlakyStore {
    inner: MemOnlineStore,
    failures: usize,
    error: StoreError,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl OnlineStore for FlakyStore {
    fn kind(&self) -> &str {
        "flaky"
    }

    async fn online_read(
        &self,
        project: &str,
        table: &str,
        keys: &[EntityKey],
        features: &[String],
    ) -> StoreResult<Vec<Option<OnlineRecord>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(self.error.clone());
        }
        self.inner.online_read(project, table, keys, features).await
    }
}

fn fast_policy(max_retries: usize) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

fn seeded_store() -> (MemOnlineStore, EntityKey) {
    let store = MemOnlineStore::new();
    let key = encode_entity_key([("driver_id", &Value::Int64Val(1001))]).unwrap();
    let values: BTreeMap<String, Value> =
        [("conv_rate".to_string(), Value::DoubleVal(0.49))].into_iter().collect();
    store
        .online_write_batch(
            "default",
            "driver_hourly_stats",
            [(key.clone(), values, Timestamp::from_secs(100))],
        )
        .unwrap();
    (store, key)
}

fn unavailable() -> StoreError {
    StoreError::Unavailable {
        store: "flaky".into(),
        message: "connection reset".into(),
    }
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let (inner, key) = seeded_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let store = RetryingStore::new(
        FlakyStore {
            inner,
            failures: 2,
            error: unavailable(),
            calls: calls.clone(),
        },
        fast_policy(3),
    );

    let slots = store
        .online_read("default", "driver_hourly_stats", &[key], &[])
        .await
        .expect("read succeeds after retries");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(slots[0].as_ref().unwrap().values["conv_rate"], Value::DoubleVal(0.49));
    assert_eq!(store.kind(), "flaky");
}

#[tokio::test]
async fn exhausted_retries_return_last_error() {
    let (inner, key) = seeded_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let store = RetryingStore::new(
        FlakyStore {
            inner,
            failures: 10,
            error: StoreError::Timeout {
                table: "driver_hourly_stats".into(),
            },
            calls: calls.clone(),
        },
        fast_policy(2),
    );

    let err = store
        .online_read("default", "driver_hourly_stats", &[key], &[])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Timeout { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let (inner, key) = seeded_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let store = RetryingStore::new(
        FlakyStore {
            inner,
            failures: 1,
            error: StoreError::Backend("schema mismatch".into()),
            calls: calls.clone(),
        },
        fast_policy(5),
    );

    let err = store
        .online_read("default", "driver_hourly_stats", &[key], &[])
        .await
        .unwrap_err();
    assert_eq!(err, StoreError::Backend("schema mismatch".into()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
