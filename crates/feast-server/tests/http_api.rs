use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use feast_online_store::{
    MemOnlineStore, OnlineRecord, OnlineStore, RetryPolicy, RetryingStore, StoreError,
    StoreResult,
};
use feast_server::http::{ApiError, HttpState, router};
use feast_server::loader;
use feast_serving::{
    EntitySpec, FeatureServer, FeatureTableSpec, Registry, RegistryError, ServingConfig,
    ServingError,
};
use feast_types::{EntityKey, FeatureService};
use serde_json::{Value as Json, json};
use tower::ServiceExt;

fn registry_json() -> Json {
    json!({
        "projects": {
            "default": {
                "entities": [
                    { "name": "driver", "join_key": "driver_id", "value_type": "INT64" }
                ],
                "feature_tables": [{
                    "name": "driver_hourly_stats",
                    "entities": ["driver"],
                    "features": [
                        { "name": "conv_rate", "value_type": "DOUBLE" },
                        { "name": "acc_rate", "value_type": "DOUBLE" }
                    ],
                    "max_age_secs": 86400
                }],
                "feature_services": [{
                    "spec": {
                        "name": "driver_activity",
                        "features": [{
                            "feature_view_name": "driver_hourly_stats",
                            "feature_columns": [{ "name": "conv_rate", "value_type": "DOUBLE" }]
                        }]
                    }
                }]
            }
        }
    })
}

fn online_json() -> Json {
    json!({
        "rows": [{
            "table": "driver_hourly_stats",
            "entities": { "driver_id": { "int64_val": 1001 } },
            "event_timestamp": { "seconds": 1618210800 },
            "values": { "conv_rate": { "double_val": 0.49 } }
        }]
    })
}

fn write_temp(value: &Json) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(value.to_string().as_bytes()).unwrap();
    file
}

fn app() -> Router {
    app_with(ServingConfig::default())
}

fn app_with(config: ServingConfig) -> Router {
    let registry_file = write_temp(&registry_json());
    let online_file = write_temp(&online_json());
    let registry = loader::load_registry(registry_file.path()).unwrap();
    let store = MemOnlineStore::new();
    let written =
        loader::load_online_data(online_file.path(), &registry, &store, &config.default_project)
            .unwrap();
    assert_eq!(written, 1);

    let store = RetryingStore::new(store, RetryPolicy::no_retry());
    let server = FeatureServer::new(Arc::new(registry), Arc::new(store), config);
    router(HttpState::new(server))
}

/// Store that answers every read after `delay`, failing with `error` if set.
struct StubStore {
    delay: Duration,
    error: Option<StoreError>,
}

#[async_trait]
impl OnlineStore for StubStore {
    fn kind(&self) -> &str {
        "stub"
    }

    async fn online_read(
        &self,
        _project: &str,
        _table: &str,
        keys: &[EntityKey],
        _features: &[String],
    ) -> StoreResult<Vec<Option<OnlineRecord>>> {
        tokio::time::sleep(self.delay).await;
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(vec![None; keys.len()]),
        }
    }
}

/// Registry whose backend is unreachable.
struct DownRegistry;

impl Registry for DownRegistry {
    fn get_entity(&self, _name: &str, _project: &str) -> Result<EntitySpec, RegistryError> {
        Err(RegistryError::Unavailable("registry backend unreachable".into()))
    }

    fn get_feature_table(
        &self,
        _name: &str,
        _project: &str,
    ) -> Result<FeatureTableSpec, RegistryError> {
        Err(RegistryError::Unavailable("registry backend unreachable".into()))
    }

    fn get_feature_service(
        &self,
        _name: &str,
        _project: &str,
    ) -> Result<FeatureService, RegistryError> {
        Err(RegistryError::Unavailable("registry backend unreachable".into()))
    }
}

fn app_over(store: StubStore, config: ServingConfig) -> Router {
    let registry_file = write_temp(&registry_json());
    let registry = loader::load_registry(registry_file.path()).unwrap();
    let server = FeatureServer::new(Arc::new(registry), Arc::new(store), config);
    router(HttpState::new(server))
}

fn v2_request() -> Json {
    json!({
        "features": [{ "feature_table": "driver_hourly_stats", "name": "conv_rate" }],
        "entity_rows": [{ "fields": { "driver_id": { "int64_val": 1001 } } }]
    })
}

async fn call(app: Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_and_info() {
    let (status, body) = call(app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let (status, body) = call(app(), "GET", "/info", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "ONLINE");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn v2_request_returns_rows_with_statuses() {
    let request = json!({
        "features": [
            { "feature_table": "driver_hourly_stats", "name": "conv_rate" },
            { "feature_table": "driver_hourly_stats", "name": "acc_rate" }
        ],
        "entity_rows": [{
            "timestamp": { "seconds": 1618214400 },
            "fields": { "driver_id": { "int64_val": 1001 } }
        }]
    });
    let (status, body) = call(app(), "POST", "/v2/get-online-features", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    let row = &body["field_values"][0];
    assert_eq!(row["fields"]["driver_id"], json!({ "int64_val": 1001 }));
    assert_eq!(row["fields"]["conv_rate"], json!({ "double_val": 0.49 }));
    assert_eq!(row["fields"]["acc_rate"], json!({ "null_val": "NULL_VALUE" }));
    assert_eq!(row["statuses"]["driver_id"], "PRESENT");
    assert_eq!(row["statuses"]["conv_rate"], "PRESENT");
    assert_eq!(row["statuses"]["acc_rate"], "NOT_FOUND");
}

#[tokio::test]
async fn columnar_request_through_feature_service() {
    let request = json!({
        "feature_service": "driver_activity",
        "entities": { "driver_id": { "val": [{ "int64_val": 1001 }, { "int64_val": 7 }] } },
        "full_feature_names": true
    });
    let (status, body) = call(app(), "POST", "/get-online-features", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["field_values"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    // Receipt time is years after the seeded event, past the one-day max age.
    assert_eq!(
        rows[0]["statuses"]["driver_hourly_stats__conv_rate"],
        "OUTSIDE_MAX_AGE"
    );
    assert_eq!(rows[1]["statuses"]["driver_hourly_stats__conv_rate"], "NOT_FOUND");
}

#[tokio::test]
async fn request_and_resolution_errors_are_bad_requests() {
    let (status, body) = call(
        app(),
        "POST",
        "/get-online-features",
        Some(json!({
            "feature_service": "driver_activity",
            "features": { "val": ["driver_hourly_stats:conv_rate"] },
            "entities": { "driver_id": { "val": [{ "int64_val": 1001 }] } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");

    let (status, body) = call(
        app(),
        "POST",
        "/get-online-features",
        Some(json!({
            "features": { "val": ["trips:count"] },
            "entities": { "driver_id": { "val": [{ "int64_val": 1001 }] } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "feature_table_not_found");
    assert_eq!(
        body["message"],
        "feature resolution failed: Feature table trips does not exist in project default"
    );

    let (status, body) = call(
        app(),
        "POST",
        "/v2/get-online-features",
        Some(json!({ "features": "not a list" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_request");
}

#[tokio::test]
async fn project_override_is_honoured() {
    let (status, body) = call(
        app_with(ServingConfig {
            request_timeout: Some(Duration::from_secs(1)),
            ..ServingConfig::default()
        }),
        "POST",
        "/v2/get-online-features",
        Some(json!({
            "features": [{ "feature_table": "driver_hourly_stats", "name": "conv_rate" }],
            "entity_rows": [{ "fields": { "driver_id": { "int64_val": 1001 } } }],
            "project": "staging"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "feature_table_not_found");
}

#[tokio::test]
async fn transient_store_failure_is_service_unavailable() {
    let store = StubStore {
        delay: Duration::ZERO,
        error: Some(StoreError::Unavailable {
            store: "stub".into(),
            message: "connection refused".into(),
        }),
    };
    let (status, body) = call(
        app_over(store, ServingConfig::default()),
        "POST",
        "/v2/get-online-features",
        Some(v2_request()),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "store_unavailable");
    assert!(body["message"].as_str().unwrap().contains("driver_hourly_stats"));
}

#[tokio::test]
async fn permanent_store_failure_keeps_its_own_code() {
    let store = StubStore {
        delay: Duration::ZERO,
        error: Some(StoreError::Backend("corrupt page".into())),
    };
    let (status, body) = call(
        app_over(store, ServingConfig::default()),
        "POST",
        "/v2/get-online-features",
        Some(v2_request()),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "store_error");
}

#[tokio::test]
async fn slow_store_past_request_timeout_is_gateway_timeout() {
    let store = StubStore {
        delay: Duration::from_secs(5),
        error: None,
    };
    let config = ServingConfig {
        request_timeout: Some(Duration::from_millis(30)),
        ..ServingConfig::default()
    };
    let (status, body) = call(
        app_over(store, config),
        "POST",
        "/v2/get-online-features",
        Some(v2_request()),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["code"], "timeout");
}

#[tokio::test]
async fn unreachable_registry_is_internal_error() {
    let store = StubStore {
        delay: Duration::ZERO,
        error: None,
    };
    let server = FeatureServer::new(
        Arc::new(DownRegistry),
        Arc::new(store),
        ServingConfig::default(),
    );
    let (status, body) = call(
        router(HttpState::new(server)),
        "POST",
        "/v2/get-online-features",
        Some(v2_request()),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "registry_unavailable");
}

#[tokio::test]
async fn cancelled_request_maps_to_client_closed() {
    let response = ApiError::Serving(ServingError::Cancelled).into_response();
    assert_eq!(response.status().as_u16(), 499);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["code"], "cancelled");
}
