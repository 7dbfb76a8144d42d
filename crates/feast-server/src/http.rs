use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use feast_serving::{AbortController, ErrorClass, FeatureServer, ServingError};
use feast_types::{
    GetFeastServingInfoResponse, GetOnlineFeaturesRequest, GetOnlineFeaturesRequestV2,
    GetOnlineFeaturesResponse,
};

/// Status for a request the client abandoned.
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Clone)]
pub struct HttpState {
    pub server: Arc<FeatureServer>,
}

impl HttpState {
    pub fn new(server: FeatureServer) -> Self {
        Self {
            server: Arc::new(server),
        }
    }
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/info", get(info))
        .route("/get-online-features", post(get_online_features))
        .route("/v2/get-online-features", post(get_online_features_v2))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    Serving(ServingError),
    Invalid(String),
}

impl From<ServingError> for ApiError {
    fn from(err: ServingError) -> Self {
        ApiError::Serving(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Invalid(rejection.body_text())
    }
}

pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::Request | ErrorClass::Resolution => StatusCode::BAD_REQUEST,
        ErrorClass::Store => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorClass::Cancelled => {
            StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
        }
        ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Serving(err) => {
                let status = status_for(err.class());
                if status.is_server_error() {
                    tracing::warn!(code = err.code(), "request failed: {err}");
                }
                (status, err.code().to_string(), err.to_string())
            }
            ApiError::Invalid(msg) => (StatusCode::BAD_REQUEST, "invalid_request".into(), msg),
        };
        let body = serde_json::json!({ "code": code, "message": message });
        (status, Json(body)).into_response()
    }
}

/// Aborts in-flight store reads when the handler future is dropped, which
/// is what happens when the client disconnects.
struct AbortOnDrop(AbortController);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn info(State(state): State<HttpState>) -> Json<GetFeastServingInfoResponse> {
    Json(state.server.get_feast_serving_info())
}

async fn get_online_features(
    State(state): State<HttpState>,
    body: Result<Json<GetOnlineFeaturesRequest>, JsonRejection>,
) -> Result<Json<GetOnlineFeaturesResponse>, ApiError> {
    let Json(request) = body?;
    let guard = AbortOnDrop(AbortController::new());
    let response = state
        .server
        .get_online_features_with_abort(request, guard.0.signal())
        .await?;
    Ok(Json(response))
}

async fn get_online_features_v2(
    State(state): State<HttpState>,
    body: Result<Json<GetOnlineFeaturesRequestV2>, JsonRejection>,
) -> Result<Json<GetOnlineFeaturesResponse>, ApiError> {
    let Json(request) = body?;
    let guard = AbortOnDrop(AbortController::new());
    let response = state
        .server
        .get_online_features_v2_with_abort(request, guard.0.signal())
        .await?;
    Ok(Json(response))
}

pub async fn serve(
    addr: SocketAddr,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("bind {addr}: {e}"))?;
    tracing::info!("feature server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("serve {addr}: {e}"))
}
