//! REST API Handlers
//!
//! Thin transport over the provisioning controller. Request bodies map onto
//! the controller's request types; error categories map onto HTTP status
//! codes. Volume ids contain `/`, so they travel in JSON bodies rather than
//! in paths.

use crate::controlplane::controller::ControllerServer;
use crate::domain::ports::{
    ControllerCapability, CreateVolumeRequest, DeleteVolumeRequest,
    ValidateVolumeCapabilitiesRequest,
};
use crate::error::{Code, Error};
use axum::{
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Plugin identity and controller capabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesResponse {
    pub driver_name: String,
    pub driver_version: String,
    pub capabilities: Vec<ControllerCapability>,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiErrorResponse {
    fn from_error(e: &Error) -> (StatusCode, Self) {
        (
            status_for(e.code()),
            Self {
                error: e.code().to_string(),
                message: e.to_string(),
                details: None,
            },
        )
    }
}

/// HTTP status reported for an error category
pub fn status_for(code: Code) -> StatusCode {
    match code {
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        Code::Aborted => StatusCode::CONFLICT,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: &Error) -> Response {
    let (status, body) = ApiErrorResponse::from_error(e);
    (status, Json(body)).into_response()
}

fn timeout_response(timeout: Duration) -> Response {
    (
        StatusCode::GATEWAY_TIMEOUT,
        Json(ApiErrorResponse {
            error: "deadline_exceeded".into(),
            message: format!("request did not complete within {:?}", timeout),
            details: None,
        }),
    )
        .into_response()
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    controller: Arc<ControllerServer>,
    request_timeout: Duration,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(controller: Arc<ControllerServer>, request_timeout: Duration) -> Self {
        Self {
            controller,
            request_timeout,
        }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            controller: self.controller,
            request_timeout: self.request_timeout,
        };

        Router::new()
            // Volume endpoints
            .route("/v1/volumes", post(create_volume))
            .route("/v1/volumes/delete", post(delete_volume))
            .route("/v1/volumes/validate", post(validate_volume_capabilities))
            .route("/v1/capabilities", get(get_capabilities))
            // Health and metrics
            .route("/healthz", get(health_check))
            .route("/readyz", get(readiness_check))
            .route("/metrics", get(metrics))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    controller: Arc<ControllerServer>,
    request_timeout: Duration,
}

impl AppState {
    /// Run a controller call under the request deadline. On expiry the call's
    /// future is dropped, which releases any address block it held.
    async fn with_deadline<T, F>(&self, operation: &str, call: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => Some(result),
            Err(_) => {
                warn!("{} exceeded deadline of {:?}", operation, self.request_timeout);
                None
            }
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a volume
async fn create_volume(
    State(state): State<AppState>,
    Json(request): Json<CreateVolumeRequest>,
) -> Response {
    let call = state.controller.create_volume(request);
    match state.with_deadline("CreateVolume", call).await {
        Some(Ok(volume)) => (StatusCode::OK, Json(volume)).into_response(),
        Some(Err(e)) => error_response(&e),
        None => timeout_response(state.request_timeout),
    }
}

/// Delete a volume
async fn delete_volume(
    State(state): State<AppState>,
    Json(request): Json<DeleteVolumeRequest>,
) -> Response {
    let call = state.controller.delete_volume(request);
    match state.with_deadline("DeleteVolume", call).await {
        Some(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Some(Err(e)) => error_response(&e),
        None => timeout_response(state.request_timeout),
    }
}

/// Validate capabilities of an existing volume.
///
/// An unsupported capability answers 400 with the `supported: false` body so
/// both the flag and the status reach the caller.
async fn validate_volume_capabilities(
    State(state): State<AppState>,
    Json(request): Json<ValidateVolumeCapabilitiesRequest>,
) -> Response {
    let call = state.controller.validate_volume_capabilities(request);
    match state.with_deadline("ValidateVolumeCapabilities", call).await {
        Some(Ok(response)) if response.supported => (StatusCode::OK, Json(response)).into_response(),
        Some(Ok(response)) => (StatusCode::BAD_REQUEST, Json(response)).into_response(),
        Some(Err(e)) => error_response(&e),
        None => timeout_response(state.request_timeout),
    }
}

/// Report plugin identity and controller capabilities
async fn get_capabilities(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.controller.config();
    Json(CapabilitiesResponse {
        driver_name: config.driver_name.clone(),
        driver_version: config.driver_version.clone(),
        capabilities: state.controller.controller_get_capabilities(),
    })
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, "ready")
}

/// Prometheus metrics
async fn metrics(State(state): State<AppState>) -> Response {
    match state.controller.render_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::controlplane::backends::{InMemoryFileService, StaticMetadata};
    use crate::domain::ports::{Volume, ValidateVolumeCapabilitiesResponse};
    use crate::network::allocation::IpRangeAllocator;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use tower::ServiceExt;

    fn app() -> Router {
        let controller = ControllerServer::new(
            DriverConfig::default(),
            Arc::new(InMemoryFileService::new()),
            Arc::new(StaticMetadata::new("test-project", "us-central1-a")),
            IpRangeAllocator::new(),
        )
        .unwrap();
        RestRouter::new(controller, Duration::from_secs(5)).build()
    }

    async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response {
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn get(app: &Router, uri: &str) -> Response {
        app.clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> T {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_body(name: &str) -> serde_json::Value {
        json!({
            "name": name,
            "capacityRange": { "requiredBytes": 1u64 << 40 },
            "volumeCapabilities": [
                { "accessType": { "type": "mount" }, "accessMode": "multi-node-multi-writer" }
            ],
            "parameters": { "reserved-ipv4-cidr": "10.0.0.0/24" }
        })
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(Code::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(Code::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(status_for(Code::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(Code::ResourceExhausted), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(Code::Aborted), StatusCode::CONFLICT);
        assert_eq!(status_for(Code::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_create_delete_flow() {
        let app = app();

        let response = post_json(&app, "/v1/volumes", create_body("vol-a")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let volume: Volume = read_json(response).await;
        assert_eq!(volume.volume_id, "modeInstance/us-central1-a/vol-a/vol1");
        assert_eq!(volume.attributes["ip"], "10.0.0.2");

        // Same request again returns the same volume
        let response = post_json(&app, "/v1/volumes", create_body("vol-a")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let again: Volume = read_json(response).await;
        assert_eq!(again, volume);

        let response = post_json(
            &app,
            "/v1/volumes/delete",
            json!({ "volumeId": volume.volume_id }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_incompatible_create_conflicts() {
        let app = app();
        post_json(&app, "/v1/volumes", create_body("vol-a")).await;

        let mut body = create_body("vol-a");
        body["capacityRange"]["requiredBytes"] = json!(2u64 << 40);
        let response = post_json(&app, "/v1/volumes", body).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let error: ApiErrorResponse = read_json(response).await;
        assert_eq!(error.error, "already_exists");
    }

    #[tokio::test]
    async fn test_invalid_parameter_is_bad_request() {
        let app = app();
        let mut body = create_body("vol-a");
        body["parameters"] = json!({ "bogus": "1" });
        let response = post_json(&app, "/v1/volumes", body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_validate_unsupported_capability() {
        let app = app();
        let response = post_json(&app, "/v1/volumes", create_body("vol-a")).await;
        let volume: Volume = read_json(response).await;

        let response = post_json(
            &app,
            "/v1/volumes/validate",
            json!({
                "volumeId": volume.volume_id,
                "volumeCapabilities": [
                    { "accessType": { "type": "block" }, "accessMode": "single-node-writer" }
                ]
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ValidateVolumeCapabilitiesResponse = read_json(response).await;
        assert!(!body.supported);
        assert!(!body.message.is_empty());
    }

    #[tokio::test]
    async fn test_validate_missing_volume() {
        let app = app();
        let response = post_json(
            &app,
            "/v1/volumes/validate",
            json!({
                "volumeId": "modeInstance/us-central1-a/missing/vol1",
                "volumeCapabilities": [
                    { "accessType": { "type": "mount" }, "accessMode": "single-node-writer" }
                ]
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_capabilities_and_health() {
        let app = app();

        let response = get(&app, "/v1/capabilities").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: CapabilitiesResponse = read_json(response).await;
        assert_eq!(body.driver_name, "filer.csi.billyronks.io");
        assert_eq!(body.capabilities, vec![ControllerCapability::CreateDeleteVolume]);

        assert_eq!(get(&app, "/healthz").await.status(), StatusCode::OK);
        assert_eq!(get(&app, "/readyz").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = app();
        post_json(&app, "/v1/volumes", create_body("vol-a")).await;

        let response = get(&app, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("create_volume"));
    }
}
