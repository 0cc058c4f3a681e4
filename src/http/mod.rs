// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! HTTP surface
//!
//! - GET /api/camera/stream, /api/camera/ipcam, /api/camera/simulated,
//!   /api/camera/local - multipart camera streams
//! - GET /api/status, /api/health, /api/metrics, /api/sensors - JSON state
//! - POST /api/fire/trigger - manual fire trigger
//! - GET /api/cameras, POST /api/camera/connect - camera listing and URLs

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::CameraEntry;
use crate::core::{evaluate, AlertEngine, Hub, LogLevel, Origin, SLOT_COUNT, TRIPPED};
use crate::error::Error;
use crate::proxy::{stream_url, CameraKind, CameraSource, ProxyResponse, StreamProxy};

const DEFAULT_PUSH_PORT: u16 = 8080;

/// Response header naming how a stream is delivered
const STREAM_SOURCE: &str = "x-stream-source";

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    hub: Hub,
    alert: AlertEngine,
    proxy: StreamProxy,
    cameras: Arc<Vec<CameraEntry>>,
}

impl AppState {
    pub fn new(alert: AlertEngine, proxy: StreamProxy, cameras: Vec<CameraEntry>) -> Self {
        Self {
            hub: alert.hub().clone(),
            alert,
            proxy,
            cameras: Arc::new(cameras),
        }
    }
}

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    error: String,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

fn map_proxy_error(e: Error) -> ApiError {
    match e {
        Error::InvalidSource(msg) => api_error(StatusCode::BAD_REQUEST, msg),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// Build the router with all endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/camera/stream", get(network_stream_handler))
        .route("/api/camera/ipcam", get(push_stream_handler))
        .route("/api/camera/simulated", get(simulated_stream_handler))
        .route("/api/camera/local", get(local_stream_handler))
        .route("/api/camera/connect", post(camera_connect_handler))
        .route("/api/cameras", get(cameras_handler))
        .route("/api/status", get(status_handler))
        .route("/api/health", get(health_handler))
        .route("/api/metrics", get(metrics_handler))
        .route("/api/sensors", get(sensors_handler))
        .route("/api/fire/trigger", post(fire_trigger_handler))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(tower_http::trace::TraceLayer::new_for_http())
                .layer(tower_http::cors::CorsLayer::permissive()),
        )
}

/// Serve the router on `listener` until the shutdown signal fires
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    info!("HTTP server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            info!("HTTP server shutting down");
        })
        .await?;

    Ok(())
}

fn stream_response(response: ProxyResponse) -> Response {
    (
        [
            (header::CONTENT_TYPE, response.content_type),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (
                HeaderName::from_static(STREAM_SOURCE),
                response.delivery.as_str().to_string(),
            ),
        ],
        Body::from_stream(response.body),
    )
        .into_response()
}

async fn open_stream(state: &AppState, source: CameraSource) -> Result<Response, ApiError> {
    state
        .proxy
        .open(source)
        .await
        .map(stream_response)
        .map_err(map_proxy_error)
}

// Camera streams

#[derive(Debug, Deserialize)]
struct NetworkQuery {
    url: String,
    username: Option<String>,
    password: Option<String>,
}

async fn network_stream_handler(
    State(state): State<AppState>,
    Query(query): Query<NetworkQuery>,
) -> Result<Response, ApiError> {
    open_stream(
        &state,
        CameraSource::Network {
            url: query.url,
            username: query.username,
            password: query.password,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
struct PushQuery {
    ip: String,
    port: Option<u16>,
    path: Option<String>,
}

async fn push_stream_handler(
    State(state): State<AppState>,
    Query(query): Query<PushQuery>,
) -> Result<Response, ApiError> {
    if query.ip.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "ip is required"));
    }
    open_stream(
        &state,
        CameraSource::Push {
            ip: query.ip.trim().to_string(),
            port: query.port.unwrap_or(DEFAULT_PUSH_PORT),
            path: query.path,
        },
    )
    .await
}

#[derive(Debug, Deserialize)]
struct LabelQuery {
    label: Option<String>,
}

async fn simulated_stream_handler(
    State(state): State<AppState>,
    Query(query): Query<LabelQuery>,
) -> Result<Response, ApiError> {
    open_stream(&state, CameraSource::Synthetic { caption: query.label }).await
}

#[derive(Debug, Deserialize)]
struct DeviceQuery {
    device: Option<String>,
}

async fn local_stream_handler(
    State(state): State<AppState>,
    Query(query): Query<DeviceQuery>,
) -> Result<Response, ApiError> {
    open_stream(&state, CameraSource::Local { device: query.device }).await
}

// Camera listing

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CameraListing {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    stream_url: String,
}

async fn cameras_handler(State(state): State<AppState>) -> Json<Vec<CameraListing>> {
    let mut listing = vec![CameraListing {
        name: "Simulated Camera".to_string(),
        kind: CameraKind::Simulated.as_str(),
        stream_url: "/api/camera/simulated".to_string(),
    }];

    for camera in state.cameras.iter() {
        let resolved = CameraKind::parse(&camera.kind)
            .ok_or_else(|| format!("unknown camera type '{}'", camera.kind))
            .and_then(|kind| {
                stream_url(kind, &camera.params)
                    .map(|url| (kind, url))
                    .map_err(|e| e.to_string())
            });

        match resolved {
            Ok((kind, stream_url)) => listing.push(CameraListing {
                name: camera.name.clone(),
                kind: kind.as_str(),
                stream_url,
            }),
            Err(reason) => warn!("Skipping camera '{}': {}", camera.name, reason),
        }
    }

    Json(listing)
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    params: BTreeMap<String, Value>,
}

async fn camera_connect_handler(Json(request): Json<ConnectRequest>) -> Result<Json<Value>, ApiError> {
    let kind = CameraKind::parse(&request.kind).ok_or_else(|| {
        api_error(
            StatusCode::BAD_REQUEST,
            format!("unknown camera type '{}'", request.kind),
        )
    })?;

    let params: BTreeMap<String, String> = request
        .params
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        })
        .collect();

    let url = stream_url(kind, &params).map_err(map_proxy_error)?;
    Ok(Json(json!({ "streamUrl": url })))
}

// State

async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    let reading = state.hub.reading();
    Json(json!({
        "name": crate::NAME,
        "version": crate::VERSION,
        "link": state.hub.link_status(),
        "sensors": reading,
        "fireDetected": evaluate(&reading.sensors).fire_detected,
        "metrics": state.hub.metrics(),
        "subscribers": state.hub.subscriber_count(),
    }))
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "uptime": state.hub.metrics().uptime,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.hub.metrics()))
}

async fn sensors_handler(State(state): State<AppState>) -> Json<Value> {
    let reading = state.hub.reading();
    let assessment = evaluate(&reading.sensors);
    Json(json!({
        "sensors": reading.sensors,
        "timestamp": reading.timestamp,
        "fireDetected": assessment.fire_detected,
        "location": assessment.location,
        "severity": assessment.severity,
        "simulated": !state.hub.link_status().connected,
    }))
}

#[derive(Debug, Deserialize)]
struct TriggerRequest {
    sensor: i64,
}

async fn fire_trigger_handler(
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<Value>, ApiError> {
    if !(1..=SLOT_COUNT as i64).contains(&request.sensor) {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("sensor must be between 1 and {}", SLOT_COUNT),
        ));
    }

    let slot = request.sensor as usize - 1;
    state.hub.log(
        LogLevel::Warning,
        format!("Manual fire trigger on sensor {}", request.sensor),
    );
    let assessment = state.alert.set_slot(slot, TRIPPED, Origin::Manual);

    Ok(Json(json!({
        "success": true,
        "sensor": request.sensor,
        "location": assessment.location,
        "severity": assessment.severity,
    })))
}
