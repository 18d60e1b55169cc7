use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ddc_common::kv::CasOutcome;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::coordinator::Coordinator;

pub fn router(coordinator: Arc<Coordinator>) -> Router {
    Router::new()
        .route("/kv/:key", get(get_kv).put(put_kv))
        .route("/kv/cas", post(cas_kv))
        .route("/lock/acquire/:key", post(lock_acquire))
        .route("/lock/release/:key", post(lock_release))
        .route("/health", get(health))
        .with_state(coordinator)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn get_kv(State(coordinator): State<Arc<Coordinator>>, Path(key): Path<String>) -> Response {
    match coordinator.get(&key).await {
        Ok(Some(value)) => Json(json!({"key": key, "value": value})).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            log::error!("kvfront get {key} failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[derive(Deserialize)]
struct ValueBody {
    value: Value,
}

async fn put_kv(
    State(coordinator): State<Arc<Coordinator>>,
    Path(key): Path<String>,
    Json(body): Json<ValueBody>,
) -> Response {
    match coordinator.put(&key, body.value).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => {
            log::error!("kvfront put {key} failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[derive(Deserialize)]
struct CasBody {
    key: String,
    old: Option<Value>,
    new: Value,
}

#[derive(Serialize)]
struct CasResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    current: Option<Value>,
}

async fn cas_kv(State(coordinator): State<Arc<Coordinator>>, Json(body): Json<CasBody>) -> Response {
    match coordinator.cas(&body.key, body.old, body.new).await {
        Ok(CasOutcome::Ok) => Json(CasResponse { ok: true, current: None }).into_response(),
        Ok(CasOutcome::Conflict { current }) => {
            Json(CasResponse { ok: false, current }).into_response()
        }
        Err(e) => {
            log::error!("kvfront cas {} failed: {e}", body.key);
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

#[derive(Deserialize)]
struct TtlQuery {
    ttl_sec: Option<u64>,
}

async fn lock_acquire(
    State(coordinator): State<Arc<Coordinator>>,
    Path(key): Path<String>,
    Query(q): Query<TtlQuery>,
) -> Response {
    match coordinator.lock_acquire(&key, q.ttl_sec.unwrap_or(20)).await {
        Ok(outcome) => Json(json!({"ok": outcome.ok, "expires_at": outcome.expires_at})).into_response(),
        Err(e) => {
            log::error!("kvfront lock_acquire {key} failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn lock_release(State(coordinator): State<Arc<Coordinator>>, Path(key): Path<String>) -> Response {
    match coordinator.lock_release(&key).await {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => {
            log::error!("kvfront lock_release {key} failed: {e}");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}
