use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{cache::CachedStore, locks::LockTable};

pub struct AppState {
    pub store: CachedStore,
    pub locks: LockTable,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/kv/:key", get(get_kv).put(put_kv))
        .route("/kv/cas", post(cas_kv))
        .route("/lock/acquire/:key", post(lock_acquire))
        .route("/lock/release/:key", post(lock_release))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(5)))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn get_kv(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Response {
    match state.store.get(&key) {
        Ok(Some(value)) => Json(json!({"key": key, "value": value})).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            log::error!("kv get {key} failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct ValueBody {
    value: Value,
}

async fn put_kv(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<ValueBody>,
) -> Response {
    match state.store.put(&key, body.value) {
        Ok(()) => Json(json!({"ok": true})).into_response(),
        Err(e) => {
            log::error!("kv put {key} failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
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

async fn cas_kv(State(state): State<Arc<AppState>>, Json(body): Json<CasBody>) -> Response {
    match state.store.cas(&body.key, body.old, body.new) {
        Ok((ok, current)) => Json(CasResponse { ok, current }).into_response(),
        Err(e) => {
            log::error!("kv cas {} failed: {e}", body.key);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[derive(Deserialize)]
struct TtlQuery {
    ttl_sec: Option<u64>,
}

async fn lock_acquire(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(q): Query<TtlQuery>,
) -> Json<Value> {
    let (ok, expires_at) = state.locks.acquire(&key, q.ttl_sec.unwrap_or(20));
    Json(json!({"ok": ok, "expires_at": expires_at}))
}

async fn lock_release(State(state): State<Arc<AppState>>, Path(key): Path<String>) -> Json<Value> {
    state.locks.release(&key);
    Json(json!({"ok": true}))
}
