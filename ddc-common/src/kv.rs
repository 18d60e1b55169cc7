use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Outcome of a `CAS key old new` call.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    Ok,
    Conflict { current: Option<Value> },
}

impl CasOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CasOutcome::Ok)
    }
}

#[derive(Debug, Clone)]
pub struct LockOutcome {
    pub ok: bool,
    pub expires_at: Option<f64>,
}

/// The KV surface every in-scope service talks through — identical whether the other end is a
/// single backend replica or the replicating coordinator in front of a replica set.
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn put(&self, key: &str, value: Value) -> Result<()>;
    async fn cas(&self, key: &str, old: Option<Value>, new: Value) -> Result<CasOutcome>;
    async fn lock_acquire(&self, key: &str, ttl_sec: u64) -> Result<LockOutcome>;
    async fn lock_release(&self, key: &str) -> Result<()>;
}

#[derive(Serialize)]
struct ValueBody<'a> {
    value: &'a Value,
}

#[derive(Deserialize)]
struct GetResponse {
    #[allow(dead_code)]
    key: String,
    value: Value,
}

#[derive(Serialize)]
struct CasBody<'a> {
    key: &'a str,
    old: &'a Option<Value>,
    new: &'a Value,
}

#[derive(Deserialize)]
struct CasResponse {
    ok: bool,
    current: Option<Value>,
}

#[derive(Deserialize)]
struct LockAcquireResponse {
    ok: bool,
    expires_at: Option<f64>,
}

/// Thin JSON-over-HTTP client against the KV HTTP surface. Used both by application code
/// talking to the coordinator and by the coordinator itself talking to individual backend
/// replicas.
pub struct HttpKv {
    base_url: String,
    client: reqwest::Client,
}

impl HttpKv {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(3))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn map_transport_err(e: reqwest::Error) -> AppError {
        if e.is_timeout() || e.is_connect() {
            AppError::Unavailable(e.to_string())
        } else {
            AppError::Io(e)
        }
    }
}

#[async_trait]
impl KvClient for HttpKv {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let resp = self
            .client
            .get(self.url(&format!("/kv/{key}")))
            .send()
            .await
            .map_err(Self::map_transport_err)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "GET {key} -> {}",
                resp.status()
            )));
        }
        let body: GetResponse = resp.json().await.map_err(Self::map_transport_err)?;
        Ok(Some(body.value))
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        let resp = self
            .client
            .put(self.url(&format!("/kv/{key}")))
            .json(&ValueBody { value: &value })
            .send()
            .await
            .map_err(Self::map_transport_err)?;
        if !resp.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "PUT {key} -> {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn cas(&self, key: &str, old: Option<Value>, new: Value) -> Result<CasOutcome> {
        let resp = self
            .client
            .post(self.url("/kv/cas"))
            .json(&CasBody {
                key,
                old: &old,
                new: &new,
            })
            .send()
            .await
            .map_err(Self::map_transport_err)?;
        if !resp.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "CAS {key} -> {}",
                resp.status()
            )));
        }
        let body: CasResponse = resp.json().await.map_err(Self::map_transport_err)?;
        if body.ok {
            Ok(CasOutcome::Ok)
        } else {
            Ok(CasOutcome::Conflict {
                current: body.current,
            })
        }
    }

    async fn lock_acquire(&self, key: &str, ttl_sec: u64) -> Result<LockOutcome> {
        let resp = self
            .client
            .post(self.url(&format!("/lock/acquire/{key}?ttl_sec={ttl_sec}")))
            .send()
            .await
            .map_err(Self::map_transport_err)?;
        if !resp.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "LOCK acquire {key} -> {}",
                resp.status()
            )));
        }
        let body: LockAcquireResponse = resp.json().await.map_err(Self::map_transport_err)?;
        Ok(LockOutcome {
            ok: body.ok,
            expires_at: body.expires_at,
        })
    }

    async fn lock_release(&self, key: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.url(&format!("/lock/release/{key}")))
            .send()
            .await
            .map_err(Self::map_transport_err)?;
        if !resp.status().is_success() {
            return Err(AppError::Unavailable(format!(
                "LOCK release {key} -> {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

/// In-process `KvClient` backed by a `tokio::sync::Mutex`-guarded map, for tests that want real
/// CAS/lock semantics without standing up `kvstore`/`kvfront` over HTTP.
pub struct InMemoryKv {
    data: tokio::sync::Mutex<std::collections::HashMap<String, Value>>,
    locks: tokio::sync::Mutex<std::collections::HashMap<String, f64>>,
}

impl InMemoryKv {
    pub fn new() -> Self {
        Self {
            data: tokio::sync::Mutex::new(std::collections::HashMap::new()),
            locks: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvClient for InMemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<()> {
        self.data.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn cas(&self, key: &str, old: Option<Value>, new: Value) -> Result<CasOutcome> {
        let mut data = self.data.lock().await;
        let current = data.get(key).cloned();
        if current != old {
            return Ok(CasOutcome::Conflict { current });
        }
        data.insert(key.to_string(), new);
        Ok(CasOutcome::Ok)
    }

    async fn lock_acquire(&self, key: &str, ttl_sec: u64) -> Result<LockOutcome> {
        let now = crate::lww::now_ts();
        let mut locks = self.locks.lock().await;
        let available = locks.get(key).map(|&exp| now >= exp).unwrap_or(true);
        if !available {
            return Ok(LockOutcome { ok: false, expires_at: None });
        }
        let expires_at = now + ttl_sec as f64;
        locks.insert(key.to_string(), expires_at);
        Ok(LockOutcome { ok: true, expires_at: Some(expires_at) })
    }

    async fn lock_release(&self, key: &str) -> Result<()> {
        self.locks.lock().await.remove(key);
        Ok(())
    }
}

/// RAII-ish helper for the lock-then-CAS pattern used throughout the dispatcher: acquire, run
/// the body, always release, and report `None` when the lock couldn't be acquired.
pub async fn with_lock<F, Fut, T>(
    kv: &dyn KvClient,
    key: &str,
    ttl_sec: u64,
    body: F,
) -> Result<Option<T>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let lock = kv.lock_acquire(key, ttl_sec).await?;
    if !lock.ok {
        return Ok(None);
    }
    let result = body().await;
    kv.lock_release(key).await?;
    result.map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn in_memory_cas_conflict_reports_current() {
        let kv = InMemoryKv::new();
        kv.put("k", json!(1)).await.unwrap();
        let outcome = kv.cas("k", Some(json!(99)), json!(2)).await.unwrap();
        assert!(matches!(outcome, CasOutcome::Conflict { current: Some(v) } if v == json!(1)));
    }

    #[tokio::test]
    async fn with_lock_skips_body_when_already_held() {
        let kv = InMemoryKv::new();
        kv.lock_acquire("x", 60).await.unwrap();
        let ran = with_lock(&kv, "x", 60, || async { Ok(42) }).await.unwrap();
        assert!(ran.is_none());
    }

    #[tokio::test]
    async fn with_lock_releases_after_body_runs() {
        let kv = InMemoryKv::new();
        let ran = with_lock(&kv, "x", 60, || async { Ok(42) }).await.unwrap();
        assert_eq!(ran, Some(42));
        // Released, so a fresh acquire should succeed immediately.
        assert!(kv.lock_acquire("x", 60).await.unwrap().ok);
    }
}
