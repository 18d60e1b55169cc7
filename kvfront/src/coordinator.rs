use std::sync::Arc;

use ddc_common::{
    error::{AppError, Result},
    kv::{CasOutcome, HttpKv, KvClient, LockOutcome},
    lww,
};
use serde_json::Value;

use crate::{hints::HintBuffer, ring::replica_set};

/// The replicating coordinator. Talks to each backend through the same `HttpKv`/`KvClient`
/// shape application code uses to talk to the coordinator itself — backend and coordinator
/// expose an identical surface.
pub struct Coordinator {
    backends: Vec<String>,
    clients: Vec<Arc<HttpKv>>,
    rf: usize,
    hints: Arc<HintBuffer>,
}

impl Coordinator {
    pub fn new(backends: Vec<String>, rf: usize, hints: Arc<HintBuffer>) -> Self {
        let clients = backends.iter().map(|b| Arc::new(HttpKv::new(b.clone()))).collect();
        Self {
            backends,
            clients,
            rf,
            hints,
        }
    }

    fn replicas_for(&self, key: &str) -> Vec<(String, Arc<HttpKv>)> {
        replica_set(key, &self.backends, self.rf)
            .into_iter()
            .map(|url| {
                let idx = self.backends.iter().position(|b| *b == url).expect("replica_set returns known backends");
                (url, self.clients[idx].clone())
            })
            .collect()
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        let replicas = self.replicas_for(key);
        if replicas.is_empty() {
            return Err(AppError::Unavailable("no backends configured".to_string()));
        }

        let mut observed: Vec<(String, Option<(f64, Value)>)> = Vec::with_capacity(replicas.len());
        for (url, client) in &replicas {
            match client.get(key).await {
                Ok(Some(raw)) => observed.push((url.clone(), Some(lww::unwrap(&raw)))),
                Ok(None) => observed.push((url.clone(), None)),
                Err(e) => {
                    log::warn!("kvfront: GET {key} from {url} failed: {e}");
                    observed.push((url.clone(), None));
                }
            }
        }

        let winner = observed
            .iter()
            .filter_map(|(_, v)| v.clone())
            .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        let Some((win_ts, win_data)) = winner else {
            return Ok(None);
        };

        for (url, v) in &observed {
            let stale = !matches!(v, Some((ts, _)) if *ts >= win_ts);
            if stale {
                if let Some(idx) = self.backends.iter().position(|b| b == url) {
                    let client = self.clients[idx].clone();
                    let key = key.to_string();
                    let wrapped = serde_json::to_value(lww::wrap(win_data.clone(), win_ts))?;
                    tokio::spawn(async move {
                        if let Err(e) = client.put(&key, wrapped).await {
                            log::warn!("kvfront: read-repair of {key} failed: {e}");
                        }
                    });
                }
            }
        }

        Ok(Some(win_data))
    }

    pub async fn put(&self, key: &str, value: Value) -> Result<()> {
        let wrapped = serde_json::to_value(lww::wrap(value, lww::now_ts()))?;
        let replicas = self.replicas_for(key);
        if replicas.is_empty() {
            return Err(AppError::Unavailable("no backends configured".to_string()));
        }

        let mut ok_count = 0usize;
        for (url, client) in &replicas {
            match client.put(key, wrapped.clone()).await {
                Ok(()) => ok_count += 1,
                Err(e) => {
                    log::warn!("kvfront: PUT {key} to {url} failed, recording hint: {e}");
                    self.hints.add(url, key, wrapped.clone()).await;
                }
            }
        }

        if ok_count == 0 {
            return Err(AppError::Unavailable(format!("PUT {key} failed on every replica")));
        }
        Ok(())
    }

    pub async fn cas(&self, key: &str, old: Option<Value>, new: Value) -> Result<CasOutcome> {
        let replicas = self.replicas_for(key);
        let Some((primary_url, primary)) = replicas.first() else {
            return Err(AppError::Unavailable("no backends configured".to_string()));
        };

        let current_wrapped = primary.get(key).await?;
        let current_data = current_wrapped.as_ref().map(|w| lww::unwrap(w).1);
        if current_data != old {
            return Ok(CasOutcome::Conflict { current: current_data });
        }

        let new_wrapped = serde_json::to_value(lww::wrap(new, lww::now_ts()))?;
        let outcome = primary.cas(key, current_wrapped, new_wrapped.clone()).await?;

        match outcome {
            CasOutcome::Ok => {
                for (url, client) in replicas.iter().skip(1) {
                    if let Err(e) = client.put(key, new_wrapped.clone()).await {
                        log::warn!("kvfront: CAS replication of {key} to {url} failed, recording hint: {e}");
                        self.hints.add(url, key, new_wrapped.clone()).await;
                    }
                }
                Ok(CasOutcome::Ok)
            }
            CasOutcome::Conflict { current } => {
                log::warn!("kvfront: CAS {key} rejected by primary {primary_url}");
                Ok(CasOutcome::Conflict {
                    current: current.map(|w| lww::unwrap(&w).1),
                })
            }
        }
    }

    pub async fn lock_acquire(&self, key: &str, ttl_sec: u64) -> Result<LockOutcome> {
        let replicas = self.replicas_for(key);
        let Some((_, primary)) = replicas.first() else {
            return Err(AppError::Unavailable("no backends configured".to_string()));
        };
        primary.lock_acquire(key, ttl_sec).await
    }

    pub async fn lock_release(&self, key: &str) -> Result<()> {
        let replicas = self.replicas_for(key);
        let Some((_, primary)) = replicas.first() else {
            return Err(AppError::Unavailable("no backends configured".to_string()));
        };
        primary.lock_release(key).await
    }
}
