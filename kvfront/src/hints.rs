use std::{collections::HashMap, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::Mutex;

/// Per-backend buffer of writes that failed to land, replayed by `run_flusher` every
/// `HINT_FLUSH_SEC`. Mirrors the coordinator's `_HINTS` map.
pub struct HintBuffer {
    pending: Mutex<HashMap<String, Vec<(String, Value)>>>,
}

impl HintBuffer {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub async fn add(&self, backend: &str, key: &str, wrapped_value: Value) {
        let mut pending = self.pending.lock().await;
        pending
            .entry(backend.to_string())
            .or_default()
            .push((key.to_string(), wrapped_value));
    }

    async fn flush_once(&self, client: &reqwest::Client) {
        let snapshot: Vec<(String, Vec<(String, Value)>)> = {
            let pending = self.pending.lock().await;
            if pending.is_empty() {
                return;
            }
            pending.iter().map(|(b, items)| (b.clone(), items.clone())).collect()
        };

        let mut still_pending: HashMap<String, Vec<(String, Value)>> = HashMap::new();
        for (backend, items) in snapshot {
            let mut still = Vec::new();
            for (key, value) in items {
                let url = format!("{}/kv/{key}", backend.trim_end_matches('/'));
                let ok = client
                    .put(&url)
                    .json(&serde_json::json!({"value": value}))
                    .send()
                    .await
                    .map(|r| r.status().is_success())
                    .unwrap_or(false);
                if !ok {
                    still.push((key, value));
                }
            }
            if !still.is_empty() {
                still_pending.insert(backend, still);
            }
        }

        let mut pending = self.pending.lock().await;
        *pending = still_pending;
    }
}

impl Default for HintBuffer {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run_flusher(buffer: Arc<HintBuffer>, interval_sec: u64) {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("reqwest client builds");
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_sec.max(1)));
    loop {
        ticker.tick().await;
        buffer.flush_once(&client).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_flush_against_unreachable_backend_keeps_the_hint() {
        let buf = HintBuffer::new();
        buf.add("http://127.0.0.1:1", "k", serde_json::json!({"_ts": 1.0, "data": "v"}))
            .await;
        let client = reqwest::Client::new();
        buf.flush_once(&client).await;
        let pending = buf.pending.lock().await;
        assert_eq!(pending.get("http://127.0.0.1:1").map(|v| v.len()), Some(1));
    }
}
