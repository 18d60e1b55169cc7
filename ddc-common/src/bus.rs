//! The `delivery_requests` / `drone_updates` / `delivery_status` message bus. Production
//! deployments would point this at a real broker; this workspace ships a single in-process
//! implementation backed by bounded `tokio::sync::mpsc` channels, delivering every message to
//! every subscriber attached before it was published.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::error::Result;

const DEFAULT_QUEUE_CAPACITY: usize = 2000;

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, queue: &str, payload: Value) -> Result<()>;
    /// Registers a new subscriber for `queue`; every publish after this call fans out to it.
    async fn subscribe(&self, queue: &str) -> mpsc::Receiver<Value>;
}

struct Topic {
    senders: Vec<mpsc::Sender<Value>>,
}

/// A process-local pub/sub bus. Each named queue holds a list of subscriber senders; publish
/// fans out to all of them, dropping the message for any subscriber whose bounded channel is
/// full rather than blocking the publisher — a slow subscriber sees stale data, not a stalled
/// system.
pub struct InProcessBus {
    topics: Mutex<HashMap<String, Topic>>,
    capacity: usize,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, queue: &str, payload: Value) -> Result<()> {
        let mut topics = self.topics.lock().await;
        let topic = topics.entry(queue.to_string()).or_insert_with(|| Topic {
            senders: Vec::new(),
        });
        topic.senders.retain(|tx| !tx.is_closed());
        for tx in &topic.senders {
            if let Err(e) = tx.try_send(payload.clone()) {
                match e {
                    mpsc::error::TrySendError::Full(_) => {
                        log::warn!("bus: queue {queue} full, dropping message for a slow subscriber");
                    }
                    mpsc::error::TrySendError::Closed(_) => {}
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut topics = self.topics.lock().await;
        topics
            .entry(queue.to_string())
            .or_insert_with(|| Topic { senders: Vec::new() })
            .senders
            .push(tx);
        rx
    }
}

pub type SharedBus = Arc<dyn MessageBus>;

pub fn shared_in_process_bus() -> SharedBus {
    Arc::new(InProcessBus::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_fans_out_to_all_subscribers() {
        let bus = InProcessBus::new();
        let mut a = bus.subscribe("q").await;
        let mut b = bus.subscribe("q").await;
        bus.publish("q", json!({"x": 1})).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), json!({"x": 1}));
        assert_eq!(b.recv().await.unwrap(), json!({"x": 1}));
    }

    #[tokio::test]
    async fn publish_before_any_subscriber_is_dropped() {
        let bus = InProcessBus::new();
        bus.publish("q", json!({"x": 1})).await.unwrap();
        let mut a = bus.subscribe("q").await;
        bus.publish("q", json!({"x": 2})).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), json!({"x": 2}));
    }
}
