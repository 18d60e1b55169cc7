use std::collections::VecDeque;

use ddc_common::{geo::LatLon, model::DroneStatus};
use serde::Serialize;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct Telemetry {
    pub drone_id: String,
    pub pos: LatLon,
    pub battery: f64,
    pub status: DroneStatus,
    pub current_delivery: Option<String>,
    pub at_charge: bool,
}

/// Bounded local queue shared between the per-drone tick tasks and the dedicated publisher
/// task; full queues drop the oldest entry rather than block a drone loop.
pub struct TelemetryQueue {
    items: Mutex<VecDeque<Telemetry>>,
    capacity: usize,
}

impl TelemetryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub async fn push(&self, event: Telemetry) {
        let mut items = self.items.lock().await;
        if items.len() >= self.capacity {
            items.pop_front();
        }
        items.push_back(event);
    }

    pub async fn drain(&self) -> Vec<Telemetry> {
        let mut items = self.items.lock().await;
        items.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> Telemetry {
        Telemetry {
            drone_id: id.to_string(),
            pos: LatLon::new(0.0, 0.0),
            battery: 100.0,
            status: DroneStatus::Idle,
            current_delivery: None,
            at_charge: false,
        }
    }

    #[tokio::test]
    async fn full_queue_drops_oldest() {
        let q = TelemetryQueue::new(2);
        q.push(event("a")).await;
        q.push(event("b")).await;
        q.push(event("c")).await;
        let drained = q.drain().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].drone_id, "b");
        assert_eq!(drained[1].drone_id, "c");
    }

    #[tokio::test]
    async fn drain_empties_the_queue() {
        let q = TelemetryQueue::new(4);
        q.push(event("a")).await;
        assert_eq!(q.drain().await.len(), 1);
        assert!(q.drain().await.is_empty());
    }
}
