use std::{sync::Arc, time::Duration};

use ddc_common::bus::MessageBus;
use serde_json::json;

use crate::telemetry::TelemetryQueue;

const POLL_INTERVAL_MS: u64 = 50;
const INITIAL_BACKOFF_MS: u64 = 100;
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Dedicated task draining the local telemetry queue onto `drone_updates`. Decoupled
/// from the per-drone tick loops so a slow or reconnecting bus never stalls movement. Backs off
/// exponentially on publish failure, capped at 5s, and just retries the same batch next pass —
/// the real broker client this would front for declares its queue idempotently on every
/// (re)connect, so no separate setup step is modeled here.
pub async fn run_publisher(bus: Arc<dyn MessageBus>, queue: Arc<TelemetryQueue>) {
    let mut backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
    let mut ticker = tokio::time::interval(Duration::from_millis(POLL_INTERVAL_MS));
    loop {
        ticker.tick().await;
        let events = queue.drain().await;
        for event in events {
            loop {
                let payload = json!({
                    "type": "drone_update",
                    "drone_id": event.drone_id,
                    "pos": event.pos,
                    "battery": event.battery,
                    "status": event.status,
                    "current_delivery": event.current_delivery,
                    "at_charge": event.at_charge,
                });
                match bus.publish("drone_updates", payload).await {
                    Ok(()) => {
                        backoff = Duration::from_millis(INITIAL_BACKOFF_MS);
                        break;
                    }
                    Err(e) => {
                        log::warn!("dronesim publisher: publish failed, backing off {backoff:?}: {e}");
                        tokio::time::sleep(backoff).await;
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }
    }
}
