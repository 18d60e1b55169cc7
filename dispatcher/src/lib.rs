pub mod advance;
pub mod assign;
pub mod autoscale;
pub mod feasibility;
pub mod governance;
pub mod keys;
pub mod scheduler;

use std::sync::Arc;

use ddc_common::{bus::MessageBus, error::Result, kv::KvClient, model::ZonesConfig, settings::Settings};

/// Consumes `delivery_requests`: attempt `assign_one` immediately per message.
pub async fn handle_delivery_request(
    kv: &dyn KvClient,
    bus: &dyn MessageBus,
    payload: &serde_json::Value,
    zones: &ZonesConfig,
    settings: &Settings,
) -> Result<()> {
    let Some(delivery_id) = payload.get("delivery_id").and_then(|v| v.as_str()) else {
        log::warn!("delivery_requests: payload missing delivery_id: {payload}");
        return Ok(());
    };
    match assign::assign_one(kv, bus, delivery_id, zones, settings).await {
        Ok(_) => Ok(()),
        Err(e) => {
            log::warn!("delivery_requests: assign_one({delivery_id}) failed: {e}");
            Ok(())
        }
    }
}

/// Consumes `drone_updates`: advance the single delivery bound to the reporting drone. The
/// drone's own document is re-read from KV; the payload only identifies which drone to look at.
pub async fn handle_drone_update(
    kv: &dyn KvClient,
    bus: &dyn MessageBus,
    payload: &serde_json::Value,
    settings: &Settings,
) -> Result<()> {
    let Some(drone_id) = payload.get("drone_id").and_then(|v| v.as_str()) else {
        log::warn!("drone_updates: payload missing drone_id: {payload}");
        return Ok(());
    };
    if let Err(e) = advance::advance_for_drone(kv, bus, drone_id, settings).await {
        log::warn!("drone_updates: advance_for_drone({drone_id}) failed: {e}");
    }
    Ok(())
}

/// Wires the two consumer loops and the periodic scheduler loop together; runs until the bus
/// channels close.
pub async fn run(
    kv: Arc<dyn KvClient>,
    bus: Arc<dyn MessageBus>,
    zones: Arc<ZonesConfig>,
    settings: Arc<Settings>,
) {
    let mut requests_rx = bus.subscribe("delivery_requests").await;
    let mut updates_rx = bus.subscribe("drone_updates").await;

    let requests_task = {
        let kv = kv.clone();
        let bus = bus.clone();
        let zones = zones.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            while let Some(payload) = requests_rx.recv().await {
                if let Err(e) = handle_delivery_request(kv.as_ref(), bus.as_ref(), &payload, &zones, &settings).await {
                    log::error!("delivery_requests handler error: {e}");
                }
            }
        })
    };

    let updates_task = {
        let kv = kv.clone();
        let bus = bus.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            while let Some(payload) = updates_rx.recv().await {
                if let Err(e) = handle_drone_update(kv.as_ref(), bus.as_ref(), &payload, &settings).await {
                    log::error!("drone_updates handler error: {e}");
                }
            }
        })
    };

    let scheduler_task = {
        let kv = kv.clone();
        let bus = bus.clone();
        let zones = zones.clone();
        let settings = settings.clone();
        tokio::spawn(async move {
            let scheduler = scheduler::Scheduler::new();
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(settings.assigner_tick_ms));
            loop {
                ticker.tick().await;
                if let Err(e) = scheduler.tick(kv.as_ref(), bus.as_ref(), &zones, &settings).await {
                    log::error!("scheduler tick error: {e}");
                }
            }
        })
    };

    let _ = tokio::join!(requests_task, updates_task, scheduler_task);
}
