pub mod drone_task;
pub mod fleet;
pub mod keys;
pub mod movement;
pub mod publisher;
pub mod telemetry;

use std::sync::Arc;

use ddc_common::{bus::MessageBus, error::Result, kv::KvClient, model::ZonesConfig, settings::Settings};

use telemetry::TelemetryQueue;

/// Matches the original simulator's `EVENT_QUEUE_MAX` default; local to this crate since it
/// bounds an in-process buffer, not a cross-process contract.
const TELEMETRY_QUEUE_CAPACITY: usize = 2000;

/// Bootstraps the fleet if needed, then spawns one task per drone plus the dedicated publisher
/// task, and waits on all of them.
pub async fn run(kv: Arc<dyn KvClient>, bus: Arc<dyn MessageBus>, zones: Arc<ZonesConfig>, settings: Arc<Settings>) -> Result<()> {
    let drone_ids = fleet::ensure_fleet(kv.as_ref(), &zones, &settings).await?;
    log::info!("dronesim: fleet bootstrapped, {} drones tracked", drone_ids.len());

    let queue = Arc::new(TelemetryQueue::new(TELEMETRY_QUEUE_CAPACITY));

    let mut tasks = Vec::with_capacity(drone_ids.len() + 1);
    for drone_id in drone_ids {
        let kv = kv.clone();
        let zones = zones.clone();
        let settings = settings.clone();
        let queue = queue.clone();
        tasks.push(tokio::spawn(async move {
            drone_task::run_drone(kv, drone_id, zones, settings, queue).await;
        }));
    }

    tasks.push(tokio::spawn(publisher::run_publisher(bus.clone(), queue.clone())));

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}
