use std::{sync::Arc, time::Duration};

use ddc_common::{
    error::Result,
    kv::{CasOutcome, KvClient},
    lww::now_ts,
    model::{Delivery, Drone, ZonesConfig},
    settings::Settings,
};

use crate::{
    keys,
    movement::{charge_point_for, compute_motion},
    telemetry::{Telemetry, TelemetryQueue},
};

const CAS_RETRY_ATTEMPTS: usize = 10;

/// One cooperative task per drone. Runs until the process shuts down.
pub async fn run_drone(
    kv: Arc<dyn KvClient>,
    drone_id: String,
    zones: Arc<ZonesConfig>,
    settings: Arc<Settings>,
    queue: Arc<TelemetryQueue>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(settings.drone_tick_sec));
    loop {
        ticker.tick().await;
        if let Err(e) = tick_once(kv.as_ref(), &drone_id, &zones, &settings, &queue).await {
            log::warn!("dronesim: tick for {drone_id} failed: {e}");
        }
    }
}

async fn tick_once(
    kv: &dyn KvClient,
    drone_id: &str,
    zones: &ZonesConfig,
    settings: &Settings,
    queue: &TelemetryQueue,
) -> Result<()> {
    for _ in 0..CAS_RETRY_ATTEMPTS {
        let key = keys::drone_key(drone_id);
        let Some(current_raw) = kv.get(&key).await? else {
            return Ok(());
        };
        let current: Drone = serde_json::from_value(current_raw.clone())?;

        if let Some(freeze_until) = current.freeze_until {
            if freeze_until > now_ts() {
                return Ok(());
            }
        }

        let delivery = match &current.current_delivery {
            Some(delivery_id) => match kv.get(&keys::delivery_key(delivery_id)).await? {
                Some(raw) => serde_json::from_value::<Delivery>(raw).ok(),
                None => None,
            },
            None => None,
        };
        let charge_point = charge_point_for(&current, zones);
        let motion = compute_motion(&current, delivery.as_ref(), charge_point, settings);

        let mut next = current.clone();
        next.pos = motion.pos;
        next.battery = motion.battery;
        next.at_charge = motion.at_charge;

        match kv.cas(&key, Some(current_raw), serde_json::to_value(&next)?).await? {
            CasOutcome::Ok => {
                queue
                    .push(Telemetry {
                        drone_id: drone_id.to_string(),
                        pos: next.pos,
                        battery: next.battery,
                        status: next.status,
                        current_delivery: next.current_delivery.clone(),
                        at_charge: next.at_charge,
                    })
                    .await;
                return Ok(());
            }
            CasOutcome::Conflict { .. } => continue,
        }
    }
    log::warn!("dronesim: {drone_id} exhausted CAS retries this tick, skipping");
    Ok(())
}
