use std::time::Duration;

use ddc_common::{
    error::Result,
    index::read_index,
    kv::{CasOutcome, KvClient},
    model::{Delivery, DeliveryStatus, Drone, DroneStatus},
    settings::Settings,
};

use crate::keys;

const SHORT_RETRY_ATTEMPTS: usize = 15;
const SHORT_RETRY_BACKOFF_MS: u64 = 10;
const LONG_RETRY_ATTEMPTS: usize = 40;
const LONG_RETRY_BACKOFF_MS: u64 = 25;
const GOVERNANCE_RETRY_ATTEMPTS: usize = 5;

/// CAS loop transitioning `idle -> busy`, preserving every telemetry field.
pub async fn set_drone_busy_if_idle(kv: &dyn KvClient, drone_id: &str, delivery_id: &str) -> Result<bool> {
    let key = keys::drone_key(drone_id);
    for _ in 0..SHORT_RETRY_ATTEMPTS {
        let Some(current_raw) = kv.get(&key).await? else {
            return Ok(false);
        };
        let current: Drone = serde_json::from_value(current_raw.clone())?;
        if current.status != DroneStatus::Idle || current.current_delivery.is_some() {
            return Ok(false);
        }
        let mut next = current;
        next.status = DroneStatus::Busy;
        next.current_delivery = Some(delivery_id.to_string());
        match kv.cas(&key, Some(current_raw), serde_json::to_value(&next)?).await? {
            CasOutcome::Ok => return Ok(true),
            CasOutcome::Conflict { .. } => tokio::time::sleep(Duration::from_millis(SHORT_RETRY_BACKOFF_MS)).await,
        }
    }
    Ok(false)
}

/// CAS loop transitioning `busy -> idle`, only if the drone is still busy on `expected_delivery`.
/// Trivially succeeds if the drone has already moved off that delivery.
pub async fn set_drone_idle_if_busy(kv: &dyn KvClient, drone_id: &str, expected_delivery: &str) -> Result<bool> {
    let key = keys::drone_key(drone_id);
    for _ in 0..LONG_RETRY_ATTEMPTS {
        let Some(current_raw) = kv.get(&key).await? else {
            return Ok(true);
        };
        let current: Drone = serde_json::from_value(current_raw.clone())?;
        if current.current_delivery.as_deref() != Some(expected_delivery) {
            return Ok(true);
        }
        let mut next = current;
        next.status = DroneStatus::Idle;
        next.current_delivery = None;
        match kv.cas(&key, Some(current_raw), serde_json::to_value(&next)?).await? {
            CasOutcome::Ok => return Ok(true),
            CasOutcome::Conflict { .. } => tokio::time::sleep(Duration::from_millis(LONG_RETRY_BACKOFF_MS)).await,
        }
    }
    Ok(false)
}

/// Sweep: any drone still `busy` on a `delivered` delivery is forced idle. Runs each tick.
pub async fn reconcile_stuck_busy(kv: &dyn KvClient) -> Result<()> {
    for drone_id in read_index(kv, keys::DRONES_INDEX).await? {
        let Some(raw) = kv.get(&keys::drone_key(&drone_id)).await? else {
            continue;
        };
        let Ok(drone) = serde_json::from_value::<Drone>(raw) else {
            continue;
        };
        if drone.status != DroneStatus::Busy {
            continue;
        }
        let Some(delivery_id) = &drone.current_delivery else {
            continue;
        };
        let Some(delivery_raw) = kv.get(&keys::delivery_key(delivery_id)).await? else {
            continue;
        };
        let Ok(delivery) = serde_json::from_value::<Delivery>(delivery_raw) else {
            continue;
        };
        if delivery.status == DeliveryStatus::Delivered {
            set_drone_idle_if_busy(kv, &drone_id, delivery_id).await?;
        }
    }
    Ok(())
}

/// Per-tick charging/retiring governance.
pub async fn govern_charging_and_retiring(kv: &dyn KvClient, settings: &Settings) -> Result<()> {
    for drone_id in read_index(kv, keys::DRONES_INDEX).await? {
        let key = keys::drone_key(&drone_id);
        for _ in 0..GOVERNANCE_RETRY_ATTEMPTS {
            let Some(current_raw) = kv.get(&key).await? else {
                break;
            };
            let Ok(current) = serde_json::from_value::<Drone>(current_raw.clone()) else {
                break;
            };

            let next_status = match current.status {
                DroneStatus::Charging if current.at_charge && current.battery >= settings.full_after => {
                    Some(DroneStatus::Idle)
                }
                DroneStatus::Retiring if current.at_charge && current.battery >= settings.full_after => {
                    Some(DroneStatus::Inactive)
                }
                DroneStatus::Idle if current.battery <= settings.critical_battery => Some(DroneStatus::Charging),
                _ => None,
            };

            let Some(next_status) = next_status else {
                break;
            };
            let mut next = current;
            next.status = next_status;
            match kv.cas(&key, Some(current_raw), serde_json::to_value(&next)?).await? {
                CasOutcome::Ok => break,
                CasOutcome::Conflict { .. } => tokio::time::sleep(Duration::from_millis(SHORT_RETRY_BACKOFF_MS)).await,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddc_common::{kv::InMemoryKv, model::DroneType};

    fn idle_drone(id: &str, battery: f64) -> Drone {
        Drone {
            id: id.to_string(),
            kind: DroneType::Light,
            speed: 0.4,
            status: DroneStatus::Idle,
            battery,
            pos: ddc_common::geo::LatLon::new(0.0, 0.0),
            at_charge: false,
            current_delivery: None,
            feas_miss: 0,
            feas_miss_set: vec![],
            freeze_until: None,
        }
    }

    #[tokio::test]
    async fn idle_drone_below_critical_moves_to_charging() {
        let kv = InMemoryKv::new();
        let settings = Settings::default();
        let drone = idle_drone("d1", settings.critical_battery - 1.0);
        kv.put(&keys::drone_key("d1"), serde_json::to_value(&drone).unwrap()).await.unwrap();
        kv.put(keys::DRONES_INDEX, serde_json::to_value(vec!["d1"]).unwrap()).await.unwrap();

        govern_charging_and_retiring(&kv, &settings).await.unwrap();

        let raw = kv.get(&keys::drone_key("d1")).await.unwrap().unwrap();
        let updated: Drone = serde_json::from_value(raw).unwrap();
        assert_eq!(updated.status, DroneStatus::Charging);
    }

    #[tokio::test]
    async fn set_drone_idle_if_busy_is_noop_when_already_moved_on() {
        let kv = InMemoryKv::new();
        let mut drone = idle_drone("d1", 100.0);
        drone.status = DroneStatus::Idle;
        drone.current_delivery = None;
        kv.put(&keys::drone_key("d1"), serde_json::to_value(&drone).unwrap()).await.unwrap();
        assert!(set_drone_idle_if_busy(&kv, "d1", "gone").await.unwrap());
    }
}
