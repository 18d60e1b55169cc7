use std::collections::HashMap;

use ddc_common::{
    error::Result,
    index::read_index,
    kv::{CasOutcome, KvClient},
    model::{Delivery, DeliveryStatus, Drone, DroneStatus, DroneType},
    settings::Settings,
};

use crate::keys;

const CLASSES: [DroneType; 3] = [DroneType::Light, DroneType::Medium, DroneType::Heavy];

/// Activates/retires drones per weight class to track backlog-proportional fleet sizing.
/// Every state change still goes through CAS, so correctness never depends on the
/// caller having serialized this against other callers.
pub async fn autoscale(kv: &dyn KvClient, settings: &Settings) -> Result<()> {
    let backlog = backlog_by_class(kv).await?;
    let total_backlog: u32 = backlog.values().sum();

    let target_total = if total_backlog == 0 {
        settings.base_active
    } else {
        ((total_backlog as f64 * settings.scale_ratio).ceil() as u32).clamp(settings.base_active, settings.drone_pool_max)
    };
    let targets = distribute_targets(target_total, &backlog, total_backlog, settings.base_active);

    let drones = load_drones(kv).await?;

    for class in CLASSES {
        let target = *targets.get(&class).unwrap_or(&0);
        let class_drones: Vec<&Drone> = drones.iter().filter(|d| d.kind == class).collect();
        let active = class_drones
            .iter()
            .filter(|d| matches!(d.status, DroneStatus::Idle | DroneStatus::Busy | DroneStatus::Charging))
            .count() as u32;

        if active < target {
            let mut deficit = target - active;
            for drone in class_drones.iter().filter(|d| d.status == DroneStatus::Inactive) {
                if deficit == 0 {
                    break;
                }
                if activate(kv, &drone.id).await? {
                    deficit -= 1;
                }
            }
        } else if active > target {
            let mut surplus = active - target;
            for drone in class_drones.iter().filter(|d| is_safe_to_retire(d)) {
                if surplus == 0 {
                    break;
                }
                if retire(kv, &drone.id).await? {
                    surplus -= 1;
                }
            }
        }
    }
    Ok(())
}

fn is_safe_to_retire(d: &Drone) -> bool {
    matches!(d.status, DroneStatus::Idle | DroneStatus::Charging) && d.current_delivery.is_none()
}

async fn backlog_by_class(kv: &dyn KvClient) -> Result<HashMap<DroneType, u32>> {
    let mut backlog = HashMap::new();
    for delivery_id in read_index(kv, keys::DELIVERIES_INDEX).await? {
        let Some(raw) = kv.get(&keys::delivery_key(&delivery_id)).await? else {
            continue;
        };
        let Ok(delivery) = serde_json::from_value::<Delivery>(raw) else {
            continue;
        };
        if delivery.status == DeliveryStatus::Pending {
            *backlog.entry(DroneType::for_weight(delivery.weight)).or_insert(0) += 1;
        }
    }
    Ok(backlog)
}

async fn load_drones(kv: &dyn KvClient) -> Result<Vec<Drone>> {
    let mut drones = Vec::new();
    for drone_id in read_index(kv, keys::DRONES_INDEX).await? {
        if let Some(raw) = kv.get(&keys::drone_key(&drone_id)).await? {
            if let Ok(drone) = serde_json::from_value::<Drone>(raw) {
                drones.push(drone);
            }
        }
    }
    Ok(drones)
}

/// When backlog is zero, `base_active` is split evenly across the three classes, remainder
/// biased light, then medium, then heavy. Otherwise the total is distributed proportionally
/// to each class's backlog share and rounded, with any rounding drift absorbed by the class
/// carrying the largest backlog.
fn distribute_targets(
    target_total: u32,
    backlog: &HashMap<DroneType, u32>,
    total_backlog: u32,
    base_active: u32,
) -> HashMap<DroneType, u32> {
    let mut out = HashMap::new();
    if total_backlog == 0 {
        let base = base_active / 3;
        let remainder = base_active % 3;
        let mut shares = [base, base, base];
        for share in shares.iter_mut().take(remainder as usize) {
            *share += 1;
        }
        for (class, value) in CLASSES.into_iter().zip(shares) {
            out.insert(class, value);
        }
        return out;
    }

    let mut shares: Vec<(DroneType, u32)> = Vec::new();
    let mut assigned = 0u32;
    for class in CLASSES {
        let class_backlog = *backlog.get(&class).unwrap_or(&0);
        let portion = ((class_backlog as f64 / total_backlog as f64) * target_total as f64).round() as u32;
        assigned += portion;
        shares.push((class, portion));
    }

    let drift = target_total as i64 - assigned as i64;
    if drift != 0 {
        if let Some(idx) = shares
            .iter()
            .enumerate()
            .max_by_key(|(_, (class, _))| *backlog.get(class).unwrap_or(&0))
            .map(|(idx, _)| idx)
        {
            shares[idx].1 = (shares[idx].1 as i64 + drift).max(0) as u32;
        }
    }

    for (class, value) in shares {
        out.insert(class, value);
    }
    out
}

async fn activate(kv: &dyn KvClient, drone_id: &str) -> Result<bool> {
    let key = keys::drone_key(drone_id);
    let Some(current_raw) = kv.get(&key).await? else {
        return Ok(false);
    };
    let Ok(current) = serde_json::from_value::<Drone>(current_raw.clone()) else {
        return Ok(false);
    };
    if current.status != DroneStatus::Inactive {
        return Ok(false);
    }
    let mut next = current;
    next.status = DroneStatus::Idle;
    Ok(matches!(
        kv.cas(&key, Some(current_raw), serde_json::to_value(&next)?).await?,
        CasOutcome::Ok
    ))
}

async fn retire(kv: &dyn KvClient, drone_id: &str) -> Result<bool> {
    let key = keys::drone_key(drone_id);
    let Some(current_raw) = kv.get(&key).await? else {
        return Ok(false);
    };
    let Ok(current) = serde_json::from_value::<Drone>(current_raw.clone()) else {
        return Ok(false);
    };
    if !is_safe_to_retire(&current) {
        return Ok(false);
    }
    let mut next = current;
    next.status = DroneStatus::Retiring;
    Ok(matches!(
        kv.cas(&key, Some(current_raw), serde_json::to_value(&next)?).await?,
        CasOutcome::Ok
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_biases_remainder_light_then_medium() {
        let targets = distribute_targets(4, &HashMap::new(), 0, 4);
        assert_eq!(targets[&DroneType::Light], 2);
        assert_eq!(targets[&DroneType::Medium], 1);
        assert_eq!(targets[&DroneType::Heavy], 1);
    }

    #[test]
    fn proportional_split_sums_to_target() {
        let mut backlog = HashMap::new();
        backlog.insert(DroneType::Light, 15);
        backlog.insert(DroneType::Medium, 4);
        backlog.insert(DroneType::Heavy, 1);
        let targets = distribute_targets(16, &backlog, 20, 4);
        let total: u32 = targets.values().sum();
        assert_eq!(total, 16);
    }
}
