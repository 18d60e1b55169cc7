use ddc_common::{
    bus::MessageBus,
    error::Result,
    geo::{haversine_km, LatLon},
    index::read_index,
    kv::{with_lock, CasOutcome, KvClient},
    model::{Delivery, DeliveryStatus, Drone, DroneStatus, DroneType, Leg, ZonesConfig},
    settings::Settings,
};
use serde_json::json;

use crate::{
    feasibility::is_feasible,
    governance::{set_drone_busy_if_idle, set_drone_idle_if_busy},
    keys,
};

const LOCK_TTL_SEC: u64 = 20;

/// Attempt to move `delivery_id` from `pending` to `assigned`, pairing it with an eligible
/// drone. Never blocks beyond its own I/O; failures just leave the delivery pending for the
/// next round.
pub async fn assign_one(
    kv: &dyn KvClient,
    bus: &dyn MessageBus,
    delivery_id: &str,
    zones: &ZonesConfig,
    settings: &Settings,
) -> Result<bool> {
    let delivery_lock_key = keys::delivery_lock(delivery_id);
    let ran = with_lock(kv, &delivery_lock_key, LOCK_TTL_SEC, || {
        assign_one_locked(kv, bus, delivery_id, zones, settings)
    })
    .await?;
    Ok(ran.unwrap_or(false))
}

async fn assign_one_locked(
    kv: &dyn KvClient,
    bus: &dyn MessageBus,
    delivery_id: &str,
    zones: &ZonesConfig,
    settings: &Settings,
) -> Result<bool> {
    let delivery_key = keys::delivery_key(delivery_id);
    let Some(raw) = kv.get(&delivery_key).await? else {
        return Ok(false);
    };
    let delivery: Delivery = serde_json::from_value(raw.clone())?;
    if delivery.status != DeliveryStatus::Pending {
        return Ok(false);
    }

    let Some(drone_id) = pick_drone(
        kv,
        delivery.origin,
        delivery.destination,
        delivery.weight,
        delivery_id,
        zones,
        settings,
    )
    .await?
    else {
        return Ok(false);
    };

    let drone_lock_key = keys::drone_lock(&drone_id);
    let ran = with_lock(kv, &drone_lock_key, LOCK_TTL_SEC, || {
        try_pair(kv, bus, delivery_id, &delivery, raw, &drone_id, zones, settings)
    })
    .await?;
    Ok(ran.unwrap_or(false))
}

async fn try_pair(
    kv: &dyn KvClient,
    bus: &dyn MessageBus,
    delivery_id: &str,
    delivery: &Delivery,
    delivery_raw: serde_json::Value,
    drone_id: &str,
    zones: &ZonesConfig,
    settings: &Settings,
) -> Result<bool> {
    let drone_key = keys::drone_key(drone_id);
    let Some(drone_raw) = kv.get(&drone_key).await? else {
        return Ok(false);
    };
    let mut drone: Drone = serde_json::from_value(drone_raw)?;
    if drone.status != DroneStatus::Idle || drone.current_delivery.is_some() {
        return Ok(false);
    }
    if drone.battery <= settings.critical_battery || !is_feasible(&drone, delivery.origin, delivery.destination, zones, settings) {
        record_feasibility_miss(kv, &mut drone, delivery_id, settings).await?;
        return Ok(false);
    }
    reset_feasibility(kv, &mut drone).await?;

    if !set_drone_busy_if_idle(kv, drone_id, delivery_id).await? {
        return Ok(false);
    }

    let mut next_delivery = delivery.clone();
    next_delivery.status = DeliveryStatus::Assigned;
    next_delivery.drone_id = Some(drone_id.to_string());
    next_delivery.leg = Some(Leg::ToOrigin);

    match kv
        .cas(
            &keys::delivery_key(delivery_id),
            Some(delivery_raw),
            serde_json::to_value(&next_delivery)?,
        )
        .await?
    {
        CasOutcome::Ok => {}
        CasOutcome::Conflict { .. } => {
            if !set_drone_idle_if_busy(kv, drone_id, delivery_id).await? {
                log::warn!("assign_one: failed to roll back drone {drone_id} after losing delivery {delivery_id} CAS race");
            }
            return Ok(false);
        }
    }

    bus.publish(
        "delivery_status",
        json!({"type": "delivery_assigned", "delivery_id": delivery_id, "drone_id": drone_id}),
    )
    .await?;
    Ok(true)
}

/// Ranking key; smaller sorts first. Distance bucket, zone proximity, battery ascending, -speed.
fn rank_key(drone: &Drone, origin: LatLon, zones: &ZonesConfig, near_eps_km: f64) -> (i64, u8, i64, i64) {
    let dist = haversine_km(drone.pos, origin);
    let bucket = (dist / near_eps_km.max(1e-9)).floor() as i64;
    let origin_zone = zones.zone_for(origin).map(|z| z.name.clone());
    let drone_zone = zones.zone_for(drone.pos).map(|z| z.name.clone());
    let zone_rank: u8 = match (&origin_zone, &drone_zone) {
        (Some(o), Some(d)) if o == d => 0,
        (Some(o), Some(d)) if zones.are_neighbors(o, d) => 1,
        _ => 2,
    };
    let battery_key = (drone.battery * 1000.0).round() as i64;
    let speed_key = -((drone.speed * 1000.0).round() as i64);
    (bucket, zone_rank, battery_key, speed_key)
}

/// Filters the known fleet down to eligible candidates and returns the best ranked pick, if
/// any. Side effects (feasibility-miss bookkeeping, pushing low-battery drones to `charging`)
/// happen even for drones that don't end up picked.
pub async fn pick_drone(
    kv: &dyn KvClient,
    origin: LatLon,
    destination: LatLon,
    weight: f64,
    delivery_id: &str,
    zones: &ZonesConfig,
    settings: &Settings,
) -> Result<Option<String>> {
    let class = DroneType::for_weight(weight);
    let ids = read_index(kv, keys::DRONES_INDEX).await?;

    let mut eligible: Vec<Drone> = Vec::new();
    for id in ids {
        let Some(raw) = kv.get(&keys::drone_key(&id)).await? else {
            continue;
        };
        let Ok(mut drone) = serde_json::from_value::<Drone>(raw) else {
            continue;
        };
        if drone.status != DroneStatus::Idle || drone.current_delivery.is_some() {
            continue;
        }
        if drone.kind != class {
            continue;
        }
        if drone.battery <= settings.critical_battery {
            push_to_charging(kv, &drone).await?;
            continue;
        }
        if !is_feasible(&drone, origin, destination, zones, settings) {
            record_feasibility_miss(kv, &mut drone, delivery_id, settings).await?;
            continue;
        }
        reset_feasibility(kv, &mut drone).await?;
        eligible.push(drone);
    }

    eligible.sort_by_key(|d| rank_key(d, origin, zones, settings.near_eps_km));

    for drone in eligible {
        if haversine_km(drone.pos, origin) > settings.max_pickup_km {
            continue;
        }
        return Ok(Some(drone.id));
    }
    Ok(None)
}

async fn push_to_charging(kv: &dyn KvClient, drone: &Drone) -> Result<()> {
    let key = keys::drone_key(&drone.id);
    if let Some(current_raw) = kv.get(&key).await? {
        if let Ok(current) = serde_json::from_value::<Drone>(current_raw.clone()) {
            if current.status == DroneStatus::Idle {
                let mut next = current;
                next.status = DroneStatus::Charging;
                let _ = kv.cas(&key, Some(current_raw), serde_json::to_value(&next)?).await;
            }
        }
    }
    Ok(())
}

async fn record_feasibility_miss(kv: &dyn KvClient, drone: &mut Drone, delivery_id: &str, settings: &Settings) -> Result<()> {
    let key = keys::drone_key(&drone.id);
    if let Some(current_raw) = kv.get(&key).await? {
        if let Ok(mut current) = serde_json::from_value::<Drone>(current_raw.clone()) {
            if !current.record_feas_miss(delivery_id) {
                return Ok(());
            }
            if current.feas_miss >= settings.early_charge_threshold {
                current.status = DroneStatus::Charging;
                current.reset_feas_miss();
            }
            let _ = kv.cas(&key, Some(current_raw), serde_json::to_value(&current)?).await;
            *drone = current;
        }
    }
    Ok(())
}

/// One periodic-scheduler assignment pass: the oldest `PENDING_SCAN_LIMIT` pending deliveries,
/// up to `MAX_ASSIGN_PER_ROUND` successful assignments.
pub async fn assign_round(kv: &dyn KvClient, bus: &dyn MessageBus, zones: &ZonesConfig, settings: &Settings) -> Result<()> {
    let mut pending: Vec<(String, f64)> = Vec::new();
    for id in read_index(kv, keys::DELIVERIES_INDEX).await? {
        if let Some(raw) = kv.get(&keys::delivery_key(&id)).await? {
            if let Ok(delivery) = serde_json::from_value::<Delivery>(raw) {
                if delivery.status == DeliveryStatus::Pending {
                    pending.push((id, delivery.timestamp));
                }
            }
        }
    }
    pending.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    pending.truncate(settings.pending_scan_limit);

    let mut assigned = 0usize;
    for (delivery_id, _) in pending {
        if assigned >= settings.max_assign_per_round {
            break;
        }
        match assign_one(kv, bus, &delivery_id, zones, settings).await {
            Ok(true) => assigned += 1,
            Ok(false) => {}
            Err(e) => log::warn!("assign_round: assign_one({delivery_id}) failed: {e}"),
        }
    }
    Ok(())
}

async fn reset_feasibility(kv: &dyn KvClient, drone: &mut Drone) -> Result<()> {
    if drone.feas_miss == 0 && drone.feas_miss_set.is_empty() {
        return Ok(());
    }
    let key = keys::drone_key(&drone.id);
    if let Some(current_raw) = kv.get(&key).await? {
        if let Ok(mut current) = serde_json::from_value::<Drone>(current_raw.clone()) {
            current.reset_feas_miss();
            let _ = kv.cas(&key, Some(current_raw), serde_json::to_value(&current)?).await;
            *drone = current;
        }
    }
    Ok(())
}
