use ddc_common::{
    bus::MessageBus,
    error::Result,
    geo::haversine_km,
    index::read_index,
    kv::{CasOutcome, KvClient},
    model::{Delivery, DeliveryStatus, Drone, Leg},
    settings::Settings,
};
use serde_json::json;

use crate::{governance::set_drone_idle_if_busy, keys};

/// Triggered by a telemetry event: advance the single delivery bound to `drone_id`, if any.
pub async fn advance_for_drone(kv: &dyn KvClient, bus: &dyn MessageBus, drone_id: &str, settings: &Settings) -> Result<()> {
    let Some(drone_raw) = kv.get(&keys::drone_key(drone_id)).await? else {
        return Ok(());
    };
    let drone: Drone = serde_json::from_value(drone_raw)?;
    let Some(delivery_id) = drone.current_delivery.clone() else {
        return Ok(());
    };
    advance_one(kv, bus, &delivery_id, &drone, settings).await
}

/// Batch over `deliveries_index`, called every tick.
pub async fn advance_deliveries(kv: &dyn KvClient, bus: &dyn MessageBus, settings: &Settings) -> Result<()> {
    for delivery_id in read_index(kv, keys::DELIVERIES_INDEX).await? {
        let Some(raw) = kv.get(&keys::delivery_key(&delivery_id)).await? else {
            continue;
        };
        let delivery: Delivery = match serde_json::from_value(raw) {
            Ok(d) => d,
            Err(_) => continue,
        };
        if delivery.status == DeliveryStatus::Delivered || delivery.status == DeliveryStatus::Pending {
            continue;
        }
        let Some(drone_id) = &delivery.drone_id else {
            continue;
        };
        let Some(drone_raw) = kv.get(&keys::drone_key(drone_id)).await? else {
            continue;
        };
        let Ok(drone) = serde_json::from_value::<Drone>(drone_raw) else {
            continue;
        };
        advance_one(kv, bus, &delivery_id, &drone, settings).await?;
    }
    Ok(())
}

async fn advance_one(kv: &dyn KvClient, bus: &dyn MessageBus, delivery_id: &str, drone: &Drone, settings: &Settings) -> Result<()> {
    let delivery_key = keys::delivery_key(delivery_id);
    let Some(raw) = kv.get(&delivery_key).await? else {
        return Ok(());
    };
    let delivery: Delivery = serde_json::from_value(raw.clone())?;

    if delivery.status == DeliveryStatus::Assigned {
        let mut next = delivery.clone();
        next.status = DeliveryStatus::InFlight;
        if kv.cas(&delivery_key, Some(raw), serde_json::to_value(&next)?).await?.is_ok() {
            log::info!("delivery {delivery_id} in_flight");
        }
        return Ok(());
    }

    if delivery.status != DeliveryStatus::InFlight {
        return Ok(());
    }

    match delivery.leg {
        Some(Leg::ToOrigin) => {
            if haversine_km(drone.pos, delivery.origin) <= settings.arrive_eps_km {
                let mut next = delivery.clone();
                next.leg = Some(Leg::ToDestination);
                let _ = kv.cas(&delivery_key, Some(raw), serde_json::to_value(&next)?).await;
            }
        }
        Some(Leg::ToDestination) => {
            if haversine_km(drone.pos, delivery.destination) <= settings.arrive_eps_km {
                let mut next = delivery.clone();
                next.status = DeliveryStatus::Delivered;
                next.leg = None;
                match kv.cas(&delivery_key, Some(raw), serde_json::to_value(&next)?).await? {
                    CasOutcome::Ok => {
                        if let Some(drone_id) = &delivery.drone_id {
                            set_drone_idle_if_busy(kv, drone_id, delivery_id).await?;
                        }
                        bus.publish(
                            "delivery_status",
                            json!({"type": "delivery_completed", "delivery_id": delivery_id, "drone_id": delivery.drone_id}),
                        )
                        .await?;
                    }
                    CasOutcome::Conflict { .. } => {}
                }
            }
        }
        None => {}
    }
    Ok(())
}
