use ddc_common::{
    geo::{close_enough, haversine_km, step_toward, LatLon},
    model::{Delivery, Drone, DroneStatus, Leg},
    settings::Settings,
    zones::nearest_charge_point,
};

/// Result of one tick's motion computation; only these three fields are ever mutated by the
/// simulator — `status`, `current_delivery`, `type`, `speed` are never touched.
pub struct Motion {
    pub pos: LatLon,
    pub battery: f64,
    pub at_charge: bool,
}

/// Computes the new `pos`/`battery`/`at_charge` for one tick. `charge_point` is precomputed by
/// the caller so this function stays free of the zones lookup and is easy to unit test.
pub fn compute_motion(drone: &Drone, delivery: Option<&Delivery>, charge_point: LatLon, settings: &Settings) -> Motion {
    match drone.status {
        DroneStatus::Busy => {
            let Some(delivery) = delivery else {
                return Motion { pos: drone.pos, battery: drone.battery, at_charge: drone.at_charge };
            };
            let target = match delivery.leg {
                Some(Leg::ToOrigin) | None => delivery.origin,
                Some(Leg::ToDestination) => delivery.destination,
            };
            move_toward(drone, target, settings)
        }
        DroneStatus::Charging | DroneStatus::Retiring => {
            if close_enough(drone.pos, charge_point, settings.arrive_eps_km) {
                Motion {
                    pos: drone.pos,
                    battery: (drone.battery + settings.charge_per_tick).min(100.0),
                    at_charge: true,
                }
            } else {
                move_toward(drone, charge_point, settings)
            }
        }
        DroneStatus::Idle | DroneStatus::Inactive => {
            Motion { pos: drone.pos, battery: drone.battery, at_charge: drone.at_charge }
        }
    }
}

fn move_toward(drone: &Drone, target: LatLon, settings: &Settings) -> Motion {
    let next_pos = step_toward(drone.pos, target, drone.speed);
    let drained = haversine_km(drone.pos, next_pos) * settings.battery_per_km;
    Motion {
        pos: next_pos,
        battery: (drone.battery - drained).max(0.0),
        at_charge: false,
    }
}

/// Convenience used by the per-drone task: resolves the nearest charge point only when it's
/// actually needed for this tick's motion (busy drones never look it up).
pub fn charge_point_for(drone: &Drone, zones: &ddc_common::model::ZonesConfig) -> LatLon {
    nearest_charge_point(zones, drone.pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddc_common::model::DroneType;

    fn idle_drone(pos: LatLon, status: DroneStatus, battery: f64) -> Drone {
        Drone {
            id: "d1".to_string(),
            kind: DroneType::Light,
            speed: 0.5,
            status,
            battery,
            pos,
            at_charge: false,
            current_delivery: None,
            feas_miss: 0,
            feas_miss_set: vec![],
            freeze_until: None,
        }
    }

    #[test]
    fn busy_drone_steps_toward_origin_leg_and_drains_battery() {
        let settings = Settings::default();
        let drone = idle_drone(LatLon::new(0.0, 0.0), DroneStatus::Busy, 100.0);
        let delivery = Delivery {
            id: "x".to_string(),
            origin: LatLon::new(1.0, 0.0),
            destination: LatLon::new(2.0, 0.0),
            weight: 1.0,
            status: ddc_common::model::DeliveryStatus::InFlight,
            drone_id: Some("d1".to_string()),
            leg: Some(Leg::ToOrigin),
            origin_zone: None,
            destination_zone: None,
            timestamp: 0.0,
        };
        let motion = compute_motion(&drone, Some(&delivery), LatLon::new(0.0, 0.0), &settings);
        assert!(motion.pos.lat > 0.0 && motion.pos.lat < 1.0);
        assert!(motion.battery < 100.0);
        assert!(!motion.at_charge);
    }

    #[test]
    fn charging_drone_recharges_once_close_to_charge_point() {
        let settings = Settings::default();
        let charge_point = LatLon::new(0.0, 0.0);
        let drone = idle_drone(charge_point, DroneStatus::Charging, 50.0);
        let motion = compute_motion(&drone, None, charge_point, &settings);
        assert!(motion.at_charge);
        assert_eq!(motion.battery, 50.0 + settings.charge_per_tick);
    }

    #[test]
    fn idle_drone_never_moves() {
        let settings = Settings::default();
        let drone = idle_drone(LatLon::new(3.0, 3.0), DroneStatus::Idle, 80.0);
        let motion = compute_motion(&drone, None, LatLon::new(0.0, 0.0), &settings);
        assert_eq!(motion.pos, drone.pos);
        assert_eq!(motion.battery, drone.battery);
    }
}
