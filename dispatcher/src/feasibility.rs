use ddc_common::{
    geo::{haversine_km, LatLon},
    model::{Drone, ZonesConfig},
    settings::Settings,
    zones::nearest_charge_point,
};

/// Whether `drone` has enough battery to fly `pos -> origin -> destination -> nearest charge
/// point from destination`, with a safety margin.
pub fn is_feasible(
    drone: &Drone,
    origin: LatLon,
    destination: LatLon,
    zones: &ZonesConfig,
    settings: &Settings,
) -> bool {
    required_battery_pct(drone, origin, destination, zones, settings) <= drone.battery
}

fn required_battery_pct(
    drone: &Drone,
    origin: LatLon,
    destination: LatLon,
    zones: &ZonesConfig,
    settings: &Settings,
) -> f64 {
    let charge_point = nearest_charge_point(zones, destination);
    let distance_km = haversine_km(drone.pos, origin)
        + haversine_km(origin, destination)
        + haversine_km(destination, charge_point);
    distance_km * settings.battery_per_km * (1.0 + settings.safety_margin_pct / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddc_common::model::{DroneStatus, DroneType, Zone, ZoneBounds};

    fn flat_zones() -> ZonesConfig {
        ZonesConfig {
            rows: 1,
            cols: 1,
            zones: vec![Zone {
                name: "z_0_0".to_string(),
                row: 0,
                col: 0,
                bounds: ZoneBounds {
                    lat_min: 0.0,
                    lat_max: 1.0,
                    lon_min: 0.0,
                    lon_max: 1.0,
                },
                charge: LatLon::new(0.5, 0.5),
                neighbors: vec![],
            }],
        }
    }

    fn drone_at(pos: LatLon, battery: f64) -> Drone {
        Drone {
            id: "d1".to_string(),
            kind: DroneType::Light,
            speed: 0.4,
            status: DroneStatus::Idle,
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
    fn plenty_of_battery_is_feasible() {
        let settings = Settings::default();
        let zones = flat_zones();
        let drone = drone_at(LatLon::new(0.1, 0.1), 100.0);
        assert!(is_feasible(&drone, LatLon::new(0.2, 0.2), LatLon::new(0.3, 0.3), &zones, &settings));
    }

    #[test]
    fn near_empty_battery_is_infeasible() {
        let settings = Settings::default();
        let zones = flat_zones();
        let drone = drone_at(LatLon::new(0.1, 0.1), 0.5);
        assert!(!is_feasible(&drone, LatLon::new(0.2, 0.2), LatLon::new(0.9, 0.9), &zones, &settings));
    }
}
