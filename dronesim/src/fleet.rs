use ddc_common::{
    error::Result,
    geo::LatLon,
    index::{read_index, register_index_entry},
    kv::{CasOutcome, KvClient},
    model::{Drone, DroneStatus, DroneType, ZonesConfig},
    settings::Settings,
};

const CLASSES: [DroneType; 3] = [DroneType::Light, DroneType::Medium, DroneType::Heavy];

/// Idempotent pool bootstrap: one full `DRONE_POOL_MAX` roster per weight class, born
/// `inactive`, parked at each zone's charge point round-robin. Sized per class (rather than
/// split across classes) so the autoscaler can size any single class up to its own target
/// even under a backlog concentrated in one weight bucket — see the corresponding note in
/// DESIGN.md.
pub async fn ensure_fleet(kv: &dyn KvClient, zones: &ZonesConfig, settings: &Settings) -> Result<Vec<String>> {
    let mut existing = read_index(kv, crate::keys::DRONES_INDEX).await?;
    if existing.len() as u32 >= settings.drone_pool_max * CLASSES.len() as u32 {
        return Ok(existing);
    }

    let charge_points: Vec<LatLon> = if zones.zones.is_empty() {
        vec![LatLon::new(0.0, 0.0)]
    } else {
        zones.zones.iter().map(|z| z.charge).collect()
    };

    for class in CLASSES {
        for n in 0..settings.drone_pool_max {
            let id = format!("{}-{n}", class_prefix(class));
            if existing.iter().any(|e| e == &id) {
                continue;
            }
            let pos = charge_points[(n as usize) % charge_points.len()];
            let drone = Drone {
                id: id.clone(),
                kind: class,
                speed: class.base_speed(),
                status: DroneStatus::Inactive,
                battery: 100.0,
                pos,
                at_charge: true,
                current_delivery: None,
                feas_miss: 0,
                feas_miss_set: vec![],
                freeze_until: None,
            };
            let key = crate::keys::drone_key(&id);
            if kv.get(&key).await?.is_none() {
                match kv.cas(&key, None, serde_json::to_value(&drone)?).await? {
                    CasOutcome::Ok => {}
                    CasOutcome::Conflict { .. } => {}
                }
            }
            register_index_entry(kv, crate::keys::DRONES_INDEX, &id).await?;
            existing.push(id);
        }
    }

    read_index(kv, crate::keys::DRONES_INDEX).await
}

fn class_prefix(class: DroneType) -> &'static str {
    match class {
        DroneType::Light => "light",
        DroneType::Medium => "medium",
        DroneType::Heavy => "heavy",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddc_common::{kv::InMemoryKv, model::{Zone, ZoneBounds}};

    fn flat_zones() -> ZonesConfig {
        ZonesConfig {
            rows: 1,
            cols: 1,
            zones: vec![Zone {
                name: "z_0_0".to_string(),
                row: 0,
                col: 0,
                bounds: ZoneBounds { lat_min: 0.0, lat_max: 1.0, lon_min: 0.0, lon_max: 1.0 },
                charge: LatLon::new(0.5, 0.5),
                neighbors: vec![],
            }],
        }
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent_and_covers_every_class() {
        let kv = InMemoryKv::new();
        let zones = flat_zones();
        let mut settings = Settings::default();
        settings.drone_pool_max = 2;

        let first = ensure_fleet(&kv, &zones, &settings).await.unwrap();
        let second = ensure_fleet(&kv, &zones, &settings).await.unwrap();
        assert_eq!(first.len(), second.len());
        assert_eq!(first.len(), 6);
        assert!(first.iter().any(|id| id.starts_with("light-")));
        assert!(first.iter().any(|id| id.starts_with("medium-")));
        assert!(first.iter().any(|id| id.starts_with("heavy-")));
    }
}
