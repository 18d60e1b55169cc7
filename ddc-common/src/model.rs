use serde::{Deserialize, Serialize};

use crate::geo::LatLon;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Assigned,
    InFlight,
    Delivered,
}

impl DeliveryStatus {
    /// Position in the monotone lattice `pending < assigned < in_flight < delivered`.
    pub fn rank(self) -> u8 {
        match self {
            DeliveryStatus::Pending => 0,
            DeliveryStatus::Assigned => 1,
            DeliveryStatus::InFlight => 2,
            DeliveryStatus::Delivered => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    ToOrigin,
    ToDestination,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneType {
    Light,
    Medium,
    Heavy,
}

impl DroneType {
    /// `light <= 3kg, medium <= 7kg, else heavy`.
    pub fn for_weight(weight_kg: f64) -> Self {
        if weight_kg <= 3.0 {
            DroneType::Light
        } else if weight_kg <= 7.0 {
            DroneType::Medium
        } else {
            DroneType::Heavy
        }
    }

    /// Base fractional-interpolation speed used when the simulator spawns a fresh drone of
    /// this type.
    pub fn base_speed(self) -> f64 {
        match self {
            DroneType::Light => 0.40,
            DroneType::Medium => 0.25,
            DroneType::Heavy => 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DroneStatus {
    Inactive,
    Idle,
    Busy,
    Charging,
    Retiring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub origin: LatLon,
    pub destination: LatLon,
    pub weight: f64,
    pub status: DeliveryStatus,
    pub drone_id: Option<String>,
    pub leg: Option<Leg>,
    pub origin_zone: Option<String>,
    pub destination_zone: Option<String>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drone {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DroneType,
    pub speed: f64,
    pub status: DroneStatus,
    pub battery: f64,
    pub pos: LatLon,
    pub at_charge: bool,
    pub current_delivery: Option<String>,
    #[serde(default)]
    pub feas_miss: u32,
    #[serde(default)]
    pub feas_miss_set: Vec<String>,
    #[serde(default)]
    pub freeze_until: Option<f64>,
}

impl Drone {
    /// Records a feasibility miss against `delivery_id`, counting each delivery only once.
    /// Returns true if the counter actually advanced.
    pub fn record_feas_miss(&mut self, delivery_id: &str) -> bool {
        if self.feas_miss_set.iter().any(|d| d == delivery_id) {
            return false;
        }
        self.feas_miss_set.push(delivery_id.to_string());
        self.feas_miss_set.sort();
        self.feas_miss_set.dedup();
        self.feas_miss += 1;
        true
    }

    pub fn reset_feas_miss(&mut self) {
        self.feas_miss = 0;
        self.feas_miss_set.clear();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub row: u32,
    pub col: u32,
    pub bounds: ZoneBounds,
    pub charge: LatLon,
    pub neighbors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZonesConfig {
    pub rows: u32,
    pub cols: u32,
    pub zones: Vec<Zone>,
}

impl ZonesConfig {
    pub fn zone_for(&self, point: LatLon) -> Option<&Zone> {
        self.zones.iter().find(|z| {
            point.lat >= z.bounds.lat_min
                && point.lat <= z.bounds.lat_max
                && point.lon >= z.bounds.lon_min
                && point.lon <= z.bounds.lon_max
        })
    }

    pub fn are_neighbors(&self, a: &str, b: &str) -> bool {
        self.zones
            .iter()
            .find(|z| z.name == a)
            .map(|z| z.neighbors.iter().any(|n| n == b))
            .unwrap_or(false)
    }
}
