pub const DELIVERIES_INDEX: &str = "deliveries_index";
pub const DRONES_INDEX: &str = "drones_index";

pub fn delivery_key(id: &str) -> String {
    format!("delivery:{id}")
}

pub fn drone_key(id: &str) -> String {
    format!("drone:{id}")
}

pub fn delivery_lock(id: &str) -> String {
    delivery_key(id)
}

pub fn drone_lock(id: &str) -> String {
    drone_key(id)
}
