pub const DRONES_INDEX: &str = "drones_index";

pub fn drone_key(id: &str) -> String {
    format!("drone:{id}")
}

pub fn delivery_key(id: &str) -> String {
    format!("delivery:{id}")
}
