use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The last-write-wins envelope every value is stored under. The coordinator applies the
/// timestamp; backends treat the whole thing as an opaque JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wrapped {
    #[serde(rename = "_ts")]
    pub ts: f64,
    pub data: Value,
}

pub fn wrap(value: Value, ts: f64) -> Wrapped {
    Wrapped { ts, data: value }
}

/// Normalizes a possibly-unwrapped stored value into `(ts, data)`, defaulting to `ts=0.0` for
/// legacy unwrapped values so they always lose an LWW comparison.
pub fn unwrap(stored: &Value) -> (f64, Value) {
    if let Some(obj) = stored.as_object() {
        if let (Some(ts), Some(data)) = (obj.get("_ts"), obj.get("data")) {
            if let Some(ts) = ts.as_f64() {
                return (ts, data.clone());
            }
        }
    }
    (0.0, stored.clone())
}

pub fn now_ts() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwrap_passes_through_wrapped_values() {
        let v = json!({"_ts": 12.5, "data": {"x": 1}});
        let (ts, data) = unwrap(&v);
        assert_eq!(ts, 12.5);
        assert_eq!(data, json!({"x": 1}));
    }

    #[test]
    fn unwrap_defaults_legacy_values_to_zero_timestamp() {
        let v = json!({"x": 1});
        let (ts, data) = unwrap(&v);
        assert_eq!(ts, 0.0);
        assert_eq!(data, v);
    }
}
