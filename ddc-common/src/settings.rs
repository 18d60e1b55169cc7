use serde::Deserialize;

use crate::error::Result;

/// Environment-configurable tunables shared by whichever binaries need them. Each binary loads
/// only the fields it cares about, but all defaults live here so every tunable has one home.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub assigner_tick_ms: u64,
    pub pending_scan_limit: usize,
    pub max_assign_per_round: usize,
    pub battery_per_km: f64,
    pub safety_margin_pct: f64,
    pub near_eps_km: f64,
    pub max_pickup_km: f64,
    pub arrive_eps_km: f64,
    pub critical_battery: f64,
    pub full_after: f64,
    pub early_charge_threshold: u32,
    pub drone_pool_max: u32,
    pub base_active: u32,
    pub scale_ratio: f64,
    pub charge_per_tick: f64,
    pub drone_tick_sec: f64,
    pub rf: usize,
    pub hint_flush_sec: u64,

    pub kv_url: String,
    pub backends: String,
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub cache_capacity: usize,
    pub cache_max_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            assigner_tick_ms: 200,
            pending_scan_limit: 500,
            max_assign_per_round: 100,
            battery_per_km: 2.0,
            safety_margin_pct: 5.0,
            near_eps_km: 0.2,
            max_pickup_km: 20.0,
            arrive_eps_km: 0.02,
            critical_battery: 30.0,
            full_after: 95.0,
            early_charge_threshold: 5,
            drone_pool_max: 20,
            base_active: 4,
            scale_ratio: 0.8,
            charge_per_tick: 5.0,
            drone_tick_sec: 0.05,
            rf: 2,
            hint_flush_sec: 2,
            kv_url: "http://127.0.0.1:9000".to_string(),
            backends: "http://127.0.0.1:9001,http://127.0.0.1:9002".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            db_path: "kvstore.sqlite3".to_string(),
            cache_capacity: 10_000,
            cache_max_bytes: 64 * 1024 * 1024,
        }
    }
}

impl Settings {
    /// Layers process environment variables (e.g. `ASSIGNER_TICK_MS`) over the defaults above.
    /// The dispatcher's feasibility check is pessimistic relative to the simulator's actual
    /// drain rate, so each binary supplies its own `battery_per_km` default; see `load_sim` for
    /// the simulator's.
    pub fn load() -> Result<Self> {
        Self::build(Settings::default().battery_per_km)
    }

    /// Same as `load`, but with the drone simulator's actual-drain default for `battery_per_km`
    /// instead of the dispatcher's planning-margin default.
    pub fn load_sim() -> Result<Self> {
        Self::build(1.2)
    }

    fn build(battery_per_km_default: f64) -> Result<Self> {
        let defaults = Settings::default();
        let builder = config::Config::builder()
            .set_default("assigner_tick_ms", defaults.assigner_tick_ms)?
            .set_default("pending_scan_limit", defaults.pending_scan_limit as i64)?
            .set_default("max_assign_per_round", defaults.max_assign_per_round as i64)?
            .set_default("battery_per_km", battery_per_km_default)?
            .set_default("safety_margin_pct", defaults.safety_margin_pct)?
            .set_default("near_eps_km", defaults.near_eps_km)?
            .set_default("max_pickup_km", defaults.max_pickup_km)?
            .set_default("arrive_eps_km", defaults.arrive_eps_km)?
            .set_default("critical_battery", defaults.critical_battery)?
            .set_default("full_after", defaults.full_after)?
            .set_default("early_charge_threshold", defaults.early_charge_threshold as i64)?
            .set_default("drone_pool_max", defaults.drone_pool_max as i64)?
            .set_default("base_active", defaults.base_active as i64)?
            .set_default("scale_ratio", defaults.scale_ratio)?
            .set_default("charge_per_tick", defaults.charge_per_tick)?
            .set_default("drone_tick_sec", defaults.drone_tick_sec)?
            .set_default("rf", defaults.rf as i64)?
            .set_default("hint_flush_sec", defaults.hint_flush_sec)?
            .set_default("kv_url", defaults.kv_url.clone())?
            .set_default("backends", defaults.backends.clone())?
            .set_default("host", defaults.host.clone())?
            .set_default("port", defaults.port as i64)?
            .set_default("db_path", defaults.db_path.clone())?
            .set_default("cache_capacity", defaults.cache_capacity as i64)?
            .set_default("cache_max_bytes", defaults.cache_max_bytes as i64)?
            .add_source(config::Environment::default().try_parsing(true));

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn backend_urls(&self) -> Vec<String> {
        self.backends
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let s = Settings::default();
        assert_eq!(s.assigner_tick_ms, 200);
        assert_eq!(s.pending_scan_limit, 500);
        assert_eq!(s.max_assign_per_round, 100);
        assert_eq!(s.battery_per_km, 2.0);
        assert_eq!(s.rf, 2);
        assert_eq!(s.early_charge_threshold, 5);
    }
}
