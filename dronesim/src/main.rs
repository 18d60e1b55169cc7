use std::sync::Arc;

use ddc_common::{
    bus::{shared_in_process_bus, MessageBus},
    kv::{HttpKv, KvClient},
    settings::Settings,
    zones::{ensure_zones_config, GridBounds},
};

#[tokio::main]
async fn main() -> ddc_common::error::Result<()> {
    ddc_common::logging::init();
    let settings = Arc::new(Settings::load_sim()?);

    let kv: Arc<dyn KvClient> = Arc::new(HttpKv::new(settings.kv_url.clone()));
    let bus: Arc<dyn MessageBus> = shared_in_process_bus();

    let zones = ensure_zones_config(
        kv.as_ref(),
        2,
        2,
        GridBounds {
            lat_min: 41.80,
            lat_max: 42.00,
            lon_min: 12.40,
            lon_max: 12.60,
        },
    )
    .await?;

    log::info!(
        "dronesim starting: kv={}, tick={}s, pool_max={} per class",
        settings.kv_url,
        settings.drone_tick_sec,
        settings.drone_pool_max
    );

    dronesim::run(kv, bus, Arc::new(zones), settings).await
}
