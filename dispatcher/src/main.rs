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
    let settings = Arc::new(Settings::load()?);

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
        "dispatcher starting: kv={}, tick={}ms, zones={}x{}",
        settings.kv_url,
        settings.assigner_tick_ms,
        zones.rows,
        zones.cols
    );

    dispatcher::run(kv, bus, Arc::new(zones), settings).await;
    Ok(())
}
