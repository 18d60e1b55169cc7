use std::{sync::Arc, time::Duration};

use ddc_common::{
    bus::{shared_in_process_bus, MessageBus},
    geo::LatLon,
    index::register_index_entry,
    kv::{InMemoryKv, KvClient},
    model::{Delivery, DeliveryStatus},
    settings::Settings,
    zones::{ensure_zones_config, GridBounds},
};

/// Wires dispatcher and the drone simulator together over a single in-process bus/KV, standing
/// in for the real deployment's separate processes wired over HTTP + a broker. Exercises the
/// happy path: a pending delivery gets assigned to an activated drone and advances through to
/// `delivered`.
#[tokio::test(flavor = "multi_thread")]
async fn happy_path_delivery_completes() {
    let kv: Arc<dyn KvClient> = Arc::new(InMemoryKv::new());
    let bus: Arc<dyn MessageBus> = shared_in_process_bus();

    let zones = Arc::new(
        ensure_zones_config(
            kv.as_ref(),
            1,
            1,
            GridBounds {
                lat_min: 0.0,
                lat_max: 0.1,
                lon_min: 0.0,
                lon_max: 0.1,
            },
        )
        .await
        .unwrap(),
    );
    let charge_point = zones.zones[0].charge;

    let mut settings = Settings::default();
    settings.assigner_tick_ms = 20;
    settings.drone_tick_sec = 0.02;
    settings.drone_pool_max = 1;
    settings.base_active = 1;
    let settings = Arc::new(settings);

    let delivery = Delivery {
        id: "delivery-1".to_string(),
        origin: charge_point,
        destination: LatLon::new(charge_point.lat + 0.01, charge_point.lon),
        weight: 1.0,
        status: DeliveryStatus::Pending,
        drone_id: None,
        leg: None,
        origin_zone: None,
        destination_zone: None,
        timestamp: 0.0,
    };
    kv.put(&format!("delivery:{}", delivery.id), serde_json::to_value(&delivery).unwrap())
        .await
        .unwrap();
    register_index_entry(kv.as_ref(), "deliveries_index", &delivery.id).await.unwrap();

    tokio::spawn(dronesim::run(kv.clone(), bus.clone(), zones.clone(), settings.clone()));
    tokio::spawn(dispatcher::run(kv.clone(), bus.clone(), zones.clone(), settings.clone()));

    let outcome = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let raw = kv.get("delivery:delivery-1").await.unwrap().unwrap();
            let current: Delivery = serde_json::from_value(raw).unwrap();
            if current.status == DeliveryStatus::Delivered {
                return current;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;

    let delivered = outcome.expect("delivery did not complete in time");
    assert_eq!(delivered.status, DeliveryStatus::Delivered);
    assert!(delivered.drone_id.is_some());
}
