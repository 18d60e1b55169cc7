use std::sync::Arc;

use ddc_common::{bus::MessageBus, error::Result, kv::KvClient, model::ZonesConfig, settings::Settings};
use tokio::sync::Mutex;

use crate::{advance::advance_deliveries, assign::assign_round, autoscale::autoscale, governance};

/// Runs the periodic tick: autoscale, charging/retiring governance, delivery advancement,
/// stuck-busy reconciliation, then an assignment round. The mutex serializes autoscaling
/// decisions against each other only (concurrent ticks never overlap in this single loop, but
/// the barrier mirrors the original design and protects against a future multi-loop caller).
pub struct Scheduler {
    autoscale_lock: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            autoscale_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn tick(&self, kv: &dyn KvClient, bus: &dyn MessageBus, zones: &ZonesConfig, settings: &Settings) -> Result<()> {
        {
            let _guard = self.autoscale_lock.lock().await;
            if let Err(e) = autoscale(kv, settings).await {
                log::warn!("scheduler: autoscale failed: {e}");
            }
        }
        if let Err(e) = governance::govern_charging_and_retiring(kv, settings).await {
            log::warn!("scheduler: charging/retiring governance failed: {e}");
        }
        if let Err(e) = advance_deliveries(kv, bus, settings).await {
            log::warn!("scheduler: advance_deliveries failed: {e}");
        }
        if let Err(e) = governance::reconcile_stuck_busy(kv).await {
            log::warn!("scheduler: reconcile_stuck_busy failed: {e}");
        }
        if let Err(e) = assign_round(kv, bus, zones, settings).await {
            log::warn!("scheduler: assign_round failed: {e}");
        }
        Ok(())
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
