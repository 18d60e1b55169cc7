mod cache;
mod http;
mod locks;
mod store;

use std::sync::Arc;

use cache::CachedStore;
use ddc_common::settings::Settings;
use locks::LockTable;
use store::DurableStore;

#[tokio::main]
async fn main() -> ddc_common::error::Result<()> {
    ddc_common::logging::init();
    let settings = Settings::load()?;

    let durable = DurableStore::open(&settings.db_path)?;
    let state = Arc::new(http::AppState {
        store: CachedStore::new(durable, settings.cache_capacity, settings.cache_max_bytes),
        locks: LockTable::new(),
    });

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ddc_common::error::AppError::Fatal(format!("binding {addr}: {e}")))?;
    log::info!("kvstore listening on {addr}, db={}", settings.db_path);

    axum::serve(listener, http::router(state).into_make_service())
        .await
        .map_err(|e| ddc_common::error::AppError::Fatal(format!("server error: {e}")))?;
    Ok(())
}
