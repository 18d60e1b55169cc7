mod coordinator;
mod hints;
mod http;
mod ring;

use std::sync::Arc;

use coordinator::Coordinator;
use ddc_common::settings::Settings;
use hints::HintBuffer;

#[tokio::main]
async fn main() -> ddc_common::error::Result<()> {
    ddc_common::logging::init();
    let settings = Settings::load()?;

    let backends = settings.backend_urls();
    if backends.is_empty() {
        return Err(ddc_common::error::AppError::Fatal(
            "BACKENDS must name at least one kvstore replica".to_string(),
        ));
    }

    let hints = Arc::new(HintBuffer::new());
    let coordinator = Arc::new(Coordinator::new(backends.clone(), settings.rf, hints.clone()));

    tokio::spawn(hints::run_flusher(hints, settings.hint_flush_sec));

    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ddc_common::error::AppError::Fatal(format!("binding {addr}: {e}")))?;
    log::info!("kvfront listening on {addr}, backends={backends:?}, rf={}", settings.rf);

    axum::serve(listener, http::router(coordinator).into_make_service())
        .await
        .map_err(|e| ddc_common::error::AppError::Fatal(format!("server error: {e}")))?;
    Ok(())
}
