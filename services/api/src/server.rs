use crate::cli::ServeArgs;
use crate::infra::{sample_catalog, seed_properties, AppState};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use stayhub::config::AppConfig;
use stayhub::error::AppError;
use stayhub::lifecycle::{InMemoryStore, Marketplace, StoreDispatcher, SystemClock};
use stayhub::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryStore::new());
    if args.seed_catalog {
        let seeded = seed_properties(store.as_ref(), sample_catalog()).await?;
        info!(seeded, "sample property catalog loaded");
    }
    let clock = Arc::new(SystemClock);
    let dispatcher = Arc::new(StoreDispatcher::new(store.clone(), clock.clone()));
    let marketplace = Arc::new(Marketplace::new(
        store,
        dispatcher,
        clock,
        &config.marketplace,
    ));

    let app = with_marketplace_routes(marketplace)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        currency = %config.marketplace.currency,
        "stayhub marketplace ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
