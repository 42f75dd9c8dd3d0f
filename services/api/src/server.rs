use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryScheduleRepository, PlaceholderDocumentGenerator, Snapshot};
use crate::routes::with_compliance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use care_docs::config::AppConfig;
use care_docs::error::AppError;
use care_docs::telemetry;
use care_docs::workflows::documents::{ComplianceService, SystemClock};
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

    let snapshot = match args.snapshot.take() {
        Some(path) => {
            let snapshot = Snapshot::from_path(&path)?;
            info!(
                path = %path.display(),
                clients = snapshot.clients.len(),
                "seeded store from snapshot"
            );
            snapshot
        }
        None => Snapshot::default(),
    };
    let repository = Arc::new(InMemoryScheduleRepository::from_snapshot(snapshot));
    let generator = Arc::new(PlaceholderDocumentGenerator::default());
    let service = Arc::new(ComplianceService::new(
        repository,
        generator,
        Arc::new(SystemClock),
        config.scheduling.clone(),
    ));

    let app = with_compliance_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "care document compliance service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
