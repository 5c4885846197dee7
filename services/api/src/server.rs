use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_claim_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use claimdesk::config::AppConfig;
use claimdesk::error::AppError;
use claimdesk::telemetry;
use claimdesk::workflows::reimbursement::claims::{ClaimService, InMemoryClaimStore};
use claimdesk::workflows::reimbursement::VisionClient;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

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
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    if config.vision.api_key.is_none() {
        warn!("VISION_API_KEY not set; audits will leave claims pending");
    }
    let verifier = Arc::new(VisionClient::new(
        config.vision.clone(),
        config.audit.check_timeout,
    )?);
    let store = Arc::new(InMemoryClaimStore::default());
    let claim_service = Arc::new(ClaimService::load(store, verifier, config.audit).await?);

    let app = with_claim_routes(claim_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, model = %config.vision.model, "claim desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
