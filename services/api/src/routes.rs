use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use claimdesk::workflows::reimbursement::claims::audit::ImageVerifier;
use claimdesk::workflows::reimbursement::claims::{
    claim_router, ClaimService, ClaimStore, FieldSettingsStore,
};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_claim_routes<S, V>(service: Arc<ClaimService<S, V>>) -> axum::Router
where
    S: ClaimStore + FieldSettingsStore + 'static,
    V: ImageVerifier + 'static,
{
    claim_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::ReceiptTextVerifier;
    use axum::body::Body;
    use axum::http::Request;
    use claimdesk::config::AuditConfig;
    use claimdesk::workflows::reimbursement::claims::{FieldSet, InMemoryClaimStore};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::AtomicBool;
    use tower::ServiceExt;

    fn app(ready: bool) -> axum::Router {
        let service = ClaimService::new(
            Arc::new(InMemoryClaimStore::default()),
            Arc::new(ReceiptTextVerifier),
            FieldSet::standard(),
            AuditConfig::default(),
        );
        let state = AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        with_claim_routes(Arc::new(service)).layer(Extension(state))
    }

    async fn status_of(router: axum::Router, uri: &str) -> StatusCode {
        router
            .oneshot(
                Request::get(uri)
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route executes")
            .status()
    }

    #[tokio::test]
    async fn health_is_always_ok() {
        assert_eq!(status_of(app(false), "/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        assert_eq!(
            status_of(app(false), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status_of(app(true), "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn claim_routes_are_mounted() {
        assert_eq!(status_of(app(true), "/api/v1/claims").await, StatusCode::OK);
        assert_eq!(status_of(app(true), "/metrics").await, StatusCode::OK);
    }
}
