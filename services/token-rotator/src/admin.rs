//! Admin API
//!
//! Served on `admin.listen_addr` when configured.
//!
//! Endpoints:
//! - GET  /health: liveness plus a per-region pool summary
//! - GET  /metrics: Prometheus text exposition
//! - POST /admin/regions/{region}/success: report one successful token use

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use common::Region;
use metrics_exporter_prometheus::PrometheusHandle;
use token_pool::FileStore;
use tracing::{debug, warn};

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    store: Arc<FileStore>,
    regions: Vec<Region>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

impl AdminState {
    pub fn new(store: Arc<FileStore>, regions: Vec<Region>, prometheus: PrometheusHandle) -> Self {
        Self {
            store,
            regions,
            started_at: Instant::now(),
            prometheus,
        }
    }
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/admin/regions/{region}/success", post(record_success))
        .with_state(state)
}

fn json(status: StatusCode, body: serde_json::Value) -> impl IntoResponse {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// GET /health: 200 when every region document is readable, 503 otherwise.
///
/// Never exposes tokens, only pool sizes and rotation state.
async fn health_handler(State(state): State<AdminState>) -> impl IntoResponse {
    let mut healthy = true;
    let mut regions = Vec::with_capacity(state.regions.len());

    for &region in &state.regions {
        match state.store.load(region).await {
            Ok(doc) => regions.push(serde_json::json!({
                "region": region,
                "live": doc.live.len(),
                "staged": doc.staging.len(),
                "success_count": doc.state.success_count,
                "refresh_done": doc.state.refresh_done,
                "current_index": doc.state.current_index,
                "last_update_time": doc.state.last_update_time,
                "refresh_count": doc.state.refresh_count,
            })),
            Err(e) => {
                healthy = false;
                warn!(%region, error = %e, "health check cannot read region");
                regions.push(serde_json::json!({
                    "region": region,
                    "error": e.to_string(),
                }));
            }
        }
    }

    let (status, label) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    json(
        status,
        serde_json::json!({
            "status": label,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
            "regions": regions,
        }),
    )
}

/// GET /metrics: Prometheus text exposition format.
async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// POST /admin/regions/{region}/success: increment the region's success count.
async fn record_success(
    State(state): State<AdminState>,
    Path(region): Path<String>,
) -> impl IntoResponse {
    let region = match region.parse::<Region>() {
        Ok(r) if state.regions.contains(&r) => r,
        _ => {
            return json(
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": format!("unknown region {region}") }),
            );
        }
    };

    match state.store.record_success(region).await {
        Ok(count) => {
            debug!(%region, success_count = count, "success recorded");
            json(
                StatusCode::OK,
                serde_json::json!({ "region": region, "success_count": count }),
            )
        }
        Err(e) => {
            warn!(%region, error = %e, "failed to record success");
            json(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": e.to_string() }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    /// Create a PrometheusHandle for tests without installing a global recorder.
    fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    async fn test_state(dir: &std::path::Path, regions: &[Region]) -> AdminState {
        let store = Arc::new(FileStore::open(dir, regions).await.unwrap());
        AdminState::new(store, regions.to_vec(), test_prometheus_handle())
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_reports_every_region() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &[Region::Ind, Region::Br]).await;
        let app = build_admin_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert!(json["uptime_seconds"].is_u64());
        let regions = json["regions"].as_array().unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0]["region"], "IND");
        assert_eq!(regions[0]["live"], 0);
        assert_eq!(regions[1]["region"], "BR");
    }

    #[tokio::test]
    async fn health_is_degraded_when_a_region_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &[Region::Me]).await;
        std::fs::write(dir.path().join("me.json"), "{{{").unwrap();

        let response = build_admin_router(state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert_eq!(json["status"], "degraded");
        assert!(json["regions"][0]["error"].is_string());
    }

    #[tokio::test]
    async fn success_report_increments_count() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &[Region::Bd]).await;
        let store = state.store.clone();

        for expected in 1..=2u64 {
            let response = build_admin_router(state.clone())
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/admin/regions/bd/success")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let json = body_json(response).await;
            assert_eq!(json["region"], "BD");
            assert_eq!(json["success_count"], expected);
        }

        let persisted = store.load_state(Region::Bd).await.unwrap();
        assert_eq!(persisted.success_count, 2);
    }

    #[tokio::test]
    async fn success_report_for_unconfigured_region_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &[Region::Bd]).await;

        for uri in ["/admin/regions/ind/success", "/admin/regions/eu/success"] {
            let response = build_admin_router(state.clone())
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_prometheus_format() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), &[Region::Ind]).await;

        let response = build_admin_router(state)
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
