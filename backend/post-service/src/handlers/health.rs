/// Liveness and readiness endpoints
use crate::repository::AggregateStore;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use media_store::S3BlobStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub struct HealthState {
    store: Arc<dyn AggregateStore>,
    media: Option<S3BlobStore>,
}

#[derive(Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Serialize)]
struct ComponentCheck {
    status: ComponentStatus,
    message: String,
    latency_ms: u64,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    status: ComponentStatus,
    checks: HashMap<&'static str, ComponentCheck>,
    timestamp: String,
}

impl HealthState {
    /// `media` is checked when present; an unreachable bucket only degrades readiness
    pub fn new(store: Arc<dyn AggregateStore>, media: Option<S3BlobStore>) -> Self {
        Self { store, media }
    }
}

pub async fn health_summary(state: web::Data<HealthState>) -> HttpResponse {
    match state.store.ping().await {
        Ok(_) => HttpResponse::Ok().json(serde_json::json!({
            "status": "ok",
            "service": "post-service",
            "version": env!("CARGO_PKG_VERSION")
        })),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "unhealthy",
                "service": "post-service"
            }))
        }
    }
}

pub async fn readiness_summary(state: web::Data<HealthState>) -> HttpResponse {
    let mut checks = HashMap::new();

    let start = Instant::now();
    let store_check = match state.store.ping().await {
        Ok(_) => ComponentCheck {
            status: ComponentStatus::Healthy,
            message: "aggregate store reachable".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => ComponentCheck {
            status: ComponentStatus::Unhealthy,
            message: e.to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        },
    };
    let ready = store_check.status == ComponentStatus::Healthy;
    checks.insert("store", store_check);

    let mut degraded = false;
    if let Some(media) = &state.media {
        let start = Instant::now();
        let media_check = match media.health_check().await {
            Ok(_) => ComponentCheck {
                status: ComponentStatus::Healthy,
                message: "media bucket reachable".to_string(),
                latency_ms: start.elapsed().as_millis() as u64,
            },
            Err(e) => {
                degraded = true;
                ComponentCheck {
                    status: ComponentStatus::Degraded,
                    message: e.to_string(),
                    latency_ms: start.elapsed().as_millis() as u64,
                }
            }
        };
        checks.insert("media", media_check);
    }

    let status = match (ready, degraded) {
        (false, _) => ComponentStatus::Unhealthy,
        (true, true) => ComponentStatus::Degraded,
        (true, false) => ComponentStatus::Healthy,
    };

    let response = ReadinessResponse {
        ready,
        status,
        checks,
        timestamp: Utc::now().to_rfc3339(),
    };

    if ready {
        HttpResponse::Ok().json(response)
    } else {
        HttpResponse::ServiceUnavailable().json(response)
    }
}

pub async fn liveness_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({"alive": true}))
}
