//! Prometheus wiring for the service

use actix_web::HttpResponse;
use prometheus::{Encoder, TextEncoder};
use tracing::warn;

use collection_cache::CacheMetrics;

use crate::cache_aside::task_pool;

/// Register library metrics with the default registry.
/// Counter propagation metrics register themselves on construction.
pub fn register() {
    let registry = prometheus::default_registry();
    if let Err(e) = CacheMetrics::register(registry) {
        warn!("Failed to register cache metrics: {}", e);
    }
    if let Err(e) = task_pool::register_metrics(registry) {
        warn!("Failed to register task pool metrics: {}", e);
    }
}

/// GET /metrics
pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(format!("metrics encoding failed: {}", e));
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
