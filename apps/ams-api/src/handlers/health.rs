//! 健康检查与指标 handlers

use ams_telemetry::metrics;
use axum::{response::IntoResponse, Json};

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn livez() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

pub async fn readyz() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// 同步子系统指标快照
pub async fn get_metrics() -> impl IntoResponse {
    let snapshot = metrics().snapshot();
    Json(serde_json::json!({
        "gatewayConnects": snapshot.gateway_connects,
        "gatewayDisconnects": snapshot.gateway_disconnects,
        "syncRounds": snapshot.sync_rounds,
        "syncBatches": snapshot.sync_batches,
        "mirrorUpserts": snapshot.mirror_upserts,
        "mirrorDeletes": snapshot.mirror_deletes,
        "eventsForwarded": snapshot.events_forwarded,
        "eventsApplied": snapshot.events_applied,
        "droppedUnknownEvents": snapshot.dropped_unknown_events,
        "protocolViolations": snapshot.protocol_violations,
        "requestTimeouts": snapshot.request_timeouts,
        "versionConflicts": snapshot.version_conflicts,
        "backpressure": snapshot.backpressure,
    }))
}
