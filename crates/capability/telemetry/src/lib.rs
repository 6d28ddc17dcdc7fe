//! 追踪与请求 ID 生成。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use tracing_subscriber::{fmt, EnvFilter};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 同步子系统指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub gateway_connects: u64,
    pub gateway_disconnects: u64,
    pub sync_rounds: u64,
    pub sync_batches: u64,
    pub mirror_upserts: u64,
    pub mirror_deletes: u64,
    pub events_forwarded: u64,
    pub events_applied: u64,
    pub dropped_unknown_events: u64,
    pub protocol_violations: u64,
    pub request_timeouts: u64,
    pub version_conflicts: u64,
    pub backpressure: u64,
}

/// 同步子系统指标。
pub struct TelemetryMetrics {
    gateway_connects: AtomicU64,
    gateway_disconnects: AtomicU64,
    sync_rounds: AtomicU64,
    sync_batches: AtomicU64,
    mirror_upserts: AtomicU64,
    mirror_deletes: AtomicU64,
    events_forwarded: AtomicU64,
    events_applied: AtomicU64,
    dropped_unknown_events: AtomicU64,
    protocol_violations: AtomicU64,
    request_timeouts: AtomicU64,
    version_conflicts: AtomicU64,
    backpressure: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            gateway_connects: AtomicU64::new(0),
            gateway_disconnects: AtomicU64::new(0),
            sync_rounds: AtomicU64::new(0),
            sync_batches: AtomicU64::new(0),
            mirror_upserts: AtomicU64::new(0),
            mirror_deletes: AtomicU64::new(0),
            events_forwarded: AtomicU64::new(0),
            events_applied: AtomicU64::new(0),
            dropped_unknown_events: AtomicU64::new(0),
            protocol_violations: AtomicU64::new(0),
            request_timeouts: AtomicU64::new(0),
            version_conflicts: AtomicU64::new(0),
            backpressure: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            gateway_connects: self.gateway_connects.load(Ordering::Relaxed),
            gateway_disconnects: self.gateway_disconnects.load(Ordering::Relaxed),
            sync_rounds: self.sync_rounds.load(Ordering::Relaxed),
            sync_batches: self.sync_batches.load(Ordering::Relaxed),
            mirror_upserts: self.mirror_upserts.load(Ordering::Relaxed),
            mirror_deletes: self.mirror_deletes.load(Ordering::Relaxed),
            events_forwarded: self.events_forwarded.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            dropped_unknown_events: self.dropped_unknown_events.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            request_timeouts: self.request_timeouts.load(Ordering::Relaxed),
            version_conflicts: self.version_conflicts.load(Ordering::Relaxed),
            backpressure: self.backpressure.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录网关连接建立。
pub fn record_gateway_connect() {
    metrics().gateway_connects.fetch_add(1, Ordering::Relaxed);
}

/// 记录网关连接断开。
pub fn record_gateway_disconnect() {
    metrics().gateway_disconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录一轮完整清单同步。
pub fn record_sync_round() {
    metrics().sync_rounds.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次批量读取。
pub fn record_sync_batch() {
    metrics().sync_batches.fetch_add(1, Ordering::Relaxed);
}

/// 记录镜像写入次数。
pub fn record_mirror_upsert() {
    metrics().mirror_upserts.fetch_add(1, Ordering::Relaxed);
}

/// 记录镜像删除次数。
pub fn record_mirror_delete() {
    metrics().mirror_deletes.fetch_add(1, Ordering::Relaxed);
}

/// 记录向网关转发事件次数。
pub fn record_event_forwarded() {
    metrics().events_forwarded.fetch_add(1, Ordering::Relaxed);
}

/// 记录网关入站事件应用次数。
pub fn record_event_applied() {
    metrics().events_applied.fetch_add(1, Ordering::Relaxed);
}

/// 记录未知事件类型丢弃次数。
pub fn record_dropped_unknown_event() {
    metrics()
        .dropped_unknown_events
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录协议违规次数。
pub fn record_protocol_violation() {
    metrics().protocol_violations.fetch_add(1, Ordering::Relaxed);
}

/// 记录请求超时次数。
pub fn record_request_timeout() {
    metrics().request_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录版本冲突次数。
pub fn record_version_conflict() {
    metrics().version_conflicts.fetch_add(1, Ordering::Relaxed);
}

/// 记录背压（入站队列满）次数。
pub fn record_backpressure() {
    metrics().backpressure.fetch_add(1, Ordering::Relaxed);
}
