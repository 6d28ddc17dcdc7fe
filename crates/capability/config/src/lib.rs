//! 应用运行配置加载。

use std::env;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 缺省时使用内存存储（演示/测试）
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub jwt_access_ttl_seconds: u64,
    /// 清单同步批大小
    pub sync_batch_size: usize,
    /// 批量读取超时（秒）
    pub sync_read_timeout_seconds: u64,
    /// 写转发超时（秒）
    pub sync_forward_timeout_seconds: u64,
    /// 网关客户端重连初始退避（毫秒）
    pub reconnect_initial_backoff_ms: u64,
    /// 网关客户端重连退避上限（毫秒）
    pub reconnect_max_backoff_ms: u64,
    /// 连接器入站事件队列容量（有界，满时停止读通道）
    pub event_queue_capacity: usize,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("AMS_JWT_SECRET")
            .map_err(|_| ConfigError::Missing("AMS_JWT_SECRET".to_string()))?;
        let jwt_access_ttl_seconds = read_u64_with_default("AMS_JWT_ACCESS_TTL_SECONDS", 3600)?;
        let http_addr = env::var("AMS_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let database_url = read_optional("AMS_DATABASE_URL");
        let sync_batch_size = read_usize_with_default("AMS_SYNC_ASSET_BATCH_SIZE", 20)?;
        let sync_read_timeout_seconds = read_u64_with_default("AMS_SYNC_READ_TIMEOUT_SECONDS", 10)?;
        let sync_forward_timeout_seconds =
            read_u64_with_default("AMS_SYNC_FORWARD_TIMEOUT_SECONDS", 5)?;
        let reconnect_initial_backoff_ms =
            read_u64_with_default("AMS_RECONNECT_INITIAL_BACKOFF_MS", 2_000)?;
        let reconnect_max_backoff_ms =
            read_u64_with_default("AMS_RECONNECT_MAX_BACKOFF_MS", 60_000)?;
        let event_queue_capacity = read_usize_with_default("AMS_EVENT_QUEUE_CAPACITY", 10_000)?;

        Ok(Self {
            http_addr,
            database_url,
            jwt_secret,
            jwt_access_ttl_seconds,
            sync_batch_size,
            sync_read_timeout_seconds,
            sync_forward_timeout_seconds,
            reconnect_initial_backoff_ms,
            reconnect_max_backoff_ms,
            event_queue_capacity,
        })
    }
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    match value.parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::Invalid(key.to_string(), value)),
    }
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
