//! 请求/响应配对
//!
//! 以 `messageId` 为键维护挂起请求表。响应与事件可以交错到达，
//! 配对层只对请求完成负责，不干预事件顺序。超时由调用方在等待点
//! 施加，表内不持有计时器状态。

use crate::codec::{Envelope, SharedEvent};
use crate::error::GatewayError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// 挂起请求表。
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: Mutex<HashMap<String, oneshot::Sender<SharedEvent>>>,
    counter: AtomicU64,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 分配新的消息 ID（保留 ID 永不发放）。
    pub fn next_message_id(&self) -> String {
        format!("req-{}", self.counter.fetch_add(1, Ordering::Relaxed))
    }

    /// 登记一个挂起请求，返回等待响应的接收端。
    ///
    /// 同一消息 ID 重复挂起视为协议滥用。
    pub fn register(
        &self,
        message_id: &str,
    ) -> Result<oneshot::Receiver<SharedEvent>, GatewayError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| GatewayError::Transport("correlator lock poisoned".to_string()))?;
        if pending.contains_key(message_id) {
            return Err(GatewayError::ProtocolViolation(format!(
                "message id already pending: {}",
                message_id
            )));
        }
        pending.insert(message_id.to_string(), tx);
        Ok(rx)
    }

    /// 尝试用入站信封完成挂起请求；无人等待时返回 false。
    pub fn complete(&self, envelope: Envelope) -> bool {
        let sender = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&envelope.message_id),
            Err(_) => None,
        };
        match sender {
            Some(tx) => {
                // 等待方可能已超时放弃，发送失败无需处理
                let _ = tx.send(envelope.event);
                true
            }
            None => false,
        }
    }

    /// 通道断开：丢弃全部挂起请求，唤醒所有等待方。
    pub fn fail_all(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }
}

/// 在截止时间内等待响应。
///
/// 超时映射为 `Timeout`，发送端被丢弃（断连清表）映射为 `Disconnected`。
pub async fn await_response(
    rx: oneshot::Receiver<SharedEvent>,
    timeout: Duration,
    what: &str,
) -> Result<SharedEvent, GatewayError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(event)) => Ok(event),
        Ok(Err(_)) => Err(GatewayError::Disconnected),
        Err(_) => {
            ams_telemetry::record_request_timeout();
            Err(GatewayError::Timeout(what.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{is_reserved_message_id, SharedEvent};

    #[tokio::test]
    async fn completes_pending_request() {
        let correlator = RequestCorrelator::new();
        let id = correlator.next_message_id();
        let rx = correlator.register(&id).expect("register");
        assert!(correlator.complete(Envelope {
            message_id: id.clone(),
            event: SharedEvent::Assets { assets: vec![] },
        }));
        let event = await_response(rx, Duration::from_secs(1), "test")
            .await
            .expect("response");
        assert!(matches!(event, SharedEvent::Assets { .. }));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn unmatched_response_is_ignored() {
        let correlator = RequestCorrelator::new();
        assert!(!correlator.complete(Envelope {
            message_id: "req-404".to_string(),
            event: SharedEvent::Assets { assets: vec![] },
        }));
    }

    #[tokio::test]
    async fn duplicate_message_id_is_rejected() {
        let correlator = RequestCorrelator::new();
        let _rx = correlator.register("GATEWAY-ASSET-READ").expect("first");
        let err = correlator.register("GATEWAY-ASSET-READ").expect_err("dup");
        assert!(matches!(err, GatewayError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn fail_all_wakes_waiters_with_disconnected() {
        let correlator = RequestCorrelator::new();
        let rx = correlator.register("req-0").expect("register");
        correlator.fail_all();
        let err = await_response(rx, Duration::from_secs(1), "test")
            .await
            .expect_err("disconnected");
        assert!(matches!(err, GatewayError::Disconnected));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let correlator = RequestCorrelator::new();
        let rx = correlator.register("req-1").expect("register");
        let err = await_response(rx, Duration::from_millis(20), "batch 0")
            .await
            .expect_err("timeout");
        assert!(matches!(err, GatewayError::Timeout(_)));
    }

    #[test]
    fn issued_ids_are_never_reserved() {
        let correlator = RequestCorrelator::new();
        for _ in 0..64 {
            assert!(!is_reserved_message_id(&correlator.next_message_id()));
        }
    }
}
