//! 消息编解码：文本通道上的类型化事件与请求/响应信封
//!
//! 每个文本帧是下列二者之一：
//!
//! - `EVENT:<json>` —— 即发即弃的 [`SharedEvent`]
//! - `REQUEST-RESPONSE:<json>` —— 携带 `messageId` 的信封，请求与响应同构
//!
//! 未知 `eventType` 记录日志后丢弃；帧格式损坏是协议违规，连接器据此
//! 进入 ERROR 并关闭通道。

use crate::error::GatewayError;
use domain::{Asset, AssetEvent, AssetQuery, AttributeEvent};
use serde::{Deserialize, Serialize};

/// 即发即弃帧前缀。
pub const EVENT_PREFIX: &str = "EVENT:";
/// 请求/响应帧前缀。
pub const REQUEST_RESPONSE_PREFIX: &str = "REQUEST-RESPONSE:";

/// 清单读取请求的保留消息 ID。
pub const ASSET_READ_MESSAGE_ID: &str = "GATEWAY-ASSET-READ";
/// 批量读取请求的保留消息 ID 前缀（后接批首偏移）。
pub const ASSET_READ_BATCH_PREFIX: &str = "GATEWAY-ASSET-READ-";

/// 判断消息 ID 是否为同步协议保留。
pub fn is_reserved_message_id(message_id: &str) -> bool {
    message_id == ASSET_READ_MESSAGE_ID || message_id.starts_with(ASSET_READ_BATCH_PREFIX)
}

/// 对端主动断开的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisconnectReason {
    Disabled,
    Terminating,
    AlreadyConnected,
    PermanentError,
}

/// 通道上的类型化事件（带 `eventType` 判别字段的和类型）。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "kebab-case")]
pub enum SharedEvent {
    /// 属性值变更
    Attribute(AttributeEvent),
    /// 资产结构变更
    Asset(AssetEvent),
    /// 对端主动断开
    GatewayDisconnect { reason: DisconnectReason },
    /// 资产读取请求
    ReadAssets { query: AssetQuery },
    /// 资产读取响应
    Assets { assets: Vec<Asset> },
    /// 资产写穿请求（创建/更新）
    MergeAsset { asset: Asset },
    /// 资产写穿请求（删除）
    #[serde(rename_all = "camelCase")]
    DeleteAsset { asset_id: String },
    /// 删除写穿的确认响应
    #[serde(rename_all = "camelCase")]
    DeleteAssetResult { asset_id: String, deleted: bool },
    /// 请求被对端拒绝
    Rejected { reason: String },
}

const KNOWN_EVENT_TYPES: &[&str] = &[
    "attribute",
    "asset",
    "gateway-disconnect",
    "read-assets",
    "assets",
    "merge-asset",
    "delete-asset",
    "delete-asset-result",
    "rejected",
];

/// 请求/响应信封。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "messageId")]
    pub message_id: String,
    pub event: SharedEvent,
}

/// 解码结果。
#[derive(Debug)]
pub enum Decoded {
    Event(SharedEvent),
    Envelope(Envelope),
    /// 未知判别值，调用方记录后丢弃
    Unknown { event_type: String },
}

/// 编码即发即弃帧。
pub fn encode_event(event: &SharedEvent) -> Result<String, GatewayError> {
    let json = serde_json::to_string(event)
        .map_err(|err| GatewayError::ProtocolViolation(err.to_string()))?;
    Ok(format!("{}{}", EVENT_PREFIX, json))
}

/// 编码请求/响应帧。
pub fn encode_envelope(envelope: &Envelope) -> Result<String, GatewayError> {
    let json = serde_json::to_string(envelope)
        .map_err(|err| GatewayError::ProtocolViolation(err.to_string()))?;
    Ok(format!("{}{}", REQUEST_RESPONSE_PREFIX, json))
}

/// 解码一个文本帧。
pub fn decode_frame(text: &str) -> Result<Decoded, GatewayError> {
    if let Some(json) = text.strip_prefix(EVENT_PREFIX) {
        return match decode_shared_event(json)? {
            Some(event) => Ok(Decoded::Event(event)),
            None => Ok(Decoded::Unknown {
                event_type: peek_event_type(json),
            }),
        };
    }
    if let Some(json) = text.strip_prefix(REQUEST_RESPONSE_PREFIX) {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|err| GatewayError::ProtocolViolation(format!("bad envelope: {}", err)))?;
        let message_id = value
            .get("messageId")
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                GatewayError::ProtocolViolation("envelope without messageId".to_string())
            })?
            .to_string();
        let event_value = value
            .get("event")
            .cloned()
            .ok_or_else(|| GatewayError::ProtocolViolation("envelope without event".to_string()))?;
        let event_type = event_value
            .get("eventType")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        if !KNOWN_EVENT_TYPES.contains(&event_type.as_str()) {
            return Ok(Decoded::Unknown { event_type });
        }
        let event: SharedEvent = serde_json::from_value(event_value)
            .map_err(|err| GatewayError::ProtocolViolation(format!("bad event: {}", err)))?;
        return Ok(Decoded::Envelope(Envelope { message_id, event }));
    }
    Err(GatewayError::ProtocolViolation(format!(
        "unknown frame prefix: {}",
        text.chars().take(24).collect::<String>()
    )))
}

fn decode_shared_event(json: &str) -> Result<Option<SharedEvent>, GatewayError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|err| GatewayError::ProtocolViolation(format!("bad frame: {}", err)))?;
    let event_type = value.get("eventType").and_then(|t| t.as_str()).unwrap_or("");
    if !KNOWN_EVENT_TYPES.contains(&event_type) {
        return Ok(None);
    }
    let event: SharedEvent = serde_json::from_value(value)
        .map_err(|err| GatewayError::ProtocolViolation(format!("bad event: {}", err)))?;
    Ok(Some(event))
}

fn peek_event_type(json: &str) -> String {
    serde_json::from_str::<serde_json::Value>(json)
        .ok()
        .and_then(|value| {
            value
                .get("eventType")
                .and_then(|t| t.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::AttributeEvent;

    #[test]
    fn attribute_event_frame_round_trip() {
        let event = SharedEvent::Attribute(AttributeEvent::new(
            "asset-1",
            "temperature",
            Some(serde_json::json!(21.5)),
            1_000,
        ));
        let frame = encode_event(&event).expect("encode");
        assert!(frame.starts_with("EVENT:"));
        assert!(frame.contains("\"eventType\":\"attribute\""));
        match decode_frame(&frame).expect("decode") {
            Decoded::Event(SharedEvent::Attribute(decoded)) => {
                assert_eq!(decoded.attribute_ref.asset_id, "asset-1");
                assert_eq!(decoded.timestamp_ms, 1_000);
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn envelope_round_trip() {
        let envelope = Envelope {
            message_id: ASSET_READ_MESSAGE_ID.to_string(),
            event: SharedEvent::ReadAssets {
                query: domain::AssetQuery::index(),
            },
        };
        let frame = encode_envelope(&envelope).expect("encode");
        assert!(frame.starts_with("REQUEST-RESPONSE:"));
        match decode_frame(&frame).expect("decode") {
            Decoded::Envelope(decoded) => {
                assert_eq!(decoded.message_id, "GATEWAY-ASSET-READ");
                assert!(matches!(decoded.event, SharedEvent::ReadAssets { .. }));
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn unknown_discriminator_is_dropped_not_fatal() {
        let frame = r#"EVENT:{"eventType":"datapoint","value":1}"#;
        match decode_frame(frame).expect("decode") {
            Decoded::Unknown { event_type } => assert_eq!(event_type, "datapoint"),
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn malformed_frame_is_a_protocol_violation() {
        assert!(decode_frame("EVENT:{not json").is_err());
        assert!(decode_frame("HELLO:{}").is_err());
        assert!(decode_frame(r#"REQUEST-RESPONSE:{"event":{"eventType":"assets","assets":[]}}"#).is_err());
    }

    #[test]
    fn reserved_ids_are_recognized() {
        assert!(is_reserved_message_id("GATEWAY-ASSET-READ"));
        assert!(is_reserved_message_id("GATEWAY-ASSET-READ-20"));
        assert!(!is_reserved_message_id("req-7"));
    }
}
