// common_models/src/ws_payloads.rs

//! 包含 WebSocket 通信中使用的各种 Payload 结构体定义。
//!
//! 每个事件信封 (`{"type": ..., "payload": ...}`) 的 `payload` 字段都对应
//! 本模块中的一个结构体，由 `type` 字段（取值为本模块中的常量之一）决定。
//! 请求与响应使用不同的事件类型：客户端发送 `send_message`，
//! 服务端广播出去的是 `new_message`。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 客户端请求：切换当前房间。
pub const CHANGE_ROOM_EVENT_TYPE: &str = "change_room";
/// 客户端请求：向当前房间发送一条聊天消息。
pub const SEND_MESSAGE_EVENT_TYPE: &str = "send_message";
/// 服务端响应：向房间内所有成员广播的新消息。
pub const NEW_MESSAGE_EVENT_TYPE: &str = "new_message";
/// 服务端响应：针对某个请求的错误说明，连接本身保持打开。
pub const ERROR_RESPONSE_EVENT_TYPE: &str = "error_response";

/// `ChangeRoomPayload` 是 `change_room` 事件的负载。
///
/// 根据共享模型规则，派生 `Serialize`, `Deserialize`, `Debug`, `Clone`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChangeRoomPayload {
    /// 目标房间名。空字符串是非法的，会被服务端以 `InvalidRoomName` 拒绝。
    pub name: String,
}

/// `SendMessagePayload` 是 `send_message` 事件的负载。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SendMessagePayload {
    /// 消息正文。
    pub message: String,
    /// 发送者的显示名称，由客户端自报。
    pub from: String,
}

/// `NewMessagePayload` 是 `new_message` 广播事件的负载。
///
/// 字段与 `SendMessagePayload` 一致，并额外带有服务端在广播时
/// 盖上的 UTC 时间戳 `sent`。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NewMessagePayload {
    /// 消息正文。
    pub message: String,
    /// 发送者的显示名称。
    pub from: String,
    /// 服务端广播此消息时的 UTC 时间戳。
    pub sent: DateTime<Utc>,
}

/// `ErrorResponsePayload` 是 `error_response` 事件的负载。
///
/// 当某个请求无法被处理（负载损坏、事件类型未知、房间名非法等）时，
/// 服务端用它告知客户端出错原因；连接不会因此被关闭。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorResponsePayload {
    /// 引发错误的原始请求事件类型（如果能确定）。
    pub original_event_type: Option<String>,
    /// 错误的描述文本。
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    /// 验证 `NewMessagePayload` 的线格式契约：序列化后必须包含
    /// `message`/`from`/`sent` 三个字段，且能无损反序列化回来。
    fn test_new_message_payload_wire_contract() {
        let original = NewMessagePayload {
            message: "大家好".to_string(),
            from: "甲".to_string(),
            sent: Utc::now(),
        };

        let json_string = serde_json::to_string(&original).expect("NewMessagePayload 序列化失败");
        assert!(json_string.contains("\"message\""), "线格式缺少 message 字段");
        assert!(json_string.contains("\"from\""), "线格式缺少 from 字段");
        assert!(json_string.contains("\"sent\""), "线格式缺少 sent 字段");

        let restored: NewMessagePayload =
            serde_json::from_str(&json_string).expect("NewMessagePayload 反序列化失败");
        assert_eq!(original, restored, "序列化往返后的 NewMessagePayload 不相等");
    }

    #[test]
    /// 错误响应中缺省的 `original_event_type` 应当序列化为 null 并还原为 `None`。
    fn test_error_response_payload_optional_origin() {
        let payload = ErrorResponsePayload {
            original_event_type: None,
            error: "不支持的事件类型".to_string(),
        };

        let json_string = serde_json::to_string(&payload).expect("ErrorResponsePayload 序列化失败");
        let restored: ErrorResponsePayload =
            serde_json::from_str(&json_string).expect("ErrorResponsePayload 反序列化失败");
        assert_eq!(restored.original_event_type, None);
        assert_eq!(restored.error, "不支持的事件类型");
    }
}
