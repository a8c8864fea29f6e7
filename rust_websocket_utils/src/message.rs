// rust_websocket_utils/src/message.rs

//! 定义 WebSocket 通信中使用的核心事件信封结构。
//!
//! 本模块主要包含 `Event` 结构体的定义及其相关实现。
//! `Event` 作为客户端与服务端之间所有 WebSocket 消息交换的标准格式：
//! `type` 字段选择负载的具体形状，`payload` 以原始 JSON 值的形式携带，
//! 由匹配的处理器按需惰性解码。

use crate::error::WsError;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// `Event` 代表在客户端与 WebSocket 服务器之间交换的标准事件信封。
///
/// 线格式为 `{"type": <string>, "payload": <与 type 对应的 JSON 对象>}`。
///
/// # 字段
/// - `event_type`: 事件的业务类型（如 `"change_room"`, `"send_message"`），
///   线格式中的字段名为 `type`。接收方根据此字段决定如何解释 `payload`。
///   不变式：格式良好的信封类型永不为空。
/// - `payload`: 事件的实际数据负载，以未解码的 `serde_json::Value` 保存。
///   缺省时为 JSON null，由匹配的处理器在解码负载时报错。
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Event {
    /// 描述事件业务类型的字符串，线格式字段名为 `type`。
    #[serde(rename = "type")]
    pub event_type: String,

    /// 事件的原始 JSON 负载，具体结构由 `event_type` 决定。
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    /// 创建一个新的 `Event` 实例，将 `payload_data` 序列化为 JSON 值后存入信封。
    ///
    /// # 参数
    /// * `event_type` - 此事件的业务类型。
    /// * `payload_data` - 任意实现了 `serde::Serialize` 的负载数据引用。
    ///
    /// # 返回
    /// * `Result<Event, WsError>` - 序列化失败时返回 `WsError::SerializationError`。
    pub fn new<T: Serialize>(event_type: impl Into<String>, payload_data: &T) -> Result<Event, WsError> {
        let payload = serde_json::to_value(payload_data)
            .map_err(|e| WsError::SerializationError(format!("创建 Event 时序列化负载失败: {}", e)))?;
        Ok(Event {
            event_type: event_type.into(),
            payload,
        })
    }

    /// 从一段 JSON 文本解码出事件信封。
    ///
    /// 除 JSON 本身的格式校验外，还会强制信封不变式：`type` 字段不得为空，
    /// 空类型以 `WsError::EmptyEventType` 拒绝。
    pub fn from_json(text: &str) -> Result<Event, WsError> {
        let event: Event = serde_json::from_str(text)
            .map_err(|e| WsError::DeserializationError(format!("事件信封解码失败: {}", e)))?;
        if event.event_type.is_empty() {
            return Err(WsError::EmptyEventType);
        }
        Ok(event)
    }

    /// 将信封序列化为 JSON 文本，用于在传输层以文本帧发送。
    pub fn to_json(&self) -> Result<String, WsError> {
        serde_json::to_string(self)
            .map_err(|e| WsError::SerializationError(format!("事件信封序列化失败: {}", e)))
    }

    /// 将内部保存的 JSON 负载解码为指定的目标类型 `T`。
    ///
    /// # 返回
    /// * `Result<T, WsError>` - 负载结构与 `T` 不匹配时返回
    ///   `WsError::DeserializationError`。
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, WsError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            WsError::DeserializationError(format!(
                "Event 负载解码为目标类型失败: {}, 原始负载: '{}'",
                e, self.payload
            ))
        })
    }
}
