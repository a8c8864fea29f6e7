//! `common_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了聊天中继服务各组件（`chat_relay_server` 服务端、
//! `rust_websocket_utils` 提供的客户端传输层，以及 Web 前端的线上数据契约）
//! 之间共享的核心数据结构。
//!
//! 主要包含：
//! - **WebSocket 事件负载 (`ws_payloads`)**: 客户端与服务端通过事件信封交换的
//!   各类 Payload 结构体（切换房间、发送消息、广播新消息、错误响应），
//!   以及对应的事件类型常量。
//!
//! 设计原则：
//! - **共享性**: 所有在此 crate 中定义的模型都旨在被多个其他 crate 共享使用。
//! - **序列化/反序列化**: 所有模型必须派生 `serde::Serialize` 和 `serde::Deserialize`，
//!   以便在 JSON 线格式与 Rust 结构体之间相互转换。
//! - **可调试性与克隆**: 所有模型同时派生 `Debug` 和 `Clone`。

pub mod ws_payloads; // WebSocket 事件信封中使用的各种负载结构体
