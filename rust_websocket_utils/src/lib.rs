//! `rust_websocket_utils` 是一个提供 WebSocket 通信实用功能的 Rust Crate。
//! 它旨在简化 WebSocket 客户端的实现，特别关注与 `common_models`
//! 一起使用时的事件编解码。
//!
//! 主要模块包括：
//! - `message`: 定义核心事件信封结构 `Event`。
//! - `error`: 定义库中使用的统一错误类型 `WsError`。
//! - `client`: 提供 WebSocket 客户端传输层，主要供集成测试驱动服务端使用。

pub mod client;
pub mod error;
pub mod message;
