// rust_websocket_utils/src/client/mod.rs

//! WebSocket 客户端模块。
//!
//! 本模块及其子模块 `transport` 提供与 WebSocket 服务端建立连接、
//! 以事件信封收发消息的客户端能力。浏览器前端走原生 WebSocket API，
//! 此处的 Rust 客户端主要服务于集成测试与命令行调试工具。

pub mod transport; // 公开 transport 子模块，包含客户端传输层实现
