//! `chat_relay_server` 服务端核心库。
//!
//! 本 Crate 实现了一个实时聊天中继服务：浏览器客户端通过 WebSocket 连接进来，
//! 加入命名房间，并向同一房间内的所有在线成员广播短文本消息。
//!
//! 主要模块包括：
//! - `config`: 管理应用的配置信息加载与访问。
//! - `error`: 定义应用特定的错误类型。
//! - `otp`: 一次性令牌存储，用于在 HTTP 升级为 WebSocket 前做准入校验。
//! - `state`: 管理应用级别的共享状态。
//! - `ws_server`: 实现 WebSocket 服务端，处理客户端连接、事件路由和实时广播。

pub mod config;
pub mod error;
pub mod otp;
pub mod state;
pub mod ws_server;
