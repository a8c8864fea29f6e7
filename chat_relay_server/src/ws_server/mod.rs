// chat_relay_server/src/ws_server/mod.rs

//! WebSocket 服务端模块树。
//!
//! - `client_session`: 单个连接的会话元数据与读/写循环。
//! - `connection_manager`: 连接注册表与房间索引（单把锁保护）。
//! - `liveness`: Ping/Pong 保活时序协议。
//! - `message_router`: 按事件类型分发到处理器的路由器。
//! - `service`: HTTP 路由装配（升级端点、令牌签发、静态资源）与服务入口。

pub mod client_session;
pub mod connection_manager;
pub mod liveness;
pub mod message_router;
pub mod service;
