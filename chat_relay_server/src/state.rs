// chat_relay_server/src/state.rs

//! 应用全局共享状态管理模块。
//!
//! 此模块定义了需要在 HTTP 处理器与各连接任务之间共享的数据：配置、
//! 连接管理器、事件路由器和一次性令牌存储。`AppState` 在 `main` 中组装一次，
//! 作为 axum 的应用状态注入到所有路由处理器中。

use crate::config::AppConfig;
use crate::otp::RetentionMap;
use crate::ws_server::connection_manager::ConnectionManager;
use crate::ws_server::message_router::MessageRouter;
use std::sync::Arc;

/// 应用级共享状态。
///
/// 所有字段都是 `Arc` 共享引用，`Clone` 只是增加引用计数；
/// `MessageRouter` 在启动时构造完成后不再变更，可在任务间只读共享。
#[derive(Clone)]
pub struct AppState {
    /// 应用配置（启动时加载，此后只读）。
    pub config: Arc<AppConfig>,
    /// 连接注册表与房间索引。
    pub connection_manager: Arc<ConnectionManager>,
    /// 事件分发路由器（启动时注册全部处理器，此后只读）。
    pub message_router: Arc<MessageRouter>,
    /// 一次性令牌存储。
    pub otp_store: Arc<RetentionMap>,
}
