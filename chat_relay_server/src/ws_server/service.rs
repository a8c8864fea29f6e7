// chat_relay_server/src/ws_server/service.rs

//! WebSocket 服务端核心服务：HTTP 路由装配与监听入口。
//!
//! 对外暴露四个面：
//! - `GET /ws`: 升级端点。先做 Origin 白名单校验（携带且不在名单内的
//!   跨域请求被拒绝），再核销一次性令牌，然后升级为 WebSocket 并进入
//!   会话读/写循环。
//! - `POST /login`: 令牌签发端点，调用令牌存储的 `issue()` 并把不透明
//!   键返回给调用方，供随后的升级使用。
//! - `GET /debug`: 返回当前活动会话总数。
//! - 其余路径回落到静态文件服务，提供前端页面。

use axum::{
    Json, Router,
    extract::{ConnectInfo, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header::ORIGIN},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::ServeDir;

use super::client_session;
use crate::error::ServerError;
use crate::state::AppState;

/// `/ws` 升级请求携带的查询参数。
#[derive(Debug, Deserialize)]
struct WsUpgradeQuery {
    /// 由 `/login` 签发的一次性令牌。
    otp: Option<String>,
}

/// `/login` 的响应体。
#[derive(Debug, Serialize)]
struct LoginResponse {
    /// 新签发的一次性令牌，升级 `/ws` 时以查询参数原样带回。
    otp: String,
}

/// 组装完整的应用路由。
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.http.static_dir.clone();
    Router::new()
        .route("/ws", get(ws_upgrade_handler))
        .route("/login", post(login_handler))
        .route("/debug", get(debug_handler))
        .fallback_service(ServeDir::new(static_dir))
        .with_state(state)
}

/// 升级端点处理器。
///
/// 校验顺序：Origin 白名单 -> 一次性令牌核销 -> 协议升级。
/// 未携带 Origin 的请求（非浏览器客户端，如集成测试）被放行；
/// 携带但不在白名单内的请求以 403 拒绝；令牌缺失或核销失败以 401 拒绝。
async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsUpgradeQuery>,
    headers: HeaderMap,
) -> Response {
    if let Some(origin) = headers.get(ORIGIN) {
        let allowed = origin
            .to_str()
            .map(|o| state.config.http.allowed_origins.iter().any(|a| a == o))
            .unwrap_or(false);
        if !allowed {
            warn!("[WS服务] 拒绝来自 {} 的升级请求：Origin {:?} 不在白名单内。", addr, origin);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    let Some(otp) = query.otp else {
        warn!("[WS服务] 拒绝来自 {} 的升级请求：缺少一次性令牌。", addr);
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if !state.otp_store.verify(&otp) {
        warn!("[WS服务] 拒绝来自 {} 的升级请求：一次性令牌核销失败。", addr);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    info!("[WS服务] 来自 {} 的连接已通过准入校验，正在升级为 WebSocket。", addr);
    let max_frame_bytes = state.config.websocket.max_frame_bytes;
    ws.max_message_size(max_frame_bytes)
        .on_upgrade(move |socket| client_session::handle_connection(socket, addr, state))
}

/// 令牌签发端点处理器。签发永不失败。
async fn login_handler(State(state): State<AppState>) -> Json<LoginResponse> {
    let otp = state.otp_store.issue();
    info!("[WS服务] 已签发一次性令牌，等待升级时核销。");
    Json(LoginResponse { otp: otp.key })
}

/// 调试端点处理器：返回当前活动会话总数。
async fn debug_handler(State(state): State<AppState>) -> String {
    state.connection_manager.client_count().await.to_string()
}

/// 绑定监听地址。绑定失败是唯一的进程级致命错误，由调用方决定退出。
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(ServerError::Bind)
}

/// 在给定监听器上运行服务，直到关停信号触发。
///
/// # 参数
/// * `listener` - 已绑定的 TCP 监听器。
/// * `state` - 应用共享状态。
/// * `shutdown` - 进程级关停信号的接收端，触发后进入优雅关停。
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServerError> {
    let app = build_router(state);
    info!(
        "[WS服务] 聊天中继服务已就绪，监听地址: {:?}",
        listener.local_addr().map_err(ServerError::Bind)?
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.changed().await;
        info!("[WS服务] 收到关停信号，停止接受新连接。");
    })
    .await
    .map_err(|e| ServerError::Connection(e.to_string()))
}
