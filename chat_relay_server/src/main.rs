use anyhow::Context;
use chat_relay_server::config;
use chat_relay_server::otp::RetentionMap;
use chat_relay_server::state::AppState;
use chat_relay_server::ws_server::connection_manager::ConnectionManager;
use chat_relay_server::ws_server::message_router::MessageRouter;
use chat_relay_server::ws_server::service;
use log::{LevelFilter, error, info};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    // 初始化日志记录器
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .format_timestamp_millis()
        .init();
    info!("[主程序] 日志系统已成功初始化 (env_logger)，默认级别: Info。");

    // 加载应用配置
    config::init_config();
    let app_config = Arc::new(config::get_config().clone());

    // 创建一次性令牌存储
    let otp_store = Arc::new(RetentionMap::new(app_config.otp.retention()));
    info!("[主程序] 一次性令牌存储 (RetentionMap) 已创建。");

    // 创建连接管理器
    let connection_manager = Arc::new(ConnectionManager::new());
    info!("[主程序] WebSocket 连接管理器 (ConnectionManager) 已创建。");

    // 构造事件路由器：启动期注册全部处理器，此后只读共享
    let message_router = Arc::new(MessageRouter::with_default_handlers(Arc::clone(
        &connection_manager,
    )));
    info!("[主程序] 事件路由器 (MessageRouter) 已构造并注册内置处理器。");

    // 进程级关停信号：Ctrl-C 触发，令牌清扫任务与 HTTP 服务共用
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[主程序] 捕获到 Ctrl-C，开始优雅关停。");
            let _ = shutdown_tx.send(true);
        }
    });

    // 启动令牌存储的后台清扫任务
    tokio::spawn(Arc::clone(&otp_store).run_sweep(app_config.otp.sweep_interval(), shutdown_rx.clone()));
    info!("[主程序] 一次性令牌后台清扫任务已派生到后台异步执行。");

    let state = AppState {
        config: Arc::clone(&app_config),
        connection_manager,
        message_router,
        otp_store,
    };

    // 绑定监听地址：唯一的进程级致命错误出口
    let bind_addr = format!("{}:{}", app_config.websocket.host, app_config.websocket.port);
    let listener = match service::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("[主程序] 致命错误：绑定监听地址 {} 失败: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    // 启动服务
    info!("[主程序] 正在 {} 上启动聊天中继服务...", bind_addr);
    if let Err(e) = service::serve(listener, state, shutdown_rx)
        .await
        .context("聊天中继服务运行失败")
    {
        error!("[主程序] 致命错误：服务运行期间发生严重问题: {:#}", e);
        std::process::exit(1);
    }
    info!("[主程序] 服务已正常退出。");
}
