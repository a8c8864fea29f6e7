// chat_relay_server/tests/ws_relay_integration_test.rs

//! 聊天中继服务的端到端集成测试。
//!
//! 每个测试在 `127.0.0.1:0` 上启动一个完整的服务实例，
//! 用 `rust_websocket_utils` 的客户端传输层驱动真实的升级、
//! 事件收发与广播链路。

use chat_relay_server::config::AppConfig;
use chat_relay_server::otp::RetentionMap;
use chat_relay_server::state::AppState;
use chat_relay_server::ws_server::connection_manager::ConnectionManager;
use chat_relay_server::ws_server::message_router::MessageRouter;
use chat_relay_server::ws_server::service;
use common_models::ws_payloads::{
    CHANGE_ROOM_EVENT_TYPE, ChangeRoomPayload, ERROR_RESPONSE_EVENT_TYPE, ErrorResponsePayload,
    NEW_MESSAGE_EVENT_TYPE, NewMessagePayload, SEND_MESSAGE_EVENT_TYPE, SendMessagePayload,
};
use log::{LevelFilter, info};
use rust_websocket_utils::client::transport::{ClientConnection, connect_client};
use rust_websocket_utils::message::Event;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// 辅助函数：初始化日志，仅用于测试，避免多次初始化
fn init_test_logger() {
    let _ = env_logger::builder()
        .filter_level(LevelFilter::Info)
        .is_test(true)
        .try_init();
}

/// 在随机端口上启动一个完整的服务实例。
/// 返回监听地址、共享状态（用于直接签发令牌与检查注册表）以及关停发送端。
async fn start_test_server() -> (SocketAddr, AppState, watch::Sender<bool>) {
    init_test_logger();

    let connection_manager = Arc::new(ConnectionManager::new());
    let message_router = Arc::new(MessageRouter::with_default_handlers(Arc::clone(
        &connection_manager,
    )));
    let state = AppState {
        config: Arc::new(AppConfig::default()),
        connection_manager,
        message_router,
        otp_store: Arc::new(RetentionMap::new(Duration::from_secs(5))),
    };

    let listener = service::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
    let addr = listener.local_addr().expect("无法获取本地监听地址");
    info!("[Test Main] 测试服务器将监听地址: {}", addr);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state_for_server = state.clone();
    tokio::spawn(async move {
        if let Err(e) = service::serve(listener, state_for_server, shutdown_rx).await {
            panic!("[Test Main - Server Task] 测试服务器运行失败: {:?}", e);
        }
    });

    (addr, state, shutdown_tx)
}

/// 辅助函数：签发一个一次性令牌并完成一次合法的 WebSocket 升级。
async fn connect_with_otp(addr: SocketAddr, state: &AppState) -> ClientConnection {
    let otp = state.otp_store.issue();
    connect_client(format!("ws://{}/ws?otp={}", addr, otp.key))
        .await
        .expect("携带有效令牌的升级应当成功")
}

/// 辅助函数：在限定时间内接收下一个事件，超时视为测试失败。
async fn recv_event_within(conn: &mut ClientConnection, within: Duration) -> Event {
    tokio::time::timeout(within, conn.receive_event())
        .await
        .expect("等待事件超时")
        .expect("连接被意外关闭")
        .expect("接收到的帧无法解码为事件")
}

/// 辅助函数：断言限定时间内不会收到任何事件。
async fn assert_no_event_within(conn: &mut ClientConnection, within: Duration) {
    let result = tokio::time::timeout(within, conn.receive_event()).await;
    assert!(result.is_err(), "预期这段时间内没有事件，但收到了: {:?}", result);
}

/// 辅助函数：等待注册表中的活动会话数达到预期值。
/// 升级握手完成后，服务端的会话登记在独立任务中进行，
/// 跨连接的断言必须先等登记生效。
async fn wait_for_client_count(state: &AppState, expected: usize) {
    for _ in 0..50 {
        if state.connection_manager.client_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!(
        "活动会话数未在限定时间内达到 {}（当前为 {}）",
        expected,
        state.connection_manager.client_count().await
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 升级准入：无令牌、伪造令牌被 401 拒绝；同一令牌不能完成两次升级。
async fn test_upgrade_requires_single_use_token() {
    let (addr, state, _shutdown_tx) = start_test_server().await;

    assert!(
        connect_client(format!("ws://{}/ws", addr)).await.is_err(),
        "缺少令牌的升级应被拒绝"
    );
    assert!(
        connect_client(format!("ws://{}/ws?otp=伪造的令牌", addr)).await.is_err(),
        "伪造令牌的升级应被拒绝"
    );

    let otp = state.otp_store.issue();
    let first = connect_client(format!("ws://{}/ws?otp={}", addr, otp.key)).await;
    assert!(first.is_ok(), "首次使用有效令牌的升级应当成功");

    let second = connect_client(format!("ws://{}/ws?otp={}", addr, otp.key)).await;
    assert!(second.is_err(), "同一令牌第二次升级应被拒绝（精确一次核销）");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 同一默认房间内的广播：甲发送 `send_message`，乙恰好收到一条
/// `new_message`，字段原样保留并带有服务端时间戳；甲也收到自己的回显。
async fn test_send_message_broadcasts_to_default_room() {
    let (addr, state, _shutdown_tx) = start_test_server().await;

    let mut alice = connect_with_otp(addr, &state).await;
    let mut bob = connect_with_otp(addr, &state).await;
    wait_for_client_count(&state, 2).await;

    let request = SendMessagePayload {
        message: "hi".to_string(),
        from: "A".to_string(),
    };
    let event = Event::new(SEND_MESSAGE_EVENT_TYPE, &request).expect("构造事件失败");
    alice.send_event(&event).await.expect("发送消息失败");

    for conn in [&mut bob, &mut alice] {
        let received = recv_event_within(conn, Duration::from_secs(5)).await;
        assert_eq!(received.event_type, NEW_MESSAGE_EVENT_TYPE);
        let payload: NewMessagePayload = received.deserialize_payload().expect("广播负载解码失败");
        assert_eq!(payload.message, "hi");
        assert_eq!(payload.from, "A");
    }
    assert_no_event_within(&mut bob, Duration::from_millis(300)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 换房语义：乙切到 `lobby` 后，默认房间的广播不再到达乙；
/// `lobby` 内的广播只到达乙。
async fn test_change_room_scopes_broadcasts() {
    let (addr, state, _shutdown_tx) = start_test_server().await;

    let mut alice = connect_with_otp(addr, &state).await;
    let mut bob = connect_with_otp(addr, &state).await;
    wait_for_client_count(&state, 2).await;

    let change = Event::new(
        CHANGE_ROOM_EVENT_TYPE,
        &ChangeRoomPayload {
            name: "lobby".to_string(),
        },
    )
    .expect("构造事件失败");
    bob.send_event(&change).await.expect("发送换房请求失败");

    // 同一连接上的请求按序处理：乙在 lobby 里发一条消息并等到自己的回显，
    // 即可确认换房已生效。
    let probe = Event::new(
        SEND_MESSAGE_EVENT_TYPE,
        &SendMessagePayload {
            message: "到了".to_string(),
            from: "B".to_string(),
        },
    )
    .expect("构造事件失败");
    bob.send_event(&probe).await.expect("发送探测消息失败");
    let echo = recv_event_within(&mut bob, Duration::from_secs(5)).await;
    assert_eq!(echo.event_type, NEW_MESSAGE_EVENT_TYPE);

    // 甲在默认房间广播：甲收到自己的回显，乙不应收到任何事件。
    let general_msg = Event::new(
        SEND_MESSAGE_EVENT_TYPE,
        &SendMessagePayload {
            message: "还在general".to_string(),
            from: "A".to_string(),
        },
    )
    .expect("构造事件失败");
    alice.send_event(&general_msg).await.expect("发送消息失败");
    let alice_echo = recv_event_within(&mut alice, Duration::from_secs(5)).await;
    let alice_payload: NewMessagePayload = alice_echo.deserialize_payload().expect("负载解码失败");
    assert_eq!(alice_payload.message, "还在general");
    assert_no_event_within(&mut bob, Duration::from_millis(300)).await;

    // 乙在 lobby 广播：只有乙收到。
    let lobby_msg = Event::new(
        SEND_MESSAGE_EVENT_TYPE,
        &SendMessagePayload {
            message: "lobby你好".to_string(),
            from: "B".to_string(),
        },
    )
    .expect("构造事件失败");
    bob.send_event(&lobby_msg).await.expect("发送消息失败");
    let bob_echo = recv_event_within(&mut bob, Duration::from_secs(5)).await;
    let bob_payload: NewMessagePayload = bob_echo.deserialize_payload().expect("负载解码失败");
    assert_eq!(bob_payload.message, "lobby你好");
    assert_no_event_within(&mut alice, Duration::from_millis(300)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 空房间名被拒绝：客户端收到 `error_response`，连接保持打开，
/// 且会话仍留在默认房间（随后的广播仍能收到自己的回显）。
async fn test_empty_room_name_is_rejected_without_state_change() {
    let (addr, state, _shutdown_tx) = start_test_server().await;

    let mut alice = connect_with_otp(addr, &state).await;

    let change = Event::new(
        CHANGE_ROOM_EVENT_TYPE,
        &ChangeRoomPayload { name: String::new() },
    )
    .expect("构造事件失败");
    alice.send_event(&change).await.expect("发送换房请求失败");

    let response = recv_event_within(&mut alice, Duration::from_secs(5)).await;
    assert_eq!(response.event_type, ERROR_RESPONSE_EVENT_TYPE);
    let payload: ErrorResponsePayload = response.deserialize_payload().expect("错误响应解码失败");
    assert_eq!(
        payload.original_event_type.as_deref(),
        Some(CHANGE_ROOM_EVENT_TYPE),
        "错误响应应指回原始请求类型"
    );

    // 连接仍然可用，且会话仍在默认房间：自己的广播回显能收到。
    let probe = Event::new(
        SEND_MESSAGE_EVENT_TYPE,
        &SendMessagePayload {
            message: "我还在".to_string(),
            from: "A".to_string(),
        },
    )
    .expect("构造事件失败");
    alice.send_event(&probe).await.expect("发送探测消息失败");
    let echo = recv_event_within(&mut alice, Duration::from_secs(5)).await;
    assert_eq!(echo.event_type, NEW_MESSAGE_EVENT_TYPE);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 未知事件类型不会被静默忽略：客户端收到 `error_response`，连接保持打开。
async fn test_unknown_event_type_yields_error_response() {
    let (addr, state, _shutdown_tx) = start_test_server().await;

    let mut alice = connect_with_otp(addr, &state).await;

    let bogus = Event::new("闻所未闻的类型", &serde_json::json!({})).expect("构造事件失败");
    alice.send_event(&bogus).await.expect("发送事件失败");

    let response = recv_event_within(&mut alice, Duration::from_secs(5)).await;
    assert_eq!(response.event_type, ERROR_RESPONSE_EVENT_TYPE);
    let payload: ErrorResponsePayload = response.deserialize_payload().expect("错误响应解码失败");
    assert!(
        payload.error.contains("不支持的事件类型"),
        "错误描述应指明事件类型不受支持，实际为: {}",
        payload.error
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
/// 客户端断开后会话被从注册表移除；损坏的信封不会拆掉连接。
async fn test_disconnect_cleans_registry_and_bad_frames_do_not() {
    let (addr, state, _shutdown_tx) = start_test_server().await;

    let mut alice = connect_with_otp(addr, &state).await;
    let mut bob = connect_with_otp(addr, &state).await;
    wait_for_client_count(&state, 2).await;

    // 发送一段根本不是 JSON 的文本：约定契约是记录日志并继续，连接保持打开。
    use futures_util::SinkExt;
    use tokio_tungstenite::tungstenite::protocol::Message;
    alice
        .ws_sender
        .send(Message::Text("这不是JSON".to_string()))
        .await
        .expect("发送损坏帧失败");

    let probe = Event::new(
        SEND_MESSAGE_EVENT_TYPE,
        &SendMessagePayload {
            message: "还活着".to_string(),
            from: "A".to_string(),
        },
    )
    .expect("构造事件失败");
    alice.send_event(&probe).await.expect("损坏帧之后连接应仍然可用");
    let echo = recv_event_within(&mut alice, Duration::from_secs(5)).await;
    assert_eq!(echo.event_type, NEW_MESSAGE_EVENT_TYPE);

    // 乙主动关闭连接，服务端应将其从注册表移除。
    bob.close().await;
    let mut removed = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if state.connection_manager.client_count().await == 1 {
            removed = true;
            break;
        }
    }
    assert!(removed, "断开的会话应在合理时间内被移出注册表");
}
