// chat_relay_server/src/ws_server/client_session.rs

//! 单个 WebSocket 连接的会话与读/写循环。
//!
//! 每个升级成功的连接对应一个 `ClientSession`，并由两个互不共享的任务驱动：
//! 读循环串行消费入站帧并交给事件路由器，写循环是该连接上唯一的写入方，
//! 在出站队列与 Ping 定时器之间复用。读循环退出后无条件请求注册表移除
//! 本会话（幂等），注册表移除会话时丢弃出站队列发送端，写循环据此收尾。

use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use rust_websocket_utils::message::Event;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use common_models::ws_payloads::{ERROR_RESPONSE_EVENT_TYPE, ErrorResponsePayload};

use super::liveness::Keepalive;
use crate::error::ServerError;
use crate::state::AppState;

/// 代表一个已连接的 WebSocket 客户端会话的元数据。
///
/// 可变状态（当前房间、出站队列）不在这里：它们记录在连接注册表中，
/// 与房间索引受同一把锁保护。
#[derive(Debug)]
pub struct ClientSession {
    /// 由服务端生成的唯一会话标识。
    pub session_id: Uuid,
    /// 客户端的 IP 地址和端口。
    pub addr: SocketAddr,
    /// 会话创建的时间戳。
    pub creation_time: DateTime<Utc>,
}

impl ClientSession {
    /// 创建一个新的 `ClientSession` 实例。
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            addr,
            creation_time: Utc::now(),
        }
    }
}

/// 升级完成后的连接主流程：登记会话、派生写循环、在当前任务中运行读循环，
/// 读循环退出后做统一清理。
pub async fn handle_connection(socket: WebSocket, addr: SocketAddr, state: AppState) {
    let (ws_sender, ws_receiver) = socket.split();
    let (egress_tx, egress_rx) =
        mpsc::channel::<Event>(state.config.websocket.outbound_queue_capacity);

    let session = state.connection_manager.add_client(addr, egress_tx).await;
    let keepalive = Keepalive::new(state.config.websocket.pong_wait());

    let write_handle = tokio::spawn(write_loop(ws_sender, egress_rx, keepalive, session.session_id));

    read_loop(ws_receiver, Arc::clone(&session), &state, keepalive).await;

    // 读循环退出（对端关闭、读错误或心跳超时）后，无条件请求移除本会话。
    // 移除是幂等的，并发的显式关闭不会造成二次关闭出站队列。
    state.connection_manager.remove_client(&session.session_id).await;

    if let Err(e) = write_handle.await {
        error!("会话 {}: 写循环任务异常结束: {:?}", session.session_id, e);
    }
    info!("会话 {}: 连接处理流程已全部结束。", session.session_id);
}

/// 读循环：在 Pong 截止时间内逐帧读取并分发。
///
/// 文本帧解码失败只记录日志并继续（单个损坏帧不拆连接）；
/// 任何连接级读错误、对端关闭或心跳超时都会退出循环。
async fn read_loop(
    mut ws_receiver: SplitStream<WebSocket>,
    session: Arc<ClientSession>,
    state: &AppState,
    keepalive: Keepalive,
) {
    let mut deadline = keepalive.next_deadline();
    loop {
        let frame = match tokio::time::timeout_at(deadline, ws_receiver.next()).await {
            Err(_) => {
                // 截止时间内未见 Pong：存活状态机进入终态，按正常断开处理。
                info!(
                    "会话 {}: 心跳超时（{:?} 内未收到 Pong），读循环退出。",
                    session.session_id,
                    keepalive.pong_wait()
                );
                break;
            }
            Ok(None) => {
                info!("会话 {}: 对端已结束消息流，读循环退出。", session.session_id);
                break;
            }
            Ok(Some(Err(e))) => {
                let err = ServerError::Connection(e.to_string());
                info!("会话 {}: 读取连接失败: {}。读循环退出。", session.session_id, err);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => handle_text_frame(&text, &session, state).await,
            Message::Pong(_) => {
                deadline = keepalive.next_deadline();
                debug!("会话 {}: 收到 Pong，读超时截止时间已顺延。", session.session_id);
            }
            Message::Ping(_) => {
                // 底层会自动应答 Pong，这里只记录。
                debug!("会话 {}: 收到对端 Ping。", session.session_id);
            }
            Message::Close(frame) => {
                info!("会话 {}: 收到 Close 帧: {:?}，读循环退出。", session.session_id, frame);
                break;
            }
            Message::Binary(_) => {
                warn!("会话 {}: 协议仅支持文本事件帧，二进制帧被忽略。", session.session_id);
            }
        }
    }
}

/// 处理一个入站文本帧：解码信封、交给路由器分发、按排队模型回送应答。
async fn handle_text_frame(text: &str, session: &Arc<ClientSession>, state: &AppState) {
    let event = match Event::from_json(text) {
        Ok(event) => event,
        Err(e) => {
            // 约定的契约：单个损坏帧记录日志后继续，连接保持打开。
            warn!("会话 {}: 事件信封解码失败: {}。连接保持打开。", session.session_id, e);
            return;
        }
    };

    let original_event_type = event.event_type.clone();
    match state.message_router.dispatch(event, Arc::clone(session)).await {
        Ok(Some(reply)) => {
            // 排队模型：应答一律经由出站队列交给写循环，读路径从不直接写。
            state
                .connection_manager
                .send_to_client(&session.session_id, reply)
                .await;
        }
        Ok(None) => {}
        Err(err) => {
            warn!(
                "会话 {}: 处理事件 '{}' 失败: {}",
                session.session_id, original_event_type, err
            );
            send_error_response(state, session, Some(original_event_type), &err).await;
        }
    }
}

/// 辅助函数：向客户端回送标准错误响应（经出站队列，尽力而为）。
///
/// # 参数
/// * `original_event_type` - 可选，引发错误的原始请求事件类型。
/// * `err` - 待回报的服务端错误。
async fn send_error_response(
    state: &AppState,
    session: &Arc<ClientSession>,
    original_event_type: Option<String>,
    err: &ServerError,
) {
    let payload = ErrorResponsePayload {
        original_event_type,
        error: err.to_string(),
    };
    match Event::new(ERROR_RESPONSE_EVENT_TYPE, &payload) {
        Ok(event) => {
            state
                .connection_manager
                .send_to_client(&session.session_id, event)
                .await;
        }
        Err(e) => {
            error!("会话 {}: 构造错误响应信封失败: {}", session.session_id, e);
        }
    }
}

/// 写循环：本连接上唯一允许写入传输层的代码路径。
///
/// 在两个信号间复用：出站队列产出事件则序列化发送；队列被关闭
/// （注册表已移除会话）则尽力发送 Close 帧后退出；Ping 定时器按
/// 保活周期触发则发送 Ping 帧。任何写错误都终止循环 —— 读循环的
/// 失败会独立触发清理，退出前写 Close 只是尽力而为的礼节。
async fn write_loop(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut egress_rx: mpsc::Receiver<Event>,
    keepalive: Keepalive,
    session_id: Uuid,
) {
    let ping_interval = keepalive.ping_interval();
    let mut ping_ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            maybe_event = egress_rx.recv() => match maybe_event {
                Some(event) => {
                    let text = match event.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            error!("会话 {}: 序列化出站事件失败: {}，该事件被跳过。", session_id, e);
                            continue;
                        }
                    };
                    if let Err(e) = ws_sender.send(Message::Text(text)).await {
                        info!("会话 {}: 写入事件失败: {}。写循环退出。", session_id, e);
                        break;
                    }
                }
                None => {
                    // 出站队列已被关闭：发送 Close 帧并结束写循环。
                    if let Err(e) = ws_sender.send(Message::Close(None)).await {
                        debug!("会话 {}: 发送 Close 帧失败（对端可能已断开）: {}", session_id, e);
                    }
                    info!("会话 {}: 出站队列已关闭，写循环退出。", session_id);
                    break;
                }
            },
            _ = ping_ticker.tick() => {
                debug!("会话 {}: 发送保活 Ping。", session_id);
                if let Err(e) = ws_sender.send(Message::Ping(Vec::new())).await {
                    info!("会话 {}: 发送 Ping 失败: {}。写循环退出。", session_id, e);
                    break;
                }
            }
        }
    }
}
