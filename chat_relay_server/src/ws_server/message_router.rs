// chat_relay_server/src/ws_server/message_router.rs

//! 事件路由器：按事件类型把入站信封分发给注册的处理器。
//!
//! 路由表是一个显式生命周期的对象：在启动时构造并注册全部处理器，
//! 随后以 `Arc` 只读共享给所有连接任务，初始化之后不再变更，
//! 因此分发路径上不存在并发写入问题。

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::{debug, info};
use rust_websocket_utils::message::Event;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common_models::ws_payloads::{
    CHANGE_ROOM_EVENT_TYPE, ChangeRoomPayload, NEW_MESSAGE_EVENT_TYPE, NewMessagePayload,
    SEND_MESSAGE_EVENT_TYPE, SendMessagePayload,
};

use super::client_session::ClientSession;
use super::connection_manager::ConnectionManager;
use crate::error::ServerError;

/// 处理器的统一返回：`Some(event)` 表示要回送给发起会话的应答，
/// `None` 表示无应答；错误通过 `ServerError` 上抛给读循环。
pub type HandlerOutcome = Result<Option<Event>, ServerError>;

/// 事件处理器：接收完整信封与发起会话，返回一个可装箱的异步结果。
/// 负载由处理器自行按需解码（解码失败以 `ServerError::Decode` 上抛）。
pub type EventHandler =
    Box<dyn Fn(Event, Arc<ClientSession>) -> BoxFuture<'static, HandlerOutcome> + Send + Sync>;

/// 按事件类型分发入站事件的路由器。
pub struct MessageRouter {
    /// 事件类型 -> 处理器 的映射，构造完成后只读。
    handlers: HashMap<String, EventHandler>,
}

impl MessageRouter {
    /// 创建一个没有任何处理器的空路由器。
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// 注册一个事件处理器。仅在启动期（路由器被共享之前）调用。
    pub fn register_handler(&mut self, event_type: impl Into<String>, handler: EventHandler) {
        let event_type = event_type.into();
        debug!("[事件路由] 已注册处理器: '{}'", event_type);
        self.handlers.insert(event_type, handler);
    }

    /// 构造注册好全部内置处理器（换房间、发消息）的路由器。
    pub fn with_default_handlers(manager: Arc<ConnectionManager>) -> Self {
        let mut router = Self::new();

        let manager_for_change_room = Arc::clone(&manager);
        router.register_handler(
            CHANGE_ROOM_EVENT_TYPE,
            Box::new(move |event, session| {
                let manager = Arc::clone(&manager_for_change_room);
                async move { handle_change_room(event, session, manager).await }.boxed()
            }),
        );

        let manager_for_send_message = manager;
        router.register_handler(
            SEND_MESSAGE_EVENT_TYPE,
            Box::new(move |event, session| {
                let manager = Arc::clone(&manager_for_send_message);
                async move { handle_send_message(event, session, manager).await }.boxed()
            }),
        );

        router
    }

    /// 将一个入站事件分发给与其类型匹配的处理器。
    ///
    /// 未注册的类型以 [`ServerError::UnsupportedEventType`] 上抛给调用方，
    /// 绝不静默吞掉。
    pub async fn dispatch(&self, event: Event, session: Arc<ClientSession>) -> HandlerOutcome {
        match self.handlers.get(event.event_type.as_str()) {
            Some(handler) => handler(event, session).await,
            None => Err(ServerError::UnsupportedEventType(event.event_type)),
        }
    }
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// `change_room` 处理器：解码房间名负载并更新注册表，无应答。
async fn handle_change_room(
    event: Event,
    session: Arc<ClientSession>,
    manager: Arc<ConnectionManager>,
) -> HandlerOutcome {
    let payload: ChangeRoomPayload = event.deserialize_payload()?;
    manager.change_room(&session.session_id, &payload.name).await?;
    Ok(None)
}

/// `send_message` 处理器：解码消息负载，盖上服务端时间戳，
/// 以 `new_message` 类型向发起会话当前所在的房间广播。
/// 请求与响应是两个不同的事件类型，无直接应答。
async fn handle_send_message(
    event: Event,
    session: Arc<ClientSession>,
    manager: Arc<ConnectionManager>,
) -> HandlerOutcome {
    let payload: SendMessagePayload = event.deserialize_payload()?;
    info!(
        "会话 {}: 广播新消息 (from='{}')",
        session.session_id, payload.from
    );

    let broadcast_payload = NewMessagePayload {
        message: payload.message,
        from: payload.from,
        sent: Utc::now(),
    };
    let outgoing = Event::new(NEW_MESSAGE_EVENT_TYPE, &broadcast_payload)?;
    manager.broadcast_to_room_of(&session.session_id, &outgoing).await;
    Ok(None)
}
