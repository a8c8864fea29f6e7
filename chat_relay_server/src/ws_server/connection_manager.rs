// chat_relay_server/src/ws_server/connection_manager.rs

//! WebSocket 连接注册表与房间索引。
//!
//! 本模块是"谁在线"与"谁在哪个房间"的唯一事实来源。全局会话表和全部
//! 房间桶由同一把互斥锁保护，换房间的"移出旧桶 + 放入新桶 + 更新记录"
//! 在一次持锁期间完成，任何可观察瞬间一个会话都恰好出现在一个房间里。
//! 锁内只做内存中的映射操作，绝不跨越任何可能阻塞的调用；
//! 广播先在锁内对成员发送端做快照，释放锁后再逐个投递。

use log::{debug, info, warn};
use rust_websocket_utils::message::Event;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::client_session::ClientSession;
use crate::error::ServerError;

/// 新会话在创建时加入的默认房间。房间按首次使用惰性创建，从不预声明。
pub const DEFAULT_ROOM: &str = "general";

/// 注册表为每个会话保存的记录。
///
/// 出站队列的发送端只存在这一份：把记录从注册表移除即丢弃发送端，
/// 队列随之关闭，对应连接的写循环被解除阻塞并发出 Close 帧。
#[derive(Debug)]
struct ClientHandle {
    /// 向该会话出站队列投递事件的发送端。
    sender: mpsc::Sender<Event>,
    /// 会话当前所在的房间名（与房间桶在同一把锁下保持一致）。
    room: String,
    /// 客户端的网络地址，仅用于日志。
    addr: SocketAddr,
}

/// 锁保护下的注册表内部状态。
///
/// 不变式：`clients` 中的每个会话 ID 恰好出现在 `rooms` 的一个桶中；
/// 空桶会被立即剪除，桶里不会残留已销毁会话的引用。
#[derive(Debug, Default)]
struct RegistryState {
    /// 全局会话表：会话 ID -> 会话记录。
    clients: HashMap<Uuid, ClientHandle>,
    /// 房间索引：房间名 -> 成员会话 ID 集合。
    rooms: HashMap<String, HashSet<Uuid>>,
}

/// 管理所有活动的 WebSocket 客户端会话。
#[derive(Debug)]
pub struct ConnectionManager {
    /// 覆盖全局会话表与全部房间桶的单把锁。
    /// 在当前规模下刻意选择粗粒度：临界区都是 O(1)/O(n) 的映射操作，没有 I/O。
    state: Mutex<RegistryState>,
}

impl ConnectionManager {
    /// 创建一个新的 `ConnectionManager` 实例。
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// 登记一个新的客户端会话：生成会话元数据，放入全局表和默认房间。
    ///
    /// # 参数
    /// * `addr` - 新连接客户端的 `SocketAddr`。
    /// * `sender` - 该会话出站队列的发送端，唯一的一份由注册表持有。
    ///
    /// # 返回
    /// 新创建的 `Arc<ClientSession>`。
    pub async fn add_client(&self, addr: SocketAddr, sender: mpsc::Sender<Event>) -> Arc<ClientSession> {
        let session = Arc::new(ClientSession::new(addr));

        let mut state = self.state.lock().await;
        state.clients.insert(
            session.session_id,
            ClientHandle {
                sender,
                room: DEFAULT_ROOM.to_string(),
                addr,
            },
        );
        state
            .rooms
            .entry(DEFAULT_ROOM.to_string())
            .or_default()
            .insert(session.session_id);
        let total = state.clients.len();
        drop(state);

        info!(
            "新客户端连接成功: id={}, addr={}, 初始房间='{}'，当前活动会话总数: {}",
            session.session_id, addr, DEFAULT_ROOM, total
        );
        session
    }

    /// 从注册表中移除一个会话：先出房间桶（顺带剪除空桶），再出全局表。
    ///
    /// 幂等：对同一会话调用两次、或对从未登记过的会话调用，都是安全的空操作。
    /// 移除成功时随记录一起丢弃的发送端会关闭出站队列，从而唤醒写循环收尾。
    pub async fn remove_client(&self, session_id: &Uuid) {
        let mut state = self.state.lock().await;
        let Some(handle) = state.clients.remove(session_id) else {
            drop(state);
            debug!("尝试移除不存在的会话: id={}（幂等空操作）", session_id);
            return;
        };
        if let Some(members) = state.rooms.get_mut(&handle.room) {
            members.remove(session_id);
            if members.is_empty() {
                state.rooms.remove(&handle.room);
            }
        }
        let total = state.clients.len();
        drop(state);

        info!(
            "客户端断开连接: id={}, addr={}, 所在房间='{}'，移除后活动会话总数: {}",
            session_id, handle.addr, handle.room, total
        );
        // handle 连同其中的发送端在此被丢弃，出站队列随之关闭。
    }

    /// 将会话切换到指定房间。
    ///
    /// 空房间名以 [`ServerError::InvalidRoomName`] 拒绝，注册表不发生任何变化。
    /// 移出旧桶、放入新桶（按需惰性创建）、更新会话记录在同一次持锁期间完成。
    /// 会话已不在注册表中（并发断开）时按空操作处理。
    pub async fn change_room(&self, session_id: &Uuid, new_room: &str) -> Result<(), ServerError> {
        if new_room.is_empty() {
            return Err(ServerError::InvalidRoomName);
        }

        let old_room = {
            let mut state = self.state.lock().await;
            let RegistryState { clients, rooms } = &mut *state;
            let Some(handle) = clients.get_mut(session_id) else {
                warn!("尝试为不存在的会话切换房间: id={}（忽略）", session_id);
                return Ok(());
            };
            let old_room = std::mem::replace(&mut handle.room, new_room.to_string());
            if let Some(members) = rooms.get_mut(&old_room) {
                members.remove(session_id);
                if members.is_empty() {
                    rooms.remove(&old_room);
                }
            }
            rooms.entry(new_room.to_string()).or_default().insert(*session_id);
            old_room
        };

        info!("会话 {} 已从房间 '{}' 切换到 '{}'", session_id, old_room, new_room);
        Ok(())
    }

    /// 查询会话当前所在的房间名。
    pub async fn room_of(&self, session_id: &Uuid) -> Option<String> {
        self.state
            .lock()
            .await
            .clients
            .get(session_id)
            .map(|handle| handle.room.clone())
    }

    /// 向指定房间的全部当前成员广播一个事件（含发起者自身，若其在房间内）。
    ///
    /// 成员集合与各自的发送端在锁内快照，锁释放后再逐个投递；
    /// 恰在此间隙被移除的会话只是收不到这条消息，不会产生错误
    /// （与尽力而为的投递语义一致）。
    pub async fn broadcast(&self, room: &str, event: &Event) {
        let targets: Vec<(Uuid, mpsc::Sender<Event>)> = {
            let state = self.state.lock().await;
            let Some(members) = state.rooms.get(room) else {
                debug!("广播目标房间 '{}' 不存在或已无成员，事件被丢弃", room);
                return;
            };
            members
                .iter()
                .filter_map(|id| state.clients.get(id).map(|handle| (*id, handle.sender.clone())))
                .collect()
        };

        debug!("向房间 '{}' 的 {} 个成员广播事件 type='{}'", room, targets.len(), event.event_type);
        for (session_id, sender) in targets {
            Self::try_enqueue(&session_id, &sender, event.clone());
        }
    }

    /// 以某个会话当前所在的房间为目标进行广播。
    /// 房间名的解析与成员快照在同一次持锁期间完成。
    pub async fn broadcast_to_room_of(&self, session_id: &Uuid, event: &Event) {
        let targets: Vec<(Uuid, mpsc::Sender<Event>)> = {
            let state = self.state.lock().await;
            let Some(room) = state.clients.get(session_id).map(|handle| handle.room.as_str()) else {
                debug!("发起广播的会话 {} 已不在注册表中，事件被丢弃", session_id);
                return;
            };
            let Some(members) = state.rooms.get(room) else {
                return; // 不变式保证发起者所在房间必有桶，此分支只是防御断开竞争
            };
            members
                .iter()
                .filter_map(|id| state.clients.get(id).map(|handle| (*id, handle.sender.clone())))
                .collect()
        };

        for (target_id, sender) in targets {
            Self::try_enqueue(&target_id, &sender, event.clone());
        }
    }

    /// 向单个会话投递一个事件。会话已被移除时是记录日志的空操作。
    pub async fn send_to_client(&self, session_id: &Uuid, event: Event) {
        let sender = {
            let state = self.state.lock().await;
            state.clients.get(session_id).map(|handle| handle.sender.clone())
        };
        match sender {
            Some(sender) => Self::try_enqueue(session_id, &sender, event),
            None => debug!("向已移除的会话 {} 投递事件被忽略（空操作）", session_id),
        }
    }

    /// 当前活动会话总数。
    pub async fn client_count(&self) -> usize {
        self.state.lock().await.clients.len()
    }

    /// 非阻塞投递的统一入口，承载出站队列的投递契约：
    /// 队列已满 -> 丢弃该事件并告警（fail-fast，绝不让广播方阻塞在慢消费者上）；
    /// 队列已关闭（会话已销毁但发送方还拿着快照）-> 静默空操作。
    fn try_enqueue(session_id: &Uuid, sender: &mpsc::Sender<Event>, event: Event) {
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    "会话 {} 的出站队列已满，事件 type='{}' 被丢弃",
                    session_id, dropped.event_type
                );
            }
            Err(TrySendError::Closed(_)) => {
                debug!("会话 {} 的出站队列已关闭，事件被忽略", session_id);
            }
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}
