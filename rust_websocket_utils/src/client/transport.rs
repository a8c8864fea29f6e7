// rust_websocket_utils/src/client/transport.rs

//! 客户端 WebSocket 传输层核心逻辑。
//!
//! 本模块提供与服务端建立连接、发送和接收事件信封 (`Event`) 的能力。
//! 控制帧（Ping/Pong/Close）在此层被消化：Ping 由底层库自动应答，
//! 上层调用方只会看到解码后的事件。

use crate::error::WsError;
use crate::message::Event;
use futures_util::{
    SinkExt,
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use log::{debug, info};
use tokio_tungstenite::{WebSocketStream, connect_async, tungstenite::protocol::Message};
use url::Url;

/// `ClientWsStream` 类型别名，代表一个可能经过 TLS 加密的 TCP WebSocket 流。
pub type ClientWsStream = WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// `ClientConnection` 结构体代表一个活动的客户端 WebSocket 连接。
///
/// 它封装了与服务器进行通信所需的发送端 (`SplitSink`) 和接收端 (`SplitStream`)，
/// 实例在成功连接到服务器后由 [`connect_client`] 创建。
pub struct ClientConnection {
    /// 用于向 WebSocket 服务器异步发送消息的发送端。
    pub ws_sender: SplitSink<ClientWsStream, Message>,
    /// 用于从 WebSocket 服务器异步接收消息的接收端。
    pub ws_receiver: SplitStream<ClientWsStream>,
}

impl ClientConnection {
    /// 异步向服务器发送一个事件信封。
    ///
    /// 信封先被序列化为 JSON 文本，再以文本帧发送。
    ///
    /// # 返回
    /// * `Result<(), WsError>` - 序列化失败或网络发送失败时返回相应的 `WsError`。
    pub async fn send_event(&mut self, event: &Event) -> Result<(), WsError> {
        let text = event.to_json()?;
        debug!("客户端：准备发送事件: {}", text);
        self.ws_sender.send(Message::Text(text)).await?;
        debug!("客户端：事件已成功发送 (类型: {})", event.event_type);
        Ok(())
    }

    /// 异步接收下一个事件信封。
    ///
    /// 跳过所有控制帧：Ping 由底层自动应答，Pong 被忽略；
    /// 收到 Close 帧或流结束时返回 `None`。
    ///
    /// # 返回
    /// * `Some(Ok(event))` - 成功解码出一个事件。
    /// * `Some(Err(e))` - 传输错误或文本帧无法解码为信封。
    /// * `None` - 连接已结束。
    pub async fn receive_event(&mut self) -> Option<Result<Event, WsError>> {
        while let Some(frame) = self.ws_receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(Event::from_json(&text)),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue, // 控制帧不上抛
                Ok(Message::Close(frame)) => {
                    info!("客户端：收到服务端 Close 帧: {:?}", frame);
                    return None;
                }
                Ok(other) => {
                    debug!("客户端：忽略非文本帧: {:?}", other);
                    continue;
                }
                Err(e) => return Some(Err(WsError::from(e))),
            }
        }
        None
    }

    /// 主动关闭连接（尽力而为，忽略已断开造成的错误）。
    pub async fn close(&mut self) {
        let _ = self.ws_sender.send(Message::Close(None)).await;
    }
}

/// 异步连接到指定的 WebSocket 服务器。
///
/// # 参数
/// * `url_str` - 服务器的完整 URL（例如 "ws://127.0.0.1:8080/ws?otp=..."）。
///
/// # 返回
/// * `Result<ClientConnection, WsError>` - URL 非法、连接失败或握手被服务端
///   拒绝（如令牌校验未通过）时返回相应的 `WsError`。
pub async fn connect_client(url_str: String) -> Result<ClientConnection, WsError> {
    info!("客户端：开始尝试连接到 WebSocket 服务器，URL: {}", url_str);
    let parsed_url = Url::parse(&url_str)
        .map_err(|e| WsError::InvalidUrl(format!("无效的 WebSocket URL '{}': {}", url_str, e)))?;

    let (ws_stream, response) = connect_async(parsed_url.as_str()).await?;
    info!(
        "客户端：已成功连接到 {} (HTTP 状态码: {})",
        url_str,
        response.status()
    );
    let (ws_sender, ws_receiver) = ws_stream.split();
    Ok(ClientConnection {
        ws_sender,
        ws_receiver,
    })
}
