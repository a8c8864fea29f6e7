use rust_websocket_utils::error::WsError;
use thiserror::Error;

/// 应用的主要错误类型
///
/// 覆盖服务端的错误分类。前两类（解码失败、事件类型不受支持）不会导致
/// 连接关闭；`Connection` 对单个连接是致命的，但绝不会波及其他连接或整个进程；
/// 进程级的失败只保留给启动期的监听绑定错误。
#[derive(Error, Debug)]
pub enum ServerError {
    /// 事件信封或负载无法解码。记录日志并回送错误响应，连接保持打开。
    #[error("解码失败: {0}")]
    Decode(#[from] WsError),

    /// 事件的 `type` 没有注册对应的处理器。必须上抛给调用方而不是吞掉。
    #[error("不支持的事件类型: '{0}'")]
    UnsupportedEventType(String),

    /// 房间名为空。请求被拒绝，注册表状态不发生任何变化。
    #[error("无效的房间名: 房间名不能为空")]
    InvalidRoomName,

    /// 传输层读写失败（含超时）。对该连接致命，触发会话清理。
    #[error("连接错误: {0}")]
    Connection(String),

    /// 启动期绑定监听地址失败，唯一的进程级致命错误。
    #[error("监听地址绑定失败: {0}")]
    Bind(#[source] std::io::Error),
}
