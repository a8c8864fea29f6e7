// chat_relay_server/src/ws_server/liveness.rs

//! 连接保活（Ping/Pong）时序协议。
//!
//! 每个连接的存活状态机只有两个状态：截止时间在未来即为存活；
//! 截止时间越过且未见 Pong 即为超时，超时是终态，读循环据此退出。
//! 每收到一次 Pong，截止时间被顺延一个完整的等待窗口。
//! 写循环以严格短于等待窗口的固定周期无条件发送 Ping，
//! 保证只要写路径没有完全饿死，截止时间到期前总有一个 Ping 在途。

use std::time::Duration;
use tokio::time::Instant;

/// 单个连接的保活时序参数。
#[derive(Debug, Clone, Copy)]
pub struct Keepalive {
    /// 等待对端 Pong 应答的最长时间。
    pong_wait: Duration,
}

impl Keepalive {
    /// 以给定的 Pong 等待窗口创建保活参数。
    pub fn new(pong_wait: Duration) -> Self {
        Self { pong_wait }
    }

    /// Pong 等待窗口。
    pub fn pong_wait(&self) -> Duration {
        self.pong_wait
    }

    /// Ping 发送周期，取等待窗口的 90%。
    /// 用 `* 9 / 10` 计算以避免浮点乘法；周期必须严格短于等待窗口，
    /// 否则新的 Ping 会晚于截止时间发出。
    pub fn ping_interval(&self) -> Duration {
        (self.pong_wait * 9) / 10
    }

    /// 从当前时刻起算的下一个读超时截止时间。
    /// 连接建立时调用一次，此后每收到一个 Pong 调用一次。
    pub fn next_deadline(&self) -> Instant {
        Instant::now() + self.pong_wait
    }
}
