// chat_relay_server/src/otp.rs

//! 一次性令牌（OTP）存储模块。
//!
//! HTTP 升级为 WebSocket 前的准入凭据由本模块签发和校验：`/login` 端点调用
//! [`RetentionMap::issue`] 取得一个一次性令牌返回给前端，随后的升级请求携带
//! 该令牌，由 [`RetentionMap::verify`] 做一次性核销。令牌有固定的保留窗口，
//! 后台清扫任务按远小于窗口的周期删除过期条目。
//!
//! 不变式：一个令牌一旦被成功核销或超过保留窗口，就永远不可能再次校验通过
//! （核销即删除，且校验本身会检查时效，不依赖清扫是否已经跑过）。

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// 单个一次性令牌。
#[derive(Debug, Clone)]
pub struct Otp {
    /// 全局唯一的不透明令牌串（UUID v4）。
    pub key: String,
    /// 令牌的签发时间（UTC）。
    pub created_at: DateTime<Utc>,
}

/// `RetentionMap` 是带保留窗口的一次性令牌存储。
///
/// 所有条目保存在 `DashMap` 中，签发、核销与后台清扫并发访问同一张表；
/// `DashMap` 的分段锁保证核销的"取出即删除"是原子的，同一令牌不可能被
/// 两个并发校验同时通过。
#[derive(Debug)]
pub struct RetentionMap {
    /// 当前未核销、未过期（或尚未被清扫）的令牌集合，键为令牌串。
    entries: DashMap<String, Otp>,
    /// 令牌的最大生存时长。
    retention: Duration,
}

impl RetentionMap {
    /// 创建一个新的 `RetentionMap` 实例。
    ///
    /// # 参数
    /// * `retention` - 令牌签发后的保留窗口。
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            retention,
        }
    }

    /// 签发一个新的一次性令牌并登记到存储中。此操作永不失败。
    pub fn issue(&self) -> Otp {
        let otp = Otp {
            key: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
        };
        self.entries.insert(otp.key.clone(), otp.clone());
        debug!("[令牌存储] 已签发新令牌，当前存量: {}", self.entries.len());
        otp
    }

    /// 核销一个令牌。
    ///
    /// 条目存在即被原子地删除（精确一次语义，无论剩余时效如何都不可重放）；
    /// 返回值仅在条目存在且仍处于保留窗口内时为 `true`。
    /// 校验失败是布尔结果，不是错误路径。
    pub fn verify(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, otp)) => {
                let expired = self.is_expired(&otp, Utc::now());
                if expired {
                    debug!("[令牌存储] 令牌已过期但尚未被清扫，按无效处理。");
                }
                !expired
            }
            None => false,
        }
    }

    /// 当前存量（供调试端点与测试使用）。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 存储是否为空。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 指定令牌当前是否仍在存储中（供测试使用）。
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// 判断令牌在 `now` 时刻是否已超过保留窗口。
    fn is_expired(&self, otp: &Otp, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(otp.created_at) > self.retention_threshold()
    }

    /// 将配置的 `std::time::Duration` 保留窗口转换为 `chrono::Duration`。
    /// 配置值异常导致转换失败时退回 60 秒的安全值。
    fn retention_threshold(&self) -> chrono::Duration {
        match chrono::Duration::from_std(self.retention) {
            Ok(threshold) => threshold,
            Err(e) => {
                warn!(
                    "[令牌存储] 无法将保留窗口 ({:?}) 转换为 chrono::Duration: {}. 将使用 60 秒备用值。",
                    self.retention, e
                );
                chrono::Duration::seconds(60)
            }
        }
    }

    /// 删除所有超过保留窗口的令牌。
    fn sweep_expired(&self) {
        let now = Utc::now();
        let threshold = self.retention_threshold();
        let before = self.entries.len();
        self.entries
            .retain(|_, otp| now.signed_duration_since(otp.created_at) <= threshold);
        let after = self.entries.len();
        if after < before {
            debug!("[令牌存储] 本轮清扫删除了 {} 个过期令牌，剩余 {}。", before - after, after);
        }
    }

    /// 启动后台清扫循环。
    ///
    /// 设计为通过 `tokio::spawn` 在后台持续运行：每隔 `sweep_interval`
    /// 清扫一次过期令牌，直到 `shutdown` 信号被触发（进程关停）才退出。
    ///
    /// # 参数
    /// * `sweep_interval` - 清扫周期，应远小于保留窗口。
    /// * `shutdown` - 进程级关停信号的接收端。
    pub async fn run_sweep(self: Arc<Self>, sweep_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            "[令牌存储] 后台清扫任务已启动。清扫周期: {:?}，保留窗口: {:?}。",
            sweep_interval, self.retention
        );
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_expired();
                }
                _ = shutdown.changed() => {
                    info!("[令牌存储] 收到关停信号，后台清扫任务退出。");
                    return;
                }
            }
        }
    }
}
