use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

/// WebSocket 服务的默认主机地址
pub const DEFAULT_WS_HOST: &str = "0.0.0.0";
/// WebSocket 服务的默认端口号
pub const DEFAULT_WS_PORT: u16 = 8080;

/// WebSocket 服务端详细配置结构体
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WebSocketConfig {
    /// WebSocket 服务绑定的主机地址
    pub host: String,
    /// WebSocket 服务监听的端口号
    pub port: u16,
    /// 等待客户端 Pong 应答的最长时间（单位：秒）。
    /// 读循环在该窗口内未收到 Pong 即按正常断开处理；
    /// 写循环的 Ping 周期取该窗口的 90%。
    pub pong_wait_seconds: u64,
    /// 单个入站消息允许的最大字节数
    pub max_frame_bytes: usize,
    /// 每个连接出站队列的容量（有界 FIFO）
    pub outbound_queue_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_WS_HOST.to_string(), // 默认监听所有网络接口
            port: DEFAULT_WS_PORT,             // 默认监听 8080 端口
            pong_wait_seconds: 10,             // 默认 10 秒内必须收到 Pong
            max_frame_bytes: 512,              // 默认单条消息最大 512 字节
            outbound_queue_capacity: 255,      // 默认出站队列容量 255 条
        }
    }
}

impl WebSocketConfig {
    /// Pong 等待窗口，转换为 `Duration`。
    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_seconds)
    }
}

/// 一次性令牌存储相关配置
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OtpConfig {
    /// 令牌的保留窗口（单位：秒），超过后由后台清扫删除
    pub retention_seconds: u64,
    /// 后台清扫的执行周期（单位：毫秒），应远小于保留窗口
    pub sweep_interval_millis: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            retention_seconds: 5,      // 令牌签发后 5 秒内有效
            sweep_interval_millis: 400, // 每 400 毫秒清扫一次过期令牌
        }
    }
}

impl OtpConfig {
    /// 令牌保留窗口，转换为 `Duration`。
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    /// 清扫周期，转换为 `Duration`。
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_millis)
    }
}

/// HTTP 外围接口（静态资源、跨域校验）相关配置
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpConfig {
    /// 静态前端资源目录，由文件服务在根路径下提供
    pub static_dir: String,
    /// WebSocket 升级允许的 Origin 白名单。
    /// 请求携带 Origin 但不在名单内时，升级被拒绝。
    pub allowed_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            static_dir: "./frontend".to_string(),
            allowed_origins: vec![
                "http://localhost:8080".to_string(),
                "https://localhost:8080".to_string(),
            ],
        }
    }
}

/// 应用的主配置结构体
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AppConfig {
    /// WebSocket 服务的相关配置
    pub websocket: WebSocketConfig,
    /// 一次性令牌存储的相关配置
    pub otp: OtpConfig,
    /// HTTP 外围接口的相关配置
    pub http: HttpConfig,
}

// 全局静态应用配置实例
static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// 加载或创建应用配置文件
fn load_or_create_config() -> AppConfig {
    let config_file_path = get_config_file_path();

    match fs::read_to_string(&config_file_path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!(
                    "[配置模块] 已成功从配置文件 {:?} 加载应用配置。",
                    config_file_path
                );
                config
            }
            Err(e) => {
                warn!(
                    "[配置模块] 警告：从 {:?} 反序列化配置失败: {}. 文件可能已损坏。将使用默认配置并尝试覆盖。",
                    config_file_path, e
                );
                let default_config = AppConfig::default();
                save_config(&default_config, &config_file_path);
                default_config
            }
        },
        Err(e) => {
            info!(
                "[配置模块] 未在 {:?} 找到配置文件或读取时发生错误 (错误: {}). 将使用默认配置并尝试创建新文件。",
                config_file_path, e
            );
            let default_config = AppConfig::default();
            save_config(&default_config, &config_file_path);
            default_config
        }
    }
}

/// 获取配置文件路径（当前工作目录下的 app_settings.json）
fn get_config_file_path() -> PathBuf {
    let current_dir = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    current_dir.join("app_settings.json")
}

/// 保存配置到文件
fn save_config(config: &AppConfig, path: &PathBuf) {
    match serde_json::to_string_pretty(config) {
        Ok(content) => {
            if let Err(e) = fs::write(path, content) {
                warn!("[配置模块] 错误：将配置写入文件 {:?} 时失败: {}", path, e);
            } else {
                info!("[配置模块] 已成功将当前配置（可能是默认配置）保存到 {:?}.", path);
            }
        }
        Err(e) => {
            warn!("[配置模块] 错误：序列化配置信息以便保存时失败: {}", e);
        }
    }
}

/// 初始化全局应用配置
pub fn init_config() {
    let loaded_config = load_or_create_config();
    if APP_CONFIG.set(loaded_config).is_err() {
        warn!("[配置模块] 全局应用配置 APP_CONFIG 已被初始化，本次 init_config 调用未覆盖已有配置。");
    }
    info!("[配置模块] 应用配置已成功初始化完毕。");
}

/// 获取已加载的全局应用配置
pub fn get_config() -> &'static AppConfig {
    APP_CONFIG
        .get()
        .expect("[配置模块] 全局应用配置尚未初始化，请先调用 init_config()")
}
