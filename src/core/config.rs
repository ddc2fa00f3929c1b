//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.toml` 的反序列化及其层级结构映射，支持 `NODEPILOT__` 环境变量覆盖与默认值回退机制。

use std::path::{Path, PathBuf};

use bon::Builder;
use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::core::error::{PilotError, Result};

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone, Default)]
pub struct AppConfig {
    /// 代理核心外部控制器 (Clash API)
    #[serde(default)]
    #[builder(default)]
    pub controller: ControllerConfig,

    /// 区域探测请求参数
    #[serde(default)]
    #[builder(default)]
    pub probe: ProbeConfig,

    /// 节点轮换目标
    #[serde(default)]
    #[builder(default)]
    pub rotator: RotatorConfig,

    /// 响应内容的区域识别规则
    #[serde(default)]
    #[builder(default)]
    pub region: RegionConfig,

    /// 持久化存储
    #[serde(default)]
    #[builder(default)]
    pub store: StoreConfig,

    #[serde(default)]
    #[builder(default)]
    pub notification: NotificationConfig,

    /// 当前网络标识来源
    #[serde(default)]
    #[builder(default)]
    pub network: NetworkConfig,
}

/// 控制器连接配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct ControllerConfig {
    #[serde(default = "default_api_url")]
    #[builder(default = default_api_url())]
    pub api_url: String,
    /// Bearer 鉴权密钥，为空则不携带
    pub api_secret: Option<String>,
    /// 启动时等待 API 就绪的上限
    #[serde(default = "default_ready_timeout")]
    #[builder(default = default_ready_timeout())]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    #[builder(default = default_request_timeout())]
    pub request_timeout_secs: u64,
}

/// 探测请求配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_url")]
    #[builder(default = default_probe_url())]
    pub url: String,
    /// 探测流量经由的代理入口 (如代理核心的 mixed 端口)
    pub proxy: Option<String>,
    /// 单次探测超时 (毫秒)
    #[serde(default = "default_timeout_ms")]
    #[builder(default = default_timeout_ms())]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    #[builder(default = default_user_agent())]
    pub user_agent: String,
    #[serde(default = "default_accept_language")]
    #[builder(default = default_accept_language())]
    pub accept_language: String,
}

/// 轮换目标配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct RotatorConfig {
    /// 待轮换的策略组名称
    pub group: Option<String>,
    #[serde(default = "default_target_region")]
    #[builder(default = default_target_region())]
    pub target_region: String,
}

/// 区域识别规则
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct RegionConfig {
    /// "服务在该地区不可用" 页面的标记文本
    #[serde(default = "default_unavailable_marker")]
    #[builder(default = default_unavailable_marker())]
    pub unavailable_marker: String,
    /// 不可用页面中指向本地落地页的主机名
    #[serde(default = "default_landing_host")]
    #[builder(default = default_landing_host())]
    pub landing_host: String,
    /// 同时命中以上两个标记时判定的区域
    #[serde(default = "default_landing_region")]
    #[builder(default = default_landing_region())]
    pub landing_region: String,
    /// 响应中缺失 countryCode 时的回退区域
    #[serde(default = "default_fallback_region")]
    #[builder(default = default_fallback_region())]
    pub fallback_region: String,
}

/// 持久化存储配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct StoreConfig {
    /// 存储文件路径，缺省为系统数据目录下的 `store.json`
    pub path: Option<PathBuf>,
    #[serde(default = "default_key_prefix")]
    #[builder(default = default_key_prefix())]
    pub key_prefix: String,
}

/// 通知后端
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationBackend {
    /// 仅写入日志
    #[default]
    Log,
    /// 调用桌面通知命令
    Desktop,
}

#[derive(Debug, Deserialize, Builder, Clone)]
pub struct NotificationConfig {
    #[serde(default)]
    #[builder(default)]
    pub backend: NotificationBackend,
    #[serde(default = "default_notify_command")]
    #[builder(default = default_notify_command())]
    pub command: String,
}

/// 网络标识配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct NetworkConfig {
    /// 固定的网络标识，设置后跳过探测
    pub id: Option<String>,
    /// 输出当前网络标识 (SSID) 的命令
    #[serde(default = "default_detect_command")]
    #[builder(default = default_detect_command())]
    pub detect_command: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_secret: None,
            ready_timeout_secs: default_ready_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            url: default_probe_url(),
            proxy: None,
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            accept_language: default_accept_language(),
        }
    }
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            group: None,
            target_region: default_target_region(),
        }
    }
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            unavailable_marker: default_unavailable_marker(),
            landing_host: default_landing_host(),
            landing_region: default_landing_region(),
            fallback_region: default_fallback_region(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            backend: NotificationBackend::default(),
            command: default_notify_command(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            id: None,
            detect_command: default_detect_command(),
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:9090".to_string()
}
fn default_ready_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    5
}
fn default_probe_url() -> String {
    "https://www.youtube.com/premium".to_string()
}
fn default_timeout_ms() -> u64 {
    3000
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/94.0.4606.61 Safari/537.36".to_string()
}
fn default_accept_language() -> String {
    "en".to_string()
}
fn default_target_region() -> String {
    "CN".to_string()
}
fn default_unavailable_marker() -> String {
    "Premium is not available in your country".to_string()
}
fn default_landing_host() -> String {
    "www.google.cn".to_string()
}
fn default_landing_region() -> String {
    "CN".to_string()
}
fn default_fallback_region() -> String {
    "US".to_string()
}
fn default_key_prefix() -> String {
    "nodepilot.ssid.".to_string()
}
fn default_notify_command() -> String {
    "notify-send".to_string()
}
fn default_detect_command() -> String {
    "iwgetid -r".to_string()
}

impl AppConfig {
    /// 从文件系统与环境变量中加载并解析配置
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| Path::new("config.toml"));
        let builder = Config::builder();

        let builder = if config_path.exists() {
            builder.add_source(File::from(config_path))
        } else {
            if path.is_some() {
                tracing::warn!("配置文件不存在，使用默认配置: {}", config_path.display());
            }
            builder
        };

        let settings = builder
            .add_source(Environment::with_prefix("NODEPILOT").separator("__"))
            .build()
            .map_err(PilotError::Config)?;
        settings.try_deserialize().map_err(PilotError::Config)
    }
}

impl StoreConfig {
    /// 解析存储文件的实际路径
    pub fn resolve_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        ProjectDirs::from("", "", "nodepilot")
            .map(|dirs| dirs.data_dir().join("store.json"))
            .ok_or_else(|| PilotError::Custom("无法定位系统数据目录".into()))
    }
}
