//! 宿主能力接口 (Host Capabilities)
//!
//! 轮换器与切换器只依赖这些 trait，具体实现由 `network` 与 `utils` 提供，测试中以内存替身注入。

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::model::{Completion, Notification, RoutingMode};

/// 策略组控制
#[async_trait]
pub trait PolicyControl: Send + Sync {
    /// 按顺序返回策略组成员
    async fn group_members(&self, group: &str) -> Result<Vec<String>>;

    /// 当前选中的成员
    async fn active_selection(&self, group: &str) -> Result<String>;

    /// 将策略组切换到指定成员
    async fn select(&self, group: &str, policy: &str) -> Result<()>;
}

/// 全局运行模式控制
#[async_trait]
pub trait RoutingControl: Send + Sync {
    async fn set_routing_mode(&self, mode: RoutingMode) -> Result<()>;
}

/// 区域探测请求
///
/// 仅在 HTTP 200 时返回响应正文，其余情况一律视为探测失败。
#[async_trait]
pub trait RegionProbe: Send + Sync {
    async fn fetch(&self) -> Result<String>;
}

/// 键值持久化
pub trait KeyValueStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// 用户通知
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, notification: &Notification) -> Result<()>;
}

/// 运行结束信号，消费自身以保证每次运行只发送一次
pub trait CompletionSink {
    fn done(self, completion: Completion) -> Result<()>;
}
