//! 错误处理体系 (Error Handling System)
//!
//! 定义控制器、探测、存储等领域的错误类型以及全局 Result 别名。

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// 全局错误定义 (Pilot Domain Errors)
#[derive(Error, Debug)]
pub enum PilotError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// 控制器 API 返回非成功状态
    #[error("Controller API {action} failed: Status {status}, Body: {body}")]
    Controller {
        action: String,
        status: StatusCode,
        body: String,
    },

    #[error("Unknown policy group: {0}")]
    UnknownGroup(String),

    /// 策略组未报告当前选中成员，无法在失败时恢复
    #[error("Policy group {0} has no active selection")]
    NoActiveSelection(String),

    /// 区域探测返回非 200 状态
    #[error("Probe rejected: HTTP {0}")]
    ProbeStatus(StatusCode),

    #[error("Probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Cannot resolve network identifier: {0}")]
    NetworkIdentity(String),

    #[error("Other error: {0}")]
    Custom(String),
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, PilotError>;

impl PilotError {
    /// 可恢复错误：仅影响当前候选节点，轮换继续
    pub fn is_recoverable(&self) -> bool {
        match self {
            PilotError::ProbeStatus(_) | PilotError::ProbeTimeout(_) => true,
            PilotError::Network(e) => !e.is_builder(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_failures_are_recoverable() {
        assert!(PilotError::ProbeStatus(StatusCode::FORBIDDEN).is_recoverable());
        assert!(PilotError::ProbeTimeout(Duration::from_millis(3000)).is_recoverable());
        assert!(!PilotError::UnknownGroup("Proxy".into()).is_recoverable());
        assert!(!PilotError::Custom("boom".into()).is_recoverable());
    }
}
