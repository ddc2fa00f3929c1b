use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::core::config::{NotificationBackend, NotificationConfig};
use crate::core::error::{PilotError, Result};
use crate::core::model::Notification;
use crate::interfaces::Notifier;

/// 将通知写入日志
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn post(&self, n: &Notification) -> Result<()> {
        info!("🔔 {} | {}\n{}", n.title, n.subtitle, n.body.trim_end());
        Ok(())
    }
}

/// 调用桌面通知命令 (`notify-send <title> <subtitle\nbody>`)
pub struct DesktopNotifier {
    command: String,
}

impl DesktopNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Notifier for DesktopNotifier {
    async fn post(&self, n: &Notification) -> Result<()> {
        let status = Command::new(&self.command)
            .arg(&n.title)
            .arg(format!("{}\n{}", n.subtitle, n.body.trim_end()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await?;

        if !status.success() {
            return Err(PilotError::Custom(format!("{} 退出状态 {}", self.command, status)));
        }
        Ok(())
    }
}

pub fn build_notifier(config: &NotificationConfig) -> Arc<dyn Notifier> {
    match config.backend {
        NotificationBackend::Log => Arc::new(LogNotifier),
        NotificationBackend::Desktop => Arc::new(DesktopNotifier::new(config.command.clone())),
    }
}
