//! 网络标识解析 (Network Identity)
//!
//! 优先级：命令行参数 > 配置中的固定值 > 探测命令输出 (如 `iwgetid -r` 给出 SSID)。

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::core::config::NetworkConfig;
use crate::core::error::{PilotError, Result};

pub async fn resolve_network_id(explicit: Option<String>, config: &NetworkConfig) -> Result<String> {
    if let Some(id) = explicit.or_else(|| config.id.clone()).filter(|id| !id.trim().is_empty()) {
        return Ok(id.trim().to_string());
    }
    detect(&config.detect_command).await
}

async fn detect(command: &str) -> Result<String> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| PilotError::NetworkIdentity("探测命令为空".into()))?;

    let output = Command::new(program)
        .args(parts)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| PilotError::NetworkIdentity(format!("无法执行 `{}`: {}", command, e)))?;

    if !output.status.success() {
        return Err(PilotError::NetworkIdentity(format!(
            "`{}` 退出状态 {}",
            command, output.status
        )));
    }

    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if id.is_empty() {
        return Err(PilotError::NetworkIdentity(format!("`{}` 没有输出", command)));
    }
    debug!("探测到当前网络: {}", id);
    Ok(id)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn config(id: Option<&str>, cmd: &str) -> NetworkConfig {
        NetworkConfig {
            id: id.map(str::to_string),
            detect_command: cmd.to_string(),
        }
    }

    #[tokio::test]
    async fn explicit_id_wins() {
        let id = resolve_network_id(Some("cli".into()), &config(Some("cfg"), "echo cmd"))
            .await
            .unwrap();
        assert_eq!(id, "cli");
    }

    #[tokio::test]
    async fn configured_id_skips_detection() {
        let id = resolve_network_id(None, &config(Some("cfg"), "false")).await.unwrap();
        assert_eq!(id, "cfg");
    }

    #[tokio::test]
    async fn detect_command_output_is_trimmed() {
        let id = resolve_network_id(None, &config(None, "echo home-wifi")).await.unwrap();
        assert_eq!(id, "home-wifi");
    }

    #[tokio::test]
    async fn empty_or_failing_detection_is_an_error() {
        for cmd in ["true", "false", "", "definitely-not-a-real-binary-xyz"] {
            let err = resolve_network_id(None, &config(None, cmd)).await.unwrap_err();
            assert!(matches!(err, PilotError::NetworkIdentity(_)), "{}", cmd);
        }
    }
}
