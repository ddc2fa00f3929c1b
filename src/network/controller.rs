//! 代理核心控制器客户端 (Clash API Controller)
//!
//! 兼容 Clash / mihomo / sing-box `clash_api` 的外部控制接口，负责策略组查询、切换与运行模式设置。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::core::config::ControllerConfig;
use crate::core::error::{PilotError, Result};
use crate::core::model::RoutingMode;
use crate::interfaces::{PolicyControl, RoutingControl};

/// `GET /proxies/{name}` 的响应结构
#[derive(Debug, Clone, Deserialize)]
pub struct GroupInfo {
    #[serde(rename = "type")]
    pub kind: String,
    /// 当前选中成员
    #[serde(default)]
    pub now: Option<String>,
    /// 全部成员，非策略组 (单节点) 时缺失
    #[serde(default)]
    pub all: Option<Vec<String>>,
}

impl GroupInfo {
    /// 当前选中成员，缺失或为空时报错
    pub fn active(self, group: &str) -> Result<String> {
        self.now
            .filter(|now| !now.is_empty())
            .ok_or_else(|| PilotError::NoActiveSelection(group.to_string()))
    }
}

pub struct ControllerClient {
    api_base: Url,
    api_secret: Option<String>,
    client: Client,
}

impl ControllerClient {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        let api_base = Url::parse(&config.api_url)?;

        // 控制器一般位于本机，不应再经由系统代理
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            api_base,
            api_secret: config.api_secret.clone().filter(|s| !s.is_empty()),
            client,
        })
    }

    /// 拼接 API 路径，路径段逐个编码 (策略组名常含空格与 emoji)
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| PilotError::Custom(format!("无效的控制器地址: {}", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_secret {
            Some(secret) => rb.bearer_auth(secret),
            None => rb,
        }
    }

    async fn check(action: &str, resp: Response) -> Result<Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(PilotError::Controller {
            action: action.to_string(),
            status,
            body,
        })
    }

    /// 轮询 `/version` 直到控制器可用
    pub async fn wait_for_api(&self, timeout_secs: u64) -> Result<()> {
        let url = self.endpoint(&["version"])?;

        timeout(Duration::from_secs(timeout_secs), async {
            loop {
                match self.authorize(self.client.get(url.clone())).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        debug!("控制器 API 已就绪");
                        return;
                    }
                    _ => debug!("正在等待控制器 API 响应..."),
                }
                sleep(Duration::from_millis(500)).await;
            }
        })
        .await
        .map_err(|_| PilotError::Custom(format!("等待控制器 API 超时: {}", self.api_base)))
    }

    /// 查询策略组详情
    pub async fn group(&self, group: &str) -> Result<GroupInfo> {
        let url = self.endpoint(&["proxies", group])?;
        let resp = self.authorize(self.client.get(url)).send().await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PilotError::UnknownGroup(group.to_string()));
        }
        let resp = Self::check("query group", resp).await?;
        Ok(resp.json::<GroupInfo>().await?)
    }

    pub async fn switch_selector(&self, group: &str, policy: &str) -> Result<()> {
        let url = self.endpoint(&["proxies", group])?;
        let body = serde_json::json!({ "name": policy });

        let resp = self.authorize(self.client.put(url)).json(&body).send().await?;
        Self::check(&format!("switch {} -> {}", group, policy), resp).await?;
        Ok(())
    }
}

#[async_trait]
impl PolicyControl for ControllerClient {
    async fn group_members(&self, group: &str) -> Result<Vec<String>> {
        let info = self.group(group).await?;
        info.all
            .ok_or_else(|| PilotError::UnknownGroup(format!("{} ({} 不是策略组)", group, info.kind)))
    }

    async fn active_selection(&self, group: &str) -> Result<String> {
        self.group(group).await?.active(group)
    }

    async fn select(&self, group: &str, policy: &str) -> Result<()> {
        self.switch_selector(group, policy).await
    }
}

#[async_trait]
impl RoutingControl for ControllerClient {
    async fn set_routing_mode(&self, mode: RoutingMode) -> Result<()> {
        let url = self.endpoint(&["configs"])?;
        let body = serde_json::json!({ "mode": mode.api_value() });

        let resp = self.authorize(self.client.patch(url)).json(&body).send().await?;
        Self::check("set mode", resp).await?;
        Ok(())
    }
}
