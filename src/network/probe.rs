use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::core::config::ProbeConfig;
use crate::core::error::{PilotError, Result};
use crate::interfaces::RegionProbe;

/// 经由当前选中节点发出的区域探测请求
pub struct HttpProbe {
    client: Client,
    url: Url,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let url = Url::parse(&config.url)?;

        let mut headers = HeaderMap::new();
        let base_headers = [
            (USER_AGENT, config.user_agent.as_str()),
            (ACCEPT_LANGUAGE, config.accept_language.as_str()),
        ];
        headers.extend(
            base_headers
                .into_iter()
                .filter(|(_, v)| !v.is_empty())
                .filter_map(|(k, v)| HeaderValue::from_str(v).ok().map(|val| (k, val))),
        );

        // 不复用连接：每次探测都必须经由刚切换的节点重新建连
        let builder = Client::builder()
            .default_headers(headers)
            .pool_max_idle_per_host(0)
            .connect_timeout(Duration::from_millis(config.timeout_ms));

        let builder = match &config.proxy {
            Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy.as_str())?),
            None => builder,
        };

        Ok(Self {
            client: builder.build()?,
            url,
        })
    }
}

#[async_trait]
impl RegionProbe for HttpProbe {
    async fn fetch(&self) -> Result<String> {
        let resp = self.client.get(self.url.clone()).send().await?;
        let status = resp.status();
        debug!("探测响应: {} {}", self.url, status);

        if status != StatusCode::OK {
            return Err(PilotError::ProbeStatus(status));
        }
        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_proxy_and_defaults() {
        let cfg = ProbeConfig::builder()
            .proxy("socks5://127.0.0.1:7890".to_string())
            .build();
        let probe = HttpProbe::new(&cfg).unwrap();
        assert_eq!(probe.url.as_str(), "https://www.youtube.com/premium");
    }

    #[test]
    fn rejects_malformed_url() {
        let cfg = ProbeConfig::builder().url("not a url".to_string()).build();
        assert!(matches!(HttpProbe::new(&cfg), Err(PilotError::Url(_))));
    }
}
