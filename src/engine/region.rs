//! 区域识别 (Region Detection)
//!
//! 从探测响应正文推断出口节点所在区域。

use regex::Regex;

use crate::core::config::RegionConfig;
use crate::core::error::{PilotError, Result};

pub struct RegionDetector {
    unavailable_marker: String,
    landing_host: String,
    landing_region: String,
    fallback_region: String,
    country_code: Regex,
}

impl RegionDetector {
    pub fn new(config: &RegionConfig) -> Result<Self> {
        let country_code = Regex::new(r#""countryCode":"(.*?)""#)
            .map_err(|e| PilotError::Custom(format!("invalid countryCode pattern: {}", e)))?;

        Ok(Self {
            unavailable_marker: config.unavailable_marker.clone(),
            landing_host: config.landing_host.clone(),
            landing_region: config.landing_region.to_uppercase(),
            fallback_region: config.fallback_region.to_uppercase(),
            country_code,
        })
    }

    /// 返回大写区域码，从不因字段缺失而失败
    pub fn detect(&self, body: &str) -> String {
        // 不可用页面往往不带 countryCode，直接按落地页判定
        if body.contains(&self.unavailable_marker) && body.contains(&self.landing_host) {
            return self.landing_region.clone();
        }

        self.country_code
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_else(|| self.fallback_region.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> RegionDetector {
        RegionDetector::new(&RegionConfig::default()).unwrap()
    }

    #[test]
    fn blocked_page_short_circuits_to_landing_region() {
        let body = r#"<html>Premium is not available in your country. <a href="https://www.google.cn">home</a> "countryCode":"FR"</html>"#;
        assert_eq!(detector().detect(body), "CN");
    }

    #[test]
    fn marker_without_landing_host_reads_country_code() {
        let body = r#"Premium is not available in your country {"countryCode":"RU"}"#;
        assert_eq!(detector().detect(body), "RU");
    }

    #[test]
    fn country_code_field_is_used() {
        assert_eq!(detector().detect(r#"{"a":1,"countryCode":"FR","b":2}"#), "FR");
    }

    #[test]
    fn first_country_code_wins_and_is_uppercased() {
        assert_eq!(detector().detect(r#""countryCode":"jp" ... "countryCode":"KR""#), "JP");
    }

    #[test]
    fn no_marker_falls_back() {
        assert_eq!(detector().detect("<html>welcome</html>"), "US");
        assert_eq!(detector().detect(""), "US");
    }

    #[test]
    fn custom_rules() {
        let cfg = RegionConfig::builder()
            .unavailable_marker("blocked".to_string())
            .landing_host("example.hk".to_string())
            .landing_region("hk".to_string())
            .fallback_region("sg".to_string())
            .build();
        let d = RegionDetector::new(&cfg).unwrap();
        assert_eq!(d.detect("blocked, see example.hk"), "HK");
        assert_eq!(d.detect("nothing here"), "SG");
    }
}
