use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString, FromRepr};

/// 代理核心的全局运行模式
///
/// 持久化数据中既可写名称 (`"ByRule"`)，也可写序号 (`1`)。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString, FromRepr)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum RoutingMode {
    GlobalDirect = 0,
    ByRule = 1,
    GlobalProxy = 2,
}

impl RoutingMode {
    /// Clash API `PATCH /configs` 中的 mode 取值
    pub fn api_value(self) -> &'static str {
        match self {
            RoutingMode::GlobalDirect => "direct",
            RoutingMode::ByRule => "rule",
            RoutingMode::GlobalProxy => "global",
        }
    }

    /// 通知文案
    pub fn label(self) -> &'static str {
        match self {
            RoutingMode::GlobalDirect => "全局直连",
            RoutingMode::ByRule => "自动分流",
            RoutingMode::GlobalProxy => "全局代理",
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoutingModeRepr {
    Index(u8),
    Name(String),
}

impl<'de> Deserialize<'de> for RoutingMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RoutingModeRepr::deserialize(deserializer)? {
            RoutingModeRepr::Index(i) => RoutingMode::from_repr(i)
                .ok_or_else(|| D::Error::custom(format!("unknown routing mode index {}", i))),
            RoutingModeRepr::Name(name) => name
                .parse()
                .map_err(|_| D::Error::custom(format!("unknown routing mode `{}`", name))),
        }
    }
}

/// 切换后的通知策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum NotificationMode {
    /// 从不通知
    None,
    /// 总是通知
    #[default]
    All,
    /// 仅命中具体网络配置时通知
    #[strum(to_string = "OnMatch", serialize = "Matched")]
    OnMatch,
    /// 仅回退到默认配置时通知
    #[strum(to_string = "OnDefault", serialize = "NotMatched")]
    OnDefault,
}

impl NotificationMode {
    pub fn should_notify(self, source: ProfileSource) -> bool {
        match self {
            NotificationMode::None => false,
            NotificationMode::All => true,
            NotificationMode::OnMatch => source == ProfileSource::Keyed,
            NotificationMode::OnDefault => source == ProfileSource::Default,
        }
    }
}

/// 单个网络下的目标配置，所有字段可缺省
///
/// 新旧键名 (`routingMode`/`runningModel`, `policySelections`/`selectPolicy`) 互为别名，
/// 同一条目中同时出现两种写法会以 `duplicate field` 报错。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, alias = "runningModel", skip_serializing_if = "Option::is_none")]
    pub routing_mode: Option<RoutingMode>,
    /// 策略组名 -> 目标策略名，保持存储顺序
    #[serde(default, alias = "selectPolicy", skip_serializing_if = "Option::is_none")]
    pub policy_selections: Option<IndexMap<String, String>>,
}

impl Profile {
    pub fn with_mode(mode: RoutingMode) -> Self {
        Self {
            routing_mode: Some(mode),
            policy_selections: None,
        }
    }
}

/// 网络标识 -> 配置
pub type ProfileTable = IndexMap<String, Profile>;

/// 配置来源：具体网络条目或默认条目
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileSource {
    Keyed,
    Default,
}

/// 解析后的生效配置
#[derive(Debug, Clone, Copy)]
pub struct ResolvedProfile<'a> {
    pub profile: &'a Profile,
    pub source: ProfileSource,
}

/// 依据网络标识查找配置，未命中时回退到默认条目
pub fn resolve_profile<'a>(
    table: &'a ProfileTable,
    default: &'a Profile,
    network_id: &'a str,
) -> ResolvedProfile<'a> {
    match table.get(network_id) {
        Some(profile) => ResolvedProfile {
            profile,
            source: ProfileSource::Keyed,
        },
        None => ResolvedProfile {
            profile: default,
            source: ProfileSource::Default,
        },
    }
}

/// 通知内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub subtitle: String,
    pub body: String,
}

/// 一次运行结束时交还给宿主的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Completion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl Completion {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn message(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: Some(content.into()),
        }
    }
}
