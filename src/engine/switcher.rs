//! 网络配置切换 (Network Profile Switcher)
//!
//! 依据当前网络标识选择配置条目，应用运行模式与策略组选择，并按通知策略决定是否提醒。

use std::fmt::Write as _;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::core::error::{PilotError, Result};
use crate::core::model::{
    Notification, NotificationMode, Profile, ProfileSource, ProfileTable, RoutingMode,
    resolve_profile,
};
use crate::interfaces::{Notifier, PolicyControl, RoutingControl};
use crate::utils::store::PrefixedStore;

pub const NOTIFICATION_MODE_KEY: &str = "notificationMode";
pub const DEFAULT_MODEL_KEY: &str = "defaultModel";
pub const MODEL_LIST_KEY: &str = "modelList";

const NOTIFICATION_TITLE: &str = "网络变化";

/// 从存储读取的切换设置 (只读)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitcherSettings {
    pub notification_mode: NotificationMode,
    pub default_profile: Profile,
    pub profiles: ProfileTable,
}

impl Default for SwitcherSettings {
    fn default() -> Self {
        Self {
            notification_mode: NotificationMode::All,
            default_profile: Profile::with_mode(RoutingMode::ByRule),
            profiles: ProfileTable::new(),
        }
    }
}

impl SwitcherSettings {
    /// 读取三项持久化设置，缺失项使用默认值，格式错误直接返回错误
    pub fn load(store: &PrefixedStore<'_>) -> Result<Self> {
        let defaults = Self::default();

        let notification_mode: NotificationMode = match store.get(NOTIFICATION_MODE_KEY)? {
            Some(name) => name.trim().parse().map_err(|_| PilotError::UnknownVariant {
                kind: NOTIFICATION_MODE_KEY,
                value: name.clone(),
            })?,
            None => defaults.notification_mode,
        };
        let default_profile: Profile = store
            .get_json(DEFAULT_MODEL_KEY)?
            .unwrap_or(defaults.default_profile);
        let profiles: ProfileTable = store
            .get_json::<IndexMap<String, Option<Profile>>>(MODEL_LIST_KEY)?
            .map(drop_null_entries)
            .unwrap_or_default();

        Ok(Self {
            notification_mode,
            default_profile,
            profiles,
        })
    }
}

/// 值为 null 的条目等同于未配置，查找时回退到默认条目
fn drop_null_entries(raw: IndexMap<String, Option<Profile>>) -> ProfileTable {
    raw.into_iter()
        .filter_map(|(network, profile)| profile.map(|p| (network, p)))
        .collect()
}

/// 写入前校验设置项，避免切换时才发现格式错误
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    match key {
        NOTIFICATION_MODE_KEY => {
            value
                .trim()
                .parse::<NotificationMode>()
                .map_err(|_| PilotError::UnknownVariant {
                    kind: NOTIFICATION_MODE_KEY,
                    value: value.to_string(),
                })?;
        }
        DEFAULT_MODEL_KEY => {
            serde_json::from_str::<Profile>(value)?;
        }
        MODEL_LIST_KEY => {
            serde_json::from_str::<IndexMap<String, Option<Profile>>>(value)?;
        }
        _ => {}
    }
    Ok(())
}

/// 一次切换的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedProfile {
    pub network_id: String,
    pub source: ProfileSource,
    pub routing_mode: Option<RoutingMode>,
    pub selections: Vec<(String, String)>,
    /// 宿主拒绝的操作数
    pub failures: usize,
    /// 人类可读的变更描述
    pub summary: String,
    pub notified: bool,
}

pub struct ProfileSwitcher {
    control: Arc<dyn PolicyControl>,
    routing: Arc<dyn RoutingControl>,
    notifier: Arc<dyn Notifier>,
}

impl ProfileSwitcher {
    pub fn new(
        control: Arc<dyn PolicyControl>,
        routing: Arc<dyn RoutingControl>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            control,
            routing,
            notifier,
        }
    }

    /// 应用 `network_id` 对应的配置，未命中时应用默认条目
    ///
    /// 各字段独立生效；单项操作失败只记录，不影响其余字段。
    pub async fn apply(&self, settings: &SwitcherSettings, network_id: &str) -> Result<AppliedProfile> {
        let resolved = resolve_profile(&settings.profiles, &settings.default_profile, network_id);
        let profile = resolved.profile;
        debug!("网络 {} 使用 {:?} 配置", network_id, resolved.source);

        let mut summary = String::new();
        let mut failures = 0;

        if let Some(mode) = profile.routing_mode {
            let _ = writeln!(summary, "运行模式 -> {}", mode.label());
            if let Err(e) = self.routing.set_routing_mode(mode).await {
                warn!("设置运行模式 {} 失败: {}", mode, e);
                failures += 1;
            }
        }

        let mut selections = Vec::new();
        if let Some(policies) = &profile.policy_selections {
            summary.push_str("策略组变更:\n");
            for (group, policy) in policies {
                let _ = writeln!(summary, "{} -> {}", group, policy);
                if let Err(e) = self.control.select(group, policy).await {
                    warn!("策略组 {} 切换到 {} 失败: {}", group, policy, e);
                    failures += 1;
                }
                selections.push((group.clone(), policy.clone()));
            }
        }

        let mut notified = false;
        if settings.notification_mode.should_notify(resolved.source) {
            let notification = Notification {
                title: NOTIFICATION_TITLE.to_string(),
                subtitle: format!("网络已切换到：{}", network_id),
                body: summary.clone(),
            };
            match self.notifier.post(&notification).await {
                Ok(()) => notified = true,
                Err(e) => warn!("发送通知失败: {}", e),
            }
        }

        info!("网络 {} 的配置已应用", network_id);
        Ok(AppliedProfile {
            network_id: network_id.to_string(),
            source: resolved.source,
            routing_mode: profile.routing_mode,
            selections,
            failures,
            summary,
            notified,
        })
    }
}
