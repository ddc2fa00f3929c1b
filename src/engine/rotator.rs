//! 节点区域轮换 (Region Rotator)
//!
//! 依次切换策略组成员并探测出口区域，直到命中目标区域或遍历完一整轮。
//! 同一时刻只有一个探测在途，保证每次探测都反映刚选中的节点。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::error::{PilotError, Result};
use crate::core::event::{EventSender, PilotEvent};
use crate::core::model::Completion;
use crate::engine::region::RegionDetector;
use crate::interfaces::{PolicyControl, RegionProbe};

const COMPLETION_TITLE: &str = "节点区域切换";

/// 一次轮换的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationOutcome {
    pub group: String,
    /// 结束时策略组的选中成员
    pub selection: String,
    pub matched: bool,
    /// 实际发出的探测次数
    pub probes: usize,
    /// 被中断信号提前终止
    pub interrupted: bool,
}

impl RotationOutcome {
    pub fn completion(&self) -> Completion {
        Completion::message(COMPLETION_TITLE, format!("当前节点: {}", self.selection))
    }
}

/// 起始偏移：当前选中成员的位置，找不到时为 0
pub fn start_offset(members: &[String], active: &str) -> usize {
    members.iter().position(|m| m == active).unwrap_or(0)
}

/// 从 `start` 开始循环遍历一整轮
pub fn rotation_order(members: &[String], start: usize) -> impl Iterator<Item = &String> {
    let len = members.len();
    (0..len).map(move |i| &members[(start + i) % len])
}

enum Attempt {
    Finished(Result<String>),
    Cancelled,
}

pub struct RegionRotator {
    control: Arc<dyn PolicyControl>,
    probe: Arc<dyn RegionProbe>,
    detector: RegionDetector,
    timeout: Duration,
    events: Option<EventSender>,
    shutdown: CancellationToken,
}

impl RegionRotator {
    pub fn new(
        control: Arc<dyn PolicyControl>,
        probe: Arc<dyn RegionProbe>,
        detector: RegionDetector,
        timeout: Duration,
    ) -> Self {
        Self {
            control,
            probe,
            detector,
            timeout,
            events: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// 设置事件发送器
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// 设置中断令牌
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn emit(&self, event: PilotEvent) {
        if let Some(ref sender) = self.events {
            sender.emit(event);
        }
    }

    async fn probe_region(&self) -> Result<String> {
        let body = self.probe.fetch().await?;
        Ok(self.detector.detect(&body))
    }

    /// 轮换策略组直到出口区域等于 `target`
    ///
    /// 未命中 (或被中断) 时恢复到开始时的选中成员；恢复失败时结果报告宿主实际选中的成员。
    pub async fn rotate(&self, group: &str, target: &str) -> Result<RotationOutcome> {
        let members = self.control.group_members(group).await?;
        let original = self.control.active_selection(group).await?;
        let target = target.to_uppercase();

        let mut outcome = RotationOutcome {
            group: group.to_string(),
            selection: original.clone(),
            matched: false,
            probes: 0,
            interrupted: false,
        };

        if members.is_empty() {
            warn!("策略组 {} 没有可用成员", group);
            return Ok(outcome);
        }

        let start = start_offset(&members, &original);
        let mut last_selected: Option<String> = None;
        let total = members.len();
        info!("开始轮换策略组 {} ({} 个成员, 目标区域 {})", group, total, target);
        self.emit(PilotEvent::RotationStarted {
            group: group.to_string(),
            total,
            target: target.clone(),
        });

        for (step, candidate) in rotation_order(&members, start).enumerate() {
            if self.shutdown.is_cancelled() {
                outcome.interrupted = true;
                break;
            }

            if let Some(ref events) = self.events {
                events.candidate_selected(step + 1, total, candidate);
            }
            if let Err(e) = self.control.select(group, candidate).await {
                warn!("切换到 {} 失败: {}", candidate, e);
                if let Some(ref events) = self.events {
                    events.probe_failed(candidate, &e);
                }
                continue;
            }
            last_selected = Some(candidate.clone());

            outcome.probes += 1;
            let attempt = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Attempt::Cancelled,
                res = timeout(self.timeout, self.probe_region()) => {
                    Attempt::Finished(res.unwrap_or_else(|_| Err(PilotError::ProbeTimeout(self.timeout))))
                }
            };

            match attempt {
                Attempt::Cancelled => {
                    warn!("轮换被中断");
                    outcome.interrupted = true;
                    break;
                }
                Attempt::Finished(Ok(region)) => {
                    info!("节点 {} 区域: {}", candidate, region);
                    self.emit(PilotEvent::RegionDetected {
                        name: candidate.clone(),
                        region: region.clone(),
                    });
                    if region == target {
                        self.emit(PilotEvent::Matched {
                            name: candidate.clone(),
                        });
                        outcome.selection = candidate.clone();
                        outcome.matched = true;
                        return Ok(outcome);
                    }
                }
                Attempt::Finished(Err(e)) if e.is_recoverable() => {
                    warn!("节点 {} 探测失败: {}", candidate, e);
                    if let Some(ref events) = self.events {
                        events.probe_failed(candidate, &e);
                    }
                }
                Attempt::Finished(Err(e)) => {
                    error!("节点 {} 探测异常: {}", candidate, e);
                    if let Some(ref events) = self.events {
                        events.probe_failed(candidate, &e);
                    }
                }
            }
        }

        debug!("未找到区域为 {} 的节点，恢复原节点 {}", target, original);
        match self.control.select(group, &original).await {
            Ok(()) => self.emit(PilotEvent::Restored {
                name: original.clone(),
            }),
            Err(e) => {
                error!("恢复原节点 {} 失败: {}", original, e);
                // 以宿主实际选中的成员作为结果
                outcome.selection = match self.control.active_selection(group).await {
                    Ok(active) => active,
                    Err(e) => {
                        warn!("查询当前节点失败: {}", e);
                        last_selected.unwrap_or(original)
                    }
                };
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;

    use super::*;
    use crate::core::config::RegionConfig;
    use crate::core::event::create_event_channel;

    #[derive(Clone, Copy)]
    enum Node {
        Region(&'static str),
        Status(u16),
        Hang,
    }

    /// 内存中的策略组，探测结果取决于当前选中节点
    struct FakeGroup {
        members: Vec<String>,
        active: Mutex<String>,
        nodes: HashMap<String, Node>,
        history: Mutex<Vec<String>>,
        fetches: AtomicUsize,
        broken: Option<String>,
    }

    impl FakeGroup {
        fn new(nodes: &[(&str, Node)], active: &str) -> Arc<Self> {
            Arc::new(Self {
                members: nodes.iter().map(|(n, _)| n.to_string()).collect(),
                active: Mutex::new(active.to_string()),
                nodes: nodes.iter().map(|(n, b)| (n.to_string(), *b)).collect(),
                history: Mutex::new(Vec::new()),
                fetches: AtomicUsize::new(0),
                broken: None,
            })
        }

        fn active(&self) -> String {
            self.active.lock().clone()
        }

        fn history(&self) -> Vec<String> {
            self.history.lock().clone()
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PolicyControl for FakeGroup {
        async fn group_members(&self, group: &str) -> Result<Vec<String>> {
            if group != "Proxy" {
                return Err(PilotError::UnknownGroup(group.to_string()));
            }
            Ok(self.members.clone())
        }

        async fn active_selection(&self, _group: &str) -> Result<String> {
            Ok(self.active())
        }

        async fn select(&self, _group: &str, policy: &str) -> Result<()> {
            if self.broken.as_deref() == Some(policy) {
                return Err(PilotError::Custom("switch rejected".into()));
            }
            self.history.lock().push(policy.to_string());
            *self.active.lock() = policy.to_string();
            Ok(())
        }
    }

    #[async_trait]
    impl RegionProbe for FakeGroup {
        async fn fetch(&self) -> Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.nodes[&self.active()] {
                Node::Region(code) => Ok(format!(r#"{{"countryCode":"{}"}}"#, code)),
                Node::Status(code) => Err(PilotError::ProbeStatus(StatusCode::from_u16(code).unwrap())),
                Node::Hang => std::future::pending().await,
            }
        }
    }

    fn rotator(host: &Arc<FakeGroup>) -> RegionRotator {
        RegionRotator::new(
            host.clone(),
            host.clone(),
            RegionDetector::new(&RegionConfig::default()).unwrap(),
            Duration::from_millis(3000),
        )
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn offset_is_position_of_active_member() {
        let members = names(&["a", "b", "c"]);
        assert_eq!(start_offset(&members, "a"), 0);
        assert_eq!(start_offset(&members, "c"), 2);
        assert_eq!(start_offset(&members, "zz"), 0);
        assert_eq!(start_offset(&[], "a"), 0);
    }

    #[test]
    fn order_wraps_once_through_all_members() {
        let members = names(&["a", "b", "c", "d"]);
        let order: Vec<_> = rotation_order(&members, 2).cloned().collect();
        assert_eq!(order, names(&["c", "d", "a", "b"]));
        assert_eq!(rotation_order(&[], 0).count(), 0);
    }

    #[tokio::test]
    async fn active_member_matching_stops_after_one_probe() {
        let host = FakeGroup::new(
            &[("a", Node::Region("US")), ("b", Node::Region("CN")), ("c", Node::Region("US"))],
            "b",
        );

        let outcome = rotator(&host).rotate("Proxy", "CN").await.unwrap();

        assert!(outcome.matched);
        assert_eq!(outcome.selection, "b");
        assert_eq!(outcome.probes, 1);
        assert_eq!(host.fetches(), 1);
        assert_eq!(host.active(), "b");
        assert_eq!(outcome.completion().content.as_deref(), Some("当前节点: b"));
    }

    #[tokio::test]
    async fn no_match_restores_original_selection() {
        let host = FakeGroup::new(
            &[("a", Node::Region("US")), ("b", Node::Region("US")), ("c", Node::Region("US"))],
            "b",
        );

        let outcome = rotator(&host).rotate("Proxy", "CN").await.unwrap();

        assert!(!outcome.matched);
        assert_eq!(outcome.probes, 3);
        assert_eq!(outcome.selection, "b");
        assert_eq!(host.active(), "b");
        assert_eq!(host.history(), names(&["b", "c", "a", "b"]));
    }

    #[tokio::test]
    async fn match_later_in_cycle_stays_selected() {
        let host = FakeGroup::new(
            &[("a", Node::Region("CN")), ("b", Node::Region("US")), ("c", Node::Region("US"))],
            "b",
        );

        let outcome = rotator(&host).rotate("Proxy", "cn").await.unwrap();

        assert!(outcome.matched);
        assert_eq!(outcome.selection, "a");
        assert_eq!(host.history(), names(&["b", "c", "a"]));
        assert_eq!(host.active(), "a");
    }

    #[tokio::test]
    async fn unknown_active_member_starts_from_first() {
        let host = FakeGroup::new(&[("a", Node::Region("US")), ("b", Node::Region("US"))], "gone");

        let outcome = rotator(&host).rotate("Proxy", "CN").await.unwrap();

        assert_eq!(host.history(), names(&["a", "b", "gone"]));
        assert_eq!(outcome.selection, "gone");
    }

    #[tokio::test]
    async fn failed_probe_moves_to_next_candidate() {
        let host = FakeGroup::new(
            &[("a", Node::Region("US")), ("b", Node::Status(503)), ("c", Node::Region("CN"))],
            "b",
        );

        let outcome = rotator(&host).rotate("Proxy", "CN").await.unwrap();

        assert!(outcome.matched);
        assert_eq!(outcome.selection, "c");
        assert_eq!(outcome.probes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_probe_moves_to_next_candidate() {
        let host = FakeGroup::new(
            &[("a", Node::Region("US")), ("b", Node::Hang), ("c", Node::Region("CN"))],
            "b",
        );
        let (events, receiver) = create_event_channel();

        let outcome = rotator(&host).with_events(events).rotate("Proxy", "CN").await.unwrap();

        assert!(outcome.matched);
        assert_eq!(outcome.selection, "c");

        let mut failures = Vec::new();
        while let Some(event) = receiver.try_recv() {
            if let PilotEvent::ProbeFailed { name, error } = event {
                failures.push((name, error));
            }
        }
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "b");
        assert!(failures[0].1.contains("timed out"));
    }

    #[tokio::test]
    async fn rejected_switch_skips_candidate_without_probing() {
        let mut group = Arc::try_unwrap(FakeGroup::new(
            &[("a", Node::Region("CN")), ("b", Node::Region("US")), ("c", Node::Region("CN"))],
            "b",
        ))
        .ok()
        .unwrap();
        group.broken = Some("c".into());
        let host = Arc::new(group);

        let outcome = rotator(&host).rotate("Proxy", "CN").await.unwrap();

        assert_eq!(outcome.selection, "a");
        assert_eq!(outcome.probes, 2);
    }

    #[tokio::test]
    async fn failed_restore_still_reports_actual_selection() {
        let mut group = Arc::try_unwrap(FakeGroup::new(
            &[("a", Node::Region("US")), ("b", Node::Region("US")), ("c", Node::Region("US"))],
            "b",
        ))
        .ok()
        .unwrap();
        group.broken = Some("b".into());
        let host = Arc::new(group);

        let outcome = rotator(&host).rotate("Proxy", "CN").await.unwrap();

        assert!(!outcome.matched);
        assert_eq!(outcome.probes, 2);
        assert_eq!(host.active(), "a");
        assert_eq!(outcome.selection, "a");
        assert_eq!(outcome.completion().content.as_deref(), Some("当前节点: a"));
    }

    #[tokio::test]
    async fn empty_group_reports_without_probing() {
        let host = FakeGroup::new(&[], "");

        let outcome = rotator(&host).rotate("Proxy", "CN").await.unwrap();

        assert!(!outcome.matched);
        assert_eq!(outcome.probes, 0);
        assert!(host.history().is_empty());
    }

    #[tokio::test]
    async fn unknown_group_is_fatal() {
        let host = FakeGroup::new(&[("a", Node::Region("US"))], "a");
        let err = rotator(&host).rotate("Missing", "CN").await.unwrap_err();
        assert!(matches!(err, PilotError::UnknownGroup(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_restores_original_selection() {
        let host = FakeGroup::new(
            &[("a", Node::Region("CN")), ("b", Node::Region("US")), ("c", Node::Hang)],
            "b",
        );
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1000)).await;
            trigger.cancel();
        });

        let outcome = rotator(&host)
            .with_shutdown(shutdown)
            .rotate("Proxy", "CN")
            .await
            .unwrap();

        assert!(outcome.interrupted);
        assert!(!outcome.matched);
        assert_eq!(outcome.probes, 2);
        assert_eq!(host.active(), "b");
        assert_eq!(host.history(), names(&["b", "c", "b"]));
    }
}
