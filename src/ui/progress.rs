//! 终端进度渲染 (Terminal UI Progress)
//!
//! 基于 `indicatif` 渲染轮换进度，日志经由同一个 `MultiProgress` 输出以免破坏进度条。

use std::sync::OnceLock;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;

use crate::core::event::{EventReceiver, PilotEvent};

/// 全局 TUI 容器 (Singleton)
static MULTI: OnceLock<MultiProgress> = OnceLock::new();

/// 获取全局进度容器实例
pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

/// 进度协调器 (Progress Orchestrator)
pub struct Ui;

impl Ui {
    /// 启动事件监听循环，发送端全部释放后结束
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut bar = None;
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(&mut bar, event);
            }
            if let Some(bar) = bar.take() {
                if !bar.is_finished() {
                    bar.finish_and_clear();
                }
            }
        })
    }

    fn handle_event(bar: &mut Option<ProgressBar>, event: PilotEvent) {
        match event {
            PilotEvent::RotationStarted { group, total, target } => {
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {prefix} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  ")
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

                let pb = get_multi().add(ProgressBar::new(total as u64));
                pb.set_style(style);
                pb.set_prefix(format!("{} ⇒ {}", truncate_string(&group, 20), target));
                pb.enable_steady_tick(Duration::from_millis(100));
                *bar = Some(pb);
            }
            PilotEvent::CandidateSelected { step, total, name } => {
                if let Some(pb) = bar {
                    pb.set_length(total as u64);
                    pb.set_position(step.saturating_sub(1) as u64);
                    pb.set_message(format!("🔍 {}", truncate_string(&name, 30)));
                }
            }
            PilotEvent::RegionDetected { name, region } => {
                if let Some(pb) = bar {
                    pb.set_message(format!("🌐 {} -> {}", truncate_string(&name, 30), region));
                }
            }
            PilotEvent::ProbeFailed { name, error } => {
                if let Some(pb) = bar {
                    pb.set_message(format!("⚠️ {}: {}", truncate_string(&name, 30), error));
                }
            }
            PilotEvent::Matched { name } => {
                if let Some(pb) = bar {
                    pb.finish_with_message(format!("✅ {}", name));
                }
            }
            PilotEvent::Restored { name } => {
                if let Some(pb) = bar {
                    pb.abandon_with_message(format!("↩️ 已恢复 {}", name));
                }
            }
        }
    }
}

/// 按字符截断
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
