//! 事件系统定义
//!
//! 用于轮换引擎与 UI 之间的解耦通信

use flume::{Receiver, Sender};

/// 轮换过程事件
#[derive(Debug, Clone)]
pub enum PilotEvent {
    /// 开始轮换
    RotationStarted {
        group: String,
        total: usize,
        target: String,
    },

    /// 已切换到候选节点，准备探测
    CandidateSelected {
        step: usize,
        total: usize,
        name: String,
    },

    /// 探测得到区域
    RegionDetected { name: String, region: String },

    /// 探测失败或超时
    ProbeFailed { name: String, error: String },

    /// 命中目标区域
    Matched { name: String },

    /// 全部未命中，已恢复原节点
    Restored { name: String },
}

/// 事件发送器
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<PilotEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<PilotEvent>) -> Self {
        Self { tx }
    }

    /// 发送事件，接收端关闭时静默丢弃
    pub fn emit(&self, event: PilotEvent) {
        let _ = self.tx.send(event);
    }

    pub fn candidate_selected(&self, step: usize, total: usize, name: &str) {
        self.emit(PilotEvent::CandidateSelected {
            step,
            total,
            name: name.to_string(),
        });
    }

    pub fn probe_failed(&self, name: &str, error: impl ToString) {
        self.emit(PilotEvent::ProbeFailed {
            name: name.to_string(),
            error: error.to_string(),
        });
    }
}

/// 事件接收器
pub struct EventReceiver {
    rx: Receiver<PilotEvent>,
}

impl EventReceiver {
    pub fn new(rx: Receiver<PilotEvent>) -> Self {
        Self { rx }
    }

    /// 非阻塞接收事件
    #[cfg(test)]
    pub fn try_recv(&self) -> Option<PilotEvent> {
        self.rx.try_recv().ok()
    }

    /// 异步接收事件
    pub async fn recv_async(&self) -> Option<PilotEvent> {
        self.rx.recv_async().await.ok()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender::new(tx), EventReceiver::new(rx))
}
