//! 事件系统定义
//!
//! 用于下载引擎 (worker) 与终端 UI 之间的完全解耦通信

use flume::{Receiver, Sender};

use crate::engine::status::RunState;

/// 抓取事件类型
#[derive(Debug, Clone)]
pub enum HarvestEvent {
    /// 运行开始，已确定章节区间
    RunStarted {
        series: String,
        start: u32,
        end: u32,
    },

    /// 发现流程的滚动进度
    DiscoveryProgress { iteration: u32, found: usize },

    /// 发现流程结束
    ChaptersDiscovered { total: usize },

    /// 开始抓取某章
    ChapterStarted {
        number: u32,
        position: usize,
        total: usize,
    },

    /// 章节已落盘
    ChapterSaved { number: u32, title: String },

    /// 章节被跳过 (计入连续失败)
    ChapterSkipped { number: u32, reason: String },

    /// 通知播报文本
    Announcement { message: String },

    /// 运行结束
    RunFinished {
        state: RunState,
        downloaded: usize,
        requested: usize,
    },
}

/// 事件发送器
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<HarvestEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<HarvestEvent>) -> Self {
        Self { tx }
    }

    /// 发送事件；接收端已关闭时静默丢弃
    pub fn emit(&self, event: HarvestEvent) {
        let _ = self.tx.send(event);
    }

    pub fn chapter_saved(&self, number: u32, title: &str) {
        self.emit(HarvestEvent::ChapterSaved {
            number,
            title: title.to_string(),
        });
    }

    pub fn chapter_skipped(&self, number: u32, reason: impl Into<String>) {
        self.emit(HarvestEvent::ChapterSkipped {
            number,
            reason: reason.into(),
        });
    }
}

/// 事件接收器
pub struct EventReceiver {
    rx: Receiver<HarvestEvent>,
}

impl EventReceiver {
    pub fn new(rx: Receiver<HarvestEvent>) -> Self {
        Self { rx }
    }

    /// 非阻塞接收事件
    pub fn try_recv(&self) -> Option<HarvestEvent> {
        self.rx.try_recv().ok()
    }

    /// 异步接收事件
    pub async fn recv_async(&self) -> Option<HarvestEvent> {
        self.rx.recv_async().await.ok()
    }

    /// 取出当前已缓冲的全部事件
    pub fn drain(&self) -> Vec<HarvestEvent> {
        self.rx.try_iter().collect()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender::new(tx), EventReceiver::new(rx))
}
