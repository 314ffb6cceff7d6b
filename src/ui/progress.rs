//! 终端进度渲染 (Terminal UI Progress)
//!
//! 基于 `indicatif` 消费下载事件：发现阶段显示 spinner，下载阶段显示章节进度条。

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::event::{EventReceiver, HarvestEvent};
use crate::engine::status::RunState;

static MULTI: OnceLock<MultiProgress> = OnceLock::new();

/// 全局进度容器
pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

#[derive(Default)]
struct UiState {
    main_bar: Option<ProgressBar>,
    chapter_bar: Option<ProgressBar>,
}

static STATE: OnceLock<Arc<RwLock<UiState>>> = OnceLock::new();

fn get_state() -> &'static Arc<RwLock<UiState>> {
    STATE.get_or_init(|| Arc::new(RwLock::new(UiState::default())))
}

pub struct Ui;

impl Ui {
    /// 启动事件监听循环，发送端全部释放后退出
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(event);
            }
        })
    }

    fn spinner(message: String) -> ProgressBar {
        let bar = get_multi().add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] {msg}") {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        bar.set_message(message);
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    fn handle_event(event: HarvestEvent) {
        let mut ui = get_state().write();

        match event {
            HarvestEvent::DiscoveryProgress { iteration, found } => {
                let bar = ui
                    .main_bar
                    .get_or_insert_with(|| Self::spinner("🔍 Discovering chapters".into()));
                bar.set_message(format!("🔍 Scroll #{}: {} chapters seen", iteration, found));
            }
            HarvestEvent::ChaptersDiscovered { total } => {
                let bar = ui
                    .main_bar
                    .get_or_insert_with(|| Self::spinner(String::new()));
                bar.set_message(format!("📑 {} chapters listed", total));
            }
            HarvestEvent::RunStarted { series, start, end } => {
                if let Some(bar) = ui.main_bar.take() {
                    bar.finish_and_clear();
                }
                ui.main_bar = Some(Self::spinner(format!("📚 {} #{}-#{}", series, start, end)));

                let total = u64::from(end.saturating_sub(start)) + 1;
                let bar = get_multi().add(ProgressBar::new(total));
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                {
                    bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏  "));
                }
                ui.chapter_bar = Some(bar);
            }
            HarvestEvent::ChapterStarted { number, position, .. } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.set_position(position.saturating_sub(1) as u64);
                    bar.set_message(format!("#{}", number));
                }
            }
            HarvestEvent::ChapterSaved { title, .. } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.inc(1);
                    bar.set_message(truncate_string(&title, 30));
                }
            }
            HarvestEvent::ChapterSkipped { number, .. } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.inc(1);
                    bar.set_message(format!("⚠️ #{} skipped", number));
                }
            }
            HarvestEvent::Announcement { message } => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!("📣 {}", truncate_string(&message, 60)));
                }
            }
            HarvestEvent::RunFinished {
                state,
                downloaded,
                requested,
            } => {
                let summary = format!("{}/{} chapters", downloaded, requested);
                if let Some(bar) = ui.chapter_bar.take() {
                    bar.finish_with_message(summary.clone());
                }
                if let Some(bar) = ui.main_bar.take() {
                    match state {
                        RunState::Error(e) => bar.abandon_with_message(format!("❌ FAILED: {}", e)),
                        RunState::StoppedByUser => bar.abandon_with_message(format!("⏹ STOPPED: {}", summary)),
                        other => bar.finish_with_message(format!("✅ {}: {}", other, summary)),
                    }
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
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
