//! 运行播报 (Announcer)
//!
//! 生成面向用户的进度/完成文本，并同时写入日志与事件通道。

use chrono::{Local, Timelike};
use tracing::info;

use crate::core::config::NotifyConfig;
use crate::core::event::{EventSender, HarvestEvent};
use crate::interfaces::notifier::Notifier;

pub struct Announcer {
    config: NotifyConfig,
    events: Option<EventSender>,
}

impl Announcer {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    fn publish(&self, message: String) {
        if !self.config.enabled {
            return;
        }
        info!("📣 {}", message);
        if let Some(events) = &self.events {
            events.emit(HarvestEvent::Announcement { message });
        }
    }
}

impl Notifier for Announcer {
    fn announce_progress(&self, downloaded: usize) {
        self.publish(progress_message(downloaded));
    }

    fn announce_completion(&self, downloaded: usize, requested: usize, success: bool) {
        let message = completion_message(downloaded, requested, success);
        let message = if self.config.greeting {
            format!("{}{}", greeting(Local::now().hour()), message)
        } else {
            message
        };
        self.publish(message);
    }
}

pub fn progress_message(downloaded: usize) -> String {
    format!(
        "Progress update: I have successfully downloaded {} chapters so far.",
        downloaded
    )
}

pub fn completion_message(downloaded: usize, requested: usize, success: bool) -> String {
    if success && downloaded > 0 {
        if downloaded == requested {
            format!(
                "Download completed successfully! I have downloaded all {} chapters as requested.",
                downloaded
            )
        } else {
            format!(
                "Download completed! I have downloaded {} out of {} requested chapters.",
                downloaded, requested
            )
        }
    } else if downloaded == 0 {
        "Download failed. No chapters were downloaded. Please check for errors.".to_string()
    } else {
        format!(
            "Download partially completed. I downloaded {} chapters, but some failed.",
            downloaded
        )
    }
}

/// 按本地时段生成问候语
pub fn greeting(hour: u32) -> &'static str {
    match hour {
        5..=11 => "Good morning! ",
        12..=16 => "Good afternoon! ",
        17..=20 => "Good evening! ",
        _ => "Hello! ",
    }
}
