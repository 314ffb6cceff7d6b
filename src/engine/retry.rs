//! 章节级重试策略
//!
//! 仅对瞬时渲染错误重试；内容不足或章节缺失直接交给调度器计入失败。

use std::time::Duration;

use crate::core::config::{Backoff, RetryConfig};
use crate::core::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff,
        }
    }

    /// 不重试
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
        }
    }

    /// 第 `attempt` 次 (1 起) 失败后是否再试
    pub fn should_retry(&self, attempt: u32, err: &HarvestError) -> bool {
        attempt < self.max_attempts && err.is_retryable()
    }

    /// 第 `attempt` 次失败后的等待时长
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let ms = match self.backoff {
            Backoff::None => 0,
            Backoff::Fixed { ms } => ms,
            Backoff::Linear { ms } => ms.saturating_mul(attempt as u64),
            Backoff::Exponential { base_ms, max_ms } => {
                let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
                base_ms.saturating_mul(factor).min(max_ms)
            }
        };
        Duration::from_millis(ms)
    }
}
