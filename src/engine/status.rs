//! 运行状态协调 (Run Control)
//!
//! 利用 `tokio::sync::watch` 广播运行状态，配合取消令牌实现协作式停止。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// 运行状态
///
/// `Idle → Running → 终态`，终态之间不再转换。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    StoppedByUser,
    StoppedOnFailureThreshold,
    Error(String),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Idle | RunState::Running)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Running => write!(f, "Running"),
            RunState::Completed => write!(f, "Completed"),
            RunState::StoppedByUser => write!(f, "StoppedByUser"),
            RunState::StoppedOnFailureThreshold => write!(f, "StoppedOnFailureThreshold"),
            RunState::Error(e) => write!(f, "Error({})", e),
        }
    }
}

/// 运行控制句柄，可在 UI 与 worker 之间克隆共享
#[derive(Clone)]
pub struct RunControl {
    state_tx: Arc<watch::Sender<RunState>>,
    state_rx: watch::Receiver<RunState>,
    cancel: CancellationToken,
    downloaded: Arc<AtomicUsize>,
    attempted: Arc<AtomicUsize>,
}

impl RunControl {
    pub fn new() -> Self {
        let (state_tx, state_rx) = watch::channel(RunState::Idle);
        Self {
            state_tx: Arc::new(state_tx),
            state_rx,
            cancel: CancellationToken::new(),
            downloaded: Arc::new(AtomicUsize::new(0)),
            attempted: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn state(&self) -> RunState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state_rx.clone()
    }

    /// `Idle → Running`；其他状态下返回 `false`
    pub fn start(&self) -> bool {
        self.transition(|s| matches!(s, RunState::Idle), RunState::Running)
    }

    /// 进入终态；已在终态或尚未开始时返回 `false`
    pub fn finish(&self, state: RunState) -> bool {
        if !state.is_terminal() {
            return false;
        }
        self.transition(|s| matches!(s, RunState::Running), state)
    }

    fn transition(&self, allowed: impl Fn(&RunState) -> bool, next: RunState) -> bool {
        let mut changed = false;
        self.state_tx.send_if_modified(|current| {
            if allowed(current) {
                *current = next.clone();
                changed = true;
            }
            changed
        });
        if changed {
            info!("RunControl: State change -> {}", next);
        }
        changed
    }

    /// 请求停止；在下一个章节边界生效
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn record_attempt(&self) -> usize {
        self.attempted.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_download(&self) -> usize {
        self.downloaded.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn attempted(&self) -> usize {
        self.attempted.load(Ordering::Relaxed)
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_never_returns_to_running() {
        let control = RunControl::new();
        assert!(!control.finish(RunState::Completed));
        assert!(control.start());
        assert!(!control.start());
        assert!(!control.finish(RunState::Running));
        assert!(control.finish(RunState::StoppedByUser));
        assert!(!control.finish(RunState::Completed));
        assert!(!control.start());
        assert_eq!(control.state(), RunState::StoppedByUser);
    }

    #[tokio::test]
    async fn subscribers_see_transitions() {
        let control = RunControl::new();
        let mut rx = control.subscribe();
        control.start();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), RunState::Running);
    }

    #[test]
    fn clones_share_cancellation_and_counters() {
        let control = RunControl::new();
        let worker = control.clone();
        control.cancel();
        assert!(worker.is_cancelled());
        worker.record_download();
        assert_eq!(control.downloaded(), 1);
    }
}
