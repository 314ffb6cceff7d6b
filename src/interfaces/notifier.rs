//! 通知协作方
//!
//! 播报失败不得影响下载流程，因此接口不返回错误。

/// 下载进度与完成通知
pub trait Notifier: Send + Sync {
    /// 已成功下载 `downloaded` 章
    fn announce_progress(&self, downloaded: usize);

    /// 运行结束
    fn announce_completion(&self, downloaded: usize, requested: usize, success: bool);
}

/// 不做任何播报
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn announce_progress(&self, _downloaded: usize) {}

    fn announce_completion(&self, _downloaded: usize, _requested: usize, _success: bool) {}
}
