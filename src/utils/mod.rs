use tokio_util::sync::CancellationToken;
use url::Url;

use crate::core::config::DelayRange;

/// 将相对链接转换为绝对 URL
pub fn to_absolute_url(base: &Url, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }

    if let Some(path_without_slashes) = href.strip_prefix("//") {
        return format!("{}://{}", base.scheme(), path_without_slashes);
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// 在区间内随机等待
pub async fn pause(range: DelayRange) {
    if range.is_zero() {
        return;
    }
    tokio::time::sleep(range.sample()).await;
}

/// 可被取消的随机等待；被取消时返回 `false`
pub async fn pause_or_cancel(range: DelayRange, cancel: &CancellationToken) -> bool {
    if range.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(range.sample()) => true,
        _ = cancel.cancelled() => false,
    }
}
