//! 错误处理体系 (Error Handling System)
//!
//! 定义抓取流程中的错误分类、可重试判定以及全局 Result 别名。

use thiserror::Error;

/// 全局错误定义 (Harvest Domain Errors)
#[derive(Error, Debug)]
pub enum HarvestError {
    /// 无法建立页面会话，整个运行随之终止
    #[error("Renderer unavailable: {0}")]
    RendererUnavailable(String),

    /// 会话已建立，但单次渲染操作失败 (导航、脚本执行等)
    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// 章节列表中不存在目标章节
    #[error("Chapter {0} not listed on the series page")]
    ChapterNotListed(u32),

    /// 页面已加载但正文不足，视为付费墙或渲染失败
    #[error("Extraction insufficient for chapter {number}: {reason}")]
    ExtractionInsufficient { number: u32, reason: String },

    /// 主文件名与回退文件名均写入失败
    #[error("Persistence failure for chapter {number}: {source}")]
    Persistence {
        number: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run cancelled")]
    Cancelled,
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, HarvestError>;

impl HarvestError {
    /// 是否值得在章节边界上重试
    ///
    /// 仅瞬时的渲染错误可重试；内容不足、章节缺失与会话无法启动均直接判定。
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarvestError::Browser(_) | HarvestError::ElementNotFound(_))
    }

    /// 是否终止整个运行
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::RendererUnavailable(_) | HarvestError::Cancelled
        )
    }

    pub fn browser(e: impl std::fmt::Display) -> Self {
        HarvestError::Browser(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(HarvestError::Browser("navigation reset".into()).is_retryable());
        assert!(!HarvestError::ChapterNotListed(4).is_retryable());
        assert!(
            !HarvestError::ExtractionInsufficient {
                number: 4,
                reason: "short".into()
            }
            .is_retryable()
        );
        assert!(HarvestError::RendererUnavailable("no chrome".into()).is_fatal());
        assert!(!HarvestError::Browser("x".into()).is_fatal());
    }
}
