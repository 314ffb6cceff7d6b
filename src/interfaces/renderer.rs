//! 页面渲染能力 (Page Renderer)
//!
//! 发现与提取流程只通过此接口与浏览器交互，便于替换为离线实现。

use async_trait::async_trait;
use serde::Deserialize;

use crate::core::error::Result;

/// 会话内元素句柄
///
/// 仅在下一次 `open` 之前有效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(pub usize);

/// 元素定位方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Css(s) => write!(f, "css:{}", s),
            Locator::XPath(s) => write!(f, "xpath:{}", s),
        }
    }
}

/// 滚动位置与文档尺寸 (像素)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ScrollMetrics {
    pub position: i64,
    pub viewport: i64,
    pub height: i64,
}

impl ScrollMetrics {
    /// 视口底部是否已进入文档底部 `margin` 像素范围内
    pub fn at_bottom(&self, margin: i64) -> bool {
        self.position + self.viewport >= self.height - margin
    }
}

/// 单个浏览器页面会话
#[async_trait]
pub trait PageSession: Send {
    /// 导航到 URL 并等待导航完成
    async fn open(&mut self, url: &str) -> Result<()>;

    async fn title(&mut self) -> Result<String>;

    async fn current_url(&mut self) -> Result<String>;

    /// 当前渲染后 DOM 的 HTML 快照
    async fn content(&mut self) -> Result<String>;

    async fn query_selector(&mut self, locator: &Locator) -> Result<Option<ElementHandle>>;

    async fn query_selector_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>>;

    async fn element_text(&mut self, element: ElementHandle) -> Result<String>;

    async fn element_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>>;

    /// 紧随元素之后的兄弟元素文本
    async fn sibling_text(&mut self, element: ElementHandle) -> Result<Option<String>>;

    async fn scroll_into_view(&mut self, element: ElementHandle) -> Result<()>;

    async fn click(&mut self, element: ElementHandle) -> Result<()>;

    async fn scroll_by(&mut self, pixels: i64) -> Result<()>;

    async fn scroll_to_top(&mut self) -> Result<()>;

    async fn scroll_to_bottom(&mut self) -> Result<()>;

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics>;

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value>;

    /// 释放会话；此后句柄不可再用
    async fn close(self: Box<Self>) -> Result<()>;
}

/// 页面会话工厂
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// 启动失败应返回 `HarvestError::RendererUnavailable`
    async fn new_session(&self) -> Result<Box<dyn PageSession>>;
}
