//! Chromium 渲染器
//!
//! 基于 CDP (chromiumoxide) 实现 `PageRenderer`，每个会话独占一个浏览器进程。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{
    Element, Page,
    browser::{Browser, BrowserConfig as CdpConfig},
    cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams,
};
use futures::StreamExt;
use tokio::{sync::OnceCell, task::JoinHandle};
use tracing::{debug, warn};

use crate::core::config::BrowserConfig;
use crate::core::error::{HarvestError, Result};
use crate::interfaces::renderer::{
    ElementHandle, Locator, PageRenderer, PageSession, ScrollMetrics,
};

/// 隐藏 `navigator.webdriver` 标记
static STEALTH_JS: &str = r#"
Object.defineProperty(Navigator.prototype, 'webdriver', { get: () => undefined, configurable: true });
"#;

static UA_CACHE: OnceCell<String> = OnceCell::const_new();

/// 基于 Chromium 的渲染器
pub struct ChromiumRenderer {
    config: Arc<BrowserConfig>,
}

impl ChromiumRenderer {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn new_session(&self) -> Result<Box<dyn PageSession>> {
        let session = ChromiumSession::launch(&self.config).await?;
        Ok(Box::new(session))
    }
}

/// 浏览器会话
/// 采用显式的所有权管理，确保关闭逻辑的确定性
pub struct ChromiumSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Page,
    /// 当前页面上已查询到的元素，`ElementHandle` 为其下标
    elements: Vec<Element>,
}

impl ChromiumSession {
    /// 启动浏览器并打开空白页
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let ua = match &config.user_agent {
            Some(ua) => ua.clone(),
            None => UA_CACHE.get_or_init(probe_native_ua).await.clone(),
        };
        let browser_config = build_browser_config(config, &ua)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| HarvestError::RendererUnavailable(e.to_string()))?;

        // 启动事件循环
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                let mut browser = browser;
                let _ = browser.close().await;
                let _ = handle.await;
                return Err(HarvestError::RendererUnavailable(e.to_string()));
            }
        };

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(
                STEALTH_JS.to_string(),
            ))
            .await
        {
            debug!("Stealth injection warning: {}", e);
        }

        Ok(Self {
            browser: Some(browser),
            handler: Some(handle),
            page,
            elements: Vec::new(),
        })
    }

    fn element(&self, handle: ElementHandle) -> Result<&Element> {
        self.elements
            .get(handle.0)
            .ok_or_else(|| HarvestError::ElementNotFound(format!("stale handle #{}", handle.0)))
    }

    fn remember(&mut self, element: Element) -> ElementHandle {
        self.elements.push(element);
        ElementHandle(self.elements.len() - 1)
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Element>> {
        let found = match locator {
            Locator::Css(s) => self.page.find_elements(s.as_str()).await,
            Locator::XPath(s) => self.page.find_xpaths(s.as_str()).await,
        };
        match found {
            Ok(elements) => Ok(elements),
            Err(e) => {
                // 无匹配时 CDP 也会报错，统一视为空结果
                debug!("查询 {} 无结果: {}", locator, e);
                Ok(Vec::new())
            }
        }
    }

    async fn evaluate_value(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(HarvestError::browser)?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn shutdown(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let _ = browser.close().await;
            if let Some(h) = self.handler.take() {
                let _ = h.await;
            }
        }
    }
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn open(&mut self, url: &str) -> Result<()> {
        self.elements.clear();
        self.page.goto(url).await.map_err(HarvestError::browser)?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn title(&mut self) -> Result<String> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(HarvestError::browser)?
            .unwrap_or_default())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(HarvestError::browser)?
            .unwrap_or_default())
    }

    async fn content(&mut self) -> Result<String> {
        self.page.content().await.map_err(HarvestError::browser)
    }

    async fn query_selector(&mut self, locator: &Locator) -> Result<Option<ElementHandle>> {
        let first = self.find_all(locator).await?.into_iter().next();
        Ok(first.map(|el| self.remember(el)))
    }

    async fn query_selector_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let found = self.find_all(locator).await?;
        Ok(found.into_iter().map(|el| self.remember(el)).collect())
    }

    async fn element_text(&mut self, element: ElementHandle) -> Result<String> {
        Ok(self
            .element(element)?
            .inner_text()
            .await
            .map_err(HarvestError::browser)?
            .unwrap_or_default())
    }

    async fn element_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>> {
        self.element(element)?
            .attribute(name)
            .await
            .map_err(HarvestError::browser)
    }

    async fn sibling_text(&mut self, element: ElementHandle) -> Result<Option<String>> {
        let returns = self
            .element(element)?
            .call_js_fn(
                "function() { const n = this.nextElementSibling; return n ? n.innerText : null; }",
                false,
            )
            .await
            .map_err(HarvestError::browser)?;
        Ok(returns
            .result
            .value
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    async fn scroll_into_view(&mut self, element: ElementHandle) -> Result<()> {
        self.element(element)?
            .scroll_into_view()
            .await
            .map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        self.element(element)?
            .click()
            .await
            .map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn scroll_by(&mut self, pixels: i64) -> Result<()> {
        self.evaluate_value(&format!("window.scrollBy(0, {}); true", pixels))
            .await?;
        Ok(())
    }

    async fn scroll_to_top(&mut self) -> Result<()> {
        self.evaluate_value("window.scrollTo(0, 0); true").await?;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        self.evaluate_value("window.scrollTo(0, document.body.scrollHeight); true")
            .await?;
        Ok(())
    }

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics> {
        let value = self
            .evaluate_value(
                "({ position: Math.round(window.pageYOffset), \
                    viewport: window.innerHeight, \
                    height: document.body.scrollHeight })",
            )
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn execute_script(&mut self, script: &str) -> Result<serde_json::Value> {
        self.evaluate_value(script).await
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.elements.clear();
        self.shutdown().await;
        Ok(())
    }
}

// 在 Drop 时尝试最后一次保护，但不报 WARN
impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let handler = self.handler.take();
            // 在后台清理
            tokio::spawn(async move {
                let _ = browser.close().await;
                if let Some(h) = handler {
                    let _ = h.await;
                }
            });
        }
    }
}

/// 构建浏览器配置
fn build_browser_config(config: &BrowserConfig, ua: &str) -> Result<CdpConfig> {
    let mut builder = CdpConfig::builder()
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua))
        .arg("--disable-infobars")
        .arg("--no-sandbox")
        .arg("--window-size=1920,1080")
        .arg("--disable-extensions");

    if config.block_images {
        builder = builder.arg("--blink-settings=imagesEnabled=false");
    }

    if config.headless {
        builder = builder.arg("--headless=new");
    } else {
        builder = builder.with_head();
    }

    let chrome_path = if let Some(path) = &config.chrome_path {
        Some(path.clone())
    } else {
        [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
        ]
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
    };

    if let Some(path) = chrome_path {
        builder = builder.chrome_executable(path);
    }

    builder.build().map_err(HarvestError::RendererUnavailable)
}

/// 探测本机浏览器的原生 User-Agent，去掉 Headless 标记
async fn probe_native_ua() -> String {
    debug!("正在探测系统原生 User-Agent...");

    let config = match CdpConfig::builder()
        .arg("--headless=new")
        .arg("--no-sandbox")
        .build()
    {
        Ok(c) => c,
        Err(_) => return fallback_ua(),
    };

    let (mut browser, mut handler) = match Browser::launch(config).await {
        Ok(b) => b,
        Err(e) => {
            warn!("UA 探测失败，使用默认值: {}", e);
            return fallback_ua();
        }
    };

    let handle = tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    let result = async {
        let page = browser.new_page("about:blank").await?;
        let ua: String = page.evaluate("navigator.userAgent").await?.into_value()?;
        Ok::<String, chromiumoxide::error::CdpError>(ua)
    }
    .await;

    let _ = browser.close().await;
    let _ = handle.await;
    // 允许 OS 回收资源
    tokio::time::sleep(Duration::from_millis(100)).await;

    match result {
        Ok(ua) => {
            let clean_ua = ua
                .replace("HeadlessChrome", "Chrome")
                .replace("Headless", "");
            debug!("UA 探测成功: {}", clean_ua);
            clean_ua
        }
        Err(_) => fallback_ua(),
    }
}

fn fallback_ua() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}
