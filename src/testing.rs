//! 离线页面会话，用于驱动发现、提取与调度流程的测试

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::error::{HarvestError, Result};
use crate::interfaces::renderer::{
    ElementHandle, Locator, PageRenderer, PageSession, ScrollMetrics,
};

/// 页面上的可交互元素
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub locators: Vec<Locator>,
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub sibling: Option<String>,
    /// 点击后追加到文档中的 HTML
    pub reveals: Option<String>,
    /// 点击后设置的属性
    pub on_click_attr: Option<(String, String)>,
    pub fail_click: bool,
    /// 点击后下一次读取快照失败
    pub breaks_snapshot: bool,
}

impl FakeElement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn matches(mut self, locator: Locator) -> Self {
        self.locators.push(locator);
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn sibling(mut self, text: &str) -> Self {
        self.sibling = Some(text.into());
        self
    }

    pub fn reveals(mut self, html: &str) -> Self {
        self.reveals = Some(html.into());
        self
    }

    pub fn sets_on_click(mut self, name: &str, value: &str) -> Self {
        self.on_click_attr = Some((name.into(), value.into()));
        self
    }

    pub fn failing_click(mut self) -> Self {
        self.fail_click = true;
        self
    }

    pub fn breaking_snapshot(mut self) -> Self {
        self.breaks_snapshot = true;
        self
    }
}

/// 一个 URL 对应的页面脚本
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    pub title: String,
    /// 按滚动次数推进的 DOM 快照
    pub snapshots: Vec<String>,
    pub elements: Vec<FakeElement>,
    pub viewport: i64,
    pub height: i64,
}

impl FakePage {
    pub fn new(title: &str, html: &str) -> Self {
        Self {
            title: title.into(),
            snapshots: vec![html.into()],
            elements: Vec::new(),
            viewport: 800,
            height: 100_000,
        }
    }

    pub fn then_after_scroll(mut self, html: &str) -> Self {
        self.snapshots.push(html.into());
        self
    }

    pub fn element(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn height(mut self, height: i64) -> Self {
        self.height = height;
        self
    }
}

/// 跨会话共享的访问记录
#[derive(Debug, Default)]
pub struct FakeLog {
    pub opened: Vec<String>,
    pub clicked: Vec<String>,
    pub scrolls: Vec<i64>,
    pub sessions: usize,
    pub closed: usize,
}

#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, FakePage>,
    failing_opens: Mutex<HashMap<String, usize>>,
    pub log: Mutex<FakeLog>,
    unavailable: bool,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.into(), page);
        self
    }

    /// 前 `times` 次打开该 URL 时返回瞬时错误
    pub fn flaky(self, url: &str, times: usize) -> Self {
        self.failing_opens.lock().insert(url.into(), times);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn into_renderer(self) -> FakeRenderer {
        FakeRenderer {
            site: Arc::new(self),
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.log.lock().opened.clone()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.log.lock().clicked.clone()
    }
}

#[derive(Clone)]
pub struct FakeRenderer {
    pub site: Arc<FakeSite>,
}

impl FakeRenderer {
    pub fn session(&self) -> FakeSession {
        self.site.log.lock().sessions += 1;
        FakeSession {
            site: self.site.clone(),
            url: String::from("about:blank"),
            page: None,
            snapshot: 0,
            revealed: Vec::new(),
            overrides: HashMap::new(),
            position: 0,
            arena: Vec::new(),
            snapshot_fault: false,
        }
    }
}

#[async_trait]
impl PageRenderer for FakeRenderer {
    async fn new_session(&self) -> Result<Box<dyn PageSession>> {
        if self.site.unavailable {
            return Err(HarvestError::RendererUnavailable("no browser".into()));
        }
        Ok(Box::new(self.session()))
    }
}

pub struct FakeSession {
    site: Arc<FakeSite>,
    url: String,
    page: Option<FakePage>,
    snapshot: usize,
    revealed: Vec<String>,
    overrides: HashMap<(usize, String), String>,
    position: i64,
    arena: Vec<usize>,
    snapshot_fault: bool,
}

impl FakeSession {
    fn page(&self) -> Result<&FakePage> {
        self.page
            .as_ref()
            .ok_or_else(|| HarvestError::Browser("no page loaded".into()))
    }

    fn element(&self, handle: ElementHandle) -> Result<(usize, &FakeElement)> {
        let index = *self
            .arena
            .get(handle.0)
            .ok_or_else(|| HarvestError::ElementNotFound(format!("#{}", handle.0)))?;
        Ok((index, &self.page()?.elements[index]))
    }

    fn matching(&self, locator: &Locator) -> Vec<usize> {
        match &self.page {
            Some(page) => page
                .elements
                .iter()
                .enumerate()
                .filter(|(_, el)| el.locators.contains(locator))
                .map(|(i, _)| i)
                .collect(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn open(&mut self, url: &str) -> Result<()> {
        self.site.log.lock().opened.push(url.to_string());
        {
            let mut failing = self.site.failing_opens.lock();
            if let Some(left) = failing.get_mut(url)
                && *left > 0
            {
                *left -= 1;
                return Err(HarvestError::Browser("net::ERR_CONNECTION_RESET".into()));
            }
        }

        let key = url.split('#').next().unwrap_or(url);
        self.url = url.to_string();
        self.page = Some(
            self.site
                .pages
                .get(key)
                .cloned()
                .unwrap_or_else(|| FakePage::new("404 Not Found", "<html><body></body></html>")),
        );
        self.snapshot = 0;
        self.revealed.clear();
        self.overrides.clear();
        self.position = 0;
        self.arena.clear();
        self.snapshot_fault = false;
        Ok(())
    }

    async fn title(&mut self) -> Result<String> {
        Ok(self.page()?.title.clone())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn content(&mut self) -> Result<String> {
        if std::mem::take(&mut self.snapshot_fault) {
            return Err(HarvestError::Browser("transient snapshot failure".into()));
        }
        let page = self.page()?;
        let base = page
            .snapshots
            .get(self.snapshot)
            .or(page.snapshots.last())
            .cloned()
            .unwrap_or_default();
        Ok(format!("{}{}", base, self.revealed.concat()))
    }

    async fn query_selector(&mut self, locator: &Locator) -> Result<Option<ElementHandle>> {
        Ok(self.query_selector_all(locator).await?.into_iter().next())
    }

    async fn query_selector_all(&mut self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let found = self.matching(locator);
        Ok(found
            .into_iter()
            .map(|index| {
                self.arena.push(index);
                ElementHandle(self.arena.len() - 1)
            })
            .collect())
    }

    async fn element_text(&mut self, element: ElementHandle) -> Result<String> {
        Ok(self.element(element)?.1.text.clone())
    }

    async fn element_attribute(
        &mut self,
        element: ElementHandle,
        name: &str,
    ) -> Result<Option<String>> {
        let (index, el) = self.element(element)?;
        if let Some(v) = self.overrides.get(&(index, name.to_string())) {
            return Ok(Some(v.clone()));
        }
        Ok(el.attributes.get(name).cloned())
    }

    async fn sibling_text(&mut self, element: ElementHandle) -> Result<Option<String>> {
        Ok(self.element(element)?.1.sibling.clone())
    }

    async fn scroll_into_view(&mut self, element: ElementHandle) -> Result<()> {
        self.element(element)?;
        Ok(())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<()> {
        let (index, el) = self.element(element)?;
        let el = el.clone();
        self.site.log.lock().clicked.push(el.text.clone());
        if el.fail_click {
            return Err(HarvestError::Browser("element is not clickable".into()));
        }
        if let Some(html) = el.reveals {
            self.revealed.push(html);
        }
        self.snapshot_fault = el.breaks_snapshot;
        if let Some((name, value)) = el.on_click_attr {
            self.overrides.insert((index, name), value);
        }
        Ok(())
    }

    async fn scroll_by(&mut self, pixels: i64) -> Result<()> {
        self.site.log.lock().scrolls.push(pixels);
        let last = self.page()?.snapshots.len().saturating_sub(1);
        self.snapshot = (self.snapshot + 1).min(last);
        self.position += pixels;
        Ok(())
    }

    async fn scroll_to_top(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        let page = self.page()?;
        self.position = (page.height - page.viewport).max(0);
        Ok(())
    }

    async fn scroll_metrics(&mut self) -> Result<ScrollMetrics> {
        let page = self.page()?;
        Ok(ScrollMetrics {
            position: self.position,
            viewport: page.viewport,
            height: page.height,
        })
    }

    async fn execute_script(&mut self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.site.log.lock().closed += 1;
        Ok(())
    }
}

/// 生成仅含章节链接的 HTML 片段
pub fn anchors<'a>(links: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    links
        .into_iter()
        .map(|(href, text)| format!(r#"<a href="{}">{}</a>"#, href, text))
        .collect()
}

/// 有序章节编号，便于断言
pub fn numbers<V>(map: &BTreeMap<u32, V>) -> Vec<u32> {
    map.keys().copied().collect()
}
