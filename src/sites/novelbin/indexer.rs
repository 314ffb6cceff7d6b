//! NovelBin 索引器
//!
//! 章节列表是虚拟化的无限滚动容器：只有视口附近的链接存在于 DOM 中。
//! 因此每次滚动后都要重新扫描快照并与已见集合求并集。

use std::collections::{BTreeMap, BTreeSet};

use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::config::DiscoveryConfig;
use crate::core::error::Result;
use crate::core::event::{EventSender, HarvestEvent};
use crate::core::model::{ChapterLocator, ChapterRange, SeriesSource};
use crate::interfaces::renderer::{Locator, PageSession};
use crate::utils::{pause, to_absolute_url};

use super::selectors::{CHAPTER_TAB_ANCHOR, CHAPTER_TAB_CSS, EARLY_CHAPTER_PATHS, SiteSelectors};

/// 滚动发现的终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStop {
    /// 单章解析时已找到目标
    TargetFound,
    /// 连续多轮没有新章节
    Stable,
    /// 已滚动到文档底部
    Bottom,
    /// 达到滚动轮数上限
    IterationCap,
}

/// 一次滚动发现的结果
#[derive(Debug)]
pub struct ScrollIndex {
    pub locators: BTreeMap<u32, ChapterLocator>,
    /// 扫描中见过的全部章节号 (不受 wanted 过滤)
    pub seen: BTreeSet<u32>,
    pub stop: ScanStop,
    pub iterations: u32,
}

/// 无限滚动索引器
pub struct ScrollIndexer {
    discovery: DiscoveryConfig,
    events: Option<EventSender>,
}

impl ScrollIndexer {
    pub fn new(discovery: DiscoveryConfig, events: Option<EventSender>) -> Self {
        Self { discovery, events }
    }

    pub async fn index(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
        wanted: ChapterRange,
    ) -> Result<ScrollIndex> {
        let base = Url::parse(&source.series_url)?;
        let list_url = chapter_list_url(&source.series_url);

        session.open(&list_url).await?;
        pause(self.discovery.page_load).await;
        self.activate_tab(session).await;

        if self.discovery.prime_early_chapters && wanted.touches_start() {
            self.prime(session, &source.series_url, &list_url).await;
        }

        session.scroll_to_top().await?;
        pause(self.discovery.settle).await;

        let mut scan = Scan::new(base, wanted);
        let initial = scan.absorb(&session.content().await?);
        debug!("初始加载章节数: {}", initial);

        if scan.target_found() {
            return Ok(scan.finish(ScanStop::TargetFound, 0));
        }

        let mut stable = 0;
        for iteration in 0..self.discovery.max_scroll_iterations {
            session
                .scroll_by(self.discovery.scroll.amount(iteration))
                .await?;
            pause(self.discovery.lazy_load).await;

            let fresh = scan.absorb(&session.content().await?);
            debug!(
                "滚动第 {} 轮: 新增 {}，累计 {}",
                iteration + 1,
                fresh,
                scan.seen.len()
            );
            if let Some(events) = &self.events {
                events.emit(HarvestEvent::DiscoveryProgress {
                    iteration: iteration + 1,
                    found: scan.seen.len(),
                });
            }

            if scan.target_found() {
                return Ok(scan.finish(ScanStop::TargetFound, iteration + 1));
            }

            if fresh == 0 {
                stable += 1;
            } else {
                stable = 0;
            }
            if stable >= self.discovery.stable_iterations {
                info!("连续 {} 轮无新章节，共 {} 章", stable, scan.seen.len());
                return Ok(scan.finish(ScanStop::Stable, iteration + 1));
            }

            let metrics = session.scroll_metrics().await?;
            if metrics.at_bottom(self.discovery.bottom_margin_px) {
                pause(self.discovery.settle).await;
                scan.absorb(&session.content().await?);
                info!("已到达页面底部，共 {} 章", scan.seen.len());
                return Ok(scan.finish(ScanStop::Bottom, iteration + 1));
            }
        }

        info!(
            "达到滚动上限 {} 轮，共 {} 章",
            self.discovery.max_scroll_iterations,
            scan.seen.len()
        );
        Ok(scan.finish(ScanStop::IterationCap, self.discovery.max_scroll_iterations))
    }

    /// 章节标签未展开时点击展开；失败只记录
    async fn activate_tab(&self, session: &mut dyn PageSession) {
        if let Err(e) = self.try_activate_tab(session).await {
            debug!("章节标签激活失败: {}", e);
        }
    }

    async fn try_activate_tab(&self, session: &mut dyn PageSession) -> Result<()> {
        let Some(tab) = session
            .query_selector(&Locator::css(CHAPTER_TAB_CSS))
            .await?
        else {
            debug!("未找到章节标签 {}", CHAPTER_TAB_CSS);
            return Ok(());
        };

        let expanded = session.element_attribute(tab, "aria-expanded").await?;
        if expanded.as_deref() == Some("true") {
            return Ok(());
        }

        session.scroll_into_view(tab).await?;
        pause(self.discovery.click_pause).await;
        session.click(tab).await?;
        pause(self.discovery.settle).await;
        Ok(())
    }

    /// 直接访问第 0/1 章，使站点缓存开头部分的列表
    ///
    /// 成功与否都回到章节列表页，返回是否命中。
    async fn prime(&self, session: &mut dyn PageSession, series_url: &str, list_url: &str) -> bool {
        let base = series_url.trim_end_matches('/');
        let mut primed = false;

        for path in EARLY_CHAPTER_PATHS {
            let candidate = format!("{}/{}", base, path);
            debug!("预热尝试: {}", candidate);
            match self.probe_chapter(session, &candidate).await {
                Ok(true) => {
                    info!("已预热开头章节: {}", candidate);
                    primed = true;
                    break;
                }
                Ok(false) => debug!("无效响应: {}", candidate),
                Err(e) => debug!("预热失败 {}: {}", candidate, e),
            }
        }

        if !primed {
            warn!("无法预热第 0/1 章，按常规流程发现");
        }

        match session.open(list_url).await {
            Ok(()) => {
                pause(self.discovery.page_load).await;
                self.activate_tab(session).await;
            }
            Err(e) => warn!("返回章节列表失败: {}", e),
        }
        primed
    }

    async fn probe_chapter(&self, session: &mut dyn PageSession, url: &str) -> Result<bool> {
        session.open(url).await?;
        pause(self.discovery.settle).await;
        let title = session.title().await?.to_lowercase();
        let current = session.current_url().await?.to_lowercase();
        Ok(title.contains("chapter")
            && !title.contains("404")
            && !title.contains("not found")
            && current.contains("chapter"))
    }
}

pub fn chapter_list_url(series_url: &str) -> String {
    format!("{}#{}", series_url.trim_end_matches('/'), CHAPTER_TAB_ANCHOR)
}

/// 扫描累加器
struct Scan {
    base: Url,
    wanted: ChapterRange,
    locators: BTreeMap<u32, ChapterLocator>,
    seen: BTreeSet<u32>,
}

impl Scan {
    fn new(base: Url, wanted: ChapterRange) -> Self {
        Self {
            base,
            wanted,
            locators: BTreeMap::new(),
            seen: BTreeSet::new(),
        }
    }

    /// 合并一次快照，返回新见到的章节数
    fn absorb(&mut self, html: &str) -> usize {
        let s = SiteSelectors::get();
        let doc = Html::parse_document(html);
        let mut fresh = 0;

        for anchor in doc.select(&s.anchor) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let url = to_absolute_url(&self.base, href);
            let Some(number) = s.chapter_number(&url) else {
                continue;
            };
            if self.seen.insert(number) {
                fresh += 1;
            }
            if self.wanted.contains(number) {
                self.locators.insert(
                    number,
                    ChapterLocator {
                        number,
                        url,
                        volume: None,
                    },
                );
            }
        }
        fresh
    }

    fn target_found(&self) -> bool {
        self.wanted
            .target()
            .is_some_and(|t| self.locators.contains_key(&t))
    }

    fn finish(self, stop: ScanStop, iterations: u32) -> ScrollIndex {
        ScrollIndex {
            locators: self.locators,
            seen: self.seen,
            stop,
            iterations,
        }
    }
}
