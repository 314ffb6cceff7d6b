//! KatReadingCafe 索引器
//!
//! 系列页把章节按卷折叠。最新卷默认展开，其余卷需逐个点击标签后才会渲染章节链接。

use std::collections::{BTreeMap, BTreeSet};

use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::config::DiscoveryConfig;
use crate::core::error::{HarvestError, Result};
use crate::core::model::{ChapterLocator, ChapterRange, SeriesSource};
use crate::interfaces::renderer::{Locator, PageSession};
use crate::utils::{pause, to_absolute_url};

use super::selectors::{NEW_CHAPTER_XPATH, SiteSelectors, VOLUME_LABELS_XPATH, volume_label_xpath};

/// 一次索引的结果
#[derive(Debug, Default)]
pub struct VolumeIndex {
    pub locators: BTreeMap<u32, ChapterLocator>,
    pub volumes: Vec<u32>,
    pub latest_volume: Option<u32>,
}

/// 卷/章树索引器
pub struct VolumeIndexer {
    discovery: DiscoveryConfig,
}

impl VolumeIndexer {
    pub fn new(discovery: DiscoveryConfig) -> Self {
        Self { discovery }
    }

    /// 打开系列页、展开各卷并收集 `wanted` 范围内的章节
    pub async fn index(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
        wanted: ChapterRange,
    ) -> Result<VolumeIndex> {
        let base = Url::parse(&source.series_url)?;

        session.open(&source.series_url).await?;
        pause(self.discovery.page_load).await;

        let latest_volume = self.latest_volume(session).await;
        let volumes = self.volumes(session).await;
        if volumes.is_empty() {
            warn!("未找到任何卷标签: {}", source.series_url);
            return Ok(VolumeIndex {
                latest_volume,
                ..Default::default()
            });
        }
        debug!("卷列表: {:?}，最新卷: {:?}", volumes, latest_volume);

        let mut locators = BTreeMap::new();

        // 最新卷默认已展开
        match session.content().await {
            Ok(html) => {
                scan_anchors(&html, &base, None, wanted, &mut locators);
            }
            Err(e) => warn!("读取最新卷快照失败: {}", e),
        }

        for &volume in &volumes {
            if Some(volume) == latest_volume {
                continue;
            }
            if let Err(e) = self.expand(session, volume).await {
                warn!("展开 Vol. {} 失败，已跳过: {}", volume, e);
                continue;
            }
            let html = match session.content().await {
                Ok(html) => html,
                Err(e) => {
                    warn!("读取 Vol. {} 快照失败，已跳过: {}", volume, e);
                    continue;
                }
            };
            let found = scan_anchors(&html, &base, Some(volume), wanted, &mut locators);
            debug!("Vol. {} 章节数: {}", volume, found);
        }

        info!("共解析 {} 个章节链接 ({} 卷)", locators.len(), volumes.len());
        Ok(VolumeIndex {
            locators,
            volumes,
            latest_volume,
        })
    }

    /// 从 "New Chapter" 标记的兄弟元素读取最新卷号
    async fn latest_volume(&self, session: &mut dyn PageSession) -> Option<u32> {
        let s = SiteSelectors::get();
        let markers = match session
            .query_selector_all(&Locator::xpath(NEW_CHAPTER_XPATH))
            .await
        {
            Ok(markers) => markers,
            Err(e) => {
                warn!("查找 New Chapter 标记失败: {}", e);
                return None;
            }
        };

        for marker in markers {
            let sibling = match session.sibling_text(marker).await {
                Ok(Some(text)) => text,
                Ok(None) => continue,
                Err(e) => {
                    debug!("读取 New Chapter 兄弟元素失败: {}", e);
                    continue;
                }
            };
            if let Some(volume) = s
                .volume_number
                .captures(&sibling)
                .and_then(|c| c[1].parse::<u32>().ok())
            {
                return Some(volume);
            }
        }
        None
    }

    /// 页面上出现的全部卷号，升序去重
    async fn volumes(&self, session: &mut dyn PageSession) -> Vec<u32> {
        let s = SiteSelectors::get();
        let labels = match session
            .query_selector_all(&Locator::xpath(VOLUME_LABELS_XPATH))
            .await
        {
            Ok(labels) => labels,
            Err(e) => {
                warn!("查找卷标签失败: {}", e);
                return Vec::new();
            }
        };

        let mut volumes: BTreeSet<u32> = BTreeSet::new();
        for label in labels {
            let text = match session.element_text(label).await {
                Ok(text) => text,
                Err(e) => {
                    debug!("读取卷标签失败: {}", e);
                    continue;
                }
            };
            if let Some(volume) = s
                .volume_number
                .captures(&text)
                .and_then(|c| c[1].parse::<u32>().ok())
            {
                volumes.insert(volume);
            }
        }
        volumes.into_iter().collect()
    }

    async fn expand(&self, session: &mut dyn PageSession, volume: u32) -> Result<()> {
        let xpath = volume_label_xpath(volume);
        let label = session
            .query_selector(&Locator::xpath(&xpath))
            .await?
            .ok_or(HarvestError::ElementNotFound(xpath))?;

        session.scroll_into_view(label).await?;
        pause(self.discovery.click_pause).await;
        session.click(label).await?;
        pause(self.discovery.settle).await;
        Ok(())
    }
}

/// 扫描快照中的 `Vol. X Ch. Y` 链接，同号章节以后扫描到的为准
///
/// 返回本次命中的链接数。
pub fn scan_anchors(
    html: &str,
    base: &Url,
    volume: Option<u32>,
    wanted: ChapterRange,
    out: &mut BTreeMap<u32, ChapterLocator>,
) -> usize {
    let s = SiteSelectors::get();
    let doc = Html::parse_document(html);
    let mut found = 0;

    for anchor in doc.select(&s.anchor) {
        let text = anchor.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        let Some(caps) = s.chapter_anchor.captures(&text) else {
            continue;
        };
        let (Ok(vol), Ok(number)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        if volume.is_some_and(|v| v != vol) || !wanted.contains(number) {
            continue;
        }
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        out.insert(
            number,
            ChapterLocator {
                number,
                url: to_absolute_url(base, href),
                volume: Some(vol),
            },
        );
        found += 1;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_filters_volume_and_range() {
        let base = Url::parse("https://katreadingcafe.com/novel/hero/").unwrap();
        let html = r#"
            <a href="/hero-1-1/">Vol. 1 Ch. 1</a>
            <a href="/hero-1-2/">Vol.1   Ch.2 - Title</a>
            <a href="/hero-2-3/">Vol. 2 Ch. 3</a>
            <a href="/about/">About</a>
        "#;

        let mut out = BTreeMap::new();
        let n = scan_anchors(html, &base, Some(1), ChapterRange::all(), &mut out);
        assert_eq!(n, 2);
        assert_eq!(out[&2].url, "https://katreadingcafe.com/hero-1-2/");
        assert_eq!(out[&2].volume, Some(1));

        let mut out = BTreeMap::new();
        scan_anchors(html, &base, None, ChapterRange::span(2, 3), &mut out);
        assert_eq!(out.keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn later_scan_wins_for_same_number() {
        let base = Url::parse("https://katreadingcafe.com/novel/hero/").unwrap();
        let mut out = BTreeMap::new();
        scan_anchors(
            r#"<a href="/old/">Vol. 1 Ch. 5</a>"#,
            &base,
            None,
            ChapterRange::all(),
            &mut out,
        );
        scan_anchors(
            r#"<a href="/new/">Vol. 2 Ch. 5</a>"#,
            &base,
            None,
            ChapterRange::all(),
            &mut out,
        );
        assert_eq!(out[&5].url, "https://katreadingcafe.com/new/");
    }
}
