//! NovelBin 站点模块 (无限滚动布局)
//!
//! 站点对同一浏览器的连续访问很敏感，每章都在新会话中重新定位并下载。

mod indexer;
mod selectors;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::core::config::{AppConfig, DelayRange};
use crate::core::error::Result;
use crate::core::event::EventSender;
use crate::core::model::{
    ChapterContent, ChapterLocator, ChapterRange, DiscoveredChapterSet, SeriesSource, SiteVariant,
};
use crate::interfaces::renderer::PageSession;
use crate::interfaces::site::{SessionMode, SiteStrategy};
use crate::sites::extractor::ContentExtractor;

pub use self::indexer::{ScanStop, ScrollIndex, ScrollIndexer, chapter_list_url};
pub use self::selectors::SiteSelectors;

/// NovelBin 站点实现
pub struct NovelBin {
    indexer: ScrollIndexer,
    extractor: ContentExtractor,
    settle: DelayRange,
}

impl NovelBin {
    pub fn new(config: &AppConfig, events: Option<EventSender>) -> Self {
        Self {
            indexer: ScrollIndexer::new(config.discovery.clone(), events),
            extractor: ContentExtractor::new(&SiteSelectors::get().body, &config.extraction),
            settle: config.discovery.chapter_load,
        }
    }

    /// 完整的滚动发现结果 (含终止原因)
    pub async fn scan(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
        wanted: ChapterRange,
    ) -> Result<ScrollIndex> {
        self.indexer.index(session, source, wanted).await
    }
}

#[async_trait]
impl SiteStrategy for NovelBin {
    fn variant(&self) -> SiteVariant {
        SiteVariant::InfiniteScroll
    }

    fn session_mode(&self) -> SessionMode {
        SessionMode::PerChapter
    }

    fn chapter_settle(&self) -> DelayRange {
        self.settle
    }

    async fn resolve(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
        wanted: ChapterRange,
    ) -> Result<BTreeMap<u32, ChapterLocator>> {
        Ok(self.scan(session, source, wanted).await?.locators)
    }

    async fn discover_all(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
    ) -> Result<DiscoveredChapterSet> {
        let index = self.scan(session, source, ChapterRange::all()).await?;
        Ok(DiscoveredChapterSet {
            chapters: index.seen,
            latest_volume: None,
        })
    }

    async fn extract_content(
        &self,
        session: &mut dyn PageSession,
        number: u32,
    ) -> Result<ChapterContent> {
        self.extractor.extract(session, number).await
    }
}
