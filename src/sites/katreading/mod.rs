//! KatReadingCafe 站点模块 (嵌套卷布局)
//!
//! 一次打开系列页即可展开全部卷并解析所有章节，之后在同一会话中逐章下载。

mod indexer;
mod selectors;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::core::config::{AppConfig, DelayRange};
use crate::core::error::Result;
use crate::core::model::{
    ChapterContent, ChapterLocator, ChapterRange, DiscoveredChapterSet, SeriesSource, SiteVariant,
};
use crate::interfaces::renderer::PageSession;
use crate::interfaces::site::{SessionMode, SiteStrategy};
use crate::sites::extractor::ContentExtractor;

pub use self::indexer::{VolumeIndex, VolumeIndexer, scan_anchors};
pub use self::selectors::SiteSelectors;

/// KatReadingCafe 站点实现
pub struct KatReading {
    indexer: VolumeIndexer,
    extractor: ContentExtractor,
    settle: DelayRange,
}

impl KatReading {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            indexer: VolumeIndexer::new(config.discovery.clone()),
            extractor: ContentExtractor::new(&SiteSelectors::get().body, &config.extraction),
            settle: config.discovery.chapter_load,
        }
    }
}

#[async_trait]
impl SiteStrategy for KatReading {
    fn variant(&self) -> SiteVariant {
        SiteVariant::NestedVolume
    }

    fn session_mode(&self) -> SessionMode {
        SessionMode::Shared
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
        Ok(self.indexer.index(session, source, wanted).await?.locators)
    }

    async fn discover_all(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
    ) -> Result<DiscoveredChapterSet> {
        let index = self
            .indexer
            .index(session, source, ChapterRange::all())
            .await?;
        Ok(DiscoveredChapterSet {
            chapters: index.locators.keys().copied().collect(),
            latest_volume: index.latest_volume,
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
