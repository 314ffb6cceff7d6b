//! 站点策略定义
//!
//! 每种站点布局实现一套章节发现与正文提取逻辑，调度器只依赖此接口。

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::core::config::DelayRange;
use crate::core::error::Result;
use crate::core::model::{
    ChapterContent, ChapterLocator, ChapterRange, DiscoveredChapterSet, SeriesSource, SiteVariant,
};
use crate::interfaces::renderer::PageSession;
use crate::utils::pause;

/// 会话使用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// 一次发现、一个会话下载全部章节
    Shared,
    /// 每章新开会话并单独定位
    PerChapter,
}

/// 站点策略 Trait
#[async_trait]
pub trait SiteStrategy: Send + Sync {
    fn variant(&self) -> SiteVariant;

    fn session_mode(&self) -> SessionMode;

    /// 打开章节页后的等待
    fn chapter_settle(&self) -> DelayRange;

    /// 解析 `wanted` 范围内的章节链接
    async fn resolve(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
        wanted: ChapterRange,
    ) -> Result<BTreeMap<u32, ChapterLocator>>;

    /// 远端全部章节编号
    async fn discover_all(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
    ) -> Result<DiscoveredChapterSet> {
        let locators = self.resolve(session, source, ChapterRange::all()).await?;
        Ok(DiscoveredChapterSet::from_locators(&locators))
    }

    /// 从已打开的章节页提取内容
    async fn extract_content(
        &self,
        session: &mut dyn PageSession,
        number: u32,
    ) -> Result<ChapterContent>;

    /// 打开章节页并提取
    async fn download(
        &self,
        session: &mut dyn PageSession,
        locator: &ChapterLocator,
    ) -> Result<ChapterContent> {
        session.open(&locator.url).await?;
        pause(self.chapter_settle()).await;
        self.extract_content(session, locator.number).await
    }
}
