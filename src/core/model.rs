use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// 站点布局变体
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum SiteVariant {
    /// 单页卷/章树，卷可折叠
    #[strum(to_string = "nested_volume", serialize = "katreadingcafe")]
    NestedVolume,
    /// 虚拟化无限滚动章节列表
    #[strum(to_string = "infinite_scroll", serialize = "novelbin")]
    InfiniteScroll,
}

impl SiteVariant {
    /// 根据域名推断站点变体
    pub fn from_url(url: &str) -> Option<Self> {
        let lower = url.to_ascii_lowercase();
        if lower.contains("katreadingcafe.com") {
            Some(SiteVariant::NestedVolume)
        } else if lower.contains("novelbin.") {
            Some(SiteVariant::InfiniteScroll)
        } else {
            None
        }
    }
}

/// 单部远程小说
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSource {
    pub name: String,
    pub series_url: String,
    pub variant: SiteVariant,
    pub archive_dir: PathBuf,
}

/// 已解析、可直接抓取的章节引用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterLocator {
    pub number: u32,
    pub url: String,
    /// 仅嵌套卷站点携带
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<u32>,
}

/// 提取结果，立即交给存储层，不做保留
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterContent {
    pub number: u32,
    pub title: String,
    pub body: String,
    pub valid: bool,
}

/// 远程存在的章节编号集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredChapterSet {
    pub chapters: BTreeSet<u32>,
    /// "New Chapter" 标记指示的最新卷
    pub latest_volume: Option<u32>,
}

impl DiscoveredChapterSet {
    pub fn from_locators(locators: &BTreeMap<u32, ChapterLocator>) -> Self {
        Self {
            chapters: locators.keys().copied().collect(),
            latest_volume: None,
        }
    }

    pub fn min(&self) -> Option<u32> {
        self.chapters.first().copied()
    }

    pub fn max(&self) -> Option<u32> {
        self.chapters.last().copied()
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }

    pub fn contains(&self, number: u32) -> bool {
        self.chapters.contains(&number)
    }

    /// 编号不小于 `from` 的章节数
    pub fn count_from(&self, from: u32) -> usize {
        self.chapters.range(from..).count()
    }
}

/// 解析请求的章节范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChapterRange {
    pub start: u32,
    pub end: Option<u32>,
}

impl ChapterRange {
    pub const fn all() -> Self {
        Self { start: 0, end: None }
    }

    pub const fn single(number: u32) -> Self {
        Self {
            start: number,
            end: Some(number),
        }
    }

    pub const fn span(start: u32, end: u32) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn contains(&self, number: u32) -> bool {
        number >= self.start && self.end.is_none_or(|end| number <= end)
    }

    pub fn target(&self) -> Option<u32> {
        match self.end {
            Some(end) if end == self.start => Some(end),
            _ => None,
        }
    }

    /// 范围是否覆盖容易漏加载的开头章节
    pub fn touches_start(&self) -> bool {
        self.start <= 1
    }
}

impl std::fmt::Display for ChapterRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end {
            Some(end) if end == self.start => write!(f, "#{}", end),
            Some(end) => write!(f, "#{}-#{}", self.start, end),
            None => write!(f, "#{}-", self.start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_parses_aliases() {
        assert_eq!(
            "katreadingcafe".parse::<SiteVariant>().unwrap(),
            SiteVariant::NestedVolume
        );
        assert_eq!(
            "NovelBin".parse::<SiteVariant>().unwrap(),
            SiteVariant::InfiniteScroll
        );
        assert_eq!(
            "infinite_scroll".parse::<SiteVariant>().unwrap(),
            SiteVariant::InfiniteScroll
        );
        assert!("royalroad".parse::<SiteVariant>().is_err());
        assert_eq!(SiteVariant::NestedVolume.to_string(), "nested_volume");
    }

    #[test]
    fn variant_from_domain() {
        assert_eq!(
            SiteVariant::from_url("https://katreadingcafe.com/novel/some-title/"),
            Some(SiteVariant::NestedVolume)
        );
        assert_eq!(
            SiteVariant::from_url("https://novelbin.me/novel-book/shadow-slave"),
            Some(SiteVariant::InfiniteScroll)
        );
        assert_eq!(SiteVariant::from_url("https://example.org/x"), None);
    }

    #[test]
    fn chapter_zero_is_a_real_chapter() {
        let set = DiscoveredChapterSet {
            chapters: [0, 1, 2].into_iter().collect(),
            latest_volume: None,
        };
        assert_eq!(set.min(), Some(0));
        assert_eq!(set.count_from(0), 3);
        assert!(ChapterRange::all().contains(0));
        assert!(!ChapterRange::span(1, 5).contains(0));
        assert_eq!(ChapterRange::single(0).target(), Some(0));
    }
}
