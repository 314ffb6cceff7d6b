//! NovelBin 选择器
//!
//! 预编译的 CSS 选择器与链接编号规则

use std::sync::OnceLock;

use regex::Regex;
use scraper::Selector;

/// 章节列表标签页
pub const CHAPTER_TAB_CSS: &str = "#tab-chapters-title";
pub const CHAPTER_TAB_ANCHOR: &str = "tab-chapters-title";

/// 预热时尝试的开头章节路径
pub const EARLY_CHAPTER_PATHS: [&str; 8] = [
    "chapter-0",
    "ch-0",
    "c0",
    "chapter/0",
    "chapter-1",
    "ch-1",
    "c1",
    "chapter/1",
];

/// 站点选择器集合
pub struct SiteSelectors {
    pub body: Vec<Selector>,
    pub anchor: Selector,
    /// 依次尝试，首个命中者给出章节号
    pub number_patterns: Vec<Regex>,
    pub short_chapter_href: Regex,
}

static SELECTORS: OnceLock<SiteSelectors> = OnceLock::new();

impl SiteSelectors {
    /// 获取全局选择器实例
    pub fn get() -> &'static SiteSelectors {
        SELECTORS.get_or_init(|| SiteSelectors {
            body: [
                ".chr-c",
                ".chapter-content",
                ".content",
                "#chr-content",
                ".reading-content",
                "article",
                ".chapter-body",
                ".chapter-text",
                ".text-left",
                "#chapter-content",
                ".entry-content",
                ".post-content",
            ]
            .iter()
            .map(|s| Selector::parse(s).unwrap())
            .collect(),
            anchor: Selector::parse("a[href]").unwrap(),
            number_patterns: [
                r"chapter-(\d+)",
                r"ch-(\d+)",
                r"chapter/(\d+)",
                r"c(\d+)",
                r"chap-(\d+)",
                r"/(\d+)/?$",
            ]
            .iter()
            .map(|p| Regex::new(p).unwrap())
            .collect(),
            short_chapter_href: Regex::new(r"/(c|ch|chap)-?\d+").unwrap(),
        })
    }

    /// 链接是否指向章节页
    pub fn is_chapter_href(&self, href: &str) -> bool {
        let lower = href.to_ascii_lowercase();
        lower.contains("chapter") || self.short_chapter_href.is_match(&lower)
    }

    /// 从章节链接中解析编号
    pub fn chapter_number(&self, href: &str) -> Option<u32> {
        if !self.is_chapter_href(href) {
            return None;
        }
        let lower = href.to_ascii_lowercase();
        self.number_patterns
            .iter()
            .find_map(|re| re.captures(&lower))
            .and_then(|c| c[1].parse().ok())
    }
}
