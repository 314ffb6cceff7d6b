//! KatReadingCafe 选择器
//!
//! 预编译的 CSS 选择器与正则

use std::sync::OnceLock;

use regex::Regex;
use scraper::Selector;

/// "New Chapter" 标记，其后兄弟元素为最新卷标签
pub const NEW_CHAPTER_XPATH: &str = "//*[contains(text(), 'New Chapter')]";
/// 全部卷标签
pub const VOLUME_LABELS_XPATH: &str = "//span[contains(text(), 'Vol.')]";

/// 指定卷的折叠标签
pub fn volume_label_xpath(volume: u32) -> String {
    format!("//span[normalize-space(text())='Vol. {}']", volume)
}

/// 站点选择器集合
pub struct SiteSelectors {
    pub body: Vec<Selector>,
    pub anchor: Selector,
    pub volume_number: Regex,
    pub chapter_anchor: Regex,
}

static SELECTORS: OnceLock<SiteSelectors> = OnceLock::new();

impl SiteSelectors {
    /// 获取全局选择器实例
    pub fn get() -> &'static SiteSelectors {
        SELECTORS.get_or_init(|| SiteSelectors {
            body: [
                "div.entry-content",
                ".post-content",
                ".chapter-content",
                "article",
                ".content",
            ]
            .iter()
            .map(|s| Selector::parse(s).unwrap())
            .collect(),
            anchor: Selector::parse("a[href]").unwrap(),
            volume_number: Regex::new(r"Vol\.\s*(\d+)").unwrap(),
            chapter_anchor: Regex::new(r"^Vol\.\s*(\d+)\s*Ch\.\s*(\d+)").unwrap(),
        })
    }
}
