//! 正文提取器 (Content Extractor)
//!
//! 从已打开的章节页面取标题与正文。标题来自文档标题并去除站点后缀；
//! 正文按站点选择器顺序尝试，不足阈值时依次回退到段落拼接与 `main` 区域。

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::core::config::ExtractionConfig;
use crate::core::error::Result;
use crate::core::model::ChapterContent;
use crate::interfaces::renderer::PageSession;

struct TitlePatterns {
    kat_branding: Regex,
    read_online: Regex,
    novel_bin: Regex,
    chapter_tag: Regex,
    whitespace: Regex,
}

fn title_patterns() -> &'static TitlePatterns {
    static PATTERNS: OnceLock<TitlePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TitlePatterns {
        kat_branding: Regex::new(r"–\s*☕\s*Kat Reading Cafe.*$").unwrap(),
        read_online: Regex::new(r"(?i)\s*-\s*Read.*Online.*$").unwrap(),
        novel_bin: Regex::new(r"(?i)\s*[-|–]\s*Novel\s*Bin.*$").unwrap(),
        chapter_tag: Regex::new(r"#Chapter\s*\d+\s*").unwrap(),
        whitespace: Regex::new(r"\s+").unwrap(),
    })
}

struct FallbackSelectors {
    paragraph: Selector,
    main: Selector,
}

fn fallback_selectors() -> &'static FallbackSelectors {
    static SELECTORS: OnceLock<FallbackSelectors> = OnceLock::new();
    SELECTORS.get_or_init(|| FallbackSelectors {
        paragraph: Selector::parse("p").unwrap(),
        main: Selector::parse("main, [role='main']").unwrap(),
    })
}

/// 去除站点品牌后缀、统一破折号并折叠空白
pub fn clean_title(raw: &str) -> String {
    let p = title_patterns();
    let t = p.kat_branding.replace(raw, "");
    let t = p.read_online.replace(&t, "");
    let t = p.novel_bin.replace(&t, "");
    let t = p.chapter_tag.replace_all(&t, "");
    let t = t.replace(['–', '—'], "-");
    let t = p.whitespace.replace_all(&t, " ");
    t.trim().trim_end_matches('-').trim_end().to_string()
}

/// 错误页标题 (404 / not found)
pub fn is_error_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    lower.contains("404") || lower.contains("not found")
}

/// 按块级元素分行的可读文本，忽略脚本与样式
pub fn readable_text(element: ElementRef<'_>) -> String {
    let mut buf = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| e.name()))
                    .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
                if !hidden {
                    buf.push_str(text);
                }
            }
            Node::Element(el) if is_block(el.name()) => buf.push('\n'),
            _ => {}
        }
    }

    buf.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn is_block(name: &str) -> bool {
    matches!(
        name,
        "p" | "br"
            | "div"
            | "section"
            | "article"
            | "blockquote"
            | "li"
            | "tr"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
    )
}

/// 站点正文提取器
#[derive(Debug, Clone, Copy)]
pub struct ContentExtractor {
    body_selectors: &'static [Selector],
    min_body_chars: usize,
    min_paragraph_chars: usize,
}

impl ContentExtractor {
    pub fn new(body_selectors: &'static [Selector], config: &ExtractionConfig) -> Self {
        Self {
            body_selectors,
            min_body_chars: config.min_body_chars,
            min_paragraph_chars: config.min_paragraph_chars,
        }
    }

    /// 从当前会话页面提取第 `number` 章
    pub async fn extract(
        &self,
        session: &mut dyn PageSession,
        number: u32,
    ) -> Result<ChapterContent> {
        let raw_title = session.title().await?;
        let html = session.content().await?;
        Ok(self.extract_from(number, &raw_title, &html))
    }

    pub fn extract_from(&self, number: u32, raw_title: &str, html: &str) -> ChapterContent {
        let mut title = clean_title(raw_title);
        let error_page = is_error_title(&title);
        if title.is_empty() {
            title = format!("Chapter {}", number);
        }

        let doc = Html::parse_document(html);
        let body = self.find_body(&doc);
        let long_enough = body.chars().count() >= self.min_body_chars;

        if !long_enough {
            debug!(
                "第 {} 章正文不足 {} 字符 (实际 {})",
                number,
                self.min_body_chars,
                body.chars().count()
            );
        }

        ChapterContent {
            number,
            title,
            valid: long_enough && !error_page,
            body,
        }
    }

    fn find_body(&self, doc: &Html) -> String {
        for selector in self.body_selectors {
            if let Some(el) = doc.select(selector).next() {
                let text = readable_text(el);
                if text.chars().count() >= self.min_body_chars {
                    return text;
                }
            }
        }

        let fallback = fallback_selectors();

        let paragraphs: Vec<String> = doc
            .select(&fallback.paragraph)
            .map(readable_text)
            .filter(|t| t.chars().count() > self.min_paragraph_chars)
            .collect();
        let joined = paragraphs.join("\n\n");
        if joined.chars().count() >= self.min_body_chars {
            debug!("正文选择器均未命中，使用段落拼接");
            return joined;
        }

        let main = doc
            .select(&fallback.main)
            .next()
            .map(readable_text)
            .unwrap_or_default();
        if main.chars().count() >= self.min_body_chars {
            debug!("正文选择器均未命中，使用 main 区域");
            return main;
        }

        // 返回最长的候选，便于日志判断页面状态
        [joined, main].into_iter().max_by_key(|t| t.len()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selectors() -> &'static [Selector] {
        static S: OnceLock<Vec<Selector>> = OnceLock::new();
        S.get_or_init(|| {
            ["div.entry-content", ".chr-c"]
                .iter()
                .map(|s| Selector::parse(s).unwrap())
                .collect()
        })
    }

    fn extractor() -> ContentExtractor {
        ContentExtractor::new(selectors(), &ExtractionConfig::default())
    }

    fn sentence(n: usize) -> String {
        "The wind howled across the broken ramparts. ".repeat(n)
    }

    #[test]
    fn strips_site_branding_from_titles() {
        assert_eq!(
            clean_title("Vol. 2 Ch. 15 – The Return – ☕ Kat Reading Cafe"),
            "Vol. 2 Ch. 15 - The Return"
        );
        assert_eq!(
            clean_title("Shadow Slave #Chapter 12 Chapter 12: Nightmare - Read Shadow Slave Online"),
            "Shadow Slave Chapter 12: Nightmare"
        );
        assert_eq!(
            clean_title("Chapter 3: Dawn | Novel Bin"),
            "Chapter 3: Dawn"
        );
        assert_eq!(clean_title("  Chapter   4\n  Rise  "), "Chapter 4 Rise");
    }

    #[test]
    fn first_matching_selector_wins() {
        let html = format!(
            r#"<html><body><div class="entry-content"><p>{}</p><p>{}</p><script>var x = 1;</script></div>
            <div class="chr-c">other</div></body></html>"#,
            sentence(2),
            sentence(2)
        );
        let content = extractor().extract_from(7, "Chapter 7", &html);
        assert!(content.valid);
        assert!(content.body.contains("\n\n"));
        assert!(!content.body.contains("var x"));
    }

    #[test]
    fn falls_back_to_long_paragraphs() {
        let html = format!(
            "<html><body><p>short</p><p>{}</p><p>{}</p></body></html>",
            sentence(2),
            sentence(2)
        );
        let content = extractor().extract_from(1, "Chapter 1", &html);
        assert!(content.valid);
        assert!(!content.body.contains("short"));
    }

    #[test]
    fn falls_back_to_main_landmark() {
        let html = format!(
            "<html><body><main><span>{}</span></main></body></html>",
            sentence(3)
        );
        let content = extractor().extract_from(1, "Chapter 1", &html);
        assert!(content.valid);
    }

    #[test]
    fn short_body_is_invalid() {
        let html = r#"<html><body><div class="entry-content">Locked. Buy coins.</div></body></html>"#;
        let content = extractor().extract_from(9, "Chapter 9", html);
        assert!(!content.valid);
    }

    #[test]
    fn error_title_is_invalid_even_with_body() {
        let html = format!(
            r#"<html><body><div class="entry-content">{}</div></body></html>"#,
            sentence(5)
        );
        let content = extractor().extract_from(9, "404 Not Found", &html);
        assert!(!content.valid);
    }

    #[test]
    fn empty_title_defaults_to_chapter_number() {
        let content = extractor().extract_from(11, " – ☕ Kat Reading Cafe", "<html></html>");
        assert_eq!(content.title, "Chapter 11");
    }
}
