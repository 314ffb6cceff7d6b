//! 归档读取 (Archive Reader)
//!
//! 读取 `ChapterStore` 落盘的章节文件，供导出使用。

use std::path::PathBuf;

use tokio::fs;
use tracing::debug;

use crate::core::config::ArchiveConfig;
use crate::core::error::Result;
use crate::core::store::ChapterStore;

/// 已归档的单章
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedChapter {
    pub number: u32,
    pub title: String,
    pub body: String,
    pub path: PathBuf,
}

/// 导出范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    /// 闭区间 `[a, b]`
    Range(u32, u32),
    /// 最新的 n 章
    Latest(usize),
}

impl Selection {
    pub fn apply(self, chapters: Vec<ArchivedChapter>) -> Vec<ArchivedChapter> {
        match self {
            Selection::All => chapters,
            Selection::Range(a, b) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                chapters
                    .into_iter()
                    .filter(|c| (lo..=hi).contains(&c.number))
                    .collect()
            }
            Selection::Latest(n) => {
                let skip = chapters.len().saturating_sub(n);
                chapters.into_iter().skip(skip).collect()
            }
        }
    }
}

/// 归档目录读取器
pub struct ArchiveReader {
    store: ChapterStore,
    locked_markers: Vec<String>,
}

impl ArchiveReader {
    pub fn new(store: ChapterStore, config: &ArchiveConfig) -> Self {
        Self {
            store,
            locked_markers: config
                .locked_markers
                .iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    pub fn store(&self) -> &ChapterStore {
        &self.store
    }

    /// 按章节号升序读取全部章节
    pub async fn chapters(&self) -> Result<Vec<ArchivedChapter>> {
        let mut out = Vec::new();
        for (number, path) in self.store.entries().await? {
            let text = fs::read_to_string(&path).await?;
            let (title, body) = split_chapter(&text, number);
            out.push(ArchivedChapter {
                number,
                title,
                body,
                path,
            });
        }
        debug!("归档中共 {} 章: {:?}", out.len(), self.store.dir());
        Ok(out)
    }

    pub async fn select(&self, selection: Selection) -> Result<Vec<ArchivedChapter>> {
        Ok(selection.apply(self.chapters().await?))
    }

    /// 正文含付费墙提示
    pub fn is_locked(&self, chapter: &ArchivedChapter) -> bool {
        let body = chapter.body.to_lowercase();
        self.locked_markers.iter().any(|m| body.contains(m))
    }
}

/// 首行为标题，空行之后为正文
fn split_chapter(text: &str, number: u32) -> (String, String) {
    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    let title = match first.trim() {
        "" => format!("Chapter {}", number),
        t => t.to_string(),
    };
    (title, rest.trim_start_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::ChapterContent;

    async fn archive_with(dir: &std::path::Path, chapters: &[(u32, &str, &str)]) -> ArchiveReader {
        let store = ChapterStore::new(dir);
        for &(number, title, body) in chapters {
            store
                .save(&ChapterContent {
                    number,
                    title: title.into(),
                    body: body.into(),
                    valid: true,
                })
                .await
                .unwrap();
        }
        ArchiveReader::new(store, &ArchiveConfig::default())
    }

    #[tokio::test]
    async fn reads_title_and_body_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let reader = archive_with(
            dir.path(),
            &[
                (10, "Vol. 1 Ch. 10", "Ten.\n\nMore."),
                (2, "Vol. 1 Ch. 2", "Two."),
            ],
        )
        .await;

        let chapters = reader.chapters().await.unwrap();
        assert_eq!(chapters.iter().map(|c| c.number).collect::<Vec<_>>(), vec![2, 10]);
        assert_eq!(chapters[1].title, "Vol. 1 Ch. 10");
        assert_eq!(chapters[1].body, "Ten.\n\nMore.");
    }

    #[tokio::test]
    async fn selections_narrow_the_list() {
        let dir = tempfile::tempdir().unwrap();
        let reader = archive_with(
            dir.path(),
            &[(1, "One", "a"), (2, "Two", "b"), (3, "Three", "c"), (4, "Four", "d")],
        )
        .await;

        let numbers = |v: Vec<ArchivedChapter>| v.iter().map(|c| c.number).collect::<Vec<_>>();
        assert_eq!(numbers(reader.select(Selection::Range(3, 2)).await.unwrap()), vec![2, 3]);
        assert_eq!(numbers(reader.select(Selection::Latest(3)).await.unwrap()), vec![2, 3, 4]);
        assert_eq!(numbers(reader.select(Selection::Latest(10)).await.unwrap()).len(), 4);
    }

    #[tokio::test]
    async fn paywall_text_marks_chapter_locked() {
        let dir = tempfile::tempdir().unwrap();
        let reader = archive_with(
            dir.path(),
            &[(1, "One", "Please Unlock This Chapter to continue."), (2, "Two", "Free text.")],
        )
        .await;

        let chapters = reader.chapters().await.unwrap();
        assert!(reader.is_locked(&chapters[0]));
        assert!(!reader.is_locked(&chapters[1]));
    }

    #[test]
    fn blank_first_line_gets_numbered_title() {
        assert_eq!(
            split_chapter("\n\nbody", 7),
            ("Chapter 7".to_string(), "body".to_string())
        );
    }
}
