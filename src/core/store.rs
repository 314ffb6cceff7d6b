//! 章节归档存储 (Chapter Store)
//!
//! 每部小说一个目录，每章一个 `NNN_<标题>.txt` 文件。
//! 章节是否已下载完全由文件名前缀决定，不维护额外索引。

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio::fs;
use tracing::{debug, warn};

use crate::core::error::{HarvestError, Result};
use crate::core::model::ChapterContent;

/// 完整路径的长度上限，超出则改用回退文件名
const MAX_PATH_LEN: usize = 240;
/// 标题截断长度 (字符)
const MAX_TITLE_CHARS: usize = 80;

fn prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)_").expect("static regex"))
}

/// 从文件名中取出章节编号
pub fn chapter_number_of(file_name: &str) -> Option<u32> {
    prefix_re()
        .captures(file_name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 单部小说的归档目录
#[derive(Debug, Clone)]
pub struct ChapterStore {
    dir: PathBuf,
}

impl ChapterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 已下载的全部章节编号；目录不存在时为空
    pub async fn downloaded(&self) -> Result<BTreeSet<u32>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|(number, _)| number)
            .collect())
    }

    /// 最新章节编号；空目录返回 `None`，以区分 "尚无章节" 与 "仅有第 0 章"
    pub async fn latest(&self) -> Result<Option<u32>> {
        Ok(self.downloaded().await?.last().copied())
    }

    /// 最新章节编号，无章节时为 0
    pub async fn latest_downloaded(&self) -> Result<u32> {
        Ok(self.latest().await?.unwrap_or(0))
    }

    /// 写入章节，返回最终落盘路径
    ///
    /// 同一章节号只保留一个文件：若已有不同文件名的旧文件，
    /// 改写为回退文件名并清理旧文件。
    pub async fn save(&self, content: &ChapterContent) -> Result<PathBuf> {
        let number = content.number;
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| HarvestError::Persistence { number, source })?;

        let title = display_title(&content.title, number);
        let fallback = self.dir.join(fallback_file_name(number));
        let preferred = self.dir.join(file_name(number, &title));

        let existing = self.files_for(number).await?;
        let conflict = existing.iter().any(|p| p != &preferred);

        let target = if conflict {
            debug!("第 {} 章已存在其他文件名，改用回退文件名", number);
            fallback.clone()
        } else if preferred.as_os_str().len() > MAX_PATH_LEN {
            debug!("第 {} 章路径过长，改用回退文件名", number);
            fallback.clone()
        } else {
            preferred
        };

        let text = format!("{}\n\n{}", title, content.body);
        let written = match fs::write(&target, &text).await {
            Ok(()) => target,
            Err(e) if target != fallback => {
                warn!("写入 {:?} 失败: {}，改用回退文件名重试", target, e);
                fs::write(&fallback, &text)
                    .await
                    .map_err(|source| HarvestError::Persistence { number, source })?;
                fallback
            }
            Err(source) => return Err(HarvestError::Persistence { number, source }),
        };

        for stale in existing.into_iter().filter(|p| p != &written) {
            if let Err(e) = fs::remove_file(&stale).await {
                warn!("清理旧章节文件 {:?} 失败: {}", stale, e);
            }
        }

        Ok(written)
    }

    /// 某章节号对应的全部现存文件
    async fn files_for(&self, number: u32) -> Result<Vec<PathBuf>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter(|(n, _)| *n == number)
            .map(|(_, path)| path)
            .collect())
    }

    /// 扫描目录中带章节前缀的文件
    pub(crate) async fn entries(&self) -> Result<Vec<(u32, PathBuf)>> {
        let mut out = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            if let Some(number) = name.to_str().and_then(chapter_number_of) {
                out.push((number, entry.path()));
            }
        }
        out.sort();
        Ok(out)
    }
}

/// 清理标题中的非法文件名字符并截断
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '#'))
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > MAX_TITLE_CHARS {
        let truncated: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
        format!("{}...", truncated.trim_end())
    } else {
        collapsed
    }
}

/// 空标题替换为 "Chapter N"
fn display_title(title: &str, number: u32) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        format!("Chapter {}", number)
    } else {
        trimmed.to_string()
    }
}

fn file_name(number: u32, title: &str) -> String {
    let safe = sanitize_title(title);
    if safe.is_empty() {
        fallback_file_name(number)
    } else {
        format!("{:03}_{}.txt", number, safe)
    }
}

fn fallback_file_name(number: u32) -> String {
    format!("{:03}_Chapter_{}.txt", number, number)
}

/// 由系列 URL 推导归档目录名 (末尾路径段)
pub fn series_folder(url: &str) -> String {
    let segment = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let name: String = segment
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    if name.is_empty() {
        "novel".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(number: u32, title: &str) -> ChapterContent {
        ChapterContent {
            number,
            title: title.to_string(),
            body: "Body text.".to_string(),
            valid: true,
        }
    }

    #[tokio::test]
    async fn latest_is_zero_for_absent_or_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let absent = ChapterStore::new(tmp.path().join("missing"));
        assert_eq!(absent.latest_downloaded().await.unwrap(), 0);
        assert_eq!(absent.latest().await.unwrap(), None);

        let empty = ChapterStore::new(tmp.path());
        assert_eq!(empty.latest_downloaded().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn latest_is_max_prefix_ignoring_other_files() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["001_A.txt", "007_B.txt", "12_C.txt", "notes.txt", "x_99.txt"] {
            std::fs::write(tmp.path().join(name), "x").unwrap();
        }
        let store = ChapterStore::new(tmp.path());
        assert_eq!(store.latest_downloaded().await.unwrap(), 12);
        assert_eq!(
            store.downloaded().await.unwrap().into_iter().collect::<Vec<_>>(),
            vec![1, 7, 12]
        );
    }

    #[tokio::test]
    async fn chapter_zero_is_distinguishable_from_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ChapterStore::new(tmp.path());
        store.save(&chapter(0, "Prologue")).await.unwrap();
        assert_eq!(store.latest().await.unwrap(), Some(0));
        assert_eq!(store.latest_downloaded().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn save_writes_title_then_body() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ChapterStore::new(tmp.path().join("series"));
        let path = store
            .save(&chapter(5, "Chapter 5: The <Gate> / Opens?"))
            .await
            .unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "005_Chapter 5 The Gate Opens.txt"
        );
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Chapter 5: The <Gate> / Opens?\n\nBody text.");
    }

    #[tokio::test]
    async fn empty_title_becomes_chapter_n() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ChapterStore::new(tmp.path());
        let path = store.save(&chapter(3, "   ")).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "003_Chapter 3.txt");
        assert!(std::fs::read_to_string(path).unwrap().starts_with("Chapter 3\n\n"));
    }

    #[tokio::test]
    async fn resave_with_other_title_keeps_one_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ChapterStore::new(tmp.path());
        store.save(&chapter(4, "Old Name")).await.unwrap();
        let path = store.save(&chapter(4, "New Name")).await.unwrap();

        assert_eq!(path.file_name().unwrap(), "004_Chapter_4.txt");
        let files: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(std::fs::read_to_string(path).unwrap().starts_with("New Name"));
    }

    #[tokio::test]
    async fn resave_with_same_title_overwrites() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ChapterStore::new(tmp.path());
        let first = store.save(&chapter(9, "Same")).await.unwrap();
        let second = store.save(&chapter(9, "Same")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn overlong_path_uses_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let deep = tmp.path().join("d".repeat(200));
        let store = ChapterStore::new(&deep);
        let path = store.save(&chapter(2, &"Long title ".repeat(10))).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "002_Chapter_2.txt");
    }

    #[test]
    fn sanitize_strips_and_truncates() {
        assert_eq!(sanitize_title("a#b\tc\n  d"), "ab c d");
        let long = "x".repeat(100);
        let out = sanitize_title(&long);
        assert_eq!(out.chars().count(), 83);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn series_folder_uses_trailing_segment() {
        assert_eq!(
            series_folder("https://katreadingcafe.com/novel/the-hero-returns/"),
            "the-hero-returns"
        );
        assert_eq!(
            series_folder("https://novelbin.me/novel-book/shadow-slave"),
            "shadow-slave"
        );
        assert_eq!(series_folder("https://x.org/a?b*c"), "abc");
    }
}
