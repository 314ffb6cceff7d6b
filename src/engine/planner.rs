//! 下载计划 (Chapter Plan)
//!
//! 对比远端章节集合与本地归档，给出下一章与剩余章节数。

use crate::core::model::DiscoveredChapterSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterPlan {
    pub latest_local: Option<u32>,
    pub min_available: Option<u32>,
    pub max_available: Option<u32>,
    pub total_available: usize,
    pub next_chapter: u32,
    pub remaining: usize,
    pub latest_volume: Option<u32>,
}

impl ChapterPlan {
    /// 空归档从远端最小章节开始，否则从本地最新章节的下一章开始
    pub fn compute(latest_local: Option<u32>, discovered: &DiscoveredChapterSet) -> Self {
        let next_chapter = match latest_local {
            Some(latest) => latest + 1,
            None => discovered.min().unwrap_or(1),
        };
        Self {
            latest_local,
            min_available: discovered.min(),
            max_available: discovered.max(),
            total_available: discovered.len(),
            next_chapter,
            remaining: discovered.count_from(next_chapter),
            latest_volume: discovered.latest_volume,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.remaining == 0
    }
}

impl std::fmt::Display for ChapterPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.min_available, self.max_available) {
            (Some(min), Some(max)) => writeln!(
                f,
                "Available: {} chapters ({} - {})",
                self.total_available, min, max
            )?,
            _ => writeln!(f, "Available: none")?,
        }
        if let Some(volume) = self.latest_volume {
            writeln!(f, "Latest volume: {}", volume)?;
        }
        match self.latest_local {
            Some(latest) => writeln!(f, "Downloaded up to: {}", latest)?,
            None => writeln!(f, "Downloaded up to: nothing yet")?,
        }
        write!(
            f,
            "Next chapter: {} ({} remaining)",
            self.next_chapter, self.remaining
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(chapters: impl IntoIterator<Item = u32>) -> DiscoveredChapterSet {
        DiscoveredChapterSet {
            chapters: chapters.into_iter().collect(),
            latest_volume: None,
        }
    }

    #[test]
    fn empty_archive_starts_at_chapter_zero() {
        let plan = ChapterPlan::compute(None, &set(0..=40));
        assert_eq!(plan.next_chapter, 0);
        assert_eq!(plan.remaining, 41);
    }

    #[test]
    fn resumes_after_latest_download() {
        let plan = ChapterPlan::compute(Some(10), &set(1..=25));
        assert_eq!(plan.next_chapter, 11);
        assert_eq!(plan.remaining, 15);
        assert!(!plan.is_up_to_date());

        let done = ChapterPlan::compute(Some(25), &set(1..=25));
        assert!(done.is_up_to_date());
    }

    #[test]
    fn downloaded_chapter_zero_moves_to_one() {
        let plan = ChapterPlan::compute(Some(0), &set(0..=3));
        assert_eq!(plan.next_chapter, 1);
        assert_eq!(plan.remaining, 3);
    }
}
