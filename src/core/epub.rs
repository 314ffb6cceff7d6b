//! EPUB 编译引擎 (EPUB Compilation Engine)
//!
//! 将归档目录中的章节文本打包为 EPUB 容器，每章一个 XHTML 文档。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use epub_builder::{EpubBuilder, EpubContent, ZipLibrary};
use tokio::fs;
use tracing::{info, warn};

use crate::core::archive::{ArchiveReader, ArchivedChapter, Selection};

/// 正文行的排版类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// 游戏式系统提示，如 `【Level Up】`
    System,
    Dialog,
    Body,
}

impl LineKind {
    fn class(self) -> &'static str {
        match self {
            LineKind::System => "system",
            LineKind::Dialog => "dialog",
            LineKind::Body => "body",
        }
    }
}

/// 按行内容判断排版类别
pub fn classify_line(line: &str) -> LineKind {
    let bracketed = (line.starts_with('【') && line.ends_with('】'))
        || (line.starts_with('[') && line.ends_with(']'))
        || (line.contains("System") && line.contains(['【', '[', '『']));
    if bracketed {
        return LineKind::System;
    }

    let lower = line.to_lowercase();
    let quoted = line.matches('"').count() >= 2 || line.starts_with('"') || line.ends_with('"');
    if quoted || lower.contains("said") || lower.contains("asked") {
        return LineKind::Dialog;
    }
    LineKind::Body
}

/// EPUB 导出器
pub struct EpubExporter {
    title: String,
    language: String,
    chapter_dir: String,
}

impl EpubExporter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            language: "en".to_string(),
            chapter_dir: "Text".to_string(),
        }
    }

    /// 读取选定章节并写入 `<output_dir>/<file_stem>.epub`
    ///
    /// 付费墙章节被跳过。没有可导出的章节时返回错误。
    pub async fn export(
        &self,
        reader: &ArchiveReader,
        selection: Selection,
        output_dir: &Path,
        file_stem: &str,
    ) -> Result<PathBuf> {
        let chapters = reader.select(selection).await?;
        let (locked, unlocked): (Vec<_>, Vec<_>) =
            chapters.into_iter().partition(|c| reader.is_locked(c));
        for chapter in &locked {
            warn!("第 {} 章为付费内容，跳过导出", chapter.number);
        }
        if unlocked.is_empty() {
            anyhow::bail!("No exportable chapters in {:?}", reader.store().dir());
        }

        fs::create_dir_all(output_dir)
            .await
            .with_context(|| format!("Failed to create export dir: {:?}", output_dir))?;
        let final_path = output_dir.join(format!("{}.epub", file_stem));

        let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(|e| anyhow::anyhow!(e))?)
            .map_err(|e| anyhow::anyhow!(e))?;
        self.configure_metadata(&mut builder, &unlocked);
        for chapter in &unlocked {
            self.add_chapter(&mut builder, chapter)?;
        }

        let final_path_clone = final_path.clone();
        // ZIP 压缩放到阻塞线程池
        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = std::fs::File::create(&final_path_clone)
                .with_context(|| format!("Failed to create artifact: {:?}", final_path_clone))?;
            builder.generate(file).map_err(|e| anyhow::anyhow!(e))?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("Worker join error: {}", e))??;

        info!(
            "📚 已导出 {} 章 (跳过 {} 章付费内容): {:?}",
            unlocked.len(),
            locked.len(),
            final_path
        );
        Ok(final_path)
    }

    fn configure_metadata(&self, builder: &mut EpubBuilder<ZipLibrary>, chapters: &[ArchivedChapter]) {
        let range = match (chapters.first(), chapters.last()) {
            (Some(first), Some(last)) => format!("Chapters {} - {}", first.number, last.number),
            _ => String::new(),
        };
        builder.set_title(format!("{} ({})", self.title, range));
        builder.set_lang(&self.language);
        builder.set_description(vec![format!(
            "{}, generated on {}",
            range,
            chrono::Local::now().format("%B %d, %Y")
        )]);
    }

    fn add_chapter(
        &self,
        builder: &mut EpubBuilder<ZipLibrary>,
        chapter: &ArchivedChapter,
    ) -> Result<()> {
        let file_name = format!("{}/chapter_{:04}.xhtml", self.chapter_dir, chapter.number);
        let title = escape(&chapter.title);
        let content = format!(
            "<h1>{}</h1><div id=\"content\">{}</div>",
            title,
            render_body(&chapter.body)
        );
        let xhtml_content = self.wrap_html(&title, &content);

        builder
            .add_content(EpubContent::new(&file_name, xhtml_content.as_bytes()).title(&chapter.title))
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    /// 应用 XHTML 1.1 标准模板包装
    fn wrap_html(&self, title: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{}">
<head>
    <meta http-equiv="Content-Type" content="application/xhtml+xml; charset=utf-8" />
    <title>{}</title>
</head>
<body>
{}
</body>
</html>"#,
            self.language, title, body
        )
    }
}

/// 每个非空行一个带类别的段落
fn render_body(body: &str) -> String {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| format!("<p class=\"{}\">{}</p>", classify_line(l).class(), escape(l)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
