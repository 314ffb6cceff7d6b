//! 系列注册表 (Series Registry)
//!
//! 纯文本文件，每行一部小说：`Name|URL|SiteVariant`。
//! 省略站点变体时按域名推断；仅给出 URL 时名称取自 URL 末尾的 slug。

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::core::error::{HarvestError, Result};
use crate::core::model::{SeriesSource, SiteVariant};
use crate::core::store::series_folder;

/// 注册表中的一条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub name: String,
    pub url: String,
    pub variant: SiteVariant,
}

impl RegistryEntry {
    pub fn new(name: impl Into<String>, url: impl Into<String>, variant: SiteVariant) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            variant,
        }
    }

    /// 解析单行；空行、注释行与无法识别站点的行返回 `None`
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let parts: Vec<&str> = line.split('|').map(str::trim).collect();
        let (name, url, variant) = match parts.as_slice() {
            [name, url, variant, ..] => {
                let variant = match variant.parse::<SiteVariant>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        warn!("未知站点类型 '{}'，改为按域名推断: {}", variant, url);
                        SiteVariant::from_url(url)
                    }
                };
                (name.to_string(), *url, variant)
            }
            [name, url] => (name.to_string(), *url, SiteVariant::from_url(url)),
            [url] => (name_from_url(url), *url, SiteVariant::from_url(url)),
            [] => return None,
        };

        let Some(variant) = variant else {
            warn!("无法识别的站点，已跳过: {}", url);
            return None;
        };

        if url.is_empty() {
            warn!("注册表行缺少 URL，已跳过: {}", line);
            return None;
        }

        let name = if name.is_empty() { name_from_url(url) } else { name };
        Some(Self::new(name, url, variant))
    }

    /// 序列化为注册表行
    pub fn to_line(&self) -> String {
        format!("{}|{}|{}", self.name, self.url, self.variant)
    }

    /// 绑定归档根目录，得到一次运行所需的系列描述
    pub fn to_source(&self, archive_root: &Path) -> SeriesSource {
        SeriesSource {
            name: self.name.clone(),
            series_url: self.url.clone(),
            variant: self.variant,
            archive_dir: archive_root.join(series_folder(&self.url)),
        }
    }
}

/// 注册表文件
#[derive(Debug, Clone)]
pub struct SeriesRegistry {
    path: PathBuf,
    entries: Vec<RegistryEntry>,
}

impl SeriesRegistry {
    /// 读取注册表；文件不存在时视为空表
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let text = match fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            entries: Self::parse(&text),
            path,
        })
    }

    pub fn parse(text: &str) -> Vec<RegistryEntry> {
        text.lines().filter_map(RegistryEntry::parse_line).collect()
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 按名称 (大小写不敏感) 或 1 起始序号查找
    pub fn find(&self, key: &str) -> Result<&RegistryEntry> {
        let key = key.trim();
        if let Ok(index) = key.parse::<usize>()
            && index >= 1
            && let Some(entry) = self.entries.get(index - 1)
        {
            return Ok(entry);
        }

        self.entries
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(key))
            .ok_or_else(|| HarvestError::Registry(format!("no series named '{}'", key)))
    }

    /// 追加一条记录；URL 已存在时拒绝
    pub async fn append(&mut self, entry: RegistryEntry) -> Result<()> {
        if self.entries.iter().any(|e| e.url == entry.url) {
            return Err(HarvestError::Registry(format!(
                "'{}' is already registered",
                entry.url
            )));
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let needs_newline = match fs::read(&self.path).await {
            Ok(bytes) => bytes.last().is_some_and(|b| *b != b'\n'),
            Err(_) => false,
        };

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut line = String::new();
        if needs_newline {
            line.push('\n');
        }
        line.push_str(&entry.to_line());
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        self.entries.push(entry);
        Ok(())
    }
}

/// 由 URL 末尾的 slug 生成展示名：`the-hero-returns` → `The Hero Returns`
pub fn name_from_url(url: &str) -> String {
    let slug = url
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
