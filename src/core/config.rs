//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.toml` 的反序列化及其层级结构映射，支持环境变量覆盖与默认值回退机制。

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use config::{Config, Environment, File};
use rand::Rng;
use serde::Deserialize;

use crate::core::error::{HarvestError, Result};

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct AppConfig {
    /// 章节归档根目录
    #[serde(default = "default_archive_root")]
    #[builder(default = default_archive_root())]
    pub archive_root: PathBuf,

    /// 系列注册表文件 (Name|URL|SiteVariant)
    #[serde(default = "default_registry_file")]
    #[builder(default = default_registry_file())]
    pub registry_file: PathBuf,

    /// EPUB 导出目录
    #[serde(default = "default_export_dir")]
    #[builder(default = default_export_dir())]
    pub export_dir: PathBuf,

    /// 自动化浏览器 (Chromium) 相关配置
    #[serde(default)]
    #[builder(default)]
    pub browser: BrowserConfig,

    /// 下载调度参数
    #[serde(default)]
    #[builder(default)]
    pub scraper: ScraperConfig,

    /// 章节发现 (滚动/展开) 参数
    #[serde(default)]
    #[builder(default)]
    pub discovery: DiscoveryConfig,

    /// 正文提取阈值
    #[serde(default)]
    #[builder(default)]
    pub extraction: ExtractionConfig,

    /// 通知播报
    #[serde(default)]
    #[builder(default)]
    pub notify: NotifyConfig,

    /// 归档后处理
    #[serde(default)]
    #[builder(default)]
    pub archive: ArchiveConfig,
}

/// 浏览器引擎配置
#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    /// 是否以无头模式 (Headless) 运行
    #[serde(default = "default_true")]
    pub headless: bool,
    /// 自定义可执行文件路径
    pub chrome_path: Option<String>,
    /// 覆盖 User-Agent
    pub user_agent: Option<String>,
    /// 禁止加载图片以加快渲染
    #[serde(default = "default_true")]
    pub block_images: bool,
}

/// 调度引擎参数
#[derive(Debug, Deserialize, Clone)]
pub struct ScraperConfig {
    /// 连续失败多少次后判定为系列已到末尾
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// 每成功下载多少章播报一次进度
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    /// 章节之间的随机间隔
    #[serde(default = "default_chapter_delay")]
    pub chapter_delay: DelayRange,
    /// 达到失败阈值时先重新发现一次以确认是否真的到底
    #[serde(default)]
    pub confirm_exhaustion: bool,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// 章节级重试策略
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

/// 退避策略
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    None,
    Fixed { ms: u64 },
    Linear { ms: u64 },
    Exponential { base_ms: u64, max_ms: u64 },
}

/// 发现流程参数
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// 打开页面后的等待
    #[serde(default = "default_page_load")]
    pub page_load: DelayRange,
    /// 打开章节页后的等待
    #[serde(default = "default_chapter_load")]
    pub chapter_load: DelayRange,
    /// 展开卷或点击标签后的稳定等待
    #[serde(default = "default_settle")]
    pub settle: DelayRange,
    /// 每次滚动后等待懒加载
    #[serde(default = "default_lazy_load")]
    pub lazy_load: DelayRange,
    /// 滚动到元素后、点击前的短暂停顿
    #[serde(default = "default_click_pause")]
    pub click_pause: DelayRange,
    #[serde(default = "default_max_scroll_iterations")]
    pub max_scroll_iterations: u32,
    /// 连续多少轮无新章节即视为稳定
    #[serde(default = "default_stable_iterations")]
    pub stable_iterations: u32,
    #[serde(default)]
    pub scroll: ScrollSchedule,
    #[serde(default = "default_bottom_margin")]
    pub bottom_margin_px: i64,
    /// 预先访问第 0/1 章以触发懒加载缓存
    #[serde(default = "default_true")]
    pub prime_early_chapters: bool,
}

/// 滚动步长：从小步开始，按几何级数增长并封顶
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct ScrollSchedule {
    #[serde(default = "default_scroll_initial")]
    pub initial_px: i64,
    #[serde(default = "default_scroll_growth")]
    pub growth: f64,
    #[serde(default = "default_scroll_max")]
    pub max_px: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,
    #[serde(default = "default_min_paragraph_chars")]
    pub min_paragraph_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 播报前附加按时段的问候语
    #[serde(default = "default_true")]
    pub greeting: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArchiveConfig {
    /// 付费墙/占位页的标记文本 (大小写不敏感)
    #[serde(default = "default_locked_markers")]
    pub locked_markers: Vec<String>,
}

/// 随机时长区间 (毫秒)
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const ZERO: DelayRange = DelayRange { min_ms: 0, max_ms: 0 };

    pub const fn between(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub const fn fixed(ms: u64) -> Self {
        Self { min_ms: ms, max_ms: ms }
    }

    /// 在区间内均匀采样
    pub fn sample(&self) -> Duration {
        if self.max_ms <= self.min_ms {
            return Duration::from_millis(self.min_ms);
        }
        Duration::from_millis(rand::rng().random_range(self.min_ms..=self.max_ms))
    }

    pub fn is_zero(&self) -> bool {
        self.max_ms == 0
    }
}

impl ScrollSchedule {
    /// 第 `iteration` 轮 (0 起) 的滚动距离
    pub fn amount(&self, iteration: u32) -> i64 {
        let raw = self.initial_px as f64 * self.growth.powi(iteration as i32);
        (raw.round() as i64).clamp(self.initial_px.min(self.max_px), self.max_px)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            user_agent: None,
            block_images: true,
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            progress_interval: default_progress_interval(),
            chapter_delay: default_chapter_delay(),
            confirm_exhaustion: false,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: Backoff::default(),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Linear { ms: 2000 }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_load: default_page_load(),
            chapter_load: default_chapter_load(),
            settle: default_settle(),
            lazy_load: default_lazy_load(),
            click_pause: default_click_pause(),
            max_scroll_iterations: default_max_scroll_iterations(),
            stable_iterations: default_stable_iterations(),
            scroll: ScrollSchedule::default(),
            bottom_margin_px: default_bottom_margin(),
            prime_early_chapters: true,
        }
    }
}

impl Default for ScrollSchedule {
    fn default() -> Self {
        Self {
            initial_px: default_scroll_initial(),
            growth: default_scroll_growth(),
            max_px: default_scroll_max(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_body_chars: default_min_body_chars(),
            min_paragraph_chars: default_min_paragraph_chars(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            greeting: true,
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            locked_markers: default_locked_markers(),
        }
    }
}

fn default_archive_root() -> PathBuf {
    PathBuf::from("chapters")
}
fn default_registry_file() -> PathBuf {
    PathBuf::from("novel_urls.txt")
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}
fn default_true() -> bool {
    true
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_progress_interval() -> usize {
    10
}
fn default_chapter_delay() -> DelayRange {
    DelayRange::between(2000, 4000)
}
fn default_max_attempts() -> u32 {
    2
}
fn default_page_load() -> DelayRange {
    DelayRange::between(3000, 6000)
}
fn default_chapter_load() -> DelayRange {
    DelayRange::between(2000, 4000)
}
fn default_settle() -> DelayRange {
    DelayRange::fixed(3000)
}
fn default_lazy_load() -> DelayRange {
    DelayRange::between(2500, 4000)
}
fn default_click_pause() -> DelayRange {
    DelayRange::between(1000, 2000)
}
fn default_max_scroll_iterations() -> u32 {
    25
}
fn default_stable_iterations() -> u32 {
    4
}
fn default_bottom_margin() -> i64 {
    100
}
fn default_scroll_initial() -> i64 {
    200
}
fn default_scroll_growth() -> f64 {
    1.3
}
fn default_scroll_max() -> i64 {
    1500
}
fn default_min_body_chars() -> usize {
    100
}
fn default_min_paragraph_chars() -> usize {
    50
}
fn default_locked_markers() -> Vec<String> {
    vec![
        "this chapter is locked".into(),
        "unlock this chapter".into(),
        "purchase this chapter".into(),
        "buy coins to unlock".into(),
    ]
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig::builder().build()
    }
}

impl AppConfig {
    /// 从文件系统与环境变量中加载并解析配置
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let builder = Config::builder();

        let builder = if config_path.exists() {
            builder.add_source(File::from(config_path))
        } else {
            builder
        };

        let settings = builder
            .add_source(Environment::with_prefix("NOVEL_HARVEST").separator("__"))
            .build()
            .map_err(HarvestError::Config)?;
        settings.try_deserialize().map_err(HarvestError::Config)
    }

    /// 所有等待归零的配置，便于离线驱动
    pub fn without_delays(mut self) -> Self {
        self.scraper.chapter_delay = DelayRange::ZERO;
        self.scraper.retry.backoff = Backoff::None;
        self.discovery.page_load = DelayRange::ZERO;
        self.discovery.chapter_load = DelayRange::ZERO;
        self.discovery.settle = DelayRange::ZERO;
        self.discovery.lazy_load = DelayRange::ZERO;
        self.discovery.click_pause = DelayRange::ZERO;
        self
    }
}
