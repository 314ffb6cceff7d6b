//! 下载调度器
//!
//! 负责协调一次运行的生命周期：确定区间 -> 逐章抓取 -> 失败阈值判定 -> 结束播报

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::core::config::AppConfig;
use crate::core::error::{HarvestError, Result};
use crate::core::event::{EventSender, HarvestEvent};
use crate::core::model::{ChapterContent, ChapterLocator, ChapterRange, SeriesSource};
use crate::core::store::ChapterStore;
use crate::interfaces::notifier::Notifier;
use crate::interfaces::renderer::{PageRenderer, PageSession};
use crate::interfaces::site::{SessionMode, SiteStrategy};
use crate::utils::pause_or_cancel;

use super::planner::ChapterPlan;
use super::retry::RetryPolicy;
use super::session::ScopedSession;
use super::status::{RunControl, RunState};

/// 一次运行的请求参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    /// 本次最多下载的章节数
    pub requested: u32,
    /// 显式起始章节；缺省时从本地最新章节的下一章开始
    pub start: Option<u32>,
}

/// 单章失败记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterFailure {
    pub number: u32,
    pub reason: String,
}

/// 运行结果汇总
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunState,
    pub downloaded: usize,
    pub requested: usize,
    pub start: u32,
    pub end: u32,
    pub failures: Vec<ChapterFailure>,
}

/// 章节获取方式
enum Fetch<'a> {
    /// 复用同一会话与预先解析的链接
    Shared {
        session: &'a mut dyn PageSession,
        locators: BTreeMap<u32, ChapterLocator>,
    },
    /// 每章新开会话
    PerChapter,
}

/// 单章处理结果
enum Step {
    Saved,
    Failed(String),
    Fatal(String),
}

/// 下载调度器
pub struct DownloadEngine {
    config: Arc<AppConfig>,
    renderer: Arc<dyn PageRenderer>,
    site: Arc<dyn SiteStrategy>,
    notifier: Arc<dyn Notifier>,
    control: RunControl,
    retry: RetryPolicy,
    events: Option<EventSender>,
}

impl DownloadEngine {
    pub fn new(
        config: Arc<AppConfig>,
        renderer: Arc<dyn PageRenderer>,
        site: Arc<dyn SiteStrategy>,
        notifier: Arc<dyn Notifier>,
        control: RunControl,
    ) -> Self {
        Self {
            retry: RetryPolicy::new(&config.scraper.retry),
            config,
            renderer,
            site,
            notifier,
            control,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    fn emit(&self, event: HarvestEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    /// 发现远端章节并与本地归档对比
    pub async fn check(&self, source: &SeriesSource) -> Result<ChapterPlan> {
        let latest = ChapterStore::new(&source.archive_dir).latest().await?;
        let mut session = ScopedSession::acquire(self.renderer.as_ref()).await?;
        let discovered = self.site.discover_all(session.get(), source).await;
        session.release().await;

        let discovered = discovered?;
        self.emit(HarvestEvent::ChaptersDiscovered {
            total: discovered.len(),
        });
        Ok(ChapterPlan::compute(latest, &discovered))
    }

    /// 执行一次下载运行
    pub async fn run(&self, source: &SeriesSource, request: RunRequest) -> Result<RunReport> {
        if !self.control.start() {
            warn!("运行已开始或已结束，忽略重复启动");
            return Err(HarvestError::Cancelled);
        }

        let store = ChapterStore::new(&source.archive_dir);
        let latest = match store.latest().await {
            Ok(l) => l,
            Err(e) => {
                self.control.finish(RunState::Error(e.to_string()));
                return Err(e);
            }
        };

        info!(
            "开始下载 {} ({})，本地最新章节: {:?}",
            source.name, source.variant, latest
        );

        let report = match self.site.session_mode() {
            SessionMode::Shared => self.run_shared(source, request, latest, &store).await,
            SessionMode::PerChapter => self.run_per_chapter(source, request, latest, &store).await,
        };

        self.control.finish(report.outcome.clone());

        let success = !matches!(report.outcome, RunState::Error(_));
        self.notifier
            .announce_completion(report.downloaded, report.requested, success);
        self.emit(HarvestEvent::RunFinished {
            state: report.outcome.clone(),
            downloaded: report.downloaded,
            requested: report.requested,
        });

        info!(
            "运行结束: {} (下载 {}/{}，区间 #{}-#{})",
            report.outcome, report.downloaded, report.requested, report.start, report.end
        );
        Ok(report)
    }

    /// 共享会话：一次解析全部链接，随后在同一会话中逐章下载
    async fn run_shared(
        &self,
        source: &SeriesSource,
        request: RunRequest,
        latest: Option<u32>,
        store: &ChapterStore,
    ) -> RunReport {
        let fallback_start = start_chapter(request, latest, None);

        if self.control.is_cancelled() {
            return self.empty_report(request, fallback_start, RunState::StoppedByUser);
        }

        let mut session = match ScopedSession::acquire(self.renderer.as_ref()).await {
            Ok(s) => s,
            Err(e) => {
                error!("无法启动渲染会话: {}", e);
                return self.empty_report(request, fallback_start, RunState::Error(e.to_string()));
            }
        };

        let report = match self.resolve_all(session.get(), source).await {
            Ok(locators) => {
                self.emit(HarvestEvent::ChaptersDiscovered {
                    total: locators.len(),
                });
                let start = start_chapter(request, latest, locators.keys().next().copied());
                self.download_range(
                    source,
                    request,
                    start,
                    store,
                    Fetch::Shared {
                        session: session.get(),
                        locators,
                    },
                )
                .await
            }
            Err(e) => {
                error!("章节解析失败: {}", e);
                self.empty_report(request, fallback_start, RunState::Error(e.to_string()))
            }
        };
        session.release().await;
        report
    }

    /// 每章独立会话；空归档时先发现一次远端章节以确定起点
    async fn run_per_chapter(
        &self,
        source: &SeriesSource,
        request: RunRequest,
        latest: Option<u32>,
        store: &ChapterStore,
    ) -> RunReport {
        let first_remote = match (request.start, latest) {
            (None, None) if !self.control.is_cancelled() => self.first_remote_chapter(source).await,
            _ => None,
        };
        let start = start_chapter(request, latest, first_remote);
        self.download_range(source, request, start, store, Fetch::PerChapter)
            .await
    }

    async fn first_remote_chapter(&self, source: &SeriesSource) -> Option<u32> {
        let mut session = match ScopedSession::acquire(self.renderer.as_ref()).await {
            Ok(s) => s,
            Err(e) => {
                warn!("无法启动渲染会话，从第 1 章开始: {}", e);
                return None;
            }
        };
        let discovered = self.site.discover_all(session.get(), source).await;
        session.release().await;

        match discovered {
            Ok(set) => {
                self.emit(HarvestEvent::ChaptersDiscovered { total: set.len() });
                set.min()
            }
            Err(e) => {
                warn!("章节发现失败，从第 1 章开始: {}", e);
                None
            }
        }
    }

    async fn resolve_all(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
    ) -> Result<BTreeMap<u32, ChapterLocator>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.site.resolve(session, source, ChapterRange::all()).await {
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    let wait = self.retry.delay_for(attempt);
                    warn!(
                        "章节解析失败 (第 {}/{} 次): {}。将在 {:?} 后重试...",
                        attempt, self.retry.max_attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    /// 顺序处理 `start..start+requested` 区间
    async fn download_range(
        &self,
        source: &SeriesSource,
        request: RunRequest,
        start: u32,
        store: &ChapterStore,
        mut fetch: Fetch<'_>,
    ) -> RunReport {
        let requested = request.requested as usize;
        let end = start.saturating_add(request.requested).saturating_sub(1);
        let mut report = RunReport {
            outcome: RunState::Completed,
            downloaded: 0,
            requested,
            start,
            end,
            failures: Vec::new(),
        };
        if request.requested == 0 {
            return report;
        }

        self.emit(HarvestEvent::RunStarted {
            series: source.name.clone(),
            start,
            end,
        });
        info!("下载区间: #{} - #{}", start, end);

        let threshold = self.config.scraper.failure_threshold.max(1);
        let interval = self.config.scraper.progress_interval;
        let mut consecutive = 0u32;
        let mut confirmed = false;

        for (position, number) in (start..=end).enumerate() {
            if self.control.is_cancelled() {
                info!("收到停止请求，于第 {} 章前停止", number);
                report.outcome = RunState::StoppedByUser;
                break;
            }

            self.control.record_attempt();
            self.emit(HarvestEvent::ChapterStarted {
                number,
                position: position + 1,
                total: requested,
            });

            match self.process_chapter(&mut fetch, source, store, number).await {
                Step::Saved => {
                    consecutive = 0;
                    report.downloaded = self.control.record_download();
                    if interval > 0 && report.downloaded % interval == 0 {
                        self.notifier.announce_progress(report.downloaded);
                    }
                }
                Step::Fatal(reason) => {
                    error!("第 {} 章遇到致命错误，终止运行: {}", number, reason);
                    report.failures.push(ChapterFailure { number, reason: reason.clone() });
                    report.outcome = RunState::Error(reason);
                    break;
                }
                Step::Failed(reason) => {
                    consecutive += 1;
                    warn!(
                        "第 {} 章跳过 (连续失败 {}/{}): {}",
                        number, consecutive, threshold, reason
                    );
                    if let Some(events) = &self.events {
                        events.chapter_skipped(number, reason.clone());
                    }
                    report.failures.push(ChapterFailure { number, reason });

                    if consecutive >= threshold {
                        if self.config.scraper.confirm_exhaustion
                            && !confirmed
                            && self.remote_has_more(&mut fetch, source, number).await
                        {
                            info!("重新发现确认远端仍有后续章节，继续下载");
                            confirmed = true;
                            consecutive = 0;
                        } else {
                            info!("连续 {} 章失败，判定已到达系列末尾", consecutive);
                            report.outcome = RunState::StoppedOnFailureThreshold;
                            break;
                        }
                    }
                }
            }

            if number < end
                && !pause_or_cancel(self.config.scraper.chapter_delay, self.control.token()).await
            {
                info!("等待期间收到停止请求");
                report.outcome = RunState::StoppedByUser;
                break;
            }
        }

        report
    }

    /// 获取、校验并保存单章
    async fn process_chapter(
        &self,
        fetch: &mut Fetch<'_>,
        source: &SeriesSource,
        store: &ChapterStore,
        number: u32,
    ) -> Step {
        let content = match self.fetch_with_retry(fetch, source, number).await {
            Ok(c) => c,
            Err(e) if e.is_fatal() => return Step::Fatal(e.to_string()),
            Err(e) => return Step::Failed(e.to_string()),
        };

        if !content.valid {
            let e = HarvestError::ExtractionInsufficient {
                number,
                reason: format!("{} chars, title '{}'", content.body.chars().count(), content.title),
            };
            return Step::Failed(e.to_string());
        }

        match store.save(&content).await {
            Ok(path) => {
                info!("✅ 第 {} 章已保存: {:?}", number, path.file_name().unwrap_or_default());
                if let Some(events) = &self.events {
                    events.chapter_saved(number, &content.title);
                }
                Step::Saved
            }
            Err(e) => Step::Failed(e.to_string()),
        }
    }

    async fn fetch_with_retry(
        &self,
        fetch: &mut Fetch<'_>,
        source: &SeriesSource,
        number: u32,
    ) -> Result<ChapterContent> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.fetch_once(fetch, source, number).await {
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    let wait = self.retry.delay_for(attempt);
                    warn!(
                        "第 {} 章获取失败 (第 {}/{} 次): {}。将在 {:?} 后重试...",
                        number, attempt, self.retry.max_attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }

    async fn fetch_once(
        &self,
        fetch: &mut Fetch<'_>,
        source: &SeriesSource,
        number: u32,
    ) -> Result<ChapterContent> {
        match fetch {
            Fetch::Shared { session, locators } => {
                let locator = locators
                    .get(&number)
                    .ok_or(HarvestError::ChapterNotListed(number))?;
                self.site.download(&mut **session, locator).await
            }
            Fetch::PerChapter => {
                let mut session = ScopedSession::acquire(self.renderer.as_ref()).await?;
                let result = self.locate_and_download(session.get(), source, number).await;
                session.release().await;
                result
            }
        }
    }

    async fn locate_and_download(
        &self,
        session: &mut dyn PageSession,
        source: &SeriesSource,
        number: u32,
    ) -> Result<ChapterContent> {
        let locators = self
            .site
            .resolve(session, source, ChapterRange::single(number))
            .await?;
        let locator = locators
            .get(&number)
            .ok_or(HarvestError::ChapterNotListed(number))?;
        debug!("第 {} 章链接: {}", number, locator.url);
        self.site.download(session, locator).await
    }

    /// 重新发现一次，确认远端是否还有 `number` 之后的章节
    ///
    /// 共享会话下新发现的链接并入已解析的映射。
    async fn remote_has_more(
        &self,
        fetch: &mut Fetch<'_>,
        source: &SeriesSource,
        number: u32,
    ) -> bool {
        let after = number.saturating_add(1);
        match fetch {
            Fetch::Shared { session, locators } => {
                match self.site.resolve(&mut **session, source, ChapterRange::all()).await {
                    Ok(fresh) => {
                        let more = fresh.range(after..).next().is_some();
                        let before = locators.len();
                        locators.extend(fresh);
                        debug!("重新发现新增 {} 个章节链接", locators.len() - before);
                        more
                    }
                    Err(e) => {
                        warn!("重新发现失败: {}", e);
                        false
                    }
                }
            }
            Fetch::PerChapter => {
                let mut session = match ScopedSession::acquire(self.renderer.as_ref()).await {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("重新发现失败: {}", e);
                        return false;
                    }
                };
                let discovered = self.site.discover_all(session.get(), source).await;
                session.release().await;
                match discovered {
                    Ok(set) => set.count_from(after) > 0,
                    Err(e) => {
                        warn!("重新发现失败: {}", e);
                        false
                    }
                }
            }
        }
    }

    fn empty_report(&self, request: RunRequest, start: u32, outcome: RunState) -> RunReport {
        RunReport {
            outcome,
            downloaded: 0,
            requested: request.requested as usize,
            start,
            end: start.saturating_add(request.requested).saturating_sub(1),
            failures: Vec::new(),
        }
    }
}

/// 显式起点优先，其次本地最新章节的下一章；空归档从远端最小章节开始
fn start_chapter(request: RunRequest, latest: Option<u32>, first_remote: Option<u32>) -> u32 {
    match (request.start, latest) {
        (Some(start), _) => start,
        (None, Some(l)) => l + 1,
        (None, None) => first_remote.unwrap_or(1),
    }
}
