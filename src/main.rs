//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化、依赖装配及运行生命周期管理。

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::fmt::MakeWriter;

use novel_harvest::core::announce::Announcer;
use novel_harvest::core::archive::{ArchiveReader, Selection};
use novel_harvest::core::config::AppConfig;
use novel_harvest::core::epub::EpubExporter;
use novel_harvest::core::event::create_event_channel;
use novel_harvest::core::model::{SeriesSource, SiteVariant};
use novel_harvest::core::registry::{RegistryEntry, SeriesRegistry, name_from_url};
use novel_harvest::core::store::{ChapterStore, series_folder};
use novel_harvest::engine::{DownloadEngine, RunControl, RunRequest};
use novel_harvest::interfaces::notifier::SilentNotifier;
use novel_harvest::interfaces::site::SiteStrategy;
use novel_harvest::network::ChromiumRenderer;
use novel_harvest::sites::{SiteContext, SiteRegistry};
use novel_harvest::ui::{Ui, get_multi};

/// 进度条感知的日志写入器
///
/// 日志经 `MultiProgress::println` 输出，不破坏进度条布局。
struct IndicatifWriter;

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let _ = get_multi().println(s.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&self) -> Self::Writer {
        IndicatifWriter
    }
}

#[derive(Parser)]
#[command(author, version, about = "Incremental web-novel chapter downloader", long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出注册表中的小说
    List,
    /// 对比远端与本地章节
    Check {
        /// 名称或序号 (1 起)
        #[arg(short, long)]
        series: String,
    },
    /// 下载后续章节
    Scrape {
        #[arg(short, long)]
        series: String,
        /// 本次下载的章节数
        #[arg(short = 'n', long, default_value_t = 10)]
        count: u32,
        /// 起始章节，缺省为本地最新章节的下一章
        #[arg(short, long)]
        from: Option<u32>,
    },
    /// 向注册表追加小说
    Add {
        #[arg(short, long)]
        url: String,
        #[arg(short, long)]
        name: Option<String>,
        /// nested_volume / infinite_scroll，缺省按域名推断
        #[arg(long)]
        site: Option<String>,
    },
    /// 导出 EPUB
    Export {
        #[arg(short, long)]
        series: String,
        #[arg(long, requires = "to", conflicts_with = "latest")]
        from: Option<u32>,
        #[arg(long, requires = "from")]
        to: Option<u32>,
        /// 仅导出最新的 N 章
        #[arg(long)]
        latest: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load_from(&cli.config)?);
    let mut registry = SeriesRegistry::load(&config.registry_file).await?;

    match cli.command {
        Commands::List => {
            if registry.entries().is_empty() {
                println!("No series in {:?}", registry.path());
            }
            for (i, entry) in registry.entries().iter().enumerate() {
                println!("{:>3}. {} [{}]\n     {}", i + 1, entry.name, entry.variant, entry.url);
            }
        }
        Commands::Check { series } => {
            let source = registry.find(&series)?.to_source(&config.archive_root);
            let engine = build_engine(&config, &source, None, RunControl::new())?;
            let plan = engine.check(&source).await?;
            println!("{}\n{}", source.name, plan);
        }
        Commands::Scrape {
            series,
            count,
            from,
        } => {
            let source = registry.find(&series)?.to_source(&config.archive_root);
            let (event_sender, event_receiver) = create_event_channel();
            let ui_handle = Ui::run(event_receiver);

            let control = RunControl::new();
            let engine = build_engine(&config, &source, Some(event_sender), control.clone())?;

            let ctrl = control.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("收到 Ctrl-C，将在当前章节结束后停止");
                    ctrl.cancel();
                }
            });

            let worker = tokio::spawn(async move {
                engine
                    .run(
                        &source,
                        RunRequest {
                            requested: count,
                            start: from,
                        },
                    )
                    .await
            });
            let report = worker.await.context("worker task panicked")??;

            // 发送端随 engine 一起释放，UI 循环随之结束
            let _ = ui_handle.await;

            for failure in &report.failures {
                tracing::debug!("#{}: {}", failure.number, failure.reason);
            }
            println!(
                "{}: {}/{} chapters (#{}-#{})",
                report.outcome, report.downloaded, report.requested, report.start, report.end
            );
        }
        Commands::Add { url, name, site } => {
            let variant = match site {
                Some(s) => s
                    .parse::<SiteVariant>()
                    .map_err(|_| anyhow::anyhow!("Unknown site variant: {}", s))?,
                None => SiteVariant::from_url(&url)
                    .with_context(|| format!("Cannot infer site variant from {}", url))?,
            };
            let name = name.unwrap_or_else(|| name_from_url(&url));
            registry
                .append(RegistryEntry::new(name.clone(), url, variant))
                .await?;
            println!("Added '{}' to {:?}", name, registry.path());
        }
        Commands::Export {
            series,
            from,
            to,
            latest,
        } => {
            let entry = registry.find(&series)?;
            let source = entry.to_source(&config.archive_root);
            let selection = match (from, to, latest) {
                (Some(a), Some(b), _) => Selection::Range(a, b),
                (_, _, Some(n)) => Selection::Latest(n),
                _ => Selection::All,
            };
            let reader = ArchiveReader::new(ChapterStore::new(&source.archive_dir), &config.archive);
            let path = EpubExporter::new(&entry.name)
                .export(&reader, selection, &config.export_dir, &series_folder(&entry.url))
                .await?;
            println!("Exported {:?}", path);
        }
    }

    Ok(())
}

/// 按系列的站点变体装配下载引擎
fn build_engine(
    config: &Arc<AppConfig>,
    source: &SeriesSource,
    events: Option<novel_harvest::core::event::EventSender>,
    control: RunControl,
) -> anyhow::Result<DownloadEngine> {
    let mut ctx = SiteContext::new(config.clone());
    if let Some(events) = &events {
        ctx = ctx.with_events(events.clone());
    }
    let site: Arc<dyn SiteStrategy> = SiteRegistry::new()
        .create(source.variant, &ctx)
        .with_context(|| format!("No strategy registered for {}", source.variant))?;
    let renderer = Arc::new(ChromiumRenderer::new(config.browser.clone()));

    let engine = match events {
        Some(events) => {
            let notifier = Announcer::new(config.notify.clone()).with_events(events.clone());
            DownloadEngine::new(config.clone(), renderer, site, Arc::new(notifier), control)
                .with_events(events)
        }
        None => DownloadEngine::new(
            config.clone(),
            renderer,
            site,
            Arc::new(SilentNotifier),
            control,
        ),
    };
    Ok(engine)
}
