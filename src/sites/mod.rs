use std::collections::HashMap;
use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::event::EventSender;
use crate::core::model::SiteVariant;
use crate::interfaces::site::SiteStrategy;

pub mod extractor;
pub mod katreading;
pub mod novelbin;

pub use extractor::ContentExtractor;
pub use katreading::KatReading;
pub use novelbin::NovelBin;

/// 站点构造上下文
#[derive(Clone)]
pub struct SiteContext {
    pub config: Arc<AppConfig>,
    pub events: Option<EventSender>,
}

impl SiteContext {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }
}

// ============================================================================
// 站点注册表
// ============================================================================

type SiteFactory = Box<dyn Fn(&SiteContext) -> Arc<dyn SiteStrategy> + Send + Sync>;

pub struct SiteRegistry {
    factories: HashMap<SiteVariant, SiteFactory>,
}

impl SiteRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register(SiteVariant::NestedVolume, |ctx| {
            Arc::new(KatReading::new(&ctx.config))
        });
        registry.register(SiteVariant::InfiniteScroll, |ctx| {
            Arc::new(NovelBin::new(&ctx.config, ctx.events.clone()))
        });
        registry
    }

    pub fn register<F>(&mut self, variant: SiteVariant, factory: F)
    where
        F: Fn(&SiteContext) -> Arc<dyn SiteStrategy> + Send + Sync + 'static,
    {
        self.factories.insert(variant, Box::new(factory));
    }

    pub fn create(&self, variant: SiteVariant, ctx: &SiteContext) -> Option<Arc<dyn SiteStrategy>> {
        self.factories.get(&variant).map(|f| f(ctx))
    }

    pub fn list(&self) -> Vec<SiteVariant> {
        self.factories.keys().copied().collect()
    }
}

impl Default for SiteRegistry {
    fn default() -> Self {
        Self::new()
    }
}
