pub mod notifier;
pub mod renderer;
pub mod site;

pub use notifier::Notifier;
pub use renderer::{ElementHandle, Locator, PageRenderer, PageSession, ScrollMetrics};
pub use site::{SessionMode, SiteStrategy};
