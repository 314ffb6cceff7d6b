pub mod pipeline;
pub mod planner;
pub mod retry;
pub mod session;
pub mod status;

pub use pipeline::{ChapterFailure, DownloadEngine, RunReport, RunRequest};
pub use planner::ChapterPlan;
pub use retry::RetryPolicy;
pub use session::ScopedSession;
pub use status::{RunControl, RunState};
