//! 作用域会话 (Scoped Session)
//!
//! 持有一个渲染会话直到作用域结束：正常路径调用 `release`，
//! 提前返回或 panic 时由 `Drop` 在后台关闭。

use tracing::debug;

use crate::core::error::Result;
use crate::interfaces::renderer::{PageRenderer, PageSession};

pub struct ScopedSession {
    inner: Option<Box<dyn PageSession>>,
}

impl ScopedSession {
    pub async fn acquire(renderer: &dyn PageRenderer) -> Result<Self> {
        Ok(Self {
            inner: Some(renderer.new_session().await?),
        })
    }

    pub fn get(&mut self) -> &mut dyn PageSession {
        match self.inner.as_mut() {
            Some(session) => session.as_mut(),
            None => unreachable!("session is only taken on release or drop"),
        }
    }

    /// 关闭会话；失败只记录
    pub async fn release(mut self) {
        if let Some(session) = self.inner.take()
            && let Err(e) = session.close().await
        {
            debug!("会话关闭警告: {}", e);
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if let Some(session) = self.inner.take() {
            // 不在运行时内时只能直接丢弃
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = session.close().await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSite;

    #[tokio::test]
    async fn release_closes_once() {
        let renderer = FakeSite::new().into_renderer();
        let mut scoped = ScopedSession::acquire(&renderer).await.unwrap();
        let _ = scoped.get().current_url().await.unwrap();
        scoped.release().await;

        let log = renderer.site.log.lock();
        assert_eq!((log.sessions, log.closed), (1, 1));
    }

    #[tokio::test]
    async fn dropped_session_is_closed_in_background() {
        let renderer = FakeSite::new().into_renderer();
        {
            let _scoped = ScopedSession::acquire(&renderer).await.unwrap();
        }
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(renderer.site.log.lock().closed, 1);
    }
}
