use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A one-shot delayed task. Cancelling or dropping the handle stops the task
/// if it has not fired yet; once it fires, the callback runs to completion.
pub struct RefreshTimer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RefreshTimer {
    pub fn arm<F, Fut>(delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => on_fire().await,
            }
        });
        Self { cancel, handle }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// Cancel only: the firing callback may itself replace this timer, and aborting
// here would kill it mid-refresh.
impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
