//! Delayed-task scheduling capability
//!
//! The retry machine suspends only through this seam, so tests can run
//! it against a manual timer instead of the tokio clock.

use std::time::Duration;

use tokio::task::JoinHandle;

/// Work to run when a timer fires
pub type RetryTask = Box<dyn FnOnce() + Send>;

/// Handle to one scheduled task. Dropping the guard cancels the task
/// if it has not fired yet.
pub trait TimerGuard: Send {
    /// Cancel the pending task explicitly
    fn cancel(&mut self);
}

/// Schedules a task to run after a delay
pub trait RetryTimer: Send + Sync {
    fn schedule(&self, delay: Duration, task: RetryTask) -> Box<dyn TimerGuard>;
}

/// Production timer backed by the tokio runtime
#[derive(Debug, Default)]
pub struct TokioRetryTimer;

impl RetryTimer for TokioRetryTimer {
    fn schedule(&self, delay: Duration, task: RetryTask) -> Box<dyn TimerGuard> {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioTimerGuard {
            handle: Some(handle),
        })
    }
}

struct TokioTimerGuard {
    handle: Option<JoinHandle<()>>,
}

impl TimerGuard for TokioTimerGuard {
    fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for TokioTimerGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}
